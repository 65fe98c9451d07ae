use crate::consts::mask::is_background;
use crate::region::Connectivity;
use crate::{Area2d, Areas2d, Idx2d, Predicate};
use ndarray::iter::{Iter, IterMut};
use ndarray::{ArrayView2, ArrayViewMut2, Ix2};
use std::collections::{HashSet, VecDeque};
use std::ops::{Index, IndexMut};

/// 不可变、借用的二维水平掩码切片.
pub struct BinSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::BinaryStack`].
    ///
    /// 这里有意把代码写死为 `ArrayView` 降低灵活性, 但使结构的意图更加明确.
    data: ArrayView2<'a, u8>,
}

/// 可变、借用的二维水平掩码切片.
pub struct BinSliceMut<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::BinaryStack`].
    ///
    /// 这里有意把代码写死为 `ArrayViewMut` 降低灵活性, 但使结构的意图更加明确.
    data: ArrayViewMut2<'a, u8>,
}

impl Index<Idx2d> for BinSlice<'_> {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl Index<Idx2d> for BinSliceMut<'_> {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx2d> for BinSliceMut<'_> {
    #[inline]
    fn index_mut(&mut self, index: Idx2d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

/// 可变方法集合.
impl<'a> BinSliceMut<'a> {
    /// 获得 **底层** 数据的一份可变 shallow copy.
    #[inline]
    pub fn array_view_mut(&mut self) -> ArrayViewMut2<u8> {
        self.data.view_mut()
    }

    /// 获取可以迭代并修改图像像素的迭代器.
    #[inline]
    pub fn iter_mut(&mut self) -> IterMut<'_, u8, Ix2> {
        self.data.iter_mut()
    }

    /// 获取给定位置 (高, 宽) 的像素值, 并可就地修改. 越界时返回 `None`.
    #[inline]
    pub fn get_mut(&mut self, pos: Idx2d) -> Option<&mut u8> {
        self.data.get_mut(pos)
    }

    /// 将 `it` 中的每个索引对应的像素改为 `new`.
    pub(crate) fn fill_batch<I: IntoIterator<Item = Idx2d>>(&mut self, it: I, new: u8) {
        for pos in it.into_iter() {
            self[pos] = new;
        }
    }
}

/// 掩码切片的不可变方法集合.
macro_rules! impl_bin_slice_immut {
    ($life: lifetime, $slice: ty, $array: ty) => {
        /// 不可变方法集合.
        impl<$life> $slice {
            /// 直接初始化.
            #[inline]
            pub(crate) fn new(data: $array) -> Self {
                Self { data }
            }

            /// 获得 **底层** 数据的一份不可变 shallow copy.
            #[inline]
            pub fn array_view(&self) -> ArrayView2<u8> {
                self.data.view()
            }

            /// 获得一份不可变的 **本体** shallow copy.
            #[inline]
            pub fn shallow_copy(&self) -> BinSlice {
                BinSlice { data: self.array_view() }
            }

            /// 获取可以迭代图像像素的迭代器.
            #[inline]
            pub fn iter(&self) -> Iter<'_, u8, Ix2> {
                self.data.iter()
            }

            /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
            #[inline]
            pub fn get(&self, pos: Idx2d) -> Option<&u8> {
                self.data.get(pos)
            }

            /// 该图是否为全背景图?
            #[inline]
            pub fn is_background(&self) -> bool {
                self.data.iter().copied().all(is_background)
            }

            /// 图像的分辨率 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                let &[h, w] = self.data.shape() else {
                    unreachable!()
                };
                (h, w)
            }

            /// 图像的像素个数.
            #[inline]
            pub fn size(&self) -> usize {
                let (h, w) = self.shape();
                h * w
            }

            /// 获得图像的高.
            #[inline]
            pub fn height(&self) -> usize {
                self.shape().0
            }

            /// 获得图像的宽.
            #[inline]
            pub fn width(&self) -> usize {
                self.shape().1
            }

            /// 判断一个索引是否合法 (未越界).
            #[inline]
            pub fn check(&self, (h, w): Idx2d) -> bool {
                let (h_len, w_len) = self.shape();
                h < h_len && w < w_len
            }

            /// 统计图像中值为 `label` 的像素总个数.
            #[inline]
            pub fn count(&self, label: u8) -> usize {
                self.data.iter().filter(|&p| *p == label).count()
            }

            /// 以行优先规则, 获取能迭代图像所有索引的迭代器.
            #[inline]
            pub fn pos_iter(&self) -> impl Iterator<Item = Idx2d> {
                super::iter::PosIter::new(self.shape())
            }

            /// 以行优先规则, 获取能迭代图像所有 `(索引, 像素值)` 的迭代器.
            #[inline]
            pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &u8)> {
                self.data.indexed_iter()
            }

            /// 按照连通性 `conn` 获取所有满足谓词 `pred` 的连通区域.
            /// 两个像素 `p1` 和 `p2` 属于同一个区域, 当且仅当存在一条从 `p1`
            /// 到 `p2` 的 `conn`-相邻路径, 且路径上的所有像素 (包括 `p1` 和
            /// `p2`) 都满足谓词 `pred`.
            pub fn areas_conn(&self, conn: Connectivity, pred: Predicate) -> Areas2d {
                let mut ans = Areas2d::with_capacity(1);
                let mut bfs_q: VecDeque<Idx2d> = VecDeque::with_capacity(4);
                let mut set: HashSet<Idx2d> = HashSet::with_capacity(16);

                for pos in self.pos_iter() {
                    if set.contains(&pos) || !pred(self[pos]) {
                        continue;
                    }
                    bfs_q.push_back(pos);
                    let mut this_area = Area2d::with_capacity(1);
                    while let Some(cur_pos) = bfs_q.pop_front() {
                        if set.contains(&cur_pos) {
                            continue;
                        }
                        set.insert(cur_pos);
                        this_area.push(cur_pos);

                        // bfs
                        bfs_q.extend(conn.neighbours(cur_pos).into_iter().filter(|p| {
                            self.check(*p) && pred(self[*p]) && !set.contains(p)
                        }));
                    }
                    ans.push(this_area);
                }
                ans
            }
        }
    };
}

impl_bin_slice_immut!('a, BinSlice<'a>, ArrayView2<'a, u8>);
impl_bin_slice_immut!('a, BinSliceMut<'a>, ArrayViewMut2<'a, u8>);

/// 不可变、借用的二维水平灰度切片.
pub struct RawSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::ChipStack`].
    ///
    /// 这里有意把代码写死为 `ArrayView` 降低灵活性, 但使结构的意图更加明确.
    data: ArrayView2<'a, f32>,
}

/// 可变、借用的二维水平灰度切片.
pub struct RawSliceMut<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::ChipStack`].
    ///
    /// 这里有意把代码写死为 `ArrayViewMut` 降低灵活性, 但使结构的意图更加明确.
    data: ArrayViewMut2<'a, f32>,
}

impl Index<Idx2d> for RawSlice<'_> {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl Index<Idx2d> for RawSliceMut<'_> {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx2d> for RawSliceMut<'_> {
    #[inline]
    fn index_mut(&mut self, index: Idx2d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

/// 可变方法集合.
impl<'a> RawSliceMut<'a> {
    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut2<f32> {
        self.data.view_mut()
    }

    /// 获取可以迭代并修改图像像素的迭代器.
    #[inline]
    pub fn iter_mut(&mut self) -> IterMut<'_, f32, Ix2> {
        self.data.iter_mut()
    }

    /// 获取给定位置 (高, 宽) 的像素值, 并可就地修改. 越界时返回 `None`.
    #[inline]
    pub fn get_mut(&mut self, pos: Idx2d) -> Option<&mut f32> {
        self.data.get_mut(pos)
    }
}

/// 灰度切片的不可变方法集合.
macro_rules! impl_raw_slice_immut {
    ($life: lifetime, $slice: ty, $array: ty) => {
        /// 不可变方法集合.
        impl<$life> $slice {
            /// 直接初始化.
            #[inline]
            pub(crate) fn new(data: $array) -> Self {
                Self { data }
            }

            /// 获得数据的一份不可变 shallow copy.
            #[inline]
            pub fn data(&self) -> ArrayView2<f32> {
                self.data.view()
            }

            /// 获取可以迭代图像像素的迭代器.
            #[inline]
            pub fn iter(&self) -> Iter<'_, f32, Ix2> {
                self.data.iter()
            }

            /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
            #[inline]
            pub fn get(&self, pos: Idx2d) -> Option<&f32> {
                self.data.get(pos)
            }

            /// 图像的分辨率 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                let &[h, w] = self.data.shape() else {
                    unreachable!()
                };
                (h, w)
            }

            /// 图像的像素个数.
            #[inline]
            pub fn size(&self) -> usize {
                let (h, w) = self.shape();
                h * w
            }

            /// 以行优先规则, 获取能迭代图像所有 `(索引, 灰度值)` 的迭代器.
            #[inline]
            pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &f32)> {
                self.data.indexed_iter()
            }
        }
    };
}

impl_raw_slice_immut!('a, RawSlice<'a>, ArrayView2<'a, f32>);
impl_raw_slice_immut!('a, RawSliceMut<'a>, ArrayViewMut2<'a, f32>);
