use std::ops::{Index, IndexMut};

use ndarray::{Array3, ArrayView, ArrayViewMut, Axis, Ix3};

use crate::{Idx2d, Idx3d};

pub mod slice;
mod tiff;

pub use slice::{BinSlice, BinSliceMut, ImgWriteRaw, ImgWriteVis, RawSlice, RawSliceMut};

pub use tiff::StackError;

/// 3D 图像堆栈的共用形状属性和部分通用操作.
pub trait StackAttr {
    /// 获取数据形状大小, 格式为 (切片数, 高, 宽).
    fn shape(&self) -> Idx3d;

    /// 获取数据水平切片形状大小.
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据像素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }
}

/// 3D 灰度图像堆栈. 灰度值以 `f32` 保存, 按 `(z, H, W)` 模式访问.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct ChipStack {
    data: Array3<f32>,
}

impl StackAttr for ChipStack {
    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for ChipStack {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for ChipStack {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl ChipStack {
    /// 根据裸灰度数据直接创建堆栈. 数据按 `(z, H, W)` 组织.
    ///
    /// # 注意
    ///
    /// 所有灰度值必须是有限的 (非 inf/NaN), 否则程序行为未定义.
    #[inline]
    pub fn from_array(data: Array3<f32>) -> Self {
        debug_assert!(data.iter().all(|v| v.is_finite()));
        Self { data }
    }

    /// 获取堆栈 z 空间的第 `z_index` 层切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> RawSlice<'_> {
        RawSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获取堆栈 z 空间的第 `z_index` 层可变切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at_mut(&mut self, z_index: usize) -> RawSliceMut<'_> {
        RawSliceMut::new(self.data.index_axis_mut(Axis(0), z_index))
    }

    /// 获取能按升序迭代水平不可变切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = RawSlice> {
        self.data.axis_iter(Axis(0)).map(RawSlice::new)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 获得底层数组的引用.
    #[inline]
    pub(crate) fn as_array(&self) -> &Array3<f32> {
        &self.data
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array3<f32> {
        self.data
    }
}

/// 3D 二值掩码堆栈. 像素值只允许为
/// [`CHIP_BACKGROUND`](crate::consts::mask::CHIP_BACKGROUND) 或
/// [`CHIP_FEATURE`](crate::consts::mask::CHIP_FEATURE).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct BinaryStack {
    data: Array3<u8>,
}

impl StackAttr for BinaryStack {
    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for BinaryStack {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for BinaryStack {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl BinaryStack {
    /// 根据裸掩码数据直接创建堆栈. 数据按 `(z, H, W)` 组织.
    ///
    /// # 注意
    ///
    /// 所有像素值必须为 0 或 1, 否则程序行为未定义.
    #[inline]
    pub fn from_array(data: Array3<u8>) -> Self {
        debug_assert!(data.iter().all(|p| *p <= 1));
        Self { data }
    }

    /// 创建给定形状的全背景堆栈.
    #[inline]
    pub fn zeros(shape: Idx3d) -> Self {
        Self {
            data: Array3::zeros(shape),
        }
    }

    /// 获取堆栈 z 空间的第 `z_index` 层不可变切片.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> BinSlice<'_> {
        BinSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获取堆栈 z 空间的第 `z_index` 层可变切片.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at_mut(&mut self, z_index: usize) -> BinSliceMut<'_> {
        BinSliceMut::new(self.data.index_axis_mut(Axis(0), z_index))
    }

    /// 获取能按升序迭代水平不可变切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = BinSlice> {
        self.data.axis_iter(Axis(0)).map(BinSlice::new)
    }

    /// 获取能按升序迭代水平可变切片的迭代器.
    #[inline]
    pub fn slice_iter_mut(&mut self) -> impl ExactSizeIterator<Item = BinSliceMut> {
        self.data.axis_iter_mut(Axis(0)).map(BinSliceMut::new)
    }

    /// 顺序地对每个水平可变切片实施 `op` 操作.
    #[inline]
    pub fn for_each_slice_mut<F>(&mut self, mut op: F)
    where
        F: FnMut(BinSliceMut),
    {
        self.slice_iter_mut().for_each(|s| op(s));
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u8, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, u8, Ix3> {
        self.data.view_mut()
    }

    /// 获取堆栈中值为 `label` 的像素个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 获取堆栈中的特征像素个数.
    #[inline]
    pub fn feature_count(&self) -> usize {
        self.count(crate::consts::mask::CHIP_FEATURE)
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array3<u8> {
        self.data
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl BinaryStack {
    /// 借助 `rayon`, 并行地对每个水平可变切片实施 `op` 操作.
    ///
    /// 每个切片的计算只读写自己的数据, 因此无需任何锁.
    pub fn par_for_each_slice_mut<F>(&mut self, op: F)
    where
        F: Fn(BinSliceMut) + Sync + Send,
    {
        self.data_mut()
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|v| {
                op(BinSliceMut::new(v));
            });
    }
}
