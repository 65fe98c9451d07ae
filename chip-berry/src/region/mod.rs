//! 连通区域标记与区域描述子.
//!
//! 流水线的第 5, 6 两个阶段都遵循同一个 "标记-过滤" 模式:
//! 先对切片做一次连通区域标记, 再对每个区域应用保留谓词,
//! 拒绝的区域整体涂为背景. 该模式由 [`BinSliceMut::retain_regions`]
//! 统一实现, 谓词由调用方注入.

use crate::consts::mask::*;
use crate::{Area2d, BinSlice, BinSliceMut, Idx2d};
use itertools::{Itertools, MinMaxResult};

/// 连通性 (邻接规则).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Connectivity {
    /// 4-邻接 (上下左右).
    Four,

    /// 8-邻接 (上下左右及四个对角).
    Eight,
}

/// 获得 `(h, w)` 的 4-邻居索引. 不检查越界.
#[inline]
pub(crate) fn neighbour4((h, w): Idx2d) -> [Idx2d; 4] {
    [
        (h.wrapping_sub(1), w),
        (h.saturating_add(1), w),
        (h, w.wrapping_sub(1)),
        (h, w.saturating_add(1)),
    ]
}

/// 获得 `(h, w)` 的 8-邻居索引. 不检查越界.
#[inline]
pub(crate) fn neighbour8((h, w): Idx2d) -> [Idx2d; 8] {
    [
        (h.wrapping_sub(1), w.wrapping_sub(1)),
        (h.wrapping_sub(1), w),
        (h.wrapping_sub(1), w.saturating_add(1)),
        (h, w.wrapping_sub(1)),
        (h, w.saturating_add(1)),
        (h.saturating_add(1), w.wrapping_sub(1)),
        (h.saturating_add(1), w),
        (h.saturating_add(1), w.saturating_add(1)),
    ]
}

impl Connectivity {
    /// 获得 `pos` 在该邻接规则下的全部邻居索引. 不检查越界.
    #[inline]
    pub(crate) fn neighbours(self, pos: Idx2d) -> Vec<Idx2d> {
        match self {
            Connectivity::Four => neighbour4(pos).to_vec(),
            Connectivity::Eight => neighbour8(pos).to_vec(),
        }
    }
}

/// 单个切片上的连通区域描述子.
///
/// 该结构仅在单个过滤阶段对单个切片的一次迭代中短暂存在, 不被持久化.
#[derive(Clone, Debug)]
pub struct Region {
    pixels: Area2d,
}

impl From<Area2d> for Region {
    #[inline]
    fn from(pixels: Area2d) -> Self {
        Self { pixels }
    }
}

impl Region {
    /// 区域包含的像素个数.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    /// 区域的所有像素索引. 无顺序保证.
    #[inline]
    pub fn pixels(&self) -> &[Idx2d] {
        &self.pixels
    }

    /// 区域包围盒在 (高, 宽) 两个方向上的跨度.
    ///
    /// 跨度按 **包含两端像素** 计算, 即 `max - min + 1`.
    /// 因此非空区域的跨度总是至少为 1. 空区域的跨度为 `(0, 0)`.
    pub fn extents(&self) -> Idx2d {
        let span = |it: MinMaxResult<usize>| match it {
            MinMaxResult::NoElements => 0,
            MinMaxResult::OneElement(_) => 1,
            MinMaxResult::MinMax(lo, hi) => hi - lo + 1,
        };
        let dx = span(self.pixels.iter().map(|p| p.0).minmax());
        let dy = span(self.pixels.iter().map(|p| p.1).minmax());
        (dx, dy)
    }

    /// 区域包围盒的跨度比 `dX / dY` (高方向跨度比宽方向跨度).
    ///
    /// 宽方向跨度为 0 (即空区域) 时无法计算比值, 返回 `None`.
    /// 调用方应将该情况视为自动拒绝.
    pub fn aspect(&self) -> Option<f64> {
        let (dx, dy) = self.extents();
        if dy == 0 {
            return None;
        }
        Some(dx as f64 / dy as f64)
    }
}

macro_rules! impl_feature_regions {
    ($($slice: ty),+) => {
        $(
            impl $slice {
                /// 按照给定连通性提取图像中所有特征连通区域.
                pub fn feature_regions(&self, conn: Connectivity) -> Vec<Region> {
                    self.areas_conn(conn, is_feature)
                        .into_iter()
                        .map(Region::from)
                        .collect()
                }
            }
        )+
    };
}

impl_feature_regions!(BinSlice<'_>, BinSliceMut<'_>);

impl BinSliceMut<'_> {
    /// 标记所有特征连通区域, 并对每个区域应用保留谓词 `keep`.
    /// 被拒绝区域的所有像素被涂为背景. 返回被移除的区域个数.
    ///
    /// 标记在任何修改发生前一次性完成, 因此单个区域的移除
    /// 不会影响其它区域的判定.
    pub fn retain_regions<F>(&mut self, conn: Connectivity, mut keep: F) -> usize
    where
        F: FnMut(&Region) -> bool,
    {
        let regions = self.feature_regions(conn);
        let mut removed = 0usize;
        for region in &regions {
            if !keep(region) {
                self.fill_batch(region.pixels().iter().copied(), CHIP_BACKGROUND);
                removed += 1;
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::{Connectivity, Region};
    use crate::BinaryStack;
    use ndarray::Array3;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_region_extents_and_aspect() {
        // 2x3 的实心块.
        let r = Region::from(vec![(5, 5), (5, 6), (5, 7), (6, 5), (6, 6), (6, 7)]);
        assert_eq!(r.pixel_count(), 6);
        assert_eq!(r.extents(), (2, 3));
        assert!(f64_eq(r.aspect().unwrap(), 2.0 / 3.0));

        // 单像素区域的跨度为 (1, 1).
        let single = Region::from(vec![(3, 4)]);
        assert_eq!(single.extents(), (1, 1));
        assert!(f64_eq(single.aspect().unwrap(), 1.0));
    }

    #[test]
    fn test_degenerate_region_rejected() {
        let empty = Region::from(vec![]);
        assert_eq!(empty.extents(), (0, 0));
        assert!(empty.aspect().is_none());
    }

    /// 对角相邻的两个像素: 8-邻接下是一个区域, 4-邻接下是两个.
    #[test]
    fn test_connectivity_difference() {
        let mut data = Array3::<u8>::zeros((1, 4, 4));
        data[(0, 1, 1)] = 1;
        data[(0, 2, 2)] = 1;
        let stack = BinaryStack::from_array(data);

        let sl = stack.slice_at(0);
        assert_eq!(sl.feature_regions(Connectivity::Eight).len(), 1);
        assert_eq!(sl.feature_regions(Connectivity::Four).len(), 2);
    }

    #[test]
    fn test_retain_regions_stable_labelling() {
        // 两个区域: 一个 2x2, 一个单像素.
        let mut data = Array3::<u8>::zeros((1, 6, 6));
        for (h, w) in [(1, 1), (1, 2), (2, 1), (2, 2), (4, 4)] {
            data[(0, h, w)] = 1;
        }
        let mut stack = BinaryStack::from_array(data);

        let removed = stack
            .slice_at_mut(0)
            .retain_regions(Connectivity::Eight, |r| r.pixel_count() >= 2);
        assert_eq!(removed, 1);

        let sl = stack.slice_at(0);
        assert_eq!(sl.count(1), 4);
        assert_eq!(sl.get((4, 4)), Some(&0));
    }
}
