//! 区域保留谓词 (流水线阶段 5, 6).
//!
//! 所有界限均为闭区间: 恰好落在端点上的区域被保留.

use crate::filter::{ExtentBounds, SizeBounds};
use crate::region::Region;

/// 阶段 5: 区域像素数落在 `[small, large]` 内时保留.
pub(crate) fn size_keep(region: &Region, bounds: &SizeBounds) -> bool {
    (bounds.small..=bounds.large).contains(&region.pixel_count())
}

/// 阶段 6 谓词之一: 区域跨度比 `dX / dY` 落在
/// `[1 / target_aspect, target_aspect]` 内时保留.
/// 跨度比无法计算 (空区域) 时拒绝.
pub(crate) fn aspect_keep(region: &Region, target_aspect: f64) -> bool {
    match region.aspect() {
        Some(ratio) => ratio >= 1.0 / target_aspect && ratio <= target_aspect,
        None => false,
    }
}

/// 阶段 6 谓词之二: 较短跨度不低于 `low` 且较长跨度不超过 `high`
/// 时保留.
pub(crate) fn extent_keep(region: &Region, bounds: &ExtentBounds) -> bool {
    let (dx, dy) = region.extents();
    dx.min(dy) >= bounds.low && dx.max(dy) <= bounds.high
}

/// 阶段 6 的完整保留条件: 所有启用的谓词都必须接受.
pub(crate) fn shape_keep(region: &Region, target_aspect: f64, extent: Option<&ExtentBounds>) -> bool {
    aspect_keep(region, target_aspect) && extent.map_or(true, |b| extent_keep(region, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_region(h_span: usize, w_span: usize) -> Region {
        let pixels: Vec<_> = (0..h_span)
            .flat_map(|h| (0..w_span).map(move |w| (h, w)))
            .collect();
        Region::from(pixels)
    }

    #[test]
    fn test_size_bounds_inclusive() {
        let bounds = SizeBounds { small: 6, large: 12 };
        assert!(size_keep(&solid_region(2, 3), &bounds));
        assert!(size_keep(&solid_region(3, 4), &bounds));
        assert!(!size_keep(&solid_region(1, 5), &bounds));
        assert!(!size_keep(&solid_region(3, 5), &bounds));
    }

    #[test]
    fn test_aspect_band_inclusive() {
        // 跨度比恰好等于 r 或 1/r 的区域被保留.
        assert!(aspect_keep(&solid_region(50, 100), 2.0));
        assert!(aspect_keep(&solid_region(100, 50), 2.0));
        assert!(aspect_keep(&solid_region(30, 30), 2.0));
        assert!(!aspect_keep(&solid_region(49, 100), 2.0));
        assert!(!aspect_keep(&solid_region(100, 49), 2.0));
    }

    #[test]
    fn test_extent_bounds_orientation_free() {
        let bounds = ExtentBounds { low: 10, high: 40 };
        // 界限作用于短/长跨度, 与方向无关.
        assert!(extent_keep(&solid_region(10, 40), &bounds));
        assert!(extent_keep(&solid_region(40, 10), &bounds));
        assert!(!extent_keep(&solid_region(9, 40), &bounds));
        assert!(!extent_keep(&solid_region(10, 41), &bounds));
    }

    #[test]
    fn test_shape_keep_composes_predicates() {
        let region = solid_region(20, 30);
        assert!(shape_keep(&region, 2.0, None));
        assert!(shape_keep(&region, 2.0, Some(&ExtentBounds { low: 20, high: 30 })));
        assert!(!shape_keep(&region, 2.0, Some(&ExtentBounds { low: 25, high: 30 })));
        // 比值谓词失败时整体拒绝, 与跨度谓词无关.
        assert!(!shape_keep(&solid_region(5, 30), 2.0, None));
    }
}
