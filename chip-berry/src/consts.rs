//! 通用常量.

/// 单通道颜色与掩码像素值.
pub mod mask {
    /// 掩码体数据中, 背景的像素值.
    pub const CHIP_BACKGROUND: u8 = 0;

    /// 掩码体数据中, 芯片特征的像素值.
    pub const CHIP_FEATURE: u8 = 1;

    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;

    /// 像素是否是特征?
    #[inline]
    pub const fn is_feature(p: u8) -> bool {
        matches!(p, CHIP_FEATURE)
    }

    /// 像素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, CHIP_BACKGROUND)
    }
}

/// 流水线各阶段的默认参数.
pub mod defaults {
    /// 离群值归一化的默认分位数.
    pub const OUTLIER_QUANTILE: f64 = 0.1;

    /// 截断-重缩放模式的默认 (下, 上) 分位数.
    pub const CLIP_QUANTILES: (f64, f64) = (0.075, 0.25);

    /// 二值化的默认阈值.
    pub const BW_THRESHOLD: f32 = 0.3;

    /// 边界剔除的默认宽度: (左/右, 上/下), 以像素为单位.
    pub const BORDER_WIDTHS: (usize, usize) = (400, 200);

    /// 区域像素数过滤的默认下界 (含).
    pub const SIZE_SMALL: usize = 2_500;

    /// 区域像素数过滤的默认上界 (含).
    pub const SIZE_LARGE: usize = 50_000;

    /// 默认目标长宽比.
    pub const TARGET_ASPECT: f64 = 2.0;

    /// 区域包围盒跨度的默认绝对界限 (下界, 上界), 以像素为单位.
    pub const TARGET_EXTENT: (usize, usize) = (210, 350);
}
