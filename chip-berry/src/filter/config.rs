//! 流水线配置.
//!
//! 所有配置在流水线运行前一次性构造并整体校验, 运行期间不再修改.
//! 任何非法参数都会在任何像素计算发生之前以 [`ConfigError`] 报告,
//! 错误信息指明出错的阶段和字段.

use super::Stage;
use crate::consts::defaults;
use crate::region::Connectivity;
use thiserror::Error;

/// 离群值归一化阶段 (阶段 1) 的两种行为.
///
/// 两条观察到的流水线变体在该阶段并不等价, 因此作为两个显式命名的
/// 变体暴露, 而不是统一到一个开关下.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum OutlierMode {
    /// 单分位数阈值化: 逐切片计算 `quantile` 分位数, 低于该值的像素
    /// 置 0, 其余 **非零** 像素置 1 (原本为 0 的像素保持 0).
    /// 输出已是二值掩码, 因此该模式下二值化阶段必须关闭.
    Threshold {
        /// 分位数, 必须在 `[0, 1]` 内.
        quantile: f64,

        /// 是否在阈值化之后做 `1 - v` 反相.
        invert: bool,
    },

    /// 双分位数截断-重缩放: 逐切片计算上下分位数, 把像素截断到
    /// 分位数区间内, 再线性缩放到 `[0, 1]`. 输出仍是灰度数据.
    ClipRescale {
        /// 下分位数, 必须在 `[0, 1]` 内且小于 `upper`.
        lower: f64,

        /// 上分位数, 必须在 `[0, 1]` 内.
        upper: f64,
    },
}

/// 二值化阶段 (阶段 2) 的参数.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BinarizeParams {
    /// 二值化阈值: 像素 `< threshold` 置 0, 否则置 1.
    pub threshold: f32,

    /// 是否在二值化之后做 `1 - v` 反相.
    pub invert: bool,
}

/// 去噪阶段 (阶段 3) 的参数.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DenoiseParams {
    /// 开运算结构元的连通性.
    pub connectivity: Connectivity,

    /// 腐蚀/膨胀各自的迭代次数, 至少为 1.
    pub iterations: u32,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::Eight,
            iterations: 1,
        }
    }
}

/// 边界剔除阶段 (阶段 4) 的剔除宽度.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BorderWidths {
    /// 左右共用一个宽度, 上下共用一个宽度.
    Symmetric {
        /// 左右两侧各自剔除的列数.
        lr: usize,

        /// 上下两侧各自剔除的行数.
        tb: usize,
    },

    /// 四边宽度各自独立.
    PerSide {
        /// 左侧剔除的列数.
        left: usize,

        /// 顶部剔除的行数.
        top: usize,

        /// 右侧剔除的列数.
        right: usize,

        /// 底部剔除的行数.
        bottom: usize,
    },
}

impl BorderWidths {
    /// 从扁平数组构造. 只接受长度为 2 (左右, 上下) 或
    /// 4 (左, 上, 右, 下) 的数组, 否则报告配置错误.
    pub fn from_slice(widths: &[usize]) -> Result<Self, ConfigError> {
        match *widths {
            [lr, tb] => Ok(Self::Symmetric { lr, tb }),
            [left, top, right, bottom] => Ok(Self::PerSide {
                left,
                top,
                right,
                bottom,
            }),
            _ => Err(ConfigError::BorderWidthLen(widths.len())),
        }
    }

    /// 展开为 (左, 上, 右, 下) 四元组.
    #[inline]
    pub(crate) fn resolve(&self) -> (usize, usize, usize, usize) {
        match *self {
            Self::Symmetric { lr, tb } => (lr, tb, lr, tb),
            Self::PerSide {
                left,
                top,
                right,
                bottom,
            } => (left, top, right, bottom),
        }
    }
}

/// 区域像素数过滤阶段 (阶段 5) 的闭区间界限.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SizeBounds {
    /// 像素数下界 (含).
    pub small: usize,

    /// 像素数上界 (含).
    pub large: usize,
}

/// 形状过滤阶段 (阶段 6) 的包围盒跨度绝对界限 (闭区间).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ExtentBounds {
    /// 较短跨度的下界 (含).
    pub low: usize,

    /// 较长跨度的上界 (含).
    pub high: usize,
}

/// 整条流水线的不可变配置.
///
/// 配置在一次运行开始前构造, 运行期间绝不修改.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct BoxFilterConfig {
    /// 阶段 1: 离群值归一化行为.
    pub outlier: OutlierMode,

    /// 阶段 2: 二值化参数. `Threshold` 模式下必须为 `None`
    /// (该模式的输出已是二值掩码); `ClipRescale` 模式下必须为 `Some`.
    pub binarize: Option<BinarizeParams>,

    /// 阶段 3: 去噪参数. `None` 表示跳过去噪,
    /// 由阶段 5 的像素数过滤兜底.
    pub denoise: Option<DenoiseParams>,

    /// 阶段 4: 边界剔除宽度.
    pub boundary: BorderWidths,

    /// 阶段 5: 区域像素数闭区间.
    pub size_bounds: SizeBounds,

    /// 阶段 6: 目标长宽比 `r`, 必须 `>= 1`.
    /// 区域保留条件之一是跨度比落在 `[1/r, r]` 内 (含端点).
    pub target_aspect: f64,

    /// 阶段 6: 可选的包围盒跨度绝对界限. `None` 表示该谓词不启用.
    pub target_extent: Option<ExtentBounds>,
}

impl Default for BoxFilterConfig {
    fn default() -> Self {
        let (lr, tb) = defaults::BORDER_WIDTHS;
        Self {
            outlier: OutlierMode::Threshold {
                quantile: defaults::OUTLIER_QUANTILE,
                invert: true,
            },
            binarize: None,
            denoise: Some(DenoiseParams::default()),
            boundary: BorderWidths::Symmetric { lr, tb },
            size_bounds: SizeBounds {
                small: defaults::SIZE_SMALL,
                large: defaults::SIZE_LARGE,
            },
            target_aspect: defaults::TARGET_ASPECT,
            target_extent: Some(ExtentBounds {
                low: defaults::TARGET_EXTENT.0,
                high: defaults::TARGET_EXTENT.1,
            }),
        }
    }
}

impl BoxFilterConfig {
    /// 截断-重缩放变体的预设配置: 双分位数截断-重缩放后做反相
    /// 二值化, 不去噪, 其余阶段与默认配置一致.
    pub fn clip_rescale_preset() -> Self {
        let (lower, upper) = defaults::CLIP_QUANTILES;
        Self {
            outlier: OutlierMode::ClipRescale { lower, upper },
            binarize: Some(BinarizeParams {
                threshold: defaults::BW_THRESHOLD,
                invert: true,
            }),
            denoise: None,
            ..Self::default()
        }
    }

    /// 整体校验配置. 在任何像素计算之前调用.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_unit = |q: f64| (0.0..=1.0).contains(&q);

        match self.outlier {
            OutlierMode::Threshold { quantile, .. } => {
                if !in_unit(quantile) {
                    return Err(ConfigError::QuantileOutOfRange {
                        field: "outlier.quantile",
                        value: quantile,
                    });
                }
                if self.binarize.is_some() {
                    return Err(ConfigError::BinarizeAfterThreshold);
                }
            }
            OutlierMode::ClipRescale { lower, upper } => {
                if !in_unit(lower) {
                    return Err(ConfigError::QuantileOutOfRange {
                        field: "outlier.lower",
                        value: lower,
                    });
                }
                if !in_unit(upper) {
                    return Err(ConfigError::QuantileOutOfRange {
                        field: "outlier.upper",
                        value: upper,
                    });
                }
                if lower >= upper {
                    return Err(ConfigError::QuantileOrder { lower, upper });
                }
                let Some(bp) = self.binarize else {
                    return Err(ConfigError::MissingBinarize);
                };
                if !(0.0..=1.0).contains(&bp.threshold) {
                    return Err(ConfigError::ThresholdOutOfRange(bp.threshold));
                }
            }
        }

        if let Some(dn) = self.denoise {
            if dn.iterations == 0 {
                return Err(ConfigError::ZeroIterations);
            }
        }

        let SizeBounds { small, large } = self.size_bounds;
        if small > large {
            return Err(ConfigError::SizeBoundsOrder { small, large });
        }

        if !(self.target_aspect >= 1.0) {
            return Err(ConfigError::AspectTooSmall(self.target_aspect));
        }

        if let Some(ExtentBounds { low, high }) = self.target_extent {
            if low > high {
                return Err(ConfigError::ExtentBoundsOrder { low, high });
            }
        }

        Ok(())
    }
}

/// 在任何像素计算之前检测到的配置错误. 对一次运行总是致命的, 绝不重试.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// 分位数不在 `[0, 1]` 内.
    #[error("配置项 `{field}` 的分位数 {value} 不在 [0, 1] 内")]
    QuantileOutOfRange {
        /// 出错的配置字段.
        field: &'static str,

        /// 实际值.
        value: f64,
    },

    /// 分位数区间为空.
    #[error("配置项 `outlier` 的分位数区间无效: lower = {lower} >= upper = {upper}")]
    QuantileOrder {
        /// 下分位数.
        lower: f64,

        /// 上分位数.
        upper: f64,
    },

    /// 二值化阈值不在 `[0, 1]` 内.
    #[error("配置项 `binarize.threshold` 的阈值 {0} 不在 [0, 1] 内")]
    ThresholdOutOfRange(f32),

    /// `Threshold` 模式下多余地配置了二值化阶段.
    #[error("`OutlierMode::Threshold` 已输出二值掩码, 不允许再配置 `binarize` 阶段")]
    BinarizeAfterThreshold,

    /// `ClipRescale` 模式下缺少二值化阶段.
    #[error("`OutlierMode::ClipRescale` 输出灰度数据, 必须配置 `binarize` 阶段")]
    MissingBinarize,

    /// 去噪迭代次数为 0.
    #[error("配置项 `denoise.iterations` 不允许为 0")]
    ZeroIterations,

    /// 边界剔除宽度数组长度非法.
    #[error("配置项 `boundary` 只接受长度为 2 或 4 的数组, 实际为 {0}")]
    BorderWidthLen(usize),

    /// 区域像素数区间为空.
    #[error("配置项 `size_bounds` 区间无效: small = {small} > large = {large}")]
    SizeBoundsOrder {
        /// 下界.
        small: usize,

        /// 上界.
        large: usize,
    },

    /// 目标长宽比小于 1 (或非有限值).
    #[error("配置项 `target_aspect` 必须 >= 1, 实际为 {0}")]
    AspectTooSmall(f64),

    /// 包围盒跨度区间为空.
    #[error("配置项 `target_extent` 区间无效: low = {low} > high = {high}")]
    ExtentBoundsOrder {
        /// 下界.
        low: usize,

        /// 上界.
        high: usize,
    },
}

impl ConfigError {
    /// 该配置错误所属的流水线阶段.
    pub fn stage(&self) -> Stage {
        match self {
            Self::QuantileOutOfRange { .. } | Self::QuantileOrder { .. } => Stage::RemoveOutliers,
            Self::ThresholdOutOfRange(_)
            | Self::BinarizeAfterThreshold
            | Self::MissingBinarize => Stage::Binarize,
            Self::ZeroIterations => Stage::Denoise,
            Self::BorderWidthLen(_) => Stage::CullBoundary,
            Self::SizeBoundsOrder { .. } => Stage::SizeFilter,
            Self::AspectTooSmall(_) | Self::ExtentBoundsOrder { .. } => Stage::AspectFilter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(BoxFilterConfig::default().validate().is_ok());
        assert!(BoxFilterConfig::clip_rescale_preset().validate().is_ok());
    }

    #[test]
    fn test_border_widths_from_slice() {
        assert_eq!(
            BorderWidths::from_slice(&[3, 7]).unwrap(),
            BorderWidths::Symmetric { lr: 3, tb: 7 }
        );
        assert_eq!(
            BorderWidths::from_slice(&[1, 2, 3, 4]).unwrap(),
            BorderWidths::PerSide {
                left: 1,
                top: 2,
                right: 3,
                bottom: 4
            }
        );
        assert_eq!(
            BorderWidths::from_slice(&[1, 2, 3]).unwrap_err(),
            ConfigError::BorderWidthLen(3)
        );
        // `(l, t)` 与 `(l, t, l, t)` 展开后完全一致.
        assert_eq!(
            BorderWidths::Symmetric { lr: 3, tb: 7 }.resolve(),
            BorderWidths::PerSide {
                left: 3,
                top: 7,
                right: 3,
                bottom: 7
            }
            .resolve()
        );
    }

    #[test]
    fn test_quantile_range_checked() {
        let cfg = BoxFilterConfig {
            outlier: OutlierMode::Threshold {
                quantile: 1.5,
                invert: false,
            },
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::QuantileOutOfRange {
                field: "outlier.quantile",
                value: 1.5
            }
        );
        assert_eq!(err.stage(), Stage::RemoveOutliers);
    }

    #[test]
    fn test_binarize_consistency() {
        // Threshold 模式下配置二值化阶段是错误的.
        let cfg = BoxFilterConfig {
            binarize: Some(BinarizeParams {
                threshold: 0.3,
                invert: false,
            }),
            ..Default::default()
        };
        assert_eq!(
            cfg.validate().unwrap_err(),
            ConfigError::BinarizeAfterThreshold
        );

        // ClipRescale 模式下缺少二值化阶段同样是错误的.
        let cfg = BoxFilterConfig {
            outlier: OutlierMode::ClipRescale {
                lower: 0.075,
                upper: 0.25,
            },
            binarize: None,
            ..Default::default()
        };
        assert_eq!(cfg.validate().unwrap_err(), ConfigError::MissingBinarize);
    }

    #[test]
    fn test_aspect_must_be_at_least_one() {
        let cfg = BoxFilterConfig {
            target_aspect: 0.5,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert_eq!(err, ConfigError::AspectTooSmall(0.5));
        assert_eq!(err.stage(), Stage::AspectFilter);
    }
}
