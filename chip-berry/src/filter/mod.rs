//! 矩形特征提取流水线.
//!
//! 流水线把一个灰度堆栈逐阶段精炼为二值掩码, 最多 6 个阶段:
//!
//! 1. 离群值归一化 ([`OutlierMode`]);
//! 2. 二值化 (仅 [`OutlierMode::ClipRescale`] 模式);
//! 3. 形态学开运算去噪 (可选);
//! 4. 边界条带剔除;
//! 5. 连通区域像素数过滤;
//! 6. 连通区域形状 (跨度比/跨度界限) 过滤.
//!
//! 所有阶段都是逐切片独立计算的确定性纯函数: 同样的输入和配置
//! 总是产生同样的输出, 切片之间没有任何信息流动. 因此切片级并行
//! (`rayon` feature) 不改变结果.
//!
//! [`BoxFilter`] 是流水线的驱动器, 持有输入, 配置, 各阶段的中间
//! 结果快照和最终掩码. 它只有 "从头跑一遍" 一种驱动方式;
//! 运行后对中间结果的任何可变访问都会把状态打回
//! [`RunState::Dirty`], 此后最终结果不再可取, 直到重新运行.

mod boundary;
mod config;
mod denoise;
mod normalize;
mod shape;

pub use config::{
    BinarizeParams, BorderWidths, BoxFilterConfig, ConfigError, DenoiseParams, ExtentBounds,
    OutlierMode, SizeBounds,
};

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array3, ArrayView2, ArrayViewMut2, Axis, Zip};
use thiserror::Error;

use crate::region::Connectivity;
use crate::{BinSliceMut, BinaryStack, ChipStack, RawSlice, StackAttr};

/// 流水线阶段标识. 用于日志, 错误报告和中间结果检索.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Stage {
    /// 阶段 1: 离群值归一化.
    RemoveOutliers,

    /// 阶段 2: 二值化.
    Binarize,

    /// 阶段 3: 形态学开运算去噪.
    Denoise,

    /// 阶段 4: 边界条带剔除.
    CullBoundary,

    /// 阶段 5: 连通区域像素数过滤.
    SizeFilter,

    /// 阶段 6: 连通区域形状过滤.
    AspectFilter,
}

impl Stage {
    /// 全部阶段, 按执行顺序排列.
    pub const ALL: [Stage; 6] = [
        Stage::RemoveOutliers,
        Stage::Binarize,
        Stage::Denoise,
        Stage::CullBoundary,
        Stage::SizeFilter,
        Stage::AspectFilter,
    ];

    /// 阶段的稳定名称.
    pub fn name(self) -> &'static str {
        match self {
            Stage::RemoveOutliers => "remove-outliers",
            Stage::Binarize => "binarize",
            Stage::Denoise => "denoise",
            Stage::CullBoundary => "cull-boundary",
            Stage::SizeFilter => "size-filter",
            Stage::AspectFilter => "aspect-filter",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 流水线的运行状态.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunState {
    /// 尚未运行, 或中间结果在运行后被外部修改过.
    Dirty,

    /// 最近一次运行成功完成, 且此后未发生任何修改.
    Clean,
}

/// 单个阶段的输出快照. 前两个阶段可能输出灰度数据,
/// 其余阶段输出二值掩码.
#[derive(Clone, Debug)]
pub enum StageOutput {
    /// 灰度堆栈 (仅 [`OutlierMode::ClipRescale`] 的阶段 1 输出).
    Gray(ChipStack),

    /// 二值掩码堆栈.
    Mask(BinaryStack),
}

impl StageOutput {
    /// 以灰度堆栈视角访问. 掩码输出返回 `None`.
    #[inline]
    pub fn as_gray(&self) -> Option<&ChipStack> {
        match self {
            Self::Gray(stack) => Some(stack),
            Self::Mask(_) => None,
        }
    }

    /// 以掩码堆栈视角访问. 灰度输出返回 `None`.
    #[inline]
    pub fn as_mask(&self) -> Option<&BinaryStack> {
        match self {
            Self::Mask(stack) => Some(stack),
            Self::Gray(_) => None,
        }
    }
}

/// 最近一次运行中各个已执行阶段的输出快照, 按执行顺序排列.
/// 被跳过的阶段没有条目.
#[derive(Debug, Default)]
pub struct Intermediates {
    entries: Vec<(Stage, StageOutput)>,
}

impl Intermediates {
    fn clear(&mut self) {
        self.entries.clear();
    }

    fn push(&mut self, stage: Stage, output: StageOutput) {
        self.entries.push((stage, output));
    }

    fn get_mut(&mut self, stage: Stage) -> Option<&mut StageOutput> {
        self.entries
            .iter_mut()
            .find(|(s, _)| *s == stage)
            .map(|(_, o)| o)
    }

    /// 检索给定阶段的输出快照. 该阶段未执行时返回 `None`.
    pub fn get(&self, stage: Stage) -> Option<&StageOutput> {
        self.entries
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, o)| o)
    }

    /// 按执行顺序迭代所有快照.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, &StageOutput)> {
        self.entries.iter().map(|(s, o)| (*s, o))
    }

    /// 已记录的快照个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否没有任何快照.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 流水线运行与结果检索时的错误.
#[derive(Debug, Error)]
pub enum FilterError {
    /// 配置校验失败. 对一次运行总是致命的.
    #[error("阶段 `{stage}` 的配置无效: {source}")]
    Config {
        /// 配置错误所属的阶段.
        stage: Stage,

        /// 具体的配置错误.
        #[source]
        source: ConfigError,
    },

    /// 输入堆栈不包含任何像素.
    #[error("输入堆栈不包含任何像素")]
    EmptyInput,

    /// 流水线尚未 (成功) 运行, 没有可取的结果.
    #[error("流水线尚未运行")]
    NotRun,

    /// 中间结果在运行结束后被修改, 最终结果不再可信.
    #[error("中间结果在运行结束后被修改, 需要重新运行流水线")]
    DirtyRun,
}

/// 矩形特征提取流水线的驱动器.
///
/// 持有输入灰度堆栈与整条流水线的配置, 并在运行后持有各阶段的
/// 输出快照和最终掩码. 输入和配置在构造后不再修改.
pub struct BoxFilter {
    stack: ChipStack,
    config: BoxFilterConfig,
    state: RunState,
    intermediates: Intermediates,
    result: Option<BinaryStack>,
}

impl BoxFilter {
    /// 以给定配置构造流水线. 配置在 [`run`](Self::run) 时才被校验.
    pub fn new(stack: ChipStack, config: BoxFilterConfig) -> Self {
        Self {
            stack,
            config,
            state: RunState::Dirty,
            intermediates: Intermediates::default(),
            result: None,
        }
    }

    /// 以默认配置构造流水线.
    pub fn with_default_config(stack: ChipStack) -> Self {
        Self::new(stack, BoxFilterConfig::default())
    }

    /// 输入灰度堆栈.
    #[inline]
    pub fn input(&self) -> &ChipStack {
        &self.stack
    }

    /// 流水线配置.
    #[inline]
    pub fn config(&self) -> &BoxFilterConfig {
        &self.config
    }

    /// 当前运行状态.
    #[inline]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// 从头到尾运行整条流水线.
    ///
    /// 总是从原始输入开始完整重算, 不存在部分重运行. 先整体校验
    /// 配置, 任何像素计算都发生在校验通过之后. 运行成功后之前的
    /// 中间结果全部被本次运行的快照替换.
    pub fn run(&mut self) -> Result<(), FilterError> {
        self.config.validate().map_err(|e| FilterError::Config {
            stage: e.stage(),
            source: e,
        })?;
        if self.stack.size() == 0 {
            return Err(FilterError::EmptyInput);
        }

        self.intermediates.clear();
        self.result = None;
        self.state = RunState::Dirty;

        let total = 4
            + usize::from(self.config.binarize.is_some())
            + usize::from(self.config.denoise.is_some());
        let mut step = 0usize;

        // 阶段 1: 离群值归一化.
        step += 1;
        log::info!("[{step}/{total}] 运行阶段 `{}`", Stage::RemoveOutliers);
        let stage1 = match self.config.outlier {
            OutlierMode::Threshold { quantile, invert } => {
                let out = map_slices(self.stack.as_array(), 0u8, |src, mut dst| {
                    dst.assign(&RawSlice::new(src).quantile_mask(quantile, invert));
                });
                StageOutput::Mask(BinaryStack::from_array(out))
            }
            OutlierMode::ClipRescale { lower, upper } => {
                let out = map_slices(self.stack.as_array(), 0f32, |src, mut dst| {
                    dst.assign(&RawSlice::new(src).clip_rescale(lower, upper));
                });
                StageOutput::Gray(ChipStack::from_array(out))
            }
        };
        self.intermediates.push(Stage::RemoveOutliers, stage1.clone());

        // 阶段 2: 二值化. 配置校验保证了阶段 1 的输出类型与
        // 二值化配置的有无一一对应.
        let mut mask = match (stage1, self.config.binarize) {
            (StageOutput::Mask(mask), None) => mask,
            (StageOutput::Gray(gray), Some(bp)) => {
                step += 1;
                log::info!("[{step}/{total}] 运行阶段 `{}`", Stage::Binarize);
                let out = map_slices(gray.as_array(), 0u8, |src, mut dst| {
                    dst.assign(&RawSlice::new(src).binarize(bp.threshold, bp.invert));
                });
                let mask = BinaryStack::from_array(out);
                self.intermediates
                    .push(Stage::Binarize, StageOutput::Mask(mask.clone()));
                mask
            }
            _ => unreachable!(),
        };

        // 阶段 3: 去噪.
        if let Some(dn) = self.config.denoise {
            step += 1;
            log::info!("[{step}/{total}] 运行阶段 `{}`", Stage::Denoise);
            apply_mask_stage(&mut mask, |mut sl| {
                let opened = sl.shallow_copy().opened(dn.connectivity, dn.iterations);
                sl.array_view_mut().assign(&opened);
            });
            self.intermediates
                .push(Stage::Denoise, StageOutput::Mask(mask.clone()));
        }

        // 阶段 4: 边界剔除.
        step += 1;
        log::info!("[{step}/{total}] 运行阶段 `{}`", Stage::CullBoundary);
        let widths = self.config.boundary;
        apply_mask_stage(&mut mask, |mut sl| sl.cull_border(&widths));
        self.intermediates
            .push(Stage::CullBoundary, StageOutput::Mask(mask.clone()));

        // 阶段 5: 像素数过滤.
        step += 1;
        log::info!("[{step}/{total}] 运行阶段 `{}`", Stage::SizeFilter);
        let bounds = self.config.size_bounds;
        let removed = AtomicUsize::new(0);
        apply_mask_stage(&mut mask, |mut sl| {
            let n = sl.retain_regions(Connectivity::Eight, |r| shape::size_keep(r, &bounds));
            removed.fetch_add(n, Ordering::Relaxed);
        });
        log::debug!(
            "阶段 `{}` 移除了 {} 个区域",
            Stage::SizeFilter,
            removed.into_inner()
        );
        self.intermediates
            .push(Stage::SizeFilter, StageOutput::Mask(mask.clone()));

        // 阶段 6: 形状过滤.
        step += 1;
        log::info!("[{step}/{total}] 运行阶段 `{}`", Stage::AspectFilter);
        let aspect = self.config.target_aspect;
        let extent = self.config.target_extent;
        let removed = AtomicUsize::new(0);
        apply_mask_stage(&mut mask, |mut sl| {
            let n = sl.retain_regions(Connectivity::Eight, |r| {
                shape::shape_keep(r, aspect, extent.as_ref())
            });
            removed.fetch_add(n, Ordering::Relaxed);
        });
        log::debug!(
            "阶段 `{}` 移除了 {} 个区域",
            Stage::AspectFilter,
            removed.into_inner()
        );
        self.intermediates
            .push(Stage::AspectFilter, StageOutput::Mask(mask.clone()));

        self.result = Some(mask);
        self.state = RunState::Clean;
        Ok(())
    }

    /// 最近一次成功运行的最终掩码.
    pub fn result(&self) -> Result<&BinaryStack, FilterError> {
        match (&self.result, self.state) {
            (Some(mask), RunState::Clean) => Ok(mask),
            (Some(_), RunState::Dirty) => Err(FilterError::DirtyRun),
            (None, _) => Err(FilterError::NotRun),
        }
    }

    /// 消耗流水线, 取出最终掩码.
    pub fn into_result(self) -> Result<BinaryStack, FilterError> {
        match (self.result, self.state) {
            (Some(mask), RunState::Clean) => Ok(mask),
            (Some(_), RunState::Dirty) => Err(FilterError::DirtyRun),
            (None, _) => Err(FilterError::NotRun),
        }
    }

    /// 检索给定阶段的输出快照. 该阶段在最近一次运行中未执行
    /// (或尚未运行过) 时返回 `None`.
    #[inline]
    pub fn intermediate(&self, stage: Stage) -> Option<&StageOutput> {
        self.intermediates.get(stage)
    }

    /// 可变地检索给定阶段的输出快照.
    ///
    /// 任何可变访问都会把运行状态打回 [`RunState::Dirty`]:
    /// 修改快照后最终结果不再可取, 直到重新运行流水线.
    pub fn intermediate_mut(&mut self, stage: Stage) -> Option<&mut StageOutput> {
        self.state = RunState::Dirty;
        self.intermediates.get_mut(stage)
    }

    /// 最近一次运行的全部输出快照.
    #[inline]
    pub fn intermediates(&self) -> &Intermediates {
        &self.intermediates
    }
}

/// 把 `op` 逐切片应用于 3D 数组, 生成一个同形状的新数组.
/// 启用 `rayon` feature 时切片级并行.
fn map_slices<A, B, F>(input: &Array3<A>, fill: B, op: F) -> Array3<B>
where
    A: Sync,
    B: Clone + Send + Sync,
    F: Fn(ArrayView2<A>, ArrayViewMut2<B>) + Sync + Send,
{
    let mut out = Array3::from_elem(input.raw_dim(), fill);
    let zip = Zip::from(out.axis_iter_mut(Axis(0))).and(input.axis_iter(Axis(0)));
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            zip.par_for_each(|dst, src| op(src, dst));
        } else {
            zip.for_each(|dst, src| op(src, dst));
        }
    }
    out
}

/// 把 `op` 逐切片就地应用于掩码堆栈.
/// 启用 `rayon` feature 时切片级并行.
fn apply_mask_stage<F>(mask: &mut BinaryStack, op: F)
where
    F: Fn(BinSliceMut) + Sync + Send,
{
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            mask.par_for_each_slice_mut(op);
        } else {
            mask.for_each_slice_mut(op);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use std::ops::Range;

    /// 在全零堆栈的第 0 层写入一个灰度值为 1 的实心矩形.
    fn stack_with_rect(
        shape: (usize, usize, usize),
        rows: Range<usize>,
        cols: Range<usize>,
    ) -> ChipStack {
        let mut data = Array3::<f32>::zeros(shape);
        for h in rows {
            for w in cols.clone() {
                data[(0, h, w)] = 1.0;
            }
        }
        ChipStack::from_array(data)
    }

    /// 宽松的基线配置: 单分位数阈值化, 不去噪, 不剔边,
    /// 几乎不过滤. 各测试在此基础上按需收紧.
    fn permissive_config() -> BoxFilterConfig {
        BoxFilterConfig {
            outlier: OutlierMode::Threshold {
                quantile: 0.1,
                invert: false,
            },
            binarize: None,
            denoise: None,
            boundary: BorderWidths::Symmetric { lr: 0, tb: 0 },
            size_bounds: SizeBounds {
                small: 1,
                large: usize::MAX,
            },
            target_aspect: 2.0,
            target_extent: None,
        }
    }

    #[test]
    fn test_invalid_config_rejected_before_any_work() {
        let stack = ChipStack::from_array(Array3::zeros((1, 4, 4)));
        let mut filter = BoxFilter::new(
            stack,
            BoxFilterConfig {
                target_aspect: 0.5,
                ..permissive_config()
            },
        );

        let err = filter.run().unwrap_err();
        assert!(matches!(
            err,
            FilterError::Config {
                stage: Stage::AspectFilter,
                ..
            }
        ));
        assert!(filter.intermediates().is_empty());
        assert!(matches!(filter.result(), Err(FilterError::NotRun)));
    }

    #[test]
    fn test_empty_input_rejected() {
        let stack = ChipStack::from_array(Array3::zeros((0, 4, 4)));
        let mut filter = BoxFilter::new(stack, permissive_config());
        assert!(matches!(filter.run(), Err(FilterError::EmptyInput)));
    }

    #[test]
    fn test_all_background_input_yields_empty_mask() {
        let stack = ChipStack::from_array(Array3::zeros((1, 10, 10)));
        let mut filter = BoxFilter::new(stack, permissive_config());

        filter.run().unwrap();
        assert_eq!(filter.result().unwrap().feature_count(), 0);
    }

    /// 合格矩形完整走过全部 6 个阶段后原样存活.
    #[test]
    fn test_qualifying_rectangle_survives_full_pipeline() {
        // 2000x2000 切片中央的 50x100 矩形.
        let stack = stack_with_rect((1, 2000, 2000), 975..1025, 950..1050);
        let config = BoxFilterConfig {
            denoise: Some(DenoiseParams {
                connectivity: Connectivity::Eight,
                iterations: 1,
            }),
            boundary: BorderWidths::Symmetric { lr: 400, tb: 200 },
            size_bounds: SizeBounds {
                small: 2_500,
                large: 50_000,
            },
            ..permissive_config()
        };
        let mut filter = BoxFilter::new(stack, config);

        filter.run().unwrap();
        let mask = filter.result().unwrap();
        // 5000 像素, 跨度比恰好 50/100 = 1/2, 落在 [1/2, 2] 的端点上.
        assert_eq!(mask.feature_count(), 5000);
        assert_eq!(mask[(0, 975, 950)], 1);
        assert_eq!(mask[(0, 1024, 1049)], 1);
        assert_eq!(mask[(0, 974, 950)], 0);
    }

    #[test]
    fn test_undersized_region_culled() {
        // 40 像素的矩形, 低于下界 100.
        let stack = stack_with_rect((1, 100, 100), 45..50, 40..48);
        let config = BoxFilterConfig {
            boundary: BorderWidths::Symmetric { lr: 10, tb: 10 },
            size_bounds: SizeBounds {
                small: 100,
                large: 1_000,
            },
            ..permissive_config()
        };
        let mut filter = BoxFilter::new(stack, config);

        filter.run().unwrap();
        assert_eq!(filter.result().unwrap().feature_count(), 0);
    }

    #[test]
    fn test_square_kept_thin_rectangle_rejected() {
        // 20x20 正方形 (跨度比 1) 和 3x45 细长条 (跨度比 1/15).
        let mut data = Array3::<f32>::zeros((1, 60, 60));
        for h in 10..30 {
            for w in 10..30 {
                data[(0, h, w)] = 1.0;
            }
        }
        for h in 40..43 {
            for w in 5..50 {
                data[(0, h, w)] = 1.0;
            }
        }
        let stack = ChipStack::from_array(data);
        let mut filter = BoxFilter::new(stack, permissive_config());

        filter.run().unwrap();
        let mask = filter.result().unwrap();
        assert_eq!(mask.feature_count(), 400);
        assert_eq!(mask[(0, 15, 15)], 1);
        assert_eq!(mask[(0, 41, 20)], 0);
    }

    #[test]
    fn test_extent_bounds_reject_small_square() {
        let stack = stack_with_rect((1, 60, 60), 10..30, 10..30);
        let config = BoxFilterConfig {
            target_extent: Some(ExtentBounds { low: 25, high: 50 }),
            ..permissive_config()
        };
        let mut filter = BoxFilter::new(stack, config);

        filter.run().unwrap();
        // 两个方向跨度均为 20, 低于短跨度下界 25.
        assert_eq!(filter.result().unwrap().feature_count(), 0);
    }

    /// 截断-重缩放模式下二值化阶段被启用, 并记录独立快照.
    #[test]
    fn test_clip_rescale_with_binarize() {
        let data =
            Array3::from_shape_vec((1, 4, 4), (0..16).map(|v| v as f32).collect()).unwrap();
        let stack = ChipStack::from_array(data);
        let config = BoxFilterConfig {
            outlier: OutlierMode::ClipRescale {
                lower: 0.0,
                upper: 1.0,
            },
            binarize: Some(BinarizeParams {
                threshold: 0.5,
                invert: false,
            }),
            target_aspect: 100.0,
            ..permissive_config()
        };
        let mut filter = BoxFilter::new(stack, config);

        filter.run().unwrap();
        // 重缩放后灰度为 v / 15, 阈值 0.5 保留 v >= 8 的 8 个像素
        // (第 2, 3 两行), 构成单个 2x4 区域.
        assert_eq!(filter.result().unwrap().feature_count(), 8);

        let inter = filter.intermediates();
        assert!(inter.get(Stage::RemoveOutliers).unwrap().as_gray().is_some());
        assert!(inter.get(Stage::Binarize).unwrap().as_mask().is_some());
    }

    #[test]
    fn test_intermediates_recorded_in_execution_order() {
        let stack = stack_with_rect((1, 30, 30), 10..20, 10..20);
        let config = BoxFilterConfig {
            denoise: Some(DenoiseParams::default()),
            ..permissive_config()
        };
        let mut filter = BoxFilter::new(stack, config);

        filter.run().unwrap();
        let recorded: Vec<Stage> = filter.intermediates().iter().map(|(s, _)| s).collect();
        assert_eq!(
            recorded,
            vec![
                Stage::RemoveOutliers,
                Stage::Denoise,
                Stage::CullBoundary,
                Stage::SizeFilter,
                Stage::AspectFilter,
            ]
        );
        // 二值化阶段被跳过, 没有快照.
        assert!(filter.intermediate(Stage::Binarize).is_none());
    }

    /// 掩码阶段只会清除特征像素, 绝不会新增: 各快照的特征像素数
    /// 沿执行顺序单调不增.
    #[test]
    fn test_foreground_monotonically_shrinks() {
        let mut data = Array3::<f32>::zeros((1, 50, 50));
        for h in 10..30 {
            for w in 10..30 {
                data[(0, h, w)] = 1.0;
            }
        }
        data[(0, 2, 2)] = 1.0;
        data[(0, 40, 45)] = 1.0;
        let stack = ChipStack::from_array(data);
        let config = BoxFilterConfig {
            denoise: Some(DenoiseParams::default()),
            boundary: BorderWidths::Symmetric { lr: 5, tb: 5 },
            size_bounds: SizeBounds {
                small: 10,
                large: 10_000,
            },
            ..permissive_config()
        };
        let mut filter = BoxFilter::new(stack, config);

        filter.run().unwrap();
        let counts: Vec<usize> = filter
            .intermediates()
            .iter()
            .filter_map(|(_, o)| o.as_mask())
            .map(BinaryStack::feature_count)
            .collect();
        assert!(counts.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[test]
    fn test_mutable_access_dirties_the_run() {
        let stack = stack_with_rect((1, 30, 30), 10..20, 10..20);
        let mut filter = BoxFilter::new(stack, permissive_config());

        assert!(matches!(filter.result(), Err(FilterError::NotRun)));

        filter.run().unwrap();
        assert_eq!(filter.state(), RunState::Clean);
        assert!(filter.result().is_ok());

        // 任何可变访问都使结果失效.
        assert!(filter.intermediate_mut(Stage::CullBoundary).is_some());
        assert_eq!(filter.state(), RunState::Dirty);
        assert!(matches!(filter.result(), Err(FilterError::DirtyRun)));

        // 重新运行后恢复.
        filter.run().unwrap();
        assert!(filter.result().is_ok());
    }
}
