//! 逐切片的灰度归一化与二值化 (流水线阶段 1, 2).
//!
//! 所有统计量 (分位数, 极值) 都在单个切片内部计算,
//! 不同切片之间互不影响.

use crate::RawSlice;
use ndarray::Array2;
use ordered_float::OrderedFloat;

impl RawSlice<'_> {
    /// 计算切片灰度值的 `q` 分位数, 使用线性插值.
    ///
    /// # Panics
    ///
    /// `q` 不在 `[0, 1]` 内或切片为空时 panic.
    pub fn quantile(&self, q: f64) -> f32 {
        assert!((0.0..=1.0).contains(&q), "分位数 {q} 不在 [0, 1] 内");
        assert!(self.size() > 0, "无法对空切片计算分位数");

        let mut vals: Vec<OrderedFloat<f32>> = self.iter().copied().map(OrderedFloat).collect();
        vals.sort_unstable();

        let pos = q * (vals.len() - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let frac = pos - lo as f64;

        let a = f64::from(vals[lo].0);
        let b = f64::from(vals[hi].0);
        (a + (b - a) * frac) as f32
    }

    /// 单分位数阈值化: 低于 `quantile` 分位数的灰度值视为离群并置 0,
    /// 其余 **非零** 灰度值置 1. 原本就是 0 的像素保持 0.
    ///
    /// `invert` 为真时对输出掩码做 `1 - v` 反相.
    pub fn quantile_mask(&self, quantile: f64, invert: bool) -> Array2<u8> {
        let t = self.quantile(quantile);
        let mut out = Array2::<u8>::zeros(self.shape());

        for (pos, &v) in self.indexed_iter() {
            if v >= t && v != 0.0 {
                out[pos] = 1;
            }
        }
        if invert {
            out.mapv_inplace(|pix| 1 - pix);
        }
        out
    }

    /// 双分位数截断-重缩放: 把灰度值截断到 `[lower, upper]`
    /// 分位数区间内, 再线性缩放到 `[0, 1]`.
    ///
    /// 平坦切片 (上下分位数重合) 没有可定义的缩放, 输出全 0.
    pub fn clip_rescale(&self, lower: f64, upper: f64) -> Array2<f32> {
        let lo = self.quantile(lower);
        let hi = self.quantile(upper);

        let mut out = Array2::<f32>::zeros(self.shape());
        if hi <= lo {
            return out;
        }

        let span = hi - lo;
        for (pos, &v) in self.indexed_iter() {
            out[pos] = (v.clamp(lo, hi) - lo) / span;
        }
        out
    }

    /// 固定阈值二值化: 灰度值 `< threshold` 的像素置 0, 其余置 1.
    ///
    /// `invert` 为真时对输出掩码做 `1 - v` 反相.
    pub fn binarize(&self, threshold: f32, invert: bool) -> Array2<u8> {
        let mut out = Array2::<u8>::zeros(self.shape());
        for (pos, &v) in self.indexed_iter() {
            let mut pix = u8::from(v >= threshold);
            if invert {
                pix = 1 - pix;
            }
            out[pos] = pix;
        }
        out
    }
}
