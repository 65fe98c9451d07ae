//! 形态学开运算去噪 (流水线阶段 3).
//!
//! 开运算 = 先腐蚀后膨胀. 两步都把图像边界外视为背景,
//! 因此紧贴边界的特征像素在腐蚀时也会被剥掉一层.

use crate::consts::mask::*;
use crate::region::Connectivity;
use crate::BinSlice;
use ndarray::Array2;

impl BinSlice<'_> {
    /// 对掩码做形态学开运算: 先做 `iterations` 次腐蚀,
    /// 再做 `iterations` 次膨胀. 返回新掩码, 不修改自身.
    ///
    /// 结构元由 `conn` 决定: 4-邻接对应十字形, 8-邻接对应 3x3 方块.
    pub fn opened(&self, conn: Connectivity, iterations: u32) -> Array2<u8> {
        let mut cur = self.array_view().to_owned();
        for _ in 0..iterations {
            cur = erode(&cur, conn);
        }
        for _ in 0..iterations {
            cur = dilate(&cur, conn);
        }
        cur
    }
}

/// 腐蚀: 仅当像素自身及其所有 `conn`-邻居均为特征时才保留.
/// 越界邻居视为背景.
fn erode(img: &Array2<u8>, conn: Connectivity) -> Array2<u8> {
    let mut out = Array2::zeros(img.raw_dim());
    for ((h, w), &pix) in img.indexed_iter() {
        if is_background(pix) {
            continue;
        }
        let survives = conn
            .neighbours((h, w))
            .into_iter()
            .all(|pos| img.get(pos).is_some_and(|&v| is_feature(v)));
        if survives {
            out[(h, w)] = CHIP_FEATURE;
        }
    }
    out
}

/// 膨胀: 像素自身或其任一 `conn`-邻居为特征时置为特征.
/// 越界邻居视为背景.
fn dilate(img: &Array2<u8>, conn: Connectivity) -> Array2<u8> {
    let mut out = Array2::zeros(img.raw_dim());
    for ((h, w), &pix) in img.indexed_iter() {
        let set = is_feature(pix)
            || conn
                .neighbours((h, w))
                .into_iter()
                .any(|pos| img.get(pos).is_some_and(|&v| is_feature(v)));
        if set {
            out[(h, w)] = CHIP_FEATURE;
        }
    }
    out
}
