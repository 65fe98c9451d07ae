#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 从显微镜灰度图像堆栈 (多页 TIFF) 中提取矩形 "芯片" 特征.
//!
//! 整个提取过程是一条确定性的滤波流水线, 逐切片独立运行:
//!
//! 1. 离群值归一化 (分位数阈值化或截断-重缩放);
//! 2. 二值化 (可选反相);
//! 3. 形态学开运算去噪 (可选);
//! 4. 边界剔除;
//! 5. 连通区域像素数过滤;
//! 6. 连通区域长宽比/尺寸过滤.
//!
//! 输入为 `(N, H, W)` 的三维灰度体数据, 输出为同形状的 0/1 掩码体数据,
//! 只保留被接受特征的像素. 各阶段均为纯粹的体数据到体数据变换,
//! 切片之间没有共享可变状态, 因此开启 `rayon` feature 后可以安全地逐切片并行.
//!
//! # 注意
//!
//! 1. 该 crate 假设整个体数据能放入内存, 不提供流式处理.
//! 2. 在非期望情况下, 程序会直接 panic, 而不会导致内存错误. As what Rust promises.
//!
//! # 模块导览
//!
//! - 体数据与切片视图: `chip-berry/src/data`;
//! - 连通区域标记与区域描述子: `chip-berry/src/region`;
//! - 六阶段流水线与配置: `chip-berry/src/filter`.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

type Predicate = fn(u8) -> bool;

type Area2d = Vec<Idx2d>;
type Areas2d = Vec<Area2d>;

/// 3D 图像堆栈基础数据结构.
mod data;

pub use data::{
    BinSlice, BinSliceMut, BinaryStack, ChipStack, ImgWriteRaw, ImgWriteVis, RawSlice,
    RawSliceMut, StackAttr, StackError,
};

pub mod consts;

pub mod filter;

pub mod region;

pub mod prelude;

pub use filter::{BoxFilter, BoxFilterConfig, ConfigError, FilterError, RunState, Stage};
pub use region::{Connectivity, Region};
