//! 灰度/掩码切片对象的操作.

mod core;
mod iter;
mod save;

pub use core::{BinSlice, BinSliceMut, RawSlice, RawSliceMut};

pub use save::{ImgWriteRaw, ImgWriteVis};
