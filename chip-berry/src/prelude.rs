//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::slice::{BinSlice, BinSliceMut, ImgWriteRaw, ImgWriteVis, RawSlice, RawSliceMut};
pub use crate::data::{BinaryStack, ChipStack, StackAttr, StackError};

pub use crate::consts::mask::{CHIP_BACKGROUND, CHIP_FEATURE};

pub use crate::filter::{
    BinarizeParams, BorderWidths, BoxFilter, BoxFilterConfig, ConfigError, DenoiseParams,
    ExtentBounds, FilterError, OutlierMode, RunState, SizeBounds, Stage, StageOutput,
};

pub use crate::region::{Connectivity, Region};
