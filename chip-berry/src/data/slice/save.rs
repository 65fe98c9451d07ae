//! 图像的持久化存储.

use crate::{BinSlice, BinSliceMut, RawSlice, RawSliceMut};
use image::ImageResult;
use std::path::Path;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// `ImgWriteVis` trait 的意图是, 图像将以 "可视化友好" 的方式保存,
/// 而不是 "as is" 的方式. 这意味着, 对于 `BinSlice`, `BinSliceMut`
/// 这类仅存在 0, 1 像素值的掩码, 在保存时会映射为黑白二色;
/// 对于 `RawSlice`, `RawSliceMut` 这类灰度切片,
/// 在保存时会按切片自身的最小/最大值线性归一化到 8-bit 灰度.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将图片保存到 `path` 路径.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 表明一个可以通过 **按原样** 模式持久化存储的图像对象.
///
/// 只有像素值本身就落在 8-bit 范围内的掩码切片才实现该 trait;
/// 灰度切片以 `f32` 存储, 无法按原样写入.
pub trait ImgWriteRaw {
    /// 按原样将图片保存到 `path` 路径.
    fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 使掩码像素更有利于单通道可视化.
#[inline]
pub(crate) fn pretty(pix: u8) -> u8 {
    use crate::consts::mask::*;
    match pix {
        // 背景为黑色
        CHIP_BACKGROUND => BLACK,

        // 特征为白色
        CHIP_FEATURE => WHITE,

        any_else => panic!("掩码只允许存在 0, 1 像素, 但发现了 `{any_else}`"),
    }
}

macro_rules! impl_mask_vis {
    ($($slice: ty),+) => {
        $(
            /// 会将背景/特征像素分别映射为黑色/白色. 不允许其他像素值.
            impl ImgWriteVis for $slice {
                fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
                    let (height, width) = self.shape();
                    let mut buf = image::GrayImage::new(width as u32, height as u32);
                    for ((h, w), &pix) in self.indexed_iter() {
                        buf.put_pixel(w as u32, h as u32, image::Luma([pretty(pix)]));
                    }
                    buf.save(path)
                }
            }
        )+
    };
}

macro_rules! impl_mask_raw {
    ($($slice: ty),+) => {
        $(
            /// 按原样存储.
            impl ImgWriteRaw for $slice {
                fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
                    let (height, width) = self.shape();
                    let mut buf = image::GrayImage::new(width as u32, height as u32);
                    for ((h, w), &pix) in self.indexed_iter() {
                        buf.put_pixel(w as u32, h as u32, image::Luma([pix]));
                    }
                    buf.save(path)
                }
            }
        )+
    };
}

macro_rules! impl_raw_vis {
    ($($slice: ty),+) => {
        $(
            /// 按切片自身的最小/最大灰度值线性归一化. 平坦切片保存为全黑.
            impl ImgWriteVis for $slice {
                fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
                    let (height, width) = self.shape();
                    let (mut lo, mut hi) = (f32::INFINITY, f32::NEG_INFINITY);
                    for &v in self.iter() {
                        lo = lo.min(v);
                        hi = hi.max(v);
                    }
                    let span = hi - lo;

                    let mut buf = image::GrayImage::new(width as u32, height as u32);
                    for ((h, w), &v) in self.indexed_iter() {
                        let gray = if span > 0.0 {
                            // 255, not 256.
                            (((v - lo) / span) * 255.0) as u8
                        } else {
                            0
                        };
                        buf.put_pixel(w as u32, h as u32, image::Luma([gray]));
                    }
                    buf.save(path)
                }
            }
        )+
    };
}

impl_mask_vis!(BinSlice<'_>, BinSliceMut<'_>);
impl_mask_raw!(BinSlice<'_>, BinSliceMut<'_>);
impl_raw_vis!(RawSlice<'_>, RawSliceMut<'_>);
