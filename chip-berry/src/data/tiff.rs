//! 多页 TIFF 堆栈读取.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ndarray::{Array2, Array3, Axis};
use num::ToPrimitive;
use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult, Limits};

use super::ChipStack;
use crate::Idx2d;

/// 读取 TIFF 堆栈时的错误.
#[derive(Debug, Error)]
pub enum StackError {
    /// 文件无法打开.
    #[error("无法打开 TIFF 文件: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF 解码错误.
    #[error("TIFF 解码失败: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// 文件不包含任何页.
    #[error("TIFF 文件不包含任何页")]
    Empty,

    /// 某一页的尺寸与第一页不一致.
    #[error("第 {page} 页的尺寸 {got:?} 与第 0 页的 {expect:?} 不一致")]
    ShapeMismatch {
        /// 页下标.
        page: usize,
        /// 第 0 页的 (高, 宽).
        expect: Idx2d,
        /// 实际读到的 (高, 宽).
        got: Idx2d,
    },

    /// 像素类型不受支持 (有符号整数或多通道).
    #[error("不支持的 TIFF 像素类型")]
    UnsupportedSampleType,
}

impl ChipStack {
    /// 打开多页灰度 TIFF 文件格式的图像堆栈. `path` 为文件的本地路径.
    ///
    /// 所有页必须共享同一个分辨率. 无符号整数与浮点像素均被放宽为
    /// `f32` 保存, 灰度值本身不做任何归一化 (归一化是流水线第一阶段的职责).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StackError> {
        let file = File::open(path.as_ref())?;

        // 为大尺寸拼接扫描放宽解码缓冲上限.
        let mut limits = Limits::default();
        limits.decoding_buffer_size = 1024 * 1024 * 1024;
        limits.ifd_value_size = 1024 * 1024 * 1024;
        limits.intermediate_buffer_size = 1024 * 1024 * 1024;

        let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(limits);

        let mut pages: Vec<Array2<f32>> = Vec::new();
        loop {
            let (w, h) = decoder.dimensions()?;
            let shape = (h as usize, w as usize);

            if let Some(first) = pages.first() {
                let expect = {
                    let &[h0, w0] = first.shape() else {
                        unreachable!()
                    };
                    (h0, w0)
                };
                if expect != shape {
                    return Err(StackError::ShapeMismatch {
                        page: pages.len(),
                        expect,
                        got: shape,
                    });
                }
            }

            let buf = widen_samples(decoder.read_image()?)?;
            if buf.len() != shape.0 * shape.1 {
                // 多通道数据 (每个像素多个样本).
                return Err(StackError::UnsupportedSampleType);
            }

            // 形状已经过检查, 不会生成 `Err`.
            pages.push(Array2::from_shape_vec(shape, buf).unwrap());

            if !decoder.more_images() {
                break;
            }
            decoder.next_image()?;
        }

        let Some(first) = pages.first() else {
            return Err(StackError::Empty);
        };
        let &[h, w] = first.shape() else {
            unreachable!()
        };

        let mut data = Array3::<f32>::zeros((pages.len(), h, w));
        for (z, page) in pages.iter().enumerate() {
            data.index_axis_mut(Axis(0), z).assign(page);
        }
        Ok(Self::from_array(data))
    }
}

/// 将解码缓冲放宽为 `f32`. 有符号整数在显微镜灰度堆栈中不会出现,
/// 因此不予支持.
fn widen_samples(res: DecodingResult) -> Result<Vec<f32>, StackError> {
    Ok(match res {
        DecodingResult::U8(buf) => widen(&buf),
        DecodingResult::U16(buf) => widen(&buf),
        DecodingResult::U32(buf) => widen(&buf),
        DecodingResult::U64(buf) => widen(&buf),
        DecodingResult::F32(buf) => buf,
        DecodingResult::F64(buf) => widen(&buf),
        _ => return Err(StackError::UnsupportedSampleType),
    })
}

/// 无损 (或就近) 转换为 `f32` 缓冲.
fn widen<T: ToPrimitive>(buf: &[T]) -> Vec<f32> {
    buf.iter().map(|v| v.to_f32().unwrap_or(0.0)).collect()
}
