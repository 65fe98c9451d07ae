//! 命令行入口: 对单个多页 TIFF 堆栈运行默认配置的提取流水线,
//! 把每个阶段的输出快照和最终掩码逐切片保存为 PNG.
//!
//! 用法: `chip-run <输入 TIFF> <输出目录>`.
//! 输出目录下按阶段名建立子目录, 最终掩码保存在 `final/` 子目录.

use chip_berry::prelude::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn main() -> ExitCode {
    simple_logger::init_with_level(log::Level::Info).expect("日志初始化失败");

    let mut args = std::env::args_os().skip(1);
    let (Some(input), Some(out_dir)) = (args.next(), args.next()) else {
        eprintln!("用法: chip-run <输入 TIFF> <输出目录>");
        return ExitCode::FAILURE;
    };
    let out_dir = PathBuf::from(out_dir);

    let stack = match ChipStack::open(&input) {
        Ok(stack) => stack,
        Err(e) => {
            log::error!("读取 {:?} 失败: {e}", input);
            return ExitCode::FAILURE;
        }
    };
    let (z, h, w) = stack.shape();
    log::info!("已读取 {:?}: {z} 层, 每层 {h}x{w}", input);

    let mut filter = BoxFilter::with_default_config(stack);
    if let Err(e) = filter.run() {
        log::error!("流水线运行失败: {e}");
        return ExitCode::FAILURE;
    }

    for (stage, output) in filter.intermediates().iter() {
        if let Err(e) = save_snapshot(&out_dir.join(stage.name()), output) {
            log::error!("保存阶段 `{stage}` 的快照失败: {e}");
            return ExitCode::FAILURE;
        }
    }

    // 只有运行状态干净时 `result` 才会返回 `Ok`.
    let mask = filter.result().expect("刚刚成功运行过");
    log::info!("提取完成, 共 {} 个特征像素", mask.feature_count());

    let final_dir = out_dir.join("final");
    if let Err(e) = save_snapshot(&final_dir, &StageOutput::Mask(mask.clone())) {
        log::error!("保存最终掩码失败: {e}");
        return ExitCode::FAILURE;
    }
    log::info!("结果已保存至 {:?}", out_dir);
    ExitCode::SUCCESS
}

/// 把一个阶段的输出快照逐切片保存为 PNG.
fn save_snapshot(dir: &Path, output: &StageOutput) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    match output {
        StageOutput::Gray(stack) => {
            for (index, sl) in stack.slice_iter().enumerate() {
                sl.save(dir.join(format!("slice-{index:04}.png")))?;
            }
        }
        StageOutput::Mask(stack) => {
            for (index, sl) in stack.slice_iter().enumerate() {
                sl.save(dir.join(format!("slice-{index:04}.png")))?;
            }
        }
    }
    Ok(())
}
