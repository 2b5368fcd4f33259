// 该文件是 Biaozhu （标注） 项目的一部分。
// src/bin/detect_oneshot.rs - 单张图像检测与可视化
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use biaozhu::{
  frame::ImageFrame,
  model::{BackendConfig, BackendWrapper},
  output::{
    SaveImageFileOutput,
    yolo_record::{to_record, write_records},
  },
  prompt::PromptContext,
  task::{OneShotTask, Task},
};

/// 对一张图像做一次文本提示检测，保存画好框的图像
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像
  #[arg(long, value_name = "IMAGE")]
  pub image: PathBuf,
  /// 检测后端
  #[arg(long, value_name = "BACKEND")]
  pub backend: Url,
  /// 文本提示
  #[arg(long, value_name = "TEXT")]
  pub prompt: String,
  /// 输出图像路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: PathBuf,
  /// 置信度阈值，默认保留全部检测框
  #[arg(long, default_value_t = 0.0, value_name = "THRESHOLD")]
  pub threshold: f64,
  /// 同时在输出图像旁写出 YOLO 标签文件
  #[arg(long)]
  pub labels: bool,

  #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
  pub google_api_key: Option<String>,
  #[arg(long, env = "DDS_API_TOKEN", hide_env_values = true)]
  pub dds_api_token: Option<String>,
}

fn main() -> Result<()> {
  dotenv::dotenv().ok();
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入图像: {}", args.image.display());
  info!("检测后端: {}", args.backend);
  info!("输出路径: {}", args.output.display());

  let config = BackendConfig {
    gemini_api_key: args.google_api_key.clone(),
    dds_token: args.dds_api_token.clone(),
    ..BackendConfig::default()
  };
  let frame =
    ImageFrame::open(&args.image).with_context(|| format!("无法读取图像: {}", args.image.display()))?;
  let (width, height) = (frame.width(), frame.height());
  let backend = BackendWrapper::build(&args.backend, &config)
    .with_context(|| format!("无法创建检测后端: {}", args.backend))?;
  let output = SaveImageFileOutput::new(&args.output)?;

  let boxes = OneShotTask::new(PromptContext::Text(args.prompt), args.threshold)
    .run_task(frame, backend, &output)?;

  for b in &boxes {
    let [x1, y1, x2, y2] = b.rect();
    info!(
      "  - {}: {:.2}% at ({:.0}, {:.0}, {:.0}, {:.0})",
      b.label.as_deref().unwrap_or("-"),
      b.score * 100.0,
      x1,
      y1,
      x2,
      y2
    );
  }

  if args.labels {
    let label = args.output.with_extension("txt");
    let records: Vec<_> = boxes.iter().map(|b| to_record(b, width, height)).collect();
    write_records(&records, &label).with_context(|| format!("无法写出标签: {}", label.display()))?;
    info!("保存标签到文件: {}", label.display());
  }

  Ok(())
}
