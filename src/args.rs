// 该文件是 Biaozhu （标注） 项目的一部分。
// src/args.rs - 项目参数配置
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
use std::time::Duration;

use clap::{ArgGroup, Parser};
use url::Url;

use biaozhu::{filter::DEFAULT_MIN_CONFIDENCE, model::BackendConfig};

/// Biaozhu 批量标注：调用检测后端，导出 YOLO 标签与可视化
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(
  ArgGroup::new("prompt")
    .required(true)
    .args(["text_prompt", "visual_prompt", "annotations"])
))]
pub struct Args {
  /// 待标注图像：目录，或 .zip / .tar / .tar.zst 归档
  #[arg(long, value_name = "SOURCE")]
  pub images: PathBuf,

  /// 检测后端
  /// 支持格式:
  /// - gemini:gemini-2.0-flash
  /// - dino://localhost:8001/predict
  /// - trex:T-Rex-2.0
  #[arg(long, value_name = "BACKEND")]
  pub backend: Url,

  /// 文本提示
  #[arg(long, value_name = "TEXT")]
  pub text_prompt: Option<String>,

  /// 视觉提示 JSON（`{"type": "visual_images", ...}`）
  #[arg(long, value_name = "FILE")]
  pub visual_prompt: Option<PathBuf>,

  /// 参考图像标注 JSON（`[{"filename", "objects"}]`）
  #[arg(long, value_name = "FILE")]
  pub annotations: Option<PathBuf>,

  /// 参考图像文件，按文件名与视觉提示对应
  #[arg(long, value_name = "IMAGE", num_args = 1..)]
  pub reference: Vec<PathBuf>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_MIN_CONFIDENCE, value_name = "THRESHOLD")]
  pub threshold: f64,

  /// 标签文件不写置信度列
  #[arg(long)]
  pub no_score: bool,

  /// 输出归档路径：.zip 写 zip（如 annotated_labels.zip），.tar.zst 写压缩 tar，其余写 tar
  #[arg(long, value_name = "OUTPUT")]
  pub output: PathBuf,

  /// 单次后端请求超时（秒）
  #[arg(long, default_value_t = 120, value_name = "SECONDS")]
  pub timeout: u64,

  #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
  pub google_api_key: Option<String>,

  #[arg(long, env = "DDS_API_TOKEN", hide_env_values = true)]
  pub dds_api_token: Option<String>,
}

impl Args {
  pub fn backend_config(&self) -> BackendConfig {
    BackendConfig {
      gemini_api_key: self.google_api_key.clone(),
      dds_token: self.dds_api_token.clone(),
      timeout: Duration::from_secs(self.timeout),
    }
  }
}
