// 该文件是 Biaozhu （标注） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use biaozhu::{
  model::{BackendError, BackendWrapper},
  prompt::{
    PromptContext, PromptError, VisualPrompt, build_visual_prompt, load_annotations, reference_index,
    resolve_image_paths,
  },
  task::{BatchTask, Task, TaskError},
};

fn prompt_from_args(args: &args::Args) -> Result<PromptContext> {
  let references = reference_index(&args.reference);
  if let Some(text) = &args.text_prompt {
    return Ok(PromptContext::Text(text.clone()));
  }
  if let Some(path) = &args.annotations {
    let annotations =
      load_annotations(path).with_context(|| format!("读取参考标注失败: {}", path.display()))?;
    return Ok(PromptContext::Visual(build_visual_prompt(&annotations, &references)?));
  }
  if let Some(path) = &args.visual_prompt {
    let mut prompt =
      VisualPrompt::from_json_file(path).with_context(|| format!("读取视觉提示失败: {}", path.display()))?;
    resolve_image_paths(&mut prompt, &references)?;
    return Ok(PromptContext::Visual(prompt));
  }
  Err(TaskError::InvalidRequest("没有提供提示".into()).into())
}

/// 批处理开始前即可判定的错误：提示、后端配置或输入本身有问题
fn is_validation(e: &anyhow::Error) -> bool {
  e.downcast_ref::<TaskError>().is_some_and(TaskError::is_validation)
    || e.downcast_ref::<PromptError>().is_some()
    || e.downcast_ref::<BackendError>().is_some()
}

fn run(args: &args::Args) -> Result<()> {
  let prompt = prompt_from_args(args)?;
  let backend = BackendWrapper::build(&args.backend, &args.backend_config())
    .with_context(|| format!("无法创建检测后端: {}", args.backend))?;

  let result = BatchTask::new(prompt, args.threshold)
    .with_score(!args.no_score)
    .run_task(args.images.as_path(), backend, args.output.as_path())?;

  for (name, reason) in result.failures() {
    warn!("未标注: {} ({})", name, reason);
  }
  info!(
    "归档 {} 包含 {} 个文件",
    result.archive().display(),
    result.archived_files().len()
  );
  Ok(())
}

fn main() -> ExitCode {
  dotenv::dotenv().ok();
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("图像来源: {}", args.images.display());
  info!("检测后端: {}", args.backend);
  info!("置信度阈值: {}", args.threshold);
  info!("输出路径: {}", args.output.display());

  match run(&args) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) if is_validation(&e) => {
      error!("请求无效，未开始处理: {:#}", e);
      ExitCode::from(2)
    }
    Err(e) => {
      error!("处理失败: {:#}", e);
      ExitCode::FAILURE
    }
  }
}
