// 该文件是 Biaozhu （标注） 项目的一部分。
// src/task.rs - 标注任务
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

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  bbox::{BoxError, CanonicalBox, normalize},
  filter::ConfidenceFilter,
  frame::{FrameError, ImageFrame},
  input::{ImageSet, InputError},
  model::{BackendError, Detect},
  output::{Artifacts, DatasetRecordOutput, OutputError, Render, SaveImageFileOutput, archive, palette},
  prompt::{PromptContext, PromptError},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

#[derive(Error, Debug)]
pub enum TaskError {
  #[error("请求无效: {0}")]
  InvalidRequest(String),
  #[error("输入错误: {0}")]
  InputError(#[from] InputError),
  #[error("提示错误: {0}")]
  PromptError(#[from] PromptError),
  #[error("输出错误: {0}")]
  OutputError(#[from] OutputError),
  #[error("打包归档失败: {0}")]
  ArchiveError(std::io::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("处理失败: {0}")]
  ImageError(#[from] ImageError),
}

impl TaskError {
  /// 请求本身不合法，批处理尚未开始
  pub fn is_validation(&self) -> bool {
    matches!(
      self,
      TaskError::InvalidRequest(_)
        | TaskError::PromptError(_)
        | TaskError::InputError(InputError::NotFound(_) | InputError::Unsupported(_))
    )
  }
}

/// 单张图像的可恢复错误
#[derive(Error, Debug)]
pub enum ImageError {
  #[error("读取图像失败: {0}")]
  FrameError(#[from] FrameError),
  #[error("检测失败: {0}")]
  BackendError(#[from] BackendError),
  #[error("检测框无效: {0}")]
  BoxError(#[from] BoxError),
  #[error("输出文件名冲突: {0}")]
  NameCollision(String),
}

/// 检测、归一化并过滤一张图像，保持后端返回的顺序
pub fn annotate_frame<M: Detect>(
  model: &M,
  frame: &ImageFrame,
  prompt: &PromptContext,
  filter: &ConfidenceFilter,
) -> Result<Vec<CanonicalBox>, ImageError> {
  let raw = model.detect(frame, prompt)?;
  let boxes = raw
    .iter()
    .map(|b| normalize(b, frame.width(), frame.height()))
    .collect::<Result<Vec<_>, _>>()?;
  Ok(filter.retain(boxes))
}

fn validate_prompt<M: Detect>(model: &M, prompt: &PromptContext) -> Result<(), TaskError> {
  match prompt {
    PromptContext::Text(text) if text.trim().is_empty() => {
      return Err(TaskError::InvalidRequest("文本提示为空".into()));
    }
    PromptContext::Visual(visual) => visual.validate()?,
    PromptContext::Text(_) => {}
  }
  if !model.accepts(prompt) {
    return Err(TaskError::InvalidRequest(format!(
      "后端 {} 不支持该类型的提示",
      model.name()
    )));
  }
  Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
  Written(Artifacts),
  Failed { reason: String },
}

/// 一次批处理的结果，以图像相对路径为键；条目写入后不会被移除
#[derive(Debug, Default)]
pub struct BatchResult {
  outcomes: BTreeMap<String, ImageOutcome>,
  archive: PathBuf,
  archived_files: Vec<String>,
  total_boxes: usize,
}

impl BatchResult {
  fn record(&mut self, name: String, outcome: ImageOutcome) {
    self.outcomes.entry(name).or_insert(outcome);
  }

  pub fn outcomes(&self) -> &BTreeMap<String, ImageOutcome> {
    &self.outcomes
  }

  pub fn outcome(&self, name: &str) -> Option<&ImageOutcome> {
    self.outcomes.get(name)
  }

  pub fn written(&self) -> impl Iterator<Item = (&String, &Artifacts)> {
    self.outcomes.iter().filter_map(|(k, v)| match v {
      ImageOutcome::Written(a) => Some((k, a)),
      ImageOutcome::Failed { .. } => None,
    })
  }

  pub fn failures(&self) -> impl Iterator<Item = (&String, &str)> {
    self.outcomes.iter().filter_map(|(k, v)| match v {
      ImageOutcome::Failed { reason } => Some((k, reason.as_str())),
      ImageOutcome::Written(_) => None,
    })
  }

  pub fn archive(&self) -> &Path {
    &self.archive
  }

  /// 归档中的条目名
  pub fn archived_files(&self) -> &[String] {
    &self.archived_files
  }

  pub fn total_boxes(&self) -> usize {
    self.total_boxes
  }
}

/// 批量导出：逐张检测、写标签和可视化，最后打包成一个归档
pub struct BatchTask {
  prompt: PromptContext,
  filter: ConfidenceFilter,
  with_score: bool,
}

impl BatchTask {
  pub fn new(prompt: PromptContext, min_conf: f64) -> Self {
    Self {
      prompt,
      filter: ConfidenceFilter::new(min_conf),
      with_score: true,
    }
  }

  pub fn with_score(mut self, with_score: bool) -> Self {
    self.with_score = with_score;
    self
  }
}

impl<M: Detect> Task<&Path, M, &Path> for BatchTask {
  type Output = BatchResult;
  type Error = TaskError;

  fn run_task(self, input: &Path, model: M, output: &Path) -> Result<Self::Output, Self::Error> {
    validate_prompt(&model, &self.prompt)?;
    let images = ImageSet::open(input)?;
    info!(
      "开始批处理: {} 张图像, 后端 {}, 阈值 {}, 调色板 v{}",
      images.images().len(),
      model.name(),
      self.filter.min_conf(),
      palette::PALETTE_VERSION
    );
    if images.images().is_empty() {
      warn!("{} 下没有找到图像", input.display());
    }

    // 每次运行独占一个输出目录
    let work_dir = tempfile::Builder::new().prefix("biaozhu-output").tempdir()?;
    let writer = DatasetRecordOutput::new(work_dir.path())?.with_score(self.with_score);

    let mut result = BatchResult::default();
    let mut used_stems = HashSet::new();

    for path in images.images() {
      let name = images.relative_name(path);
      let boxes = ImageFrame::open(path)
        .map_err(ImageError::from)
        .and_then(|frame| {
          // 只有已写出的文件名才占用
          if used_stems.contains(&frame.stem()) {
            return Err(ImageError::NameCollision(frame.stem()));
          }
          let boxes = annotate_frame(&model, &frame, &self.prompt, &self.filter)?;
          Ok((frame, boxes))
        });

      match boxes {
        Ok((frame, boxes)) => {
          // 写出失败属于致命错误
          let artifacts = writer.render_result(&frame, &boxes)?;
          used_stems.insert(frame.stem());
          info!("{}: 保留 {} 个检测框", name, boxes.len());
          result.total_boxes += boxes.len();
          result.record(name, ImageOutcome::Written(artifacts));
        }
        Err(e) => {
          error!("处理 {} 失败: {}", name, e);
          result.record(
            name,
            ImageOutcome::Failed {
              reason: e.to_string(),
            },
          );
        }
      }
    }

    result.archived_files =
      archive::pack_flat(writer.directory(), output).map_err(TaskError::ArchiveError)?;
    result.archive = output.to_path_buf();

    info!(
      "批处理完成: 成功 {} 张, 失败 {} 张, 共 {} 个检测框, 归档 {}",
      result.written().count(),
      result.failures().count(),
      result.total_boxes,
      output.display()
    );
    Ok(result)
  }
}

/// 单张图像：检测后只保存可视化结果
pub struct OneShotTask {
  prompt: PromptContext,
  filter: ConfidenceFilter,
}

impl OneShotTask {
  pub fn new(prompt: PromptContext, min_conf: f64) -> Self {
    Self {
      prompt,
      filter: ConfidenceFilter::new(min_conf),
    }
  }
}

impl<'a, M: Detect> Task<ImageFrame, M, &SaveImageFileOutput<'a>> for OneShotTask {
  type Output = Vec<CanonicalBox>;
  type Error = TaskError;

  fn run_task(
    self,
    input: ImageFrame,
    model: M,
    output: &SaveImageFileOutput<'a>,
  ) -> Result<Self::Output, Self::Error> {
    validate_prompt(&model, &self.prompt)?;
    info!("开始推理 {} ...", input.filename());
    let now = std::time::Instant::now();
    let boxes = annotate_frame(&model, &input, &self.prompt, &self.filter)?;
    info!("推理完成，耗时: {:.2?}, {} 个检测框", now.elapsed(), boxes.len());
    let path = output.render_result(&input, &boxes)?;
    info!("保存图像到文件: {}", path.display());
    Ok(boxes)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bbox::{BoxEncoding, RawBox};
  use crate::prompt::{VisualPrompt, VisualPromptKind};
  use image::RgbImage;

  struct FixedBackend(Vec<RawBox>);

  impl Detect for FixedBackend {
    fn name(&self) -> &'static str {
      "fixed"
    }

    fn detect(&self, _: &ImageFrame, _: &PromptContext) -> Result<Vec<RawBox>, BackendError> {
      Ok(self.0.clone())
    }
  }

  struct TextOnly;

  impl Detect for TextOnly {
    fn name(&self) -> &'static str {
      "text-only"
    }

    fn accepts(&self, prompt: &PromptContext) -> bool {
      matches!(prompt, PromptContext::Text(_))
    }

    fn detect(&self, _: &ImageFrame, _: &PromptContext) -> Result<Vec<RawBox>, BackendError> {
      Ok(vec![])
    }
  }

  #[test]
  fn annotate_filters_after_normalizing() {
    let frame = ImageFrame::from_image("x.png", RgbImage::new(100, 100)).unwrap();
    let backend = FixedBackend(vec![
      RawBox::new(BoxEncoding::AbsolutePixel, [10.0, 10.0, 30.0, 30.0]).with_score(0.15),
      RawBox::new(BoxEncoding::NormalizedThousandths, [500.0, 500.0, 1000.0, 1000.0]),
      RawBox::new(BoxEncoding::AbsolutePixel, [30.0, 30.0, 5.0, 5.0]).with_score(0.4),
    ]);
    let boxes = annotate_frame(
      &backend,
      &frame,
      &PromptContext::Text("x".into()),
      &ConfidenceFilter::new(0.4),
    )
    .unwrap();
    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes[0].rect(), [50.0, 50.0, 100.0, 100.0]);
    assert_eq!(boxes[1].rect(), [5.0, 5.0, 30.0, 30.0]);
  }

  #[test]
  fn unsupported_prompt_is_a_validation_error() {
    let prompt = PromptContext::Visual(VisualPrompt {
      kind: VisualPromptKind::VisualImages,
      visual_images: vec![],
    });
    let err = validate_prompt(&TextOnly, &prompt).unwrap_err();
    assert!(err.is_validation());

    let err = validate_prompt(&TextOnly, &PromptContext::Text("  ".into())).unwrap_err();
    assert!(err.is_validation());
  }

  #[test]
  fn missing_input_is_reported_before_any_detection() {
    let work = tempfile::tempdir().unwrap();
    let err = BatchTask::new(PromptContext::Text("cat".into()), 0.4)
      .run_task(
        work.path().join("nope.tar").as_path(),
        FixedBackend(vec![]),
        work.path().join("out.tar").as_path(),
      )
      .unwrap_err();
    assert!(err.is_validation());
    assert!(!work.path().join("out.tar").exists());
  }

  #[test]
  fn outcomes_are_never_overwritten() {
    let mut result = BatchResult::default();
    result.record("a.png".into(), ImageOutcome::Failed { reason: "x".into() });
    result.record(
      "a.png".into(),
      ImageOutcome::Written(Artifacts {
        label: "a.txt".into(),
        visualization: "a_vis.png".into(),
      }),
    );
    assert_eq!(result.failures().count(), 1);
    assert_eq!(result.written().count(), 0);
  }
}
