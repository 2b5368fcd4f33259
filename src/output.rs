// 该文件是 Biaozhu （标注） 项目的一部分。
// src/output.rs - 输出定义
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::bbox::CanonicalBox;
use crate::frame::ImageFrame;

pub mod archive;
pub mod draw;
pub mod palette;
pub mod yolo_record;

use self::draw::Draw;
use self::yolo_record::{YoloRecord, to_record, write_records};

/// 可视化文件名后缀
pub const VIS_SUFFIX: &str = "_vis";

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("字体加载失败: {0}")]
  FontError(#[from] ab_glyph::InvalidFont),
}

pub trait Render<Frame, Output>: Sized {
  type Artifact;
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<Self::Artifact, Self::Error>;
}

/// 单张图像写出的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
  pub label: PathBuf,
  pub visualization: PathBuf,
}

/// 把检测结果写成数据集：`<stem>.txt` 标签与 `<stem>_vis.png` 可视化
pub struct DatasetRecordOutput<'a> {
  directory: PathBuf,
  draw: Draw<'a>,
  with_score: bool,
}

impl DatasetRecordOutput<'static> {
  pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self, OutputError> {
    let directory = directory.as_ref().to_path_buf();
    std::fs::create_dir_all(&directory)?;
    Ok(Self {
      directory,
      draw: Draw::new()?,
      with_score: true,
    })
  }
}

impl<'a> DatasetRecordOutput<'a> {
  /// 是否在标签行末尾写入置信度
  pub fn with_score(mut self, with_score: bool) -> Self {
    self.with_score = with_score;
    self
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn label_path(&self, stem: &str) -> PathBuf {
    self.directory.join(format!("{}.txt", stem))
  }

  pub fn visualization_path(&self, stem: &str) -> PathBuf {
    self.directory.join(format!("{}{}.png", stem, VIS_SUFFIX))
  }

  fn records(&self, frame: &ImageFrame, boxes: &[CanonicalBox]) -> Vec<YoloRecord> {
    boxes
      .iter()
      .map(|b| to_record(b, frame.width(), frame.height()))
      .map(|r| if self.with_score { r } else { r.without_score() })
      .collect()
  }
}

impl<'a> Render<ImageFrame, Vec<CanonicalBox>> for DatasetRecordOutput<'a> {
  type Artifact = Artifacts;
  type Error = OutputError;

  fn render_result(
    &self,
    frame: &ImageFrame,
    result: &Vec<CanonicalBox>,
  ) -> Result<Self::Artifact, Self::Error> {
    let stem = frame.stem();

    let label = self.label_path(&stem);
    write_records(&self.records(frame, result), &label)?;

    let visualization = self.visualization_path(&stem);
    self
      .draw
      .render(frame.image(), result)
      .save_with_format(&visualization, image::ImageFormat::Png)?;

    debug!("写出 {} 与 {}", label.display(), visualization.display());
    Ok(Artifacts {
      label,
      visualization,
    })
  }
}

/// 只保存可视化图像
pub struct SaveImageFileOutput<'a> {
  path: PathBuf,
  draw: Draw<'a>,
}

impl SaveImageFileOutput<'static> {
  pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, OutputError> {
    Ok(Self {
      path: path.as_ref().to_path_buf(),
      draw: Draw::new()?,
    })
  }
}

impl<'a> Render<ImageFrame, Vec<CanonicalBox>> for SaveImageFileOutput<'a> {
  type Artifact = PathBuf;
  type Error = OutputError;

  fn render_result(
    &self,
    frame: &ImageFrame,
    result: &Vec<CanonicalBox>,
  ) -> Result<Self::Artifact, Self::Error> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    self.draw.render(frame.image(), result).save(&self.path)?;
    Ok(self.path.clone())
  }
}
