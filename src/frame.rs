// 该文件是 Biaozhu （标注） 项目的一部分。
// src/frame.rs - 图像帧定义
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

use image::{ImageReader, RgbImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("图像尺寸为零: {0}")]
  EmptyImage(String),
}

/// 一张已加载的图像，加载后不可变；宽高即归一化的分母
#[derive(Debug, Clone)]
pub struct ImageFrame {
  path: PathBuf,
  image: RgbImage,
}

impl ImageFrame {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FrameError> {
    let path = path.as_ref();
    let image = ImageReader::open(path)?
      .with_guessed_format()?
      .decode()?
      .to_rgb8();
    Self::from_image(path, image)
  }

  pub fn from_image<P: AsRef<Path>>(path: P, image: RgbImage) -> Result<Self, FrameError> {
    let path = path.as_ref().to_path_buf();
    if image.width() == 0 || image.height() == 0 {
      return Err(FrameError::EmptyImage(path.display().to_string()));
    }
    Ok(Self { path, image })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 文件名（不含目录）
  pub fn filename(&self) -> String {
    self
      .path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default()
  }

  /// 文件名去掉扩展名，用于命名标签与可视化文件
  pub fn stem(&self) -> String {
    self
      .path
      .file_stem()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default()
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }
}
