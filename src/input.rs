// 该文件是 Biaozhu （标注） 项目的一部分。
// src/input.rs - 输入定义
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

use tempfile::TempDir;
use thiserror::Error;
use tracing::info;

mod archive;
mod image_dir;

pub use self::archive::{is_archive, unpack_archive};
pub use self::image_dir::{IMAGE_EXTENSIONS, collect_images, is_image_file};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("输入不存在: {0}")]
  NotFound(String),
  #[error("不支持的输入: {0}")]
  Unsupported(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 一次运行要处理的图像集合；来自归档时解压到本次运行独占的临时目录
pub struct ImageSet {
  root: PathBuf,
  images: Vec<PathBuf>,
  _extracted: Option<TempDir>,
}

impl ImageSet {
  /// 接受目录或 `.zip` / `.tar` / `.tar.zst` 归档
  pub fn open<P: AsRef<Path>>(source: P) -> Result<Self, InputError> {
    let source = source.as_ref();
    if !source.exists() {
      return Err(InputError::NotFound(source.display().to_string()));
    }

    let (root, extracted) = if source.is_dir() {
      (source.to_path_buf(), None)
    } else if is_archive(source) {
      let dir = tempfile::Builder::new().prefix("biaozhu-input").tempdir()?;
      unpack_archive(source, dir.path())?;
      info!("已解压 {} 到 {}", source.display(), dir.path().display());
      (dir.path().to_path_buf(), Some(dir))
    } else {
      return Err(InputError::Unsupported(source.display().to_string()));
    };

    let images = collect_images(&root)?;
    Ok(Self {
      root,
      images,
      _extracted: extracted,
    })
  }

  /// 按路径排序的图像文件
  pub fn images(&self) -> &[PathBuf] {
    &self.images
  }

  /// 相对于图像根目录的路径，作为结果的键
  pub fn relative_name(&self, path: &Path) -> String {
    path
      .strip_prefix(&self.root)
      .unwrap_or(path)
      .to_string_lossy()
      .into_owned()
  }
}
