// 该文件是 Biaozhu （标注） 项目的一部分。
// tests/common/mod.rs - 集成测试公共工具
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

#![allow(dead_code)]

use std::fs::File;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

pub use biaozhu::{
  bbox::{BoxEncoding, RawBox},
  frame::ImageFrame,
  model::{BackendError, Detect},
  prompt::PromptContext,
};

/// 按文件名返回固定结果的检测后端；文件名包含 `fail` 或位于 `fail/` 目录时报错
pub struct ScriptedBackend {
  pub boxes: Vec<RawBox>,
  pub text_only: bool,
}

impl ScriptedBackend {
  pub fn new(boxes: Vec<RawBox>) -> Self {
    Self {
      boxes,
      text_only: false,
    }
  }

  pub fn text_only(mut self) -> Self {
    self.text_only = true;
    self
  }
}

impl Detect for ScriptedBackend {
  fn name(&self) -> &'static str {
    "scripted"
  }

  fn accepts(&self, prompt: &PromptContext) -> bool {
    !self.text_only || matches!(prompt, PromptContext::Text(_))
  }

  fn detect(&self, frame: &ImageFrame, _prompt: &PromptContext) -> Result<Vec<RawBox>, BackendError> {
    let in_fail_dir = frame
      .path()
      .parent()
      .and_then(|dir| dir.file_name())
      .is_some_and(|dir| dir == "fail");
    if in_fail_dir || frame.filename().contains("fail") {
      return Err(BackendError::StatusError(503, "unavailable".into()));
    }
    Ok(self.boxes.clone())
  }
}

pub fn write_image(path: &Path, width: u32, height: u32) -> PathBuf {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  RgbImage::from_pixel(width, height, Rgb([40, 80, 120]))
    .save(path)
    .unwrap();
  path.to_path_buf()
}

/// 把 zip、tar 或 zstd 压缩的 tar 归档解压到目录
pub fn unpack(archive: &Path, dest: &Path) {
  let file = File::open(archive).unwrap();
  let name = archive.to_string_lossy().to_lowercase();
  if name.ends_with(".zip") {
    zip::ZipArchive::new(file).unwrap().extract(dest).unwrap();
  } else if name.ends_with(".zst") {
    tar::Archive::new(zstd::stream::read::Decoder::new(file).unwrap())
      .unpack(dest)
      .unwrap();
  } else {
    tar::Archive::new(file).unpack(dest).unwrap();
  }
}
