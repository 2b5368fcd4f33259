// 该文件是 Biaozhu （标注） 项目的一部分。
// src/input/image_dir.rs - 图像目录遍历
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

pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// 扩展名不区分大小写
pub fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .map(|e| e.to_string_lossy().to_ascii_lowercase())
    .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

/// 递归收集目录下的图像文件，按路径排序
pub fn collect_images(root: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
  let mut images = Vec::new();
  let mut pending = vec![root.to_path_buf()];
  while let Some(dir) = pending.pop() {
    for entry in std::fs::read_dir(&dir)? {
      let entry = entry?;
      let path = entry.path();
      let file_type = entry.file_type()?;
      if file_type.is_dir() {
        pending.push(path);
      } else if file_type.is_file() && is_image_file(&path) {
        images.push(path);
      }
    }
  }
  images.sort();
  Ok(images)
}
