// 该文件是 Biaozhu （标注） 项目的一部分。
// src/input/archive.rs - 输入归档解压
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

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tar::Archive;
use zip::ZipArchive;
use zstd::stream::read::Decoder as ZstdDecoder;

fn lower_name(path: &Path) -> String {
  path
    .file_name()
    .map(|n| n.to_string_lossy().to_ascii_lowercase())
    .unwrap_or_default()
}

pub fn is_archive(path: &Path) -> bool {
  let name = lower_name(path);
  name.ends_with(".zip") || name.ends_with(".tar") || name.ends_with(".tar.zst") || name.ends_with(".tzst")
}

/// 解压 zip、tar 或 zstd 压缩的 tar。tar 跳过指向目标目录之外的条目，zip 遇到这种条目时报错
pub fn unpack_archive(archive: &Path, dest: &Path) -> Result<(), std::io::Error> {
  let file = BufReader::new(File::open(archive)?);
  let name = lower_name(archive);
  if name.ends_with(".zip") {
    ZipArchive::new(file)
      .and_then(|mut zip| zip.extract(dest))
      .map_err(std::io::Error::other)
  } else if name.ends_with(".zst") || name.ends_with(".tzst") {
    Archive::new(ZstdDecoder::new(file)?).unpack(dest)
  } else {
    Archive::new(file).unpack(dest)
  }
}
