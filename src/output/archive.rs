// 该文件是 Biaozhu （标注） 项目的一部分。
// src/output/archive.rs - 输出归档
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
use std::io::Write;
use std::path::Path;

use tar::Builder;
use zip::{ZipWriter, write::SimpleFileOptions};
use zstd::stream::write::Encoder as ZstdEncoder;

const ZSTD_LEVEL: i32 = 3;

fn append_tar<W: Write>(tar: &mut Builder<W>, dir: &Path, files: &[String]) -> Result<(), std::io::Error> {
  for name in files {
    tar.append_path_with_name(dir.join(name), name)?;
  }
  Ok(())
}

fn flat_files(dir: &Path) -> Result<Vec<String>, std::io::Error> {
  let mut files = Vec::new();
  for entry in std::fs::read_dir(dir)? {
    let entry = entry?;
    if entry.file_type()?.is_file() {
      files.push(entry.file_name().to_string_lossy().into_owned());
    }
  }
  files.sort();
  Ok(files)
}

fn append_zip(out: File, dir: &Path, files: &[String]) -> zip::result::ZipResult<()> {
  let mut zip = ZipWriter::new(out);
  let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
  for name in files {
    zip.start_file(name.as_str(), options)?;
    std::io::copy(&mut File::open(dir.join(name))?, &mut zip)?;
  }
  zip.finish()?;
  Ok(())
}

/// 把目录下的所有文件平铺打包（条目名即文件名）。
/// 路径以 `.zip` 结尾时写 zip；以 `.zst` 结尾时写 zstd 压缩的 tar；其余写 tar。
/// 返回写入的条目名。
pub fn pack_flat(dir: &Path, archive: &Path) -> Result<Vec<String>, std::io::Error> {
  if let Some(parent) = archive.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }

  let files = flat_files(dir)?;
  let out = File::create(archive)?;
  let name = archive
    .file_name()
    .map(|n| n.to_string_lossy().to_ascii_lowercase())
    .unwrap_or_default();

  if name.ends_with(".zip") {
    append_zip(out, dir, &files).map_err(std::io::Error::other)?;
  } else if name.ends_with(".zst") {
    let mut tar = Builder::new(ZstdEncoder::new(out, ZSTD_LEVEL)?);
    append_tar(&mut tar, dir, &files)?;
    tar.into_inner()?.finish()?;
  } else {
    let mut tar = Builder::new(out);
    append_tar(&mut tar, dir, &files)?;
    tar.into_inner()?.flush()?;
  }
  Ok(files)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tar::Archive;

  fn entry_names(archive: &Path) -> Vec<String> {
    let file = File::open(archive).unwrap();
    let mut names: Vec<String> = if archive.to_string_lossy().ends_with(".zip") {
      zip::ZipArchive::new(file)
        .unwrap()
        .file_names()
        .map(str::to_string)
        .collect()
    } else if archive.to_string_lossy().ends_with(".zst") {
      Archive::new(zstd::stream::read::Decoder::new(file).unwrap())
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect()
    } else {
      Archive::new(file)
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect()
    };
    names.sort();
    names
  }

  #[test]
  fn packs_files_flat() {
    let work = tempfile::tempdir().unwrap();
    let dir = work.path().join("out");
    std::fs::create_dir_all(dir.join("nested")).unwrap();
    std::fs::write(dir.join("b.txt"), "1").unwrap();
    std::fs::write(dir.join("a_vis.png"), "2").unwrap();
    std::fs::write(dir.join("nested/ignored.txt"), "3").unwrap();

    for name in ["labels.tar", "labels.tar.zst", "annotated_labels.zip"] {
      let archive = work.path().join(name);
      let written = pack_flat(&dir, &archive).unwrap();
      assert_eq!(written, vec!["a_vis.png", "b.txt"]);
      assert_eq!(entry_names(&archive), vec!["a_vis.png", "b.txt"]);
    }
  }
}
