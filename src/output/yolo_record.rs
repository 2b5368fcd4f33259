// 该文件是 Biaozhu （标注） 项目的一部分。
// src/output/yolo_record.rs - YOLO 标签记录
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

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::bbox::CanonicalBox;

#[derive(Error, Debug, PartialEq)]
pub enum RecordParseError {
  #[error("字段数量错误: 期望 5 或 6 个, 实际 {0} 个")]
  FieldCount(usize),
  #[error("字段无法解析: {0}")]
  InvalidField(String),
}

/// 一行 YOLO 标签：`category_id cx cy w h [score]`，中心与宽高为相对图像尺寸的比例
#[derive(Debug, Clone, PartialEq)]
pub struct YoloRecord {
  pub category_id: u32,
  pub cx: f64,
  pub cy: f64,
  pub w: f64,
  pub h: f64,
  pub score: Option<f64>,
}

impl YoloRecord {
  /// 去掉置信度列，得到标准五列格式
  pub fn without_score(mut self) -> Self {
    self.score = None;
    self
  }

  /// 反算像素矩形 `[x1, y1, x2, y2]`
  pub fn to_pixel_rect(&self, image_width: u32, image_height: u32) -> [f64; 4] {
    let (w, h) = (image_width as f64, image_height as f64);
    [
      (self.cx - self.w / 2.0) * w,
      (self.cy - self.h / 2.0) * h,
      (self.cx + self.w / 2.0) * w,
      (self.cy + self.h / 2.0) * h,
    ]
  }
}

impl fmt::Display for YoloRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} {:.6} {:.6} {:.6} {:.6}",
      self.category_id, self.cx, self.cy, self.w, self.h
    )?;
    if let Some(score) = self.score {
      write!(f, " {:.4}", score)?;
    }
    Ok(())
  }
}

impl FromStr for YoloRecord {
  type Err = RecordParseError;

  fn from_str(line: &str) -> Result<Self, Self::Err> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 5 && fields.len() != 6 {
      return Err(RecordParseError::FieldCount(fields.len()));
    }

    fn parse<T: FromStr>(field: &str) -> Result<T, RecordParseError> {
      field
        .parse::<T>()
        .map_err(|_| RecordParseError::InvalidField(field.to_string()))
    }

    Ok(YoloRecord {
      category_id: parse(fields[0])?,
      cx: parse(fields[1])?,
      cy: parse(fields[2])?,
      w: parse(fields[3])?,
      h: parse(fields[4])?,
      score: fields.get(5).map(|s| parse(s)).transpose()?,
    })
  }
}

/// 将像素矩形转为 YOLO 记录；类别编号原样写入
pub fn to_record(bbox: &CanonicalBox, image_width: u32, image_height: u32) -> YoloRecord {
  let (w, h) = (image_width as f64, image_height as f64);
  let [x1, y1, x2, y2] = bbox.rect();
  YoloRecord {
    category_id: bbox.category_id,
    cx: (x1 + x2) / 2.0 / w,
    cy: (y1 + y2) / 2.0 / h,
    w: (x2 - x1) / w,
    h: (y2 - y1) / h,
    score: Some(bbox.score),
  }
}

/// 覆盖写入标签文件，每个记录一行；没有记录时写入空文件
pub fn write_records(records: &[YoloRecord], path: &Path) -> Result<(), std::io::Error> {
  let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
  for record in records {
    writeln!(file, "{}", record)?;
  }
  file.flush()
}
