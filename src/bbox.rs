// 该文件是 Biaozhu （标注） 项目的一部分。
// src/bbox.rs - 检测框坐标归一化
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

use thiserror::Error;

/// 未提供置信度时的默认值
pub const DEFAULT_SCORE: f64 = 1.0;

#[derive(Error, Debug, PartialEq)]
pub enum BoxError {
  #[error("检测框坐标不是有限数: {0:?}")]
  NonFinite([f64; 4]),
}

/// 后端原生的坐标编码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxEncoding {
  /// `[y1, x1, y2, x2]`，取值 0..=1000，LLM 视觉定位输出
  NormalizedThousandths,
  /// `[x1, y1, x2, y2]`，图像像素坐标
  AbsolutePixel,
  /// `[cx, cy, w, h]`，取值 0..=1，Grounding DINO 原生输出
  NormalizedCenterSize,
}

/// 后端返回的原始检测框
#[derive(Debug, Clone, PartialEq)]
pub struct RawBox {
  pub encoding: BoxEncoding,
  pub coords: [f64; 4],
  pub score: Option<f64>,
  pub label: Option<String>,
  pub category_id: Option<u32>,
}

impl RawBox {
  pub fn new(encoding: BoxEncoding, coords: [f64; 4]) -> Self {
    Self {
      encoding,
      coords,
      score: None,
      label: None,
      category_id: None,
    }
  }

  pub fn with_score(mut self, score: f64) -> Self {
    self.score = Some(score);
    self
  }

  pub fn with_label(mut self, label: impl Into<String>) -> Self {
    self.label = Some(label.into());
    self
  }

  pub fn with_category(mut self, category_id: u32) -> Self {
    self.category_id = Some(category_id);
    self
  }
}

/// 统一的像素矩形，保证 `x1 <= x2` 且 `y1 <= y2`
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalBox {
  x1: f64,
  y1: f64,
  x2: f64,
  y2: f64,
  pub score: f64,
  pub label: Option<String>,
  pub category_id: u32,
}

impl CanonicalBox {
  /// 构造时交换颠倒的坐标对
  pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
    let (x1, x2) = if x1 > x2 { (x2, x1) } else { (x1, x2) };
    let (y1, y2) = if y1 > y2 { (y2, y1) } else { (y1, y2) };
    Self {
      x1,
      y1,
      x2,
      y2,
      score: DEFAULT_SCORE,
      label: None,
      category_id: 0,
    }
  }

  pub fn with_score(mut self, score: f64) -> Self {
    self.score = score;
    self
  }

  pub fn with_label(mut self, label: Option<String>) -> Self {
    self.label = label;
    self
  }

  pub fn with_category(mut self, category_id: u32) -> Self {
    self.category_id = category_id;
    self
  }

  /// `[x1, y1, x2, y2]`
  pub fn rect(&self) -> [f64; 4] {
    [self.x1, self.y1, self.x2, self.y2]
  }

  pub fn width(&self) -> f64 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f64 {
    self.y2 - self.y1
  }
}

/// 将任意受支持编码的检测框转换为像素矩形。
///
/// 千分比编码按图像尺寸缩放后截断为整数像素；超出图像范围的坐标不会被裁剪。
pub fn normalize(
  raw: &RawBox,
  image_width: u32,
  image_height: u32,
) -> Result<CanonicalBox, BoxError> {
  if raw.coords.iter().any(|v| !v.is_finite()) {
    return Err(BoxError::NonFinite(raw.coords));
  }

  let (w, h) = (image_width as f64, image_height as f64);
  let [a, b, c, d] = raw.coords;

  let bbox = match raw.encoding {
    BoxEncoding::NormalizedThousandths => CanonicalBox::new(
      (b / 1000.0 * w).trunc(),
      (a / 1000.0 * h).trunc(),
      (d / 1000.0 * w).trunc(),
      (c / 1000.0 * h).trunc(),
    ),
    BoxEncoding::AbsolutePixel => CanonicalBox::new(a, b, c, d),
    BoxEncoding::NormalizedCenterSize => CanonicalBox::new(
      (a - c / 2.0) * w,
      (b - d / 2.0) * h,
      (a + c / 2.0) * w,
      (b + d / 2.0) * h,
    ),
  };

  Ok(
    bbox
      .with_score(raw.score.unwrap_or(DEFAULT_SCORE))
      .with_label(raw.label.clone())
      .with_category(raw.category_id.unwrap_or(0)),
  )
}
