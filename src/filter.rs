// 该文件是 Biaozhu （标注） 项目的一部分。
// src/filter.rs - 置信度过滤
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

use crate::bbox::CanonicalBox;

/// 默认置信度阈值
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.4;

/// 置信度过滤器；阈值不做裁剪，超出 [0, 1] 时表现为全部通过或全部拒绝
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceFilter {
  min_conf: f64,
}

impl Default for ConfidenceFilter {
  fn default() -> Self {
    Self::new(DEFAULT_MIN_CONFIDENCE)
  }
}

impl ConfidenceFilter {
  pub fn new(min_conf: f64) -> Self {
    Self { min_conf }
  }

  pub fn min_conf(&self) -> f64 {
    self.min_conf
  }

  /// 含边界：置信度恰好等于阈值时保留
  pub fn admit(&self, bbox: &CanonicalBox) -> bool {
    bbox.score >= self.min_conf
  }

  /// 按原有顺序保留通过的检测框
  pub fn retain(&self, boxes: Vec<CanonicalBox>) -> Vec<CanonicalBox> {
    boxes.into_iter().filter(|b| self.admit(b)).collect()
  }
}
