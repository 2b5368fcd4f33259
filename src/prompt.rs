// 该文件是 Biaozhu （标注） 项目的一部分。
// src/prompt.rs - 检测提示与视觉提示交互映射
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

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 单类别标注时使用的类别编号
pub const DEFAULT_CATEGORY_ID: u32 = 1;

#[derive(Error, Debug)]
pub enum PromptError {
  #[error("没有参考图像")]
  NoReferences,
  #[error("参考图像 {0} 上没有绘制任何矩形")]
  EmptyInteractions(String),
  #[error("找不到参考图像文件: {0}")]
  MissingReferenceImage(String),
  #[error("提示 JSON 解析失败: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 画布上绘制的矩形，左上角加宽高
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRect {
  pub left: f64,
  pub top: f64,
  pub width: f64,
  pub height: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category_id: Option<u32>,
}

/// 一张参考图像及其上绘制的矩形
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceAnnotation {
  pub filename: String,
  pub objects: Vec<UserRect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
  Rect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
  #[serde(rename = "type")]
  pub kind: InteractionKind,
  pub category_id: u32,
  /// `[x1, y1, x2, y2]`，参考图像像素坐标
  pub rect: [i64; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualImage {
  pub filename: String,
  pub interactions: Vec<Interaction>,
  /// 本地参考图像，只在进程内使用
  #[serde(default, skip_serializing)]
  pub image_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualPromptKind {
  VisualImages,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualPrompt {
  #[serde(rename = "type")]
  pub kind: VisualPromptKind,
  pub visual_images: Vec<VisualImage>,
}

/// 传给检测后端的提示
#[derive(Debug, Clone, PartialEq)]
pub enum PromptContext {
  Text(String),
  Visual(VisualPrompt),
}

/// 每个矩形映射为一个交互；角点按绘制位置相加得到，不裁剪到图像范围
pub fn to_interactions(rects: &[UserRect], default_category: u32) -> Vec<Interaction> {
  rects
    .iter()
    .map(|r| Interaction {
      kind: InteractionKind::Rect,
      category_id: r.category_id.unwrap_or(default_category),
      rect: [
        r.left as i64,
        r.top as i64,
        (r.left + r.width) as i64,
        (r.top + r.height) as i64,
      ],
    })
    .collect()
}

/// 由参考图像标注构建视觉提示。任何一张参考图像没有矩形都会直接失败，不会部分提交。
pub fn build_visual_prompt(
  annotations: &[ReferenceAnnotation],
  reference_paths: &HashMap<String, PathBuf>,
) -> Result<VisualPrompt, PromptError> {
  if annotations.is_empty() {
    return Err(PromptError::NoReferences);
  }
  if let Some(empty) = annotations.iter().find(|a| a.objects.is_empty()) {
    return Err(PromptError::EmptyInteractions(empty.filename.clone()));
  }

  let mut prompt = VisualPrompt {
    kind: VisualPromptKind::VisualImages,
    visual_images: annotations
      .iter()
      .map(|a| VisualImage {
        filename: a.filename.clone(),
        interactions: to_interactions(&a.objects, DEFAULT_CATEGORY_ID),
        image_path: None,
      })
      .collect(),
  };
  resolve_image_paths(&mut prompt, reference_paths)?;
  Ok(prompt)
}

/// 按文件名为视觉提示补全参考图像路径；已有路径的条目保持不变
pub fn resolve_image_paths(
  prompt: &mut VisualPrompt,
  reference_paths: &HashMap<String, PathBuf>,
) -> Result<(), PromptError> {
  for item in prompt.visual_images.iter_mut() {
    if let Some(path) = reference_paths.get(&item.filename) {
      item.image_path = Some(path.clone());
    }
    if item.image_path.is_none() {
      return Err(PromptError::MissingReferenceImage(item.filename.clone()));
    }
  }
  Ok(())
}

/// 以文件名为键建立参考图像索引
pub fn reference_index<P: AsRef<Path>>(paths: &[P]) -> HashMap<String, PathBuf> {
  paths
    .iter()
    .filter_map(|p| {
      let p = p.as_ref();
      p.file_name()
        .map(|n| (n.to_string_lossy().into_owned(), p.to_path_buf()))
    })
    .collect()
}

impl VisualPrompt {
  pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, PromptError> {
    let text = std::fs::read_to_string(path)?;
    let prompt: VisualPrompt = serde_json::from_str(&text)?;
    prompt.validate()?;
    Ok(prompt)
  }

  /// 检查每张参考图像至少有一个交互
  pub fn validate(&self) -> Result<(), PromptError> {
    if self.visual_images.is_empty() {
      return Err(PromptError::NoReferences);
    }
    match self.visual_images.iter().find(|v| v.interactions.is_empty()) {
      Some(empty) => Err(PromptError::EmptyInteractions(empty.filename.clone())),
      None => Ok(()),
    }
  }
}

pub fn load_annotations<P: AsRef<Path>>(path: P) -> Result<Vec<ReferenceAnnotation>, PromptError> {
  let text = std::fs::read_to_string(path)?;
  Ok(serde_json::from_str(&text)?)
}
