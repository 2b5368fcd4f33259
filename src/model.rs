// 该文件是 Biaozhu （标注） 项目的一部分。
// src/model.rs - 检测后端
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

use std::io::Cursor;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::RgbImage;
use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  bbox::RawBox,
  frame::ImageFrame,
  prompt::PromptContext,
};

mod gemini;
mod grounding_dino;
mod trex;

pub use self::gemini::{GeminiBackend, GeminiBuilder};
pub use self::grounding_dino::{GroundingDinoBackend, GroundingDinoBuilder};
pub use self::trex::{TRexBackend, TRexBuilder};

#[derive(Error, Debug)]
pub enum BackendError {
  #[error("HTTP 请求错误: {0}")]
  HttpError(#[from] reqwest::Error),
  #[error("后端返回状态 {0}: {1}")]
  StatusError(u16, String),
  #[error("后端响应无效: {0}")]
  InvalidResponse(String),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("图像编码错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("后端 {0} 不支持该类型的提示")]
  UnsupportedPrompt(&'static str),
  #[error("缺少凭据: {0}")]
  MissingCredential(&'static str),
  #[error("检测任务失败: {0}")]
  TaskFailed(String),
  #[error("检测任务超时: {0}")]
  TaskTimeout(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("后端参数无效: {0}")]
  InvalidParameter(String),
}

/// 检测后端：输入一张图像和提示，返回后端原生编码的检测框
pub trait Detect {
  fn name(&self) -> &'static str;

  /// 后端能否使用这种提示；批处理开始前据此拒绝请求
  fn accepts(&self, _prompt: &PromptContext) -> bool {
    true
  }

  fn detect(&self, frame: &ImageFrame, prompt: &PromptContext) -> Result<Vec<RawBox>, BackendError>;
}

impl<D: Detect + ?Sized> Detect for &D {
  fn name(&self) -> &'static str {
    (**self).name()
  }

  fn accepts(&self, prompt: &PromptContext) -> bool {
    (**self).accepts(prompt)
  }

  fn detect(&self, frame: &ImageFrame, prompt: &PromptContext) -> Result<Vec<RawBox>, BackendError> {
    (**self).detect(frame, prompt)
  }
}

/// 后端的显式配置，生命周期与一次运行相同
#[derive(Debug, Clone)]
pub struct BackendConfig {
  pub gemini_api_key: Option<String>,
  pub dds_token: Option<String>,
  pub timeout: Duration,
}

impl Default for BackendConfig {
  fn default() -> Self {
    Self {
      gemini_api_key: None,
      dds_token: None,
      timeout: Duration::from_secs(120),
    }
  }
}

pub enum BackendWrapper {
  Gemini(GeminiBackend),
  GroundingDino(GroundingDinoBackend),
  TRex(TRexBackend),
}

impl BackendWrapper {
  /// 按 URL 方案选择后端：`gemini:<model>`、`dino://host:port/path`、`trex:<model>`
  pub fn build(url: &Url, config: &BackendConfig) -> Result<Self, BackendError> {
    match url.scheme() {
      GeminiBuilder::SCHEME => Ok(BackendWrapper::Gemini(
        GeminiBuilder::from_url(url)?.config(config).build()?,
      )),
      GroundingDinoBuilder::SCHEME => Ok(BackendWrapper::GroundingDino(
        GroundingDinoBuilder::from_url(url)?.config(config).build()?,
      )),
      TRexBuilder::SCHEME => Ok(BackendWrapper::TRex(
        TRexBuilder::from_url(url)?.config(config).build()?,
      )),
      other => Err(BackendError::SchemeMismatch(format!(
        "未知的后端方案 '{}'，可用: {}, {}, {}",
        other,
        GeminiBuilder::SCHEME,
        GroundingDinoBuilder::SCHEME,
        TRexBuilder::SCHEME
      ))),
    }
  }
}

impl Detect for BackendWrapper {
  fn name(&self) -> &'static str {
    match self {
      BackendWrapper::Gemini(b) => b.name(),
      BackendWrapper::GroundingDino(b) => b.name(),
      BackendWrapper::TRex(b) => b.name(),
    }
  }

  fn accepts(&self, prompt: &PromptContext) -> bool {
    match self {
      BackendWrapper::Gemini(b) => b.accepts(prompt),
      BackendWrapper::GroundingDino(b) => b.accepts(prompt),
      BackendWrapper::TRex(b) => b.accepts(prompt),
    }
  }

  fn detect(&self, frame: &ImageFrame, prompt: &PromptContext) -> Result<Vec<RawBox>, BackendError> {
    match self {
      BackendWrapper::Gemini(b) => b.detect(frame, prompt),
      BackendWrapper::GroundingDino(b) => b.detect(frame, prompt),
      BackendWrapper::TRex(b) => b.detect(frame, prompt),
    }
  }
}

pub(crate) fn check_scheme(url: &Url, expected: &str) -> Result<(), BackendError> {
  if url.scheme() != expected {
    return Err(BackendError::SchemeMismatch(format!(
      "期望方案 '{}', 实际方案 '{}'",
      expected,
      url.scheme()
    )));
  }
  Ok(())
}

pub(crate) fn param<T: std::str::FromStr>(url: &Url, key: &str, default: T) -> Result<T, BackendError> {
  crate::query_param(url, key)
    .transpose()
    .map(|v| v.unwrap_or(default))
    .map_err(BackendError::InvalidParameter)
}

/// URL 路径中的模型名，空路径时使用默认值
pub(crate) fn model_from_path(url: &Url, default: &str) -> String {
  let path = url.path().trim_matches('/');
  if path.is_empty() {
    default.to_string()
  } else {
    path.to_string()
  }
}

pub(crate) fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, BackendError> {
  let mut buffer = Cursor::new(Vec::new());
  image.write_to(&mut buffer, image::ImageFormat::Jpeg)?;
  Ok(buffer.into_inner())
}

pub(crate) fn encode_base64(bytes: &[u8]) -> String {
  BASE64.encode(bytes)
}

pub(crate) fn data_uri(mime: &str, bytes: &[u8]) -> String {
  format!("data:{};base64,{}", mime, encode_base64(bytes))
}

/// 非 2xx 响应转为错误，保留响应正文便于排查
pub(crate) fn ensure_success(
  response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, BackendError> {
  let status = response.status();
  if status.is_success() {
    Ok(response)
  } else {
    let text = response.text().unwrap_or_default();
    Err(BackendError::StatusError(status.as_u16(), text))
  }
}
