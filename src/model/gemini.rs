// 该文件是 Biaozhu （标注） 项目的一部分。
// src/model/gemini.rs - Gemini 视觉定位后端
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

use std::time::Duration;

use image::RgbImage;
use image::imageops::FilterType;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  bbox::{BoxEncoding, RawBox},
  frame::ImageFrame,
  model::{
    BackendConfig, BackendError, Detect, check_scheme, encode_base64, encode_jpeg, model_from_path, param,
  },
  prompt::PromptContext,
};

const GEMINI_SCHEME: &str = "gemini";
const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";
const GEMINI_DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_THUMBNAIL_SIZE: u32 = 1024;

const SYSTEM_INSTRUCTION: &str = "Return bounding boxes as a JSON array with labels. \
Never return masks or code fencing. Limit to 25 objects.\n\
If an object is present multiple times, name them according to their unique characteristic \
(colors, size, position, unique characteristics, etc..).";

pub struct GeminiBuilder {
  model: String,
  endpoint: String,
  temperature: f32,
  max_retries: u32,
  api_key: Option<String>,
  timeout: Duration,
}

impl FromUrlWithScheme for GeminiBuilder {
  const SCHEME: &'static str = GEMINI_SCHEME;
}

impl FromUrl for GeminiBuilder {
  type Error = BackendError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;
    Ok(GeminiBuilder {
      model: model_from_path(url, GEMINI_DEFAULT_MODEL),
      endpoint: param(url, "endpoint", GEMINI_DEFAULT_ENDPOINT.to_string())?,
      temperature: param(url, "temperature", 0.5)?,
      max_retries: param(url, "max_retries", 2)?,
      api_key: None,
      timeout: BackendConfig::default().timeout,
    })
  }
}

impl GeminiBuilder {
  pub fn config(mut self, config: &BackendConfig) -> Self {
    self.api_key = config.gemini_api_key.clone();
    self.timeout = config.timeout;
    self
  }

  pub fn build(self) -> Result<GeminiBackend, BackendError> {
    let api_key = self
      .api_key
      .filter(|k| !k.is_empty())
      .ok_or(BackendError::MissingCredential("GOOGLE_API_KEY"))?;
    let client = Client::builder().timeout(self.timeout).build()?;
    info!("Gemini 后端: model={}, endpoint={}", self.model, self.endpoint);
    Ok(GeminiBackend {
      client,
      endpoint: self.endpoint.trim_end_matches('/').to_string(),
      model: self.model,
      temperature: self.temperature,
      max_retries: self.max_retries,
      api_key,
    })
  }
}

pub struct GeminiBackend {
  client: Client,
  endpoint: String,
  model: String,
  temperature: f32,
  max_retries: u32,
  api_key: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
  content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
  #[serde(default)]
  parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
  text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroundedBox {
  box_2d: [f64; 4],
  label: Option<String>,
}

/// 缩小到 1024x1024 以内，保持宽高比，不放大
fn thumbnail(image: &RgbImage) -> RgbImage {
  if image.width() <= GEMINI_THUMBNAIL_SIZE && image.height() <= GEMINI_THUMBNAIL_SIZE {
    return image.clone();
  }
  image::DynamicImage::ImageRgb8(image.clone())
    .resize(GEMINI_THUMBNAIL_SIZE, GEMINI_THUMBNAIL_SIZE, FilterType::Lanczos3)
    .to_rgb8()
}

/// 取出 ```json 围栏中的内容；没有围栏时原样返回
pub fn strip_json_fence(text: &str) -> &str {
  let mut offset = 0;
  for line in text.split_inclusive('\n') {
    offset += line.len();
    if line.trim_end_matches(['\r', '\n']) == "```json" {
      let rest = &text[offset..];
      return rest.split("```").next().unwrap_or(rest);
    }
  }
  text
}

/// 解析模型返回的 `[{box_2d, label}]` 数组；坐标为 `[y1, x1, y2, x2]` 千分比
pub fn parse_grounded_boxes(text: &str) -> Result<Vec<RawBox>, BackendError> {
  let boxes: Vec<GroundedBox> = serde_json::from_str(strip_json_fence(text).trim())?;
  Ok(
    boxes
      .into_iter()
      .map(|b| {
        let raw = RawBox::new(BoxEncoding::NormalizedThousandths, b.box_2d);
        match b.label {
          Some(label) => raw.with_label(label),
          None => raw,
        }
      })
      .collect(),
  )
}

impl GeminiBackend {
  fn request_body(&self, image: &RgbImage, user_request: &str) -> Result<serde_json::Value, BackendError> {
    let data = encode_base64(&encode_jpeg(&thumbnail(image))?);
    Ok(json!({
      "system_instruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
      "contents": [{
        "role": "user",
        "parts": [
          { "text": user_request },
          { "inline_data": { "mime_type": "image/jpeg", "data": data } }
        ]
      }],
      "generationConfig": { "temperature": self.temperature },
      "safetySettings": [{
        "category": "HARM_CATEGORY_DANGEROUS_CONTENT",
        "threshold": "BLOCK_ONLY_HIGH"
      }]
    }))
  }

  fn generate(&self, body: &serde_json::Value) -> Result<String, BackendError> {
    let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
    debug!("Gemini POST {}", url);
    let response = self
      .client
      .post(&url)
      .header("x-goog-api-key", &self.api_key)
      .json(body)
      .send()?;
    let response: GenerateContentResponse = super::ensure_success(response)?.json()?;

    let text: String = response
      .candidates
      .into_iter()
      .next()
      .and_then(|c| c.content)
      .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
      .unwrap_or_default();
    if text.is_empty() {
      return Err(BackendError::InvalidResponse("Gemini 没有返回文本".into()));
    }
    Ok(text)
  }
}

impl Detect for GeminiBackend {
  fn name(&self) -> &'static str {
    "gemini"
  }

  fn accepts(&self, prompt: &PromptContext) -> bool {
    matches!(prompt, PromptContext::Text(_))
  }

  fn detect(&self, frame: &ImageFrame, prompt: &PromptContext) -> Result<Vec<RawBox>, BackendError> {
    let PromptContext::Text(user_request) = prompt else {
      return Err(BackendError::UnsupportedPrompt("gemini"));
    };
    let body = self.request_body(frame.image(), user_request)?;

    let mut attempt = 0;
    let text = loop {
      match self.generate(&body) {
        Ok(text) => break text,
        Err(e @ (BackendError::HttpError(_) | BackendError::StatusError(..)))
          if attempt < self.max_retries =>
        {
          attempt += 1;
          warn!("Gemini 请求失败，第 {} 次重试: {}", attempt, e);
        }
        Err(e) => return Err(e),
      }
    };

    parse_grounded_boxes(&text)
  }
}
