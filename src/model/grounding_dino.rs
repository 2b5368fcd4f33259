// 该文件是 Biaozhu （标注） 项目的一部分。
// src/model/grounding_dino.rs - Grounding DINO 推理服务后端
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

use reqwest::blocking::{Client, multipart};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  bbox::{BoxEncoding, RawBox},
  frame::ImageFrame,
  model::{BackendConfig, BackendError, Detect, check_scheme, encode_jpeg, param},
  prompt::PromptContext,
};

const DINO_SCHEME: &str = "dino";
const DINO_BOX_THRESHOLD: f32 = 0.35;
const DINO_TEXT_THRESHOLD: f32 = 0.25;

pub struct GroundingDinoBuilder {
  endpoint: String,
  box_threshold: f32,
  text_threshold: f32,
  timeout: Duration,
}

impl FromUrlWithScheme for GroundingDinoBuilder {
  const SCHEME: &'static str = DINO_SCHEME;
}

impl FromUrl for GroundingDinoBuilder {
  type Error = BackendError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;
    let host = url
      .host_str()
      .ok_or_else(|| BackendError::InvalidParameter(format!("缺少推理服务地址: {}", url)))?;
    let scheme = if param(url, "tls", false)? { "https" } else { "http" };
    let endpoint = match url.port() {
      Some(port) => format!("{}://{}:{}{}", scheme, host, port, url.path()),
      None => format!("{}://{}{}", scheme, host, url.path()),
    };

    Ok(GroundingDinoBuilder {
      endpoint,
      box_threshold: param(url, "box_threshold", DINO_BOX_THRESHOLD)?,
      text_threshold: param(url, "text_threshold", DINO_TEXT_THRESHOLD)?,
      timeout: BackendConfig::default().timeout,
    })
  }
}

impl GroundingDinoBuilder {
  pub fn config(mut self, config: &BackendConfig) -> Self {
    self.timeout = config.timeout;
    self
  }

  pub fn build(self) -> Result<GroundingDinoBackend, BackendError> {
    let client = Client::builder().timeout(self.timeout).build()?;
    info!(
      "Grounding DINO 后端: endpoint={}, box_threshold={}, text_threshold={}",
      self.endpoint, self.box_threshold, self.text_threshold
    );
    Ok(GroundingDinoBackend {
      client,
      endpoint: self.endpoint,
      box_threshold: self.box_threshold,
      text_threshold: self.text_threshold,
    })
  }
}

pub struct GroundingDinoBackend {
  client: Client,
  endpoint: String,
  box_threshold: f32,
  text_threshold: f32,
}

/// 推理服务的原生输出：归一化的 `[cx, cy, w, h]`、logit 与短语
#[derive(Debug, Deserialize)]
pub struct DinoPrediction {
  pub boxes: Vec<[f64; 4]>,
  pub logits: Vec<f64>,
  pub phrases: Vec<String>,
}

impl DinoPrediction {
  pub fn into_raw_boxes(self) -> Result<Vec<RawBox>, BackendError> {
    if self.boxes.len() != self.logits.len() || self.boxes.len() != self.phrases.len() {
      return Err(BackendError::InvalidResponse(format!(
        "boxes/logits/phrases 长度不一致: {}/{}/{}",
        self.boxes.len(),
        self.logits.len(),
        self.phrases.len()
      )));
    }

    Ok(
      self
        .boxes
        .into_iter()
        .zip(self.logits)
        .zip(self.phrases)
        .map(|((coords, logit), phrase)| {
          RawBox::new(BoxEncoding::NormalizedCenterSize, coords)
            .with_score(logit)
            .with_label(phrase)
        })
        .collect(),
    )
  }
}

/// 小写、去空白并以句点结尾，与 Grounding DINO 的文本预处理一致
pub fn preprocess_caption(caption: &str) -> String {
  let caption = caption.trim().to_lowercase();
  if caption.ends_with('.') {
    caption
  } else {
    format!("{}.", caption)
  }
}

impl Detect for GroundingDinoBackend {
  fn name(&self) -> &'static str {
    "grounding-dino"
  }

  fn accepts(&self, prompt: &PromptContext) -> bool {
    matches!(prompt, PromptContext::Text(_))
  }

  fn detect(&self, frame: &ImageFrame, prompt: &PromptContext) -> Result<Vec<RawBox>, BackendError> {
    let PromptContext::Text(caption) = prompt else {
      return Err(BackendError::UnsupportedPrompt("grounding-dino"));
    };

    let image = multipart::Part::bytes(encode_jpeg(frame.image())?)
      .file_name(frame.filename())
      .mime_str("image/jpeg")?;
    let form = multipart::Form::new()
      .part("image", image)
      .text("caption", preprocess_caption(caption))
      .text("box_threshold", self.box_threshold.to_string())
      .text("text_threshold", self.text_threshold.to_string());

    debug!("Grounding DINO POST {}", self.endpoint);
    let response = self.client.post(&self.endpoint).multipart(form).send()?;
    let prediction: DinoPrediction = super::ensure_success(response)?.json()?;
    prediction.into_raw_boxes()
  }
}
