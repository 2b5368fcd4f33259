// 该文件是 Biaozhu （标注） 项目的一部分。
// src/model/trex.rs - T-Rex 云端少样本检测后端
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

use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  bbox::{BoxEncoding, RawBox},
  frame::ImageFrame,
  model::{BackendConfig, BackendError, Detect, check_scheme, data_uri, encode_jpeg, model_from_path, param},
  prompt::{PromptContext, VisualPrompt},
};

const TREX_SCHEME: &str = "trex";
const TREX_DEFAULT_MODEL: &str = "T-Rex-2.0";
const TREX_DEFAULT_ENDPOINT: &str = "https://api.deepdataspace.com";
const TREX_DETECTION_API: &str = "/v2/task/trex/detection";
const TREX_STATUS_API: &str = "/v2/task_status";
const TREX_BBOX_THRESHOLD: f32 = 0.2;
const TREX_IOU_THRESHOLD: f32 = 0.8;

pub struct TRexBuilder {
  model: String,
  endpoint: String,
  bbox_threshold: f32,
  iou_threshold: f32,
  poll_interval: Duration,
  max_polls: u32,
  token: Option<String>,
  timeout: Duration,
}

impl FromUrlWithScheme for TRexBuilder {
  const SCHEME: &'static str = TREX_SCHEME;
}

impl FromUrl for TRexBuilder {
  type Error = BackendError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;
    Ok(TRexBuilder {
      model: model_from_path(url, TREX_DEFAULT_MODEL),
      endpoint: param(url, "endpoint", TREX_DEFAULT_ENDPOINT.to_string())?,
      bbox_threshold: param(url, "bbox_threshold", TREX_BBOX_THRESHOLD)?,
      iou_threshold: param(url, "iou_threshold", TREX_IOU_THRESHOLD)?,
      poll_interval: Duration::from_millis(param(url, "poll_interval_ms", 1000)?),
      max_polls: param(url, "max_polls", 120)?,
      token: None,
      timeout: BackendConfig::default().timeout,
    })
  }
}

impl TRexBuilder {
  pub fn config(mut self, config: &BackendConfig) -> Self {
    self.token = config.dds_token.clone();
    self.timeout = config.timeout;
    self
  }

  pub fn build(self) -> Result<TRexBackend, BackendError> {
    let token = self
      .token
      .filter(|t| !t.is_empty())
      .ok_or(BackendError::MissingCredential("DDS_API_TOKEN"))?;
    let client = Client::builder().timeout(self.timeout).build()?;
    info!("T-Rex 后端: model={}, endpoint={}", self.model, self.endpoint);
    Ok(TRexBackend {
      client,
      endpoint: self.endpoint.trim_end_matches('/').to_string(),
      model: self.model,
      bbox_threshold: self.bbox_threshold,
      iou_threshold: self.iou_threshold,
      poll_interval: self.poll_interval,
      max_polls: self.max_polls,
      token,
    })
  }
}

pub struct TRexBackend {
  client: Client,
  endpoint: String,
  model: String,
  bbox_threshold: f32,
  iou_threshold: f32,
  poll_interval: Duration,
  max_polls: u32,
  token: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
  code: i64,
  #[serde(default)]
  msg: String,
  data: Option<T>,
}

impl<T> ApiEnvelope<T> {
  fn into_data(self) -> Result<T, BackendError> {
    if self.code != 0 {
      return Err(BackendError::InvalidResponse(format!(
        "code={}, msg={}",
        self.code, self.msg
      )));
    }
    self
      .data
      .ok_or_else(|| BackendError::InvalidResponse("响应缺少 data 字段".into()))
  }
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
  task_uuid: String,
}

#[derive(Debug, Deserialize)]
struct TaskStatus {
  status: String,
  result: Option<DetectionResult>,
  error: Option<String>,
}

/// 检测结果：`objects[].bbox` 为图像像素坐标 `[x1, y1, x2, y2]`
#[derive(Debug, Deserialize)]
pub struct DetectionResult {
  #[serde(default)]
  pub objects: Vec<DetectedObject>,
}

#[derive(Debug, Deserialize)]
pub struct DetectedObject {
  pub bbox: [f64; 4],
  pub score: Option<f64>,
  pub category_id: Option<u32>,
}

impl DetectionResult {
  pub fn into_raw_boxes(self) -> Vec<RawBox> {
    self
      .objects
      .into_iter()
      .map(|o| RawBox {
        encoding: BoxEncoding::AbsolutePixel,
        coords: o.bbox,
        score: o.score,
        label: None,
        category_id: o.category_id,
      })
      .collect()
  }
}

fn image_mime(path: &Path) -> &'static str {
  match path
    .extension()
    .map(|e| e.to_string_lossy().to_ascii_lowercase())
    .as_deref()
  {
    Some("png") => "image/png",
    _ => "image/jpeg",
  }
}

/// 转为接口需要的提示结构；参考图像从 `image_path` 读取并内联为 data URI
pub fn prompt_body(prompt: &PromptContext) -> Result<Value, BackendError> {
  match prompt {
    PromptContext::Text(text) => Ok(json!({ "type": "text", "text": text })),
    PromptContext::Visual(visual) => visual_prompt_body(visual),
  }
}

fn visual_prompt_body(prompt: &VisualPrompt) -> Result<Value, BackendError> {
  let mut visual_images = Vec::with_capacity(prompt.visual_images.len());
  for item in &prompt.visual_images {
    let mut entry = json!({
      "filename": item.filename,
      "interactions": item.interactions,
    });
    if let Some(path) = &item.image_path {
      let bytes = std::fs::read(path)?;
      entry["image"] = json!(data_uri(image_mime(path), &bytes));
    }
    visual_images.push(entry);
  }
  Ok(json!({ "type": "visual_images", "visual_images": visual_images }))
}

impl TRexBackend {
  fn call<T: DeserializeOwned>(
    &self,
    request: reqwest::blocking::RequestBuilder,
  ) -> Result<T, BackendError> {
    let response = request.header("Token", &self.token).send()?;
    let envelope: ApiEnvelope<T> = super::ensure_success(response)?.json()?;
    envelope.into_data()
  }

  fn create_task(&self, body: &Value) -> Result<String, BackendError> {
    let url = format!("{}{}", self.endpoint, TREX_DETECTION_API);
    debug!("T-Rex POST {}", url);
    let created: CreatedTask = self.call(self.client.post(&url).json(body))?;
    Ok(created.task_uuid)
  }

  fn wait_task(&self, task_uuid: &str) -> Result<DetectionResult, BackendError> {
    let url = format!("{}{}/{}", self.endpoint, TREX_STATUS_API, task_uuid);
    for _ in 0..self.max_polls {
      let status: TaskStatus = self.call(self.client.get(&url))?;
      match status.status.as_str() {
        "success" => {
          return status
            .result
            .ok_or_else(|| BackendError::InvalidResponse("任务成功但没有结果".into()));
        }
        "failed" => {
          return Err(BackendError::TaskFailed(
            status.error.unwrap_or_else(|| task_uuid.to_string()),
          ));
        }
        other => debug!("任务 {} 状态: {}", task_uuid, other),
      }
      thread::sleep(self.poll_interval);
    }
    Err(BackendError::TaskTimeout(task_uuid.to_string()))
  }
}

impl Detect for TRexBackend {
  fn name(&self) -> &'static str {
    "t-rex"
  }

  fn detect(&self, frame: &ImageFrame, prompt: &PromptContext) -> Result<Vec<RawBox>, BackendError> {
    let body = json!({
      "model": self.model,
      "image": data_uri("image/jpeg", &encode_jpeg(frame.image())?),
      "targets": ["bbox"],
      "bbox_threshold": self.bbox_threshold,
      "iou_threshold": self.iou_threshold,
      "prompt": prompt_body(prompt)?,
    });

    let task_uuid = self.create_task(&body)?;
    debug!("{} 提交任务 {}", frame.filename(), task_uuid);
    Ok(self.wait_task(&task_uuid)?.into_raw_boxes())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::prompt::{Interaction, InteractionKind, VisualImage, VisualPromptKind};

  #[test]
  fn cloud_objects_are_absolute_pixels() {
    let result: DetectionResult = serde_json::from_str(
      r#"{"objects": [{"bbox": [10, 10, 30, 30], "score": 0.15, "category_id": 1}, {"bbox": [1, 2, 3, 4]}]}"#,
    )
    .unwrap();
    let boxes = result.into_raw_boxes();
    assert_eq!(boxes[0].encoding, BoxEncoding::AbsolutePixel);
    assert_eq!(boxes[0].coords, [10.0, 10.0, 30.0, 30.0]);
    assert_eq!(boxes[0].score, Some(0.15));
    assert_eq!(boxes[0].category_id, Some(1));
    assert_eq!(boxes[1].score, None);
    assert_eq!(boxes[1].category_id, None);
  }

  #[test]
  fn cloud_scores_keep_double_precision() {
    use crate::bbox::normalize;
    use crate::filter::ConfidenceFilter;
    use crate::output::yolo_record::to_record;

    let result: DetectionResult = serde_json::from_str(
      r#"{"objects": [{"bbox": [10, 10, 30, 30], "score": 0.00015}, {"bbox": [10, 10, 30, 30], "score": 0.399999999}]}"#,
    )
    .unwrap();
    let boxes: Vec<_> = result
      .into_raw_boxes()
      .iter()
      .map(|b| normalize(b, 100, 100).unwrap())
      .collect();

    assert_eq!(
      to_record(&boxes[0], 100, 100).to_string(),
      "0 0.200000 0.200000 0.200000 0.200000 0.0001"
    );
    assert!(!ConfidenceFilter::new(0.4).admit(&boxes[1]));
  }

  #[test]
  fn envelope_errors_are_surfaced() {
    let envelope: ApiEnvelope<CreatedTask> =
      serde_json::from_str(r#"{"code": 401, "msg": "invalid token", "data": null}"#).unwrap();
    assert!(matches!(
      envelope.into_data(),
      Err(BackendError::InvalidResponse(msg)) if msg.contains("invalid token")
    ));
  }

  #[test]
  fn visual_prompt_inlines_reference_images() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ref.png");
    std::fs::write(&path, b"png-bytes").unwrap();

    let prompt = PromptContext::Visual(VisualPrompt {
      kind: VisualPromptKind::VisualImages,
      visual_images: vec![VisualImage {
        filename: "ref.png".into(),
        interactions: vec![Interaction {
          kind: InteractionKind::Rect,
          category_id: 1,
          rect: [1, 2, 3, 4],
        }],
        image_path: Some(path),
      }],
    });

    let body = prompt_body(&prompt).unwrap();
    assert_eq!(body["type"], "visual_images");
    let item = &body["visual_images"][0];
    assert_eq!(item["image"], "data:image/png;base64,cG5nLWJ5dGVz");
    assert_eq!(item["interactions"][0]["rect"], json!([1, 2, 3, 4]));
    assert!(item.get("image_path").is_none());
  }

  #[test]
  fn text_prompt_body() {
    assert_eq!(
      prompt_body(&PromptContext::Text("cupcake".into())).unwrap(),
      json!({"type": "text", "text": "cupcake"})
    );
  }

  #[test]
  fn builder_requires_token() {
    let url = Url::parse("trex:?max_polls=3").unwrap();
    let builder = TRexBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model, TREX_DEFAULT_MODEL);
    assert_eq!(builder.max_polls, 3);
    assert!(matches!(
      builder.build(),
      Err(BackendError::MissingCredential(_))
    ));
  }
}
