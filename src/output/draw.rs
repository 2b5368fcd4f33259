// 该文件是 Biaozhu （标注） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use ab_glyph::{FontRef, InvalidFont, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::bbox::CanonicalBox;
use crate::output::palette;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 14.0;
const LABEL_OFFSET_X: i64 = 8;
const LABEL_OFFSET_Y: i64 = 6;
const STROKE_WIDTH: i64 = 4;
const TEXT_ANCHOR_LIMIT: i64 = 1 << 20;

static FONT_DATA: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

pub struct Draw<'a> {
  font: FontRef<'a>,
  font_size: f32,
  stroke_width: i64,
}

impl Draw<'static> {
  pub fn new() -> Result<Self, InvalidFont> {
    let font = FontRef::try_from_slice(FONT_DATA)?;
    Ok(Self {
      font,
      font_size: LABEL_FONT_SIZE,
      stroke_width: STROKE_WIDTH,
    })
  }
}

impl<'a> Draw<'a> {
  /// 在图像副本上绘制检测框，调用方的图像保持不变
  pub fn render(&self, image: &RgbImage, boxes: &[CanonicalBox]) -> RgbImage {
    let mut canvas = image.clone();
    self.draw_detections_on_image(&mut canvas, boxes);
    canvas
  }

  /// 第 i 个检测框使用调色板第 i 种颜色（循环），与标签和类别无关
  pub fn draw_detections_on_image(&self, image: &mut RgbImage, boxes: &[CanonicalBox]) {
    for (index, bbox) in boxes.iter().enumerate() {
      self.draw_bbox_with_label(image, bbox, palette::color_at(index));
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: &CanonicalBox, color: Rgb<u8>) {
    let [x1, y1, x2, y2] = bbox.rect().map(|v| v as i64);

    // 只把坐标收进图像外一圈的范围，画出来的像素不变
    let margin = self.stroke_width + 1;
    let clamp_x = |v: i64| v.clamp(-margin, image.width() as i64 + margin);
    let clamp_y = |v: i64| v.clamp(-margin, image.height() as i64 + margin);
    let (cx1, cy1, cx2, cy2) = (clamp_x(x1), clamp_y(y1), clamp_x(x2), clamp_y(y2));

    // 边框向内加粗
    for t in 0..self.stroke_width {
      let width = cx2 - cx1 + 1 - 2 * t;
      let height = cy2 - cy1 + 1 - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at((cx1 + t) as i32, (cy1 + t) as i32).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    if let Some(label) = bbox.label.as_deref() {
      let text_x = x1 + LABEL_OFFSET_X;
      let text_y = y1 + LABEL_OFFSET_Y;
      // 文本向右下方展开，锚点越过右边或下边时整段不可见
      if text_x >= image.width() as i64 || text_y >= image.height() as i64 {
        return;
      }
      let text_x = text_x.max(-TEXT_ANCHOR_LIMIT) as i32;
      let text_y = text_y.max(-TEXT_ANCHOR_LIMIT) as i32;
      draw_text_mut(
        image,
        color,
        text_x,
        text_y,
        PxScale::from(self.font_size),
        &self.font,
        label,
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gray_image() -> RgbImage {
    RgbImage::from_pixel(120, 90, Rgb([40, 40, 40]))
  }

  fn sample_boxes() -> Vec<CanonicalBox> {
    vec![
      CanonicalBox::new(10.0, 10.0, 60.0, 50.0).with_label(Some("cupcake".into())),
      CanonicalBox::new(30.0, 20.0, 110.0, 80.0),
      CanonicalBox::new(-20.0, -20.0, 500.0, 500.0).with_label(Some("tray".into())),
    ]
  }

  #[test]
  fn rendering_is_deterministic() {
    let draw = Draw::new().unwrap();
    let image = gray_image();
    let a = draw.render(&image, &sample_boxes());
    let b = draw.render(&image, &sample_boxes());
    assert_eq!(a.as_raw(), b.as_raw());
  }

  #[test]
  fn source_image_is_untouched() {
    let draw = Draw::new().unwrap();
    let image = gray_image();
    let rendered = draw.render(&image, &sample_boxes());
    assert_eq!(image, gray_image());
    assert_ne!(rendered, image);
  }

  #[test]
  fn colors_follow_sequence_position() {
    let draw = Draw::new().unwrap();
    let boxes = vec![
      CanonicalBox::new(5.0, 5.0, 20.0, 20.0).with_category(9),
      CanonicalBox::new(40.0, 40.0, 60.0, 60.0).with_category(9),
    ];
    let rendered = draw.render(&gray_image(), &boxes);
    assert_eq!(*rendered.get_pixel(5, 5), palette::color_at(0));
    assert_eq!(*rendered.get_pixel(40, 40), palette::color_at(1));
    // 四像素宽的边框
    assert_eq!(*rendered.get_pixel(8, 12), palette::color_at(0));
    assert_eq!(*rendered.get_pixel(9, 12), Rgb([40, 40, 40]));
  }

  #[test]
  fn label_sits_below_right_of_corner_in_box_color() {
    let draw = Draw::new().unwrap();
    let background = Rgb([40, 40, 40]);
    // 整块字符填满字形框，覆盖处像素与框颜色完全一致
    let boxes = vec![CanonicalBox::new(10.0, 10.0, 100.0, 80.0).with_label(Some("\u{2588}".into()))];
    let rendered = draw.render(&gray_image(), &boxes);

    let anchor = (10 + LABEL_OFFSET_X as u32, 10 + LABEL_OFFSET_Y as u32);
    assert_eq!(*rendered.get_pixel(anchor.0 + 3, anchor.1 + 8), palette::color_at(0));
    // 锚点左侧和上方的框内区域保持原样
    assert_eq!(*rendered.get_pixel(anchor.0 - 2, anchor.1 + 8), background);
    assert_eq!(*rendered.get_pixel(anchor.0 + 3, anchor.1 - 2), background);
  }

  #[test]
  fn degenerate_and_far_boxes_do_not_panic() {
    let draw = Draw::new().unwrap();
    let boxes = vec![
      CanonicalBox::new(3.0, 3.0, 3.0, 3.0),
      CanonicalBox::new(1e12, 1e12, 2e12, 2e12).with_label(Some("far".into())),
      CanonicalBox::new(-1e12, -1e12, -5.0, -5.0),
    ];
    let rendered = draw.render(&gray_image(), &boxes);
    assert_eq!(*rendered.get_pixel(3, 3), palette::color_at(0));
  }
}
