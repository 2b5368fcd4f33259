// 该文件是 Biaozhu （标注） 项目的一部分。
// tests/test_batch.rs - 批量导出集成测试
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

mod common;

use std::fs::File;
use std::io::Write;

use biaozhu::{
  output::yolo_record::YoloRecord,
  prompt::{Interaction, InteractionKind, VisualImage, VisualPrompt, VisualPromptKind},
  task::{BatchTask, ImageOutcome, Task},
};
use common::*;

fn text(prompt: &str) -> PromptContext {
  PromptContext::Text(prompt.into())
}

#[test]
fn one_failing_image_does_not_stop_the_batch() -> anyhow::Result<()> {
  let work = tempfile::TempDir::new()?;
  let images = work.path().join("images");
  for name in ["img0.png", "img1.png", "img2_fail.png", "img3.png"] {
    write_image(&images.join(name), 100, 100);
  }
  let archive = work.path().join("out.tar");

  let backend = ScriptedBackend::new(vec![RawBox::new(
    BoxEncoding::NormalizedThousandths,
    [500.0, 500.0, 1000.0, 1000.0],
  )]);
  let result = BatchTask::new(text("cupcakes"), 0.4).run_task(images.as_path(), backend, archive.as_path())?;

  assert_eq!(result.written().count(), 3);
  let failures: Vec<_> = result.failures().collect();
  assert_eq!(failures.len(), 1);
  assert_eq!(failures[0].0, "img2_fail.png");
  assert!(failures[0].1.contains("503"));

  assert_eq!(
    result.archived_files(),
    [
      "img0.txt",
      "img0_vis.png",
      "img1.txt",
      "img1_vis.png",
      "img3.txt",
      "img3_vis.png"
    ]
  );

  let out = work.path().join("unpacked");
  unpack(&archive, &out);
  assert_eq!(
    std::fs::read_to_string(out.join("img0.txt"))?,
    "0 0.750000 0.750000 0.500000 0.500000 1.0000\n"
  );
  let vis = image::open(out.join("img3_vis.png"))?;
  assert_eq!((vis.width(), vis.height()), (100, 100));
  Ok(())
}

#[test]
fn low_confidence_boxes_are_dropped_and_empty_labels_kept() -> anyhow::Result<()> {
  let work = tempfile::TempDir::new()?;
  let images = work.path().join("images");
  write_image(&images.join("scene.jpg"), 100, 100);
  let archive = work.path().join("out.tar.zst");

  let backend = ScriptedBackend::new(vec![
    RawBox::new(BoxEncoding::AbsolutePixel, [10.0, 10.0, 30.0, 30.0])
      .with_score(0.15)
      .with_category(1),
  ]);
  let result = BatchTask::new(text("cat"), 0.4)
    .with_score(false)
    .run_task(images.as_path(), backend, archive.as_path())?;

  assert_eq!(result.total_boxes(), 0);
  assert!(matches!(result.outcome("scene.jpg"), Some(ImageOutcome::Written(_))));

  let out = work.path().join("unpacked");
  unpack(&archive, &out);
  assert_eq!(std::fs::read_to_string(out.join("scene.txt"))?, "");
  assert!(out.join("scene_vis.png").exists());
  Ok(())
}

#[test]
fn archive_input_is_labelled_with_pixel_boxes() -> anyhow::Result<()> {
  let work = tempfile::TempDir::new()?;
  let staging = work.path().join("staging");
  write_image(&staging.join("a.png"), 200, 100);
  write_image(&staging.join("nested/b.png"), 200, 100);

  let input = work.path().join("images.tar");
  let mut builder = tar::Builder::new(File::create(&input)?);
  builder.append_dir_all(".", &staging)?;
  builder.finish()?;
  drop(builder);

  let archive = work.path().join("labels.tar");
  let backend = ScriptedBackend::new(vec![
    RawBox::new(BoxEncoding::AbsolutePixel, [20.0, 10.0, 120.0, 60.0])
      .with_score(0.9)
      .with_category(2),
  ]);
  let result = BatchTask::new(text("thing"), 0.4).run_task(input.as_path(), backend, archive.as_path())?;

  assert_eq!(result.written().count(), 2);
  assert!(result.outcome("nested/b.png").is_some());

  let out = work.path().join("unpacked");
  unpack(&archive, &out);
  let line = std::fs::read_to_string(out.join("b.txt"))?;
  let record: YoloRecord = line.trim().parse()?;
  assert_eq!(record.category_id, 2);
  assert_eq!(record.score, Some(0.9));
  let [x1, y1, x2, y2] = record.to_pixel_rect(200, 100);
  assert!((x1 - 20.0).abs() < 1e-3 && (y1 - 10.0).abs() < 1e-3);
  assert!((x2 - 120.0).abs() < 1e-3 && (y2 - 60.0).abs() < 1e-3);
  Ok(())
}

#[test]
fn undecodable_and_colliding_images_are_failures() -> anyhow::Result<()> {
  let work = tempfile::TempDir::new()?;
  let images = work.path().join("images");
  write_image(&images.join("a/x.png"), 32, 32);
  write_image(&images.join("b/x.png"), 32, 32);
  write_image(&images.join("ok.png"), 32, 32);
  std::fs::write(images.join("broken.png"), b"not an image")?;
  let archive = work.path().join("out.tar");

  let result = BatchTask::new(text("x"), 0.4).run_task(
    images.as_path(),
    ScriptedBackend::new(vec![]),
    archive.as_path(),
  )?;

  let failed: Vec<_> = result.failures().map(|(name, _)| name.as_str()).collect();
  assert_eq!(failed, ["b/x.png", "broken.png"]);
  assert!(matches!(result.outcome("a/x.png"), Some(ImageOutcome::Written(_))));
  assert!(matches!(result.outcome("ok.png"), Some(ImageOutcome::Written(_))));
  assert_eq!(result.archived_files().len(), 4);
  Ok(())
}

#[test]
fn failed_image_does_not_claim_its_stem() -> anyhow::Result<()> {
  let work = tempfile::TempDir::new()?;
  let images = work.path().join("images");
  write_image(&images.join("fail/x.png"), 32, 32);
  write_image(&images.join("ok/x.png"), 32, 32);
  let archive = work.path().join("out.tar");

  let backend = ScriptedBackend::new(vec![
    RawBox::new(BoxEncoding::AbsolutePixel, [0.0, 0.0, 16.0, 16.0]).with_score(0.8),
  ]);
  let result = BatchTask::new(text("x"), 0.4).run_task(images.as_path(), backend, archive.as_path())?;

  let failed: Vec<_> = result.failures().map(|(name, _)| name.as_str()).collect();
  assert_eq!(failed, ["fail/x.png"]);
  assert!(matches!(result.outcome("ok/x.png"), Some(ImageOutcome::Written(_))));
  assert_eq!(result.archived_files(), ["x.txt", "x_vis.png"]);

  let out = work.path().join("unpacked");
  unpack(&archive, &out);
  assert_eq!(
    std::fs::read_to_string(out.join("x.txt"))?,
    "0 0.250000 0.250000 0.500000 0.500000 0.8000\n"
  );
  Ok(())
}

#[test]
fn zip_dataset_round_trips_through_the_batch() -> anyhow::Result<()> {
  let work = tempfile::TempDir::new()?;
  let staging = work.path().join("staging");
  write_image(&staging.join("a.png"), 100, 50);
  write_image(&staging.join("b.jpg"), 100, 50);

  let input = work.path().join("images.zip");
  let mut zip = zip::ZipWriter::new(File::create(&input)?);
  let options = zip::write::SimpleFileOptions::default();
  for name in ["a.png", "b.jpg"] {
    zip.start_file(name, options)?;
    zip.write_all(&std::fs::read(staging.join(name))?)?;
  }
  zip.finish()?;

  let archive = work.path().join("annotated_labels.zip");
  let backend = ScriptedBackend::new(vec![
    RawBox::new(BoxEncoding::AbsolutePixel, [0.0, 0.0, 50.0, 25.0])
      .with_score(0.75)
      .with_category(3),
  ]);
  let result = BatchTask::new(text("thing"), 0.4).run_task(input.as_path(), backend, archive.as_path())?;

  assert_eq!(result.written().count(), 2);
  assert_eq!(
    result.archived_files(),
    ["a.txt", "a_vis.png", "b.txt", "b_vis.png"]
  );

  let out = work.path().join("unpacked");
  unpack(&archive, &out);
  for stem in ["a", "b"] {
    assert_eq!(
      std::fs::read_to_string(out.join(format!("{stem}.txt")))?,
      "3 0.250000 0.250000 0.500000 0.500000 0.7500\n"
    );
    let vis = image::open(out.join(format!("{stem}_vis.png")))?;
    assert_eq!((vis.width(), vis.height()), (100, 50));
  }
  Ok(())
}

#[test]
fn invalid_requests_are_rejected_before_processing() -> anyhow::Result<()> {
  let work = tempfile::TempDir::new()?;
  let images = work.path().join("images");
  write_image(&images.join("a.png"), 16, 16);
  let archive = work.path().join("out.tar");

  let visual = PromptContext::Visual(VisualPrompt {
    kind: VisualPromptKind::VisualImages,
    visual_images: vec![VisualImage {
      filename: "ref.png".into(),
      interactions: vec![Interaction {
        kind: InteractionKind::Rect,
        category_id: 1,
        rect: [0, 0, 4, 4],
      }],
      image_path: None,
    }],
  });
  let err = BatchTask::new(visual, 0.4)
    .run_task(
      images.as_path(),
      ScriptedBackend::new(vec![]).text_only(),
      archive.as_path(),
    )
    .unwrap_err();
  assert!(err.is_validation());

  let empty = PromptContext::Visual(VisualPrompt {
    kind: VisualPromptKind::VisualImages,
    visual_images: vec![VisualImage {
      filename: "ref.png".into(),
      interactions: vec![],
      image_path: None,
    }],
  });
  let err = BatchTask::new(empty, 0.4)
    .run_task(images.as_path(), ScriptedBackend::new(vec![]), archive.as_path())
    .unwrap_err();
  assert!(err.is_validation());

  let err = BatchTask::new(text("x"), 0.4)
    .run_task(
      work.path().join("missing").as_path(),
      ScriptedBackend::new(vec![]),
      archive.as_path(),
    )
    .unwrap_err();
  assert!(err.is_validation());

  assert!(!archive.exists());
  Ok(())
}
