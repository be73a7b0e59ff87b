//! Edge case tests for berrydoc-eye

use berrydoc_eye::config::VisionConfig;
use berrydoc_eye::models::yolo::{apply_nms, compute_iou, decode_output, Candidate, DecodeParams, Letterbox};
use berrydoc_eye::models::{LabelTable, RawDetection, RawDetections};
use berrydoc_eye::processing::{annotate, project};
use image::DynamicImage;
use std::io::Write;

#[test]
fn test_config_edge_cases() {
    let mut config = VisionConfig::default();
    config.input_size = 32;
    config.confidence_threshold = 0.0;
    config.iou_threshold = 1.0;
    config.inference_workers = 1;
    assert!(config.validate().is_ok());

    config.input_size = 4096;
    config.inference_workers = 64;
    assert!(config.validate().is_ok());

    config.input_size = 650;
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_config_values() {
    let mut config = VisionConfig::default();
    config.confidence_threshold = 1.5;
    assert!(config.validate().is_err());

    let mut config = VisionConfig::default();
    config.inference_workers = 0;
    assert!(config.validate().is_err());

    let mut config = VisionConfig::default();
    config.max_detections = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_labels_file_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "Leaf Scorch").unwrap();
    writeln!(file, "Powdery Mildew").unwrap();
    let table = LabelTable::from_file(file.path()).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.resolve(1), "Powdery Mildew");
    assert_eq!(table.resolve(2), "class_2");
}

#[test]
fn test_iou_degenerate_boxes() {
    assert_eq!(compute_iou(&[5.0, 5.0, 5.0, 5.0], &[5.0, 5.0, 5.0, 5.0]), 0.0);
    assert_eq!(compute_iou(&[0.0, 0.0, 10.0, 10.0], &[10.0, 0.0, 20.0, 10.0]), 0.0);
}

#[test]
fn test_nms_empty() {
    assert!(apply_nms(Vec::new(), 0.7).is_empty());
}

#[test]
fn test_nms_chain_keeps_non_overlapping_tail() {
    let a = Candidate { class_index: 2, confidence: 0.9, bbox: [0.0, 0.0, 10.0, 10.0] };
    let b = Candidate { class_index: 2, confidence: 0.8, bbox: [1.0, 0.0, 11.0, 10.0] };
    let c = Candidate { class_index: 2, confidence: 0.7, bbox: [50.0, 50.0, 60.0, 60.0] };
    let kept = apply_nms(vec![c, b, a], 0.7);
    assert_eq!(kept, vec![a, c]);
}

#[test]
fn test_decode_all_below_threshold() {
    // [1, 5, 6]: one class, six proposals, every score 0.1
    let mut data = vec![0.0f32; 5 * 6];
    for i in 0..6 {
        data[i] = 100.0;
        data[6 + i] = 100.0;
        data[12 + i] = 10.0;
        data[18 + i] = 10.0;
        data[24 + i] = 0.1;
    }
    let geometry = Letterbox::fit(640, 640, 640);
    let params = DecodeParams { confidence_threshold: 0.25, iou_threshold: 0.7, max_detections: 300 };
    let out = decode_output(&data, &[1, 5, 6], &geometry, (640, 640), params).unwrap();
    assert!(out.is_empty());
}

#[test]
fn test_project_and_annotate_tiny_image() {
    let image = DynamicImage::new_rgb8(1, 1);
    let raw = RawDetections {
        entries: vec![RawDetection {
            class_index: 0,
            label: "Gray Mold".to_string(),
            confidence: 1.0,
            bbox: [0.0, 0.0, 1.0, 1.0],
        }],
        image_size: (1, 1),
    };
    let annotated = annotate(&image, &raw);
    assert_eq!(annotated.dimensions(), (1, 1));

    let result = project(&raw, "tiny.png", None);
    assert_eq!(result.summary, "Gray Mold");
    assert_eq!(result.detections[0].confidence, 1.0);
}
