//! YOLO object detection model

use crate::config::VisionConfig;
use crate::error::{Result, VisionError};
use crate::models::detector::{Detector, RawDetection, RawDetections};
use crate::models::labels::LabelTable;
use crate::models::pool::SessionPool;
use crate::utils::{letterbox, to_chw_tensor};
use image::DynamicImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use tracing::{debug, info, warn};

pub use crate::utils::Letterbox;

/// Input tensor name used by the YOLO exporter
const INPUT_NAME: &str = "images";

/// Decoder thresholds
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl From<&VisionConfig> for DecodeParams {
    fn from(config: &VisionConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
        }
    }
}

/// Box candidate in source-image pixels, before label resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub class_index: usize,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

/// YOLO model for object detection
pub struct YoloModel {
    pool: SessionPool,
    labels: LabelTable,
    input_size: u32,
    params: DecodeParams,
}

impl YoloModel {
    /// Load the model described by `config`, one ONNX session per inference worker
    pub fn load(config: &VisionConfig) -> Result<Self> {
        config.validate().map_err(VisionError::Config)?;

        if !config.model_path.exists() {
            return Err(VisionError::Model(format!(
                "Model file not found: {:?}",
                config.model_path
            )));
        }

        let mut sessions = Vec::with_capacity(config.inference_workers);
        for _ in 0..config.inference_workers {
            sessions.push(build_session(&config.model_path, config.intra_threads)?);
        }
        let pool = SessionPool::new(sessions)?;

        let labels = match &config.labels_path {
            Some(path) => LabelTable::from_file(path)?,
            None => match pool.with_any(labels_from_metadata)? {
                Some(table) => table,
                None => {
                    warn!("Model has no embedded class names, using built-in strawberry labels");
                    LabelTable::default()
                }
            },
        };

        info!(
            "YOLO model loaded from {:?} ({} sessions, {} classes)",
            config.model_path,
            pool.size(),
            labels.len()
        );

        Ok(Self {
            pool,
            labels,
            input_size: config.input_size,
            params: DecodeParams::from(config),
        })
    }
}

impl Detector for YoloModel {
    fn name(&self) -> &str {
        "yolo-onnx"
    }

    fn labels(&self) -> &LabelTable {
        &self.labels
    }

    fn detect(&self, image: &DynamicImage) -> Result<RawDetections> {
        let source = (image.width(), image.height());
        if source.0 == 0 || source.1 == 0 {
            return Err(VisionError::MalformedImage("image has zero area".to_string()));
        }

        let (canvas, geometry) = letterbox(image, self.input_size);
        let side = self.input_size as usize;
        let input = Tensor::from_array(([1usize, 3, side, side], to_chw_tensor(&canvas)))
            .map_err(|e| VisionError::Ort(format!("Failed to create input tensor: {}", e)))?;

        let mut session = self.pool.checkout()?;
        let (shape, data) = {
            let outputs = session
                .run(ort::inputs![INPUT_NAME => input])
                .map_err(|e| VisionError::Ort(format!("YOLO inference failed: {}", e)))?;

            let (_, value) = outputs
                .iter()
                .next()
                .ok_or_else(|| VisionError::Ort("YOLO produced no outputs".to_string()))?;
            let (shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| VisionError::Ort(format!("Failed to extract output tensor: {}", e)))?;

            let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
            (shape, data.to_vec())
        };
        drop(session);

        debug!("YOLO output shape: {:?}", shape);
        let candidates = decode_output(&data, &shape, &geometry, source, self.params)?;

        let entries = candidates
            .into_iter()
            .map(|c| RawDetection {
                class_index: c.class_index,
                label: self.labels.resolve(c.class_index),
                confidence: c.confidence,
                bbox: c.bbox,
            })
            .collect::<Vec<_>>();

        debug!("YOLO detected {} objects", entries.len());
        Ok(RawDetections {
            entries,
            image_size: source,
        })
    }
}

fn build_session(path: &Path, intra_threads: usize) -> Result<Session> {
    let ort_err = |e: &dyn std::fmt::Display| VisionError::Ort(format!("Failed to load YOLO model: {}", e));
    Session::builder()
        .map_err(|e| ort_err(&e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| ort_err(&e))?
        .with_intra_threads(intra_threads)
        .map_err(|e| ort_err(&e))?
        .commit_from_file(path)
        .map_err(|e| ort_err(&e))
}

fn labels_from_metadata(session: &Session) -> Option<LabelTable> {
    let metadata = session.metadata().ok()?;
    let names = metadata.custom("names").ok()??;
    LabelTable::from_exporter_metadata(&names)
}

/// Decode a raw YOLOv8-style output tensor.
///
/// Accepts `[1, 4 + classes, proposals]` as exported, or the transposed
/// `[1, proposals, 4 + classes]`. Rows hold `cx, cy, w, h` in letterboxed model
/// space followed by per-class scores. Returned candidates are in source pixels,
/// suppressed per class and ordered by confidence descending.
pub fn decode_output(
    data: &[f32],
    shape: &[usize],
    geometry: &Letterbox,
    source: (u32, u32),
    params: DecodeParams,
) -> Result<Vec<Candidate>> {
    let (rows, cols) = match shape {
        [1, a, b] | [a, b] => (*a, *b),
        _ => {
            return Err(VisionError::Processing(format!(
                "Unexpected YOLO output shape {:?}",
                shape
            )))
        }
    };

    // Attributes are the short axis; proposals number in the thousands
    let transposed = rows > cols;
    let (attributes, proposals) = if transposed { (cols, rows) } else { (rows, cols) };
    if attributes <= 4 {
        return Err(VisionError::Processing(format!(
            "YOLO output has no class scores (shape {:?})",
            shape
        )));
    }
    let expected = attributes
        .checked_mul(proposals)
        .ok_or_else(|| VisionError::Processing("YOLO output size overflow".to_string()))?;
    if data.len() < expected {
        return Err(VisionError::Processing(format!(
            "YOLO output has {} values, expected {}",
            data.len(),
            expected
        )));
    }

    let at = |attr: usize, i: usize| -> f32 {
        if transposed {
            data[i * attributes + attr]
        } else {
            data[attr * proposals + i]
        }
    };

    let mut candidates = Vec::new();
    for i in 0..proposals {
        let mut best_class = 0;
        let mut best_score = f32::MIN;
        for class in 0..attributes - 4 {
            let score = at(4 + class, i);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }

        if !best_score.is_finite() || best_score < params.confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) || w <= 0.0 || h <= 0.0 {
            continue;
        }

        let bbox = geometry.unmap(
            [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
            source,
        );
        if bbox[2] <= bbox[0] || bbox[3] <= bbox[1] {
            continue;
        }

        candidates.push(Candidate {
            class_index: best_class,
            confidence: best_score.min(1.0),
            bbox,
        });
    }

    let mut kept = apply_nms(candidates, params.iou_threshold);
    kept.truncate(params.max_detections);
    Ok(kept)
}

/// Class-aware Non-Maximum Suppression; output ordered by confidence descending
pub fn apply_nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::new();
    let mut suppressed = vec![false; candidates.len()];

    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(candidates[i]);

        for j in (i + 1)..candidates.len() {
            if suppressed[j] || candidates[j].class_index != candidates[i].class_index {
                continue;
            }
            if compute_iou(&candidates[i].bbox, &candidates[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// IoU between two (x1, y1, x2, y2) boxes
pub fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);

    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 || !union.is_finite() {
        return 0.0;
    }
    (inter / union).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DecodeParams {
        DecodeParams {
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }

    /// Build a `[1, 4 + classes, proposals]` tensor from (cx, cy, w, h, scores) rows.
    /// Empty proposals pad the tensor so proposals outnumber attributes.
    fn tensor(rows: &[(f32, f32, f32, f32, Vec<f32>)]) -> (Vec<f32>, Vec<usize>) {
        let classes = rows[0].4.len();
        let attributes = 4 + classes;
        let proposals = rows.len().max(attributes + 1);
        let mut data = vec![0.0; attributes * proposals];
        for (i, (cx, cy, w, h, scores)) in rows.iter().enumerate() {
            data[i] = *cx;
            data[proposals + i] = *cy;
            data[2 * proposals + i] = *w;
            data[3 * proposals + i] = *h;
            for (c, s) in scores.iter().enumerate() {
                data[(4 + c) * proposals + i] = *s;
            }
        }
        (data, vec![1, attributes, proposals])
    }

    #[test]
    fn test_compute_iou() {
        assert_eq!(compute_iou(&[0.0, 0.0, 10.0, 10.0], &[0.0, 0.0, 10.0, 10.0]), 1.0);
        assert_eq!(compute_iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]), 0.0);
        let half = compute_iou(&[0.0, 0.0, 10.0, 10.0], &[5.0, 0.0, 15.0, 10.0]);
        assert!((half - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_same_class_suppressed() {
        let a = Candidate { class_index: 0, confidence: 0.9, bbox: [0.0, 0.0, 10.0, 10.0] };
        let b = Candidate { class_index: 0, confidence: 0.8, bbox: [0.5, 0.5, 10.0, 10.0] };
        let kept = apply_nms(vec![b, a], 0.7);
        assert_eq!(kept, vec![a]);
    }

    #[test]
    fn test_nms_keeps_cross_class_overlap() {
        let a = Candidate { class_index: 0, confidence: 0.9, bbox: [0.0, 0.0, 10.0, 10.0] };
        let b = Candidate { class_index: 1, confidence: 0.8, bbox: [0.0, 0.0, 10.0, 10.0] };
        let kept = apply_nms(vec![b, a], 0.7);
        assert_eq!(kept, vec![a, b]);
    }

    #[test]
    fn test_decode_output_thresholds_and_order() {
        let (data, shape) = tensor(&[
            (100.0, 100.0, 40.0, 40.0, vec![0.10, 0.60]),
            (300.0, 300.0, 50.0, 50.0, vec![0.95, 0.05]),
            (500.0, 500.0, 20.0, 20.0, vec![0.10, 0.20]),
        ]);
        let geometry = Letterbox::fit(640, 640, 640);
        let out = decode_output(&data, &shape, &geometry, (640, 640), params()).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].class_index, 0);
        assert_eq!(out[0].confidence, 0.95);
        assert_eq!(out[0].bbox, [275.0, 275.0, 325.0, 325.0]);
        assert_eq!(out[1].class_index, 1);
        assert_eq!(out[1].bbox, [80.0, 80.0, 120.0, 120.0]);
    }

    #[test]
    fn test_decode_output_transposed() {
        // [1, proposals, 4 + classes], one row per proposal
        let mut data = vec![0.0f32; 8 * 5];
        data[..5].copy_from_slice(&[320.0, 320.0, 64.0, 64.0, 0.9]);
        let shape = vec![1, 8, 5];
        let geometry = Letterbox::fit(640, 640, 640);
        let out = decode_output(&data, &shape, &geometry, (640, 640), params()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bbox, [288.0, 288.0, 352.0, 352.0]);
    }

    #[test]
    fn test_decode_output_maps_to_source_pixels() {
        // 1280x720 source letterboxed into 640: scale 0.5, 140px bands top and bottom
        let (data, shape) = tensor(&[(100.0, 290.0, 100.0, 100.0, vec![0.8])]);
        let geometry = Letterbox::fit(1280, 720, 640);
        let out = decode_output(&data, &shape, &geometry, (1280, 720), params()).unwrap();
        assert_eq!(out[0].bbox, [100.0, 200.0, 300.0, 400.0]);
    }

    #[test]
    fn test_decode_output_bad_shape() {
        let geometry = Letterbox::fit(640, 640, 640);
        assert!(decode_output(&[0.0; 8], &[1, 2, 2, 2], &geometry, (640, 640), params()).is_err());
        assert!(decode_output(&[0.0; 8], &[1, 4, 2], &geometry, (640, 640), params()).is_err());
        assert!(decode_output(&[0.0; 3], &[1, 5, 2], &geometry, (640, 640), params()).is_err());
    }

    #[test]
    fn test_decode_output_max_detections() {
        let rows: Vec<_> = (0..10)
            .map(|i| (30.0 + i as f32 * 60.0, 30.0, 20.0, 20.0, vec![0.5 + i as f32 * 0.01]))
            .collect();
        let (data, shape) = tensor(&rows);
        let geometry = Letterbox::fit(640, 640, 640);
        let mut p = params();
        p.max_detections = 3;
        let out = decode_output(&data, &shape, &geometry, (640, 640), p).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out[0].confidence >= out[1].confidence && out[1].confidence >= out[2].confidence);
    }
}
