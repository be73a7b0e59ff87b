//! Projection of raw detector output into the serialisable result record

use crate::models::detector::RawDetections;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary used when the detector found nothing
pub const NONE_FOUND: &str = "Tidak terdeteksi penyakit pada gambar.";

/// One detected object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub label: String,
    pub confidence: f32,
    /// (x1, y1, x2, y2) in source-image pixels
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
}

/// Outcome of one completed inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(rename = "result")]
    pub summary: String,
    #[serde(rename = "result_img", default, skip_serializing_if = "Option::is_none")]
    pub annotated_image: Option<String>,
    pub detections: Vec<DetectionBox>,
    #[serde(rename = "original_filename")]
    pub source_name: String,
    pub captured_at: DateTime<Utc>,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Project raw output, stamping the current time
pub fn project(
    raw: &RawDetections,
    source_name: impl Into<String>,
    annotated_image: Option<String>,
) -> DetectionResult {
    project_at(raw, source_name, annotated_image, Utc::now())
}

/// Project raw output with an explicit capture time.
///
/// Keeps the detector's order. An empty output always yields [`NONE_FOUND`]
/// and no annotated image.
pub fn project_at(
    raw: &RawDetections,
    source_name: impl Into<String>,
    annotated_image: Option<String>,
    captured_at: DateTime<Utc>,
) -> DetectionResult {
    let detections: Vec<DetectionBox> = raw
        .entries
        .iter()
        .map(|entry| DetectionBox {
            label: entry.label.clone(),
            confidence: entry.confidence,
            bbox: entry.bbox,
        })
        .collect();

    let (summary, annotated_image) = if detections.is_empty() {
        (NONE_FOUND.to_string(), None)
    } else {
        let labels: Vec<&str> = detections.iter().map(|d| d.label.as_str()).collect();
        (labels.join(", "), annotated_image)
    };

    DetectionResult {
        summary,
        annotated_image,
        detections,
        source_name: source_name.into(),
        captured_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::detector::RawDetection;
    use proptest::prelude::*;

    fn raw(entries: Vec<(&str, f32)>) -> RawDetections {
        RawDetections {
            entries: entries
                .into_iter()
                .enumerate()
                .map(|(i, (label, confidence))| RawDetection {
                    class_index: i,
                    label: label.to_string(),
                    confidence,
                    bbox: [i as f32, 0.0, i as f32 + 10.0, 10.0],
                })
                .collect(),
            image_size: (100, 100),
        }
    }

    #[test]
    fn test_project_empty() {
        let result = project(&raw(vec![]), "leaf.jpg", Some("/static/results/leaf.jpg".into()));
        assert_eq!(result.summary, NONE_FOUND);
        assert!(result.detections.is_empty());
        assert!(result.annotated_image.is_none());
        assert_eq!(result.source_name, "leaf.jpg");
    }

    #[test]
    fn test_project_keeps_order_and_confidence() {
        let result = project(
            &raw(vec![("Powdery Mildew", 0.87), ("Leaf Scorch", 0.95)]),
            "leaf.jpg",
            None,
        );
        assert_eq!(result.summary, "Powdery Mildew, Leaf Scorch");
        assert_eq!(result.detections[0].confidence, 0.87);
        assert_eq!(result.detections[1].label, "Leaf Scorch");
    }

    #[test]
    fn test_serialized_field_names() {
        let result = project(&raw(vec![("Gray Mold", 0.5)]), "a.jpg", Some("/static/results/a.jpg".into()));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["result"], "Gray Mold");
        assert_eq!(json["result_img"], "/static/results/a.jpg");
        assert_eq!(json["original_filename"], "a.jpg");
        assert_eq!(json["detections"][0]["box"][2], 10.0);
        assert!(json.get("captured_at").is_some());
    }

    proptest! {
        #[test]
        fn prop_project_preserves_entries(
            entries in proptest::collection::vec(("[A-Za-z ]{1,12}", 0.0f32..=1.0), 0..20)
        ) {
            let input = raw(entries.iter().map(|(l, c)| (l.as_str(), *c)).collect());
            let result = project(&input, "frame", Some("img".into()));

            prop_assert_eq!(result.detections.len(), entries.len());
            prop_assert_eq!(result.detections.is_empty(), result.summary == NONE_FOUND);
            prop_assert_eq!(result.detections.is_empty(), result.annotated_image.is_none());

            if !entries.is_empty() {
                let joined: Vec<&str> = entries.iter().map(|(l, _)| l.as_str()).collect();
                prop_assert_eq!(&result.summary, &joined.join(", "));
            }
            for (det, (label, confidence)) in result.detections.iter().zip(entries.iter()) {
                prop_assert_eq!(&det.label, label);
                prop_assert_eq!(det.confidence.to_bits(), confidence.to_bits());
            }
        }
    }
}
