//! Class index to label table

use crate::error::{Result, VisionError};
use std::path::Path;
use tracing::{info, warn};

/// Classes of the strawberry disease detector shipped with berrydoc
pub const STRAWBERRY_CLASSES: &[&str] = &[
    "Angular Leafspot",
    "Anthracnose Fruit Rot",
    "Blossom Blight",
    "Gray Mold",
    "Leaf Spot",
    "Powdery Mildew Fruit",
    "Powdery Mildew Leaf",
];

/// Fixed index -> human readable label mapping bundled with a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    names: Vec<String>,
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::new(STRAWBERRY_CLASSES.iter().map(|s| s.to_string()).collect())
    }
}

impl LabelTable {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Resolve a class index; indices outside the table get a synthetic name
    pub fn resolve(&self, index: usize) -> String {
        self.names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", index))
    }

    /// Load a labels file: either a JSON array of strings or one label per line.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let table = Self::parse_labels_file(&content)?;
        info!("Loaded {} labels from {:?}", table.len(), path);
        Ok(table)
    }

    fn parse_labels_file(content: &str) -> Result<Self> {
        let trimmed = content.trim();
        if trimmed.starts_with('[') {
            let names: Vec<String> = serde_json::from_str(trimmed)
                .map_err(|e| VisionError::Config(format!("Invalid labels JSON: {}", e)))?;
            return Ok(Self::new(names));
        }

        let names: Vec<String> = trimmed
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        if names.is_empty() {
            return Err(VisionError::Config("Labels file is empty".to_string()));
        }
        Ok(Self::new(names))
    }

    /// Parse the `names` metadata entry written by the YOLO exporter,
    /// e.g. `{0: 'Angular Leafspot', 1: 'Gray Mold'}`.
    pub fn from_exporter_metadata(raw: &str) -> Option<Self> {
        let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
        let mut entries: Vec<(usize, String)> = Vec::new();

        let mut rest = body;
        while !rest.trim().is_empty() {
            let (index, after_index) = rest.split_once(':')?;
            let index: usize = index.trim().trim_start_matches(',').trim().parse().ok()?;

            let after_index = after_index.trim_start();
            let quote = after_index.chars().next()?;
            if quote != '\'' && quote != '"' {
                return None;
            }
            let value_and_rest = &after_index[1..];
            let end = value_and_rest.find(quote)?;
            entries.push((index, value_and_rest[..end].to_string()));
            rest = &value_and_rest[end + 1..];
        }

        if entries.is_empty() {
            return None;
        }

        entries.sort_by_key(|(index, _)| *index);
        let size = entries.last().map(|(index, _)| index + 1)?;
        if size > 10_000 {
            warn!("Refusing label metadata with {} classes", size);
            return None;
        }

        let mut names: Vec<String> = (0..size).map(|i| format!("class_{}", i)).collect();
        for (index, name) in entries {
            names[index] = name;
        }
        Some(Self::new(names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = LabelTable::default();
        assert_eq!(table.len(), 7);
        assert_eq!(table.resolve(0), "Angular Leafspot");
        assert_eq!(table.resolve(6), "Powdery Mildew Leaf");
    }

    #[test]
    fn test_resolve_out_of_range() {
        let table = LabelTable::new(vec!["Leaf Scorch".to_string()]);
        assert_eq!(table.resolve(0), "Leaf Scorch");
        assert_eq!(table.resolve(3), "class_3");
    }

    #[test]
    fn test_exporter_metadata() {
        let table =
            LabelTable::from_exporter_metadata("{0: 'Leaf Scorch', 1: 'Powdery Mildew'}").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve(0), "Leaf Scorch");
        assert_eq!(table.resolve(1), "Powdery Mildew");
    }

    #[test]
    fn test_exporter_metadata_sparse_and_double_quotes() {
        let table = LabelTable::from_exporter_metadata(r#"{2: "Gray Mold", 0: "Leaf Spot"}"#).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.resolve(0), "Leaf Spot");
        assert_eq!(table.resolve(1), "class_1");
        assert_eq!(table.resolve(2), "Gray Mold");
    }

    #[test]
    fn test_exporter_metadata_garbage() {
        assert!(LabelTable::from_exporter_metadata("not a dict").is_none());
        assert!(LabelTable::from_exporter_metadata("{}").is_none());
        assert!(LabelTable::from_exporter_metadata("{x: 'a'}").is_none());
    }

    #[test]
    fn test_labels_file_formats() {
        let json = LabelTable::parse_labels_file(r#"["Leaf Scorch", "Powdery Mildew"]"#).unwrap();
        assert_eq!(json.resolve(1), "Powdery Mildew");

        let lines = LabelTable::parse_labels_file("Leaf Scorch\n\n  Powdery Mildew  \n").unwrap();
        assert_eq!(lines, json);

        assert!(LabelTable::parse_labels_file("   \n").is_err());
    }
}
