//! Per-frame aggregation of analysis results into the output document.
//!
//! ```json
//! { "Frame0": { "device_keys": {"CM-Beacon0": "CM-Beacon0"},
//!               "CM-Beacon0": {"device_name": "CM-Beacon",
//!                              "position": {"x": 10, "y": 5, "width": 260, "height": 165},
//!                              "beacon": {"ID1": 31, "ID2": 0}} },
//!   "frame_num": 1 }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{json, Map, Value};

use crate::{AnalyzationResult, PixelRect};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
struct DeviceEntry {
    device_name: String,
    position: PixelRect,
    beacon: BTreeMap<String, u8>,
}

/// Results accumulated per frame index, then device key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisReport {
    frames: BTreeMap<u64, BTreeMap<String, DeviceEntry>>,
}

impl AnalysisReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one result under `frame_index`. A later result for the same
    /// device key in the same frame replaces the earlier one.
    pub fn record(&mut self, result: &AnalyzationResult, frame_index: u64) {
        let entry = DeviceEntry {
            device_name: result.device_name.clone(),
            position: result.position,
            beacon: result.beacon.clone(),
        };
        self.frames
            .entry(frame_index)
            .or_default()
            .insert(result.device_key(), entry);
    }

    /// Number of distinct frames with at least one result.
    pub fn recorded_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Levels recorded for `device_key` in `frame_index`.
    pub fn levels(&self, frame_index: u64, device_key: &str) -> Option<&BTreeMap<String, u8>> {
        self.frames
            .get(&frame_index)?
            .get(device_key)
            .map(|e| &e.beacon)
    }

    /// Build the output document; `frame_count` becomes `frame_num`.
    pub fn to_json(&self, frame_count: u64) -> Value {
        let mut root = Map::new();
        for (frame_index, devices) in &self.frames {
            let mut frame = Map::new();
            let keys: Map<String, Value> = devices
                .keys()
                .map(|k| (k.clone(), Value::String(k.clone())))
                .collect();
            frame.insert("device_keys".to_string(), Value::Object(keys));
            for (key, entry) in devices {
                frame.insert(key.clone(), json!(entry));
            }
            root.insert(format!("Frame{}", frame_index), Value::Object(frame));
        }
        root.insert("frame_num".to_string(), json!(frame_count));
        Value::Object(root)
    }

    pub fn to_json_string(&self, frame_count: u64) -> String {
        // Serializing a `Value` cannot fail.
        serde_json::to_string_pretty(&self.to_json(frame_count)).unwrap_or_default()
    }

    pub fn write_json(&self, path: &Path, frame_count: u64) -> std::io::Result<()> {
        std::fs::write(path, self.to_json_string(frame_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, id: u64, levels: &[(&str, u8)]) -> AnalyzationResult {
        AnalyzationResult {
            device_name: name.to_string(),
            device_id: id,
            position: PixelRect {
                x: 10,
                y: 5,
                width: 260,
                height: 165,
            },
            beacon: levels.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            marker_points: None,
            rectified: None,
        }
    }

    #[test]
    fn document_layout_matches_output_format() {
        let mut report = AnalysisReport::new();
        report.record(&result("CM-Beacon", 0, &[("ID1", 31), ("ID2", 0)]), 0);

        let doc = report.to_json(1);
        assert_eq!(
            doc,
            json!({
                "Frame0": {
                    "device_keys": {"CM-Beacon0": "CM-Beacon0"},
                    "CM-Beacon0": {
                        "device_name": "CM-Beacon",
                        "position": {"x": 10, "y": 5, "width": 260, "height": 165},
                        "beacon": {"ID1": 31, "ID2": 0}
                    }
                },
                "frame_num": 1
            })
        );
    }

    #[test]
    fn devices_and_frames_accumulate() {
        let mut report = AnalysisReport::new();
        report.record(&result("CM-Beacon", 0, &[("ID1", 3)]), 0);
        report.record(&result("CM-Beacon", 1, &[("ID1", 4)]), 0);
        report.record(&result("CM-Beacon", 0, &[("ID1", 5)]), 2);
        report.record(&result("CM-Beacon", 0, &[("ID1", 6)]), 2);

        assert_eq!(report.recorded_frames(), 2);
        assert_eq!(report.levels(0, "CM-Beacon1").unwrap()["ID1"], 4);
        assert_eq!(report.levels(2, "CM-Beacon0").unwrap()["ID1"], 6);
        assert!(report.levels(1, "CM-Beacon0").is_none());

        let doc = report.to_json(3);
        assert_eq!(doc["frame_num"], 3);
        assert_eq!(doc["Frame0"]["device_keys"].as_object().unwrap().len(), 2);
        assert!(doc.get("Frame1").is_none());
    }

    #[test]
    fn write_json_produces_parseable_file() {
        let mut report = AnalysisReport::new();
        report.record(&result("CM-Beacon", 7, &[("ID1", 12)]), 0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write_json(&path, 1).unwrap();

        let back: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["Frame0"]["CM-Beacon7"]["beacon"]["ID1"], 12);
    }
}
