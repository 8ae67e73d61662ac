//! Detection request documents from the upstream device detector.
//!
//! ```json
//! { "device_key": ["dev0"],
//!   "dev0": {"device_name": "CM-Beacon", "device_id": 0,
//!            "rect_x": 10, "rect_y": 5, "rect_width": 260, "rect_height": 165} }
//! ```

use std::collections::HashMap;

use serde::Deserialize;

use crate::{DetectionResult, RoiRect};

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("malformed detection request: {0}")]
    Json(#[from] serde_json::Error),
    #[error("device key '{0}' is listed but has no entry")]
    MissingEntry(String),
    #[error("entry '{key}' is malformed: {source}")]
    MalformedEntry {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    device_key: Vec<String>,
    #[serde(flatten)]
    entries: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    device_name: String,
    device_id: u64,
    rect_x: f64,
    rect_y: f64,
    rect_width: f64,
    rect_height: f64,
}

/// Parse a request document into detections, in `device_key` order.
pub fn parse_detection_request(data: &str) -> Result<Vec<DetectionResult>, RequestError> {
    let raw: RawRequest = serde_json::from_str(data)?;
    raw.device_key
        .iter()
        .map(|key| {
            let value = raw
                .entries
                .get(key)
                .ok_or_else(|| RequestError::MissingEntry(key.clone()))?;
            let det = RawDetection::deserialize(value).map_err(|source| {
                RequestError::MalformedEntry {
                    key: key.clone(),
                    source,
                }
            })?;
            Ok(DetectionResult::new(
                det.device_name,
                det.device_id,
                RoiRect {
                    x: det.rect_x,
                    y: det.rect_y,
                    width: det.rect_width,
                    height: det.rect_height,
                },
            ))
        })
        .collect()
}
