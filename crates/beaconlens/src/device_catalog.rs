//! Runtime device definitions.
//!
//! A definition document lists device types and, for each, the canonical
//! template size, the four calibration markers, and the status LEDs to decode:
//!
//! ```json
//! {
//!   "device_name": ["CM-Beacon"],
//!   "CM-Beacon": {
//!     "template_width": 200, "template_height": 100,
//!     "marker": { "led_num": 4,
//!       "ID1": {"center_x": 20, "center_y": 20, "radius": 8, "color": "blue"}, ... },
//!     "beacon": { "led_num": 2,
//!       "ID1": {"center_x": 100, "center_y": 50, "radius": 10}, ... }
//!   }
//! }
//! ```
//!
//! Marker `ID1` is the primary-color marker; `ID2..ID4` are the secondary
//! markers listed clockwise from it. Loading checks that the canonical
//! positions actually follow that order, since the rectifier pairs detected
//! and canonical markers purely by index.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};

use crate::marker_locator::ordering::clockwise_sweep_deg;
use crate::PixelRect;

/// Number of calibration markers on every device.
pub const MARKER_COUNT: usize = 4;

/// Errors raised while loading a definition document.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("failed to read definition file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed definition document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("device '{device}' is malformed: {source}")]
    MalformedDevice {
        device: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("device '{0}' is listed in device_name but has no entry")]
    MissingDevice(String),
    #[error("device '{0}' is listed more than once")]
    DuplicateDevice(String),
    #[error("device '{device}': {field} {reason}")]
    InvalidField {
        device: String,
        field: String,
        reason: String,
    },
    #[error("device '{device}': marker layout {reason}")]
    MarkerLayout { device: String, reason: String },
}

/// Calibration marker slot. `Id1` is the primary-color marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerId {
    Id1,
    Id2,
    Id3,
    Id4,
}

impl MarkerId {
    pub const ALL: [MarkerId; MARKER_COUNT] =
        [MarkerId::Id1, MarkerId::Id2, MarkerId::Id3, MarkerId::Id4];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Key used in definition documents (`"ID1"`..`"ID4"`).
    pub fn key(self) -> &'static str {
        match self {
            MarkerId::Id1 => "ID1",
            MarkerId::Id2 => "ID2",
            MarkerId::Id3 => "ID3",
            MarkerId::Id4 => "ID4",
        }
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Geometry of one LED in template space, plus its precomputed sampling mask.
#[derive(Debug, Clone, PartialEq)]
pub struct LedSpec {
    /// Center in template pixels.
    pub position: [f32; 2],
    /// Radius of the lit area in template pixels.
    pub radius: f32,
    /// Color tag (only meaningful for calibration markers).
    pub color: String,
    /// Square circumscribing the LED circle.
    pub bounding_box: PixelRect,
    /// Filled circle raster, same size as `bounding_box`; non-zero inside.
    pub mask: GrayImage,
}

impl LedSpec {
    /// Build an LED whose bounding box must fit inside `template_size`.
    pub fn new(
        position: [f32; 2],
        radius: f32,
        color: impl Into<String>,
        template_size: [u32; 2],
    ) -> Result<Self, String> {
        if !position[0].is_finite() || !position[1].is_finite() {
            return Err("center must be finite".to_string());
        }
        if !radius.is_finite() || radius <= 0.0 {
            return Err("radius must be finite and > 0".to_string());
        }

        let x0 = (position[0] - radius).round();
        let y0 = (position[1] - radius).round();
        let x1 = (position[0] + radius).round();
        let y1 = (position[1] + radius).round();
        if x0 < 0.0 || y0 < 0.0 || x1 > template_size[0] as f32 || y1 > template_size[1] as f32 {
            return Err(format!(
                "bounding box [{}, {}]..[{}, {}] exceeds template {}x{}",
                x0, y0, x1, y1, template_size[0], template_size[1]
            ));
        }
        if x1 <= x0 || y1 <= y0 {
            return Err("bounding box is empty".to_string());
        }

        let bounding_box = PixelRect {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        };

        let mut mask = GrayImage::new(bounding_box.width, bounding_box.height);
        let center = (
            position[0].round() as i32 - bounding_box.x as i32,
            position[1].round() as i32 - bounding_box.y as i32,
        );
        imageproc::drawing::draw_filled_circle_mut(&mut mask, center, radius as i32, Luma([255]));

        Ok(Self {
            position,
            radius,
            color: color.into(),
            bounding_box,
            mask,
        })
    }
}

/// One device type: template size, calibration markers and status LEDs.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDefinition {
    name: String,
    template_size: [u32; 2],
    markers: [LedSpec; MARKER_COUNT],
    beacons: BTreeMap<String, LedSpec>,
}

impl DeviceDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical rectified size `[width, height]`.
    pub fn template_size(&self) -> [u32; 2] {
        self.template_size
    }

    pub fn marker(&self, id: MarkerId) -> &LedSpec {
        &self.markers[id.index()]
    }

    pub fn markers(&self) -> &[LedSpec; MARKER_COUNT] {
        &self.markers
    }

    /// Canonical marker centers in `MarkerId` order.
    pub fn marker_positions(&self) -> [[f32; 2]; MARKER_COUNT] {
        MarkerId::ALL.map(|id| self.marker(id).position)
    }

    pub fn beacons(&self) -> &BTreeMap<String, LedSpec> {
        &self.beacons
    }

    pub fn beacon(&self, id: &str) -> Option<&LedSpec> {
        self.beacons.get(id)
    }

    pub fn beacon_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.beacons.keys().map(String::as_str)
    }
}

fn write_led(f: &mut fmt::Formatter<'_>, label: &str, led: &LedSpec) -> fmt::Result {
    write!(
        f,
        "{} center: [{}, {}], radius: {}",
        label, led.position[0], led.position[1], led.radius
    )?;
    if !led.color.is_empty() {
        write!(f, ", color: {}", led.color)?;
    }
    writeln!(f)
}

impl fmt::Display for DeviceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "*[{}]* template {}x{}",
            self.name, self.template_size[0], self.template_size[1]
        )?;
        for id in MarkerId::ALL {
            write_led(f, &format!("marker_{}", id), self.marker(id))?;
        }
        for (id, led) in &self.beacons {
            write_led(f, &format!("beacon_{}", id), led)?;
        }
        Ok(())
    }
}

/// All device types known to an analyzer. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCatalog {
    /// Device names in document order.
    names: Vec<String>,
    devices: HashMap<String, DeviceDefinition>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct RawDocument {
    device_name: Vec<String>,
    #[serde(flatten)]
    entries: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct RawDevice {
    template_width: u32,
    template_height: u32,
    marker: RawLedBlock,
    beacon: RawLedBlock,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct RawLedBlock {
    led_num: usize,
    #[serde(flatten)]
    leds: HashMap<String, RawLed>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct RawLed {
    center_x: f32,
    center_y: f32,
    radius: f32,
    #[serde(default)]
    color: Option<String>,
}

impl DeviceCatalog {
    /// Load a catalog from a JSON definition file.
    pub fn from_json_file(path: &Path) -> Result<Self, DefinitionError> {
        let data = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&data)
    }

    /// Load a catalog from a JSON definition document.
    pub fn from_json_str(data: &str) -> Result<Self, DefinitionError> {
        let doc: RawDocument = serde_json::from_str(data)?;
        Self::from_document(doc)
    }

    fn from_document(mut doc: RawDocument) -> Result<Self, DefinitionError> {
        let mut devices = HashMap::with_capacity(doc.device_name.len());
        for name in &doc.device_name {
            if devices.contains_key(name) {
                return Err(DefinitionError::DuplicateDevice(name.clone()));
            }
            let value = doc
                .entries
                .remove(name)
                .ok_or_else(|| DefinitionError::MissingDevice(name.clone()))?;
            let raw: RawDevice =
                serde_json::from_value(value).map_err(|source| DefinitionError::MalformedDevice {
                    device: name.clone(),
                    source,
                })?;
            let definition = build_device(name, raw)?;
            tracing::debug!(
                device = %name,
                beacons = definition.beacons.len(),
                "loaded device definition"
            );
            devices.insert(name.clone(), definition);
        }

        Ok(Self {
            names: doc.device_name,
            devices,
        })
    }

    pub fn get(&self, name: &str) -> Option<&DeviceDefinition> {
        self.devices.get(name)
    }

    /// Device names in document order.
    pub fn device_names(&self) -> &[String] {
        &self.names
    }

    /// Definitions in document order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceDefinition> + '_ {
        self.names.iter().filter_map(|n| self.devices.get(n))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl fmt::Display for DeviceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for definition in self.iter() {
            writeln!(f, "{}", definition)?;
        }
        Ok(())
    }
}

fn invalid(device: &str, field: impl Into<String>, reason: impl Into<String>) -> DefinitionError {
    DefinitionError::InvalidField {
        device: device.to_string(),
        field: field.into(),
        reason: reason.into(),
    }
}

fn build_device(name: &str, mut raw: RawDevice) -> Result<DeviceDefinition, DefinitionError> {
    if raw.template_width == 0 || raw.template_height == 0 {
        return Err(invalid(name, "template size", "must be > 0"));
    }
    let template_size = [raw.template_width, raw.template_height];

    if raw.marker.led_num != MARKER_COUNT {
        return Err(invalid(
            name,
            "marker.led_num",
            format!("must be {} (got {})", MARKER_COUNT, raw.marker.led_num),
        ));
    }
    if raw.beacon.led_num == 0 {
        return Err(invalid(name, "beacon.led_num", "must be >= 1"));
    }

    let mut markers = Vec::with_capacity(MARKER_COUNT);
    for id in MarkerId::ALL {
        let led = take_led(name, "marker", &mut raw.marker, id.key(), template_size)?;
        if led.color.is_empty() {
            return Err(invalid(name, format!("marker.{}.color", id), "is required"));
        }
        markers.push(led);
    }
    let markers: [LedSpec; MARKER_COUNT] = markers
        .try_into()
        .map_err(|_| invalid(name, "marker", "expected exactly four markers"))?;

    let mut beacons = BTreeMap::new();
    for idx in 1..=raw.beacon.led_num {
        let key = format!("ID{}", idx);
        let led = take_led(name, "beacon", &mut raw.beacon, &key, template_size)?;
        beacons.insert(key, led);
    }

    check_marker_layout(name, &markers, template_size)?;

    Ok(DeviceDefinition {
        name: name.to_string(),
        template_size,
        markers,
        beacons,
    })
}

fn take_led(
    device: &str,
    block: &str,
    raw: &mut RawLedBlock,
    key: &str,
    template_size: [u32; 2],
) -> Result<LedSpec, DefinitionError> {
    let field = format!("{}.{}", block, key);
    let led = raw
        .leds
        .remove(key)
        .ok_or_else(|| invalid(device, field.as_str(), "is missing"))?;
    LedSpec::new(
        [led.center_x, led.center_y],
        led.radius,
        led.color.unwrap_or_default(),
        template_size,
    )
    .map_err(|reason| invalid(device, field, reason))
}

/// Secondary markers must share one color distinct from the primary, and sit
/// clockwise from it in `ID2`, `ID3`, `ID4` order around the template center.
fn check_marker_layout(
    device: &str,
    markers: &[LedSpec; MARKER_COUNT],
    template_size: [u32; 2],
) -> Result<(), DefinitionError> {
    let layout_err = |reason: String| DefinitionError::MarkerLayout {
        device: device.to_string(),
        reason,
    };

    let primary = &markers[MarkerId::Id1.index()];
    let secondary_color = &markers[MarkerId::Id2.index()].color;
    if markers[1..].iter().any(|m| &m.color != secondary_color) {
        return Err(layout_err(
            "requires ID2..ID4 to share one color tag".to_string(),
        ));
    }
    if &primary.color == secondary_color {
        return Err(layout_err(format!(
            "requires ID1 color to differ from ID2..ID4 (both '{}')",
            primary.color
        )));
    }

    let pivot = [template_size[0] as f32 / 2.0, template_size[1] as f32 / 2.0];
    let sweeps: Vec<f64> = markers[1..]
        .iter()
        .map(|m| clockwise_sweep_deg(primary.position, m.position, pivot))
        .collect();
    if !sweeps.windows(2).all(|w| w[0] < w[1]) {
        return Err(layout_err(format!(
            "requires ID2..ID4 clockwise from ID1 around the template center \
             (sweeps {:.1}, {:.1}, {:.1} deg)",
            sweeps[0], sweeps[1], sweeps[2]
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{definition_json, DeviceSketch};

    fn load(json: &str) -> Result<DeviceCatalog, DefinitionError> {
        DeviceCatalog::from_json_str(json)
    }

    #[test]
    fn loads_reference_device() {
        let catalog = load(&definition_json(&[DeviceSketch::reference()])).expect("valid doc");
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.device_names(), ["GCB-Test".to_string()]);

        let dev = catalog.get("GCB-Test").expect("device present");
        assert_eq!(dev.template_size(), [200, 100]);
        assert_eq!(dev.marker(MarkerId::Id1).color, "blue");
        assert_eq!(dev.marker(MarkerId::Id3).position, [180.0, 80.0]);
        assert_eq!(dev.beacons().len(), 3);
        assert_eq!(dev.beacon_ids().collect::<Vec<_>>(), vec!["ID1", "ID2", "ID3"]);
    }

    #[test]
    fn bounding_box_and_mask_agree() {
        let catalog = load(&definition_json(&[DeviceSketch::reference()])).unwrap();
        let led = catalog.get("GCB-Test").unwrap().beacon("ID1").unwrap();
        assert_eq!(
            led.bounding_box,
            PixelRect {
                x: 90,
                y: 40,
                width: 20,
                height: 20
            }
        );
        assert_eq!(led.mask.dimensions(), (20, 20));
        assert_eq!(led.mask.get_pixel(10, 10)[0], 255);
        assert_eq!(led.mask.get_pixel(10, 1)[0], 255);
        assert_eq!(led.mask.get_pixel(0, 0)[0], 0);
        assert_eq!(led.mask.get_pixel(19, 19)[0], 0);
    }

    #[test]
    fn loading_twice_yields_equal_catalogs() {
        let json = definition_json(&[DeviceSketch::reference()]);
        assert_eq!(load(&json).unwrap(), load(&json).unwrap());
    }

    #[test]
    fn unknown_top_level_keys_are_ignored() {
        let mut doc: serde_json::Value =
            serde_json::from_str(&definition_json(&[DeviceSketch::reference()])).unwrap();
        doc["generator"] = serde_json::json!({"version": 3});
        assert!(load(&doc.to_string()).is_ok());
    }

    #[test]
    fn missing_device_entry_is_rejected() {
        let mut doc: serde_json::Value =
            serde_json::from_str(&definition_json(&[DeviceSketch::reference()])).unwrap();
        doc["device_name"] = serde_json::json!(["GCB-Test", "Ghost"]);
        let err = load(&doc.to_string()).expect_err("ghost device");
        assert!(matches!(err, DefinitionError::MissingDevice(ref n) if n == "Ghost"));
    }

    #[test]
    fn marker_count_must_be_four() {
        let mut doc: serde_json::Value =
            serde_json::from_str(&definition_json(&[DeviceSketch::reference()])).unwrap();
        doc["GCB-Test"]["marker"]["led_num"] = serde_json::json!(3);
        let err = load(&doc.to_string()).expect_err("three markers");
        assert!(err.to_string().contains("marker.led_num"));
    }

    #[test]
    fn missing_beacon_id_is_rejected() {
        let mut doc: serde_json::Value =
            serde_json::from_str(&definition_json(&[DeviceSketch::reference()])).unwrap();
        doc["GCB-Test"]["beacon"]["led_num"] = serde_json::json!(4);
        let err = load(&doc.to_string()).expect_err("ID4 absent");
        assert!(err.to_string().contains("beacon.ID4 is missing"));
    }

    #[test]
    fn malformed_fields_are_rejected() {
        let mut doc: serde_json::Value =
            serde_json::from_str(&definition_json(&[DeviceSketch::reference()])).unwrap();
        doc["GCB-Test"]["beacon"]["ID2"]["center_x"] = serde_json::json!("left");
        let err = load(&doc.to_string()).expect_err("string coordinate");
        assert!(matches!(err, DefinitionError::MalformedDevice { .. }));

        assert!(matches!(load("{not json"), Err(DefinitionError::Json(_))));
    }

    #[test]
    fn radius_must_be_positive() {
        let mut doc: serde_json::Value =
            serde_json::from_str(&definition_json(&[DeviceSketch::reference()])).unwrap();
        doc["GCB-Test"]["beacon"]["ID1"]["radius"] = serde_json::json!(0.0);
        let err = load(&doc.to_string()).expect_err("zero radius");
        assert!(err.to_string().contains("radius must be finite and > 0"));
    }

    #[test]
    fn led_outside_template_is_rejected() {
        let mut doc: serde_json::Value =
            serde_json::from_str(&definition_json(&[DeviceSketch::reference()])).unwrap();
        doc["GCB-Test"]["beacon"]["ID3"]["center_x"] = serde_json::json!(195.0);
        let err = load(&doc.to_string()).expect_err("overhanging LED");
        assert!(err.to_string().contains("exceeds template"));
    }

    #[test]
    fn markers_out_of_clockwise_order_are_rejected() {
        let mut sketch = DeviceSketch::reference();
        sketch.markers.swap(2, 3);
        let err = load(&definition_json(&[sketch])).expect_err("ID3/ID4 swapped");
        assert!(matches!(err, DefinitionError::MarkerLayout { .. }));
    }

    #[test]
    fn marker_colors_must_single_out_the_primary() {
        let mut sketch = DeviceSketch::reference();
        sketch.primary_color = "green".to_string();
        let err = load(&definition_json(&[sketch])).expect_err("all green");
        assert!(err.to_string().contains("ID1 color to differ"));
    }

    #[test]
    fn display_lists_every_led() {
        let catalog = load(&definition_json(&[DeviceSketch::reference()])).unwrap();
        let text = catalog.to_string();
        assert!(text.contains("*[GCB-Test]*"));
        assert!(text.contains("marker_ID4 center: [20, 80], radius: 8, color: green"));
        assert!(text.contains("beacon_ID3"));
    }
}
