//! Core data types shared across the edge pipeline
//!
//! The wire and document shapes here mirror what the sensor fleet publishes:
//! one message per completed window, channel-major nested mappings, and an
//! ISO-ish capture timestamp that sorts lexicographically.

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical channel names in capture order: tri-axis accelerometer,
/// gyroscope and magnetometer across three body positions plus two ECG leads.
pub const CHANNELS: [&str; 23] = [
    "chest_acc_x",
    "chest_acc_y",
    "chest_acc_z",
    "ecg_lead_1",
    "ecg_lead_2",
    "ankle_acc_x",
    "ankle_acc_y",
    "ankle_acc_z",
    "ankle_gyro_x",
    "ankle_gyro_y",
    "ankle_gyro_z",
    "ankle_mag_x",
    "ankle_mag_y",
    "ankle_mag_z",
    "arm_acc_x",
    "arm_acc_y",
    "arm_acc_z",
    "arm_gyro_x",
    "arm_gyro_y",
    "arm_gyro_z",
    "arm_mag_x",
    "arm_mag_y",
    "arm_mag_z",
];

/// Device identifier stamped on messages that arrive without one.
pub const UNKNOWN_DEVICE: &str = "unknown_device";

/// Label sentinel for records forwarded upstream without a class label.
pub const UNLABELED: i64 = -1;

/// Per-channel per-sample-index mapping, as published on the wire and as
/// stored in the document body: `channel name -> sample index -> value`.
pub type ChannelData = BTreeMap<String, BTreeMap<String, f64>>;

/// One timestamped observation across all channels. Immutable once captured.
#[derive(Debug, Clone)]
pub struct Sample {
    pub at: DateTime<Utc>,
    /// Channel readings in `CHANNELS` order.
    pub values: Vec<f64>,
    /// Activity label, when the capture source knows it.
    pub label: Option<i64>,
}

/// An ordered, fixed-length run of consecutive samples. Only ever constructed
/// full by the window builder; partial windows never leave the builder.
#[derive(Debug, Clone)]
pub struct Window {
    pub samples: Vec<Sample>,
}

impl Window {
    /// Capture timestamp of the window: the last sample's timestamp.
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.samples.last().map(|s| s.at)
    }

    /// Label carried by the window, taken from the last labeled sample.
    pub fn label(&self) -> Option<i64> {
        self.samples.iter().rev().find_map(|s| s.label)
    }

    /// Wire/document representation: `channel name -> sample index -> value`.
    pub fn to_channel_data(&self) -> ChannelData {
        let mut data = ChannelData::new();
        for (c, name) in CHANNELS.iter().enumerate() {
            let mut series = BTreeMap::new();
            for (i, sample) in self.samples.iter().enumerate() {
                let value = sample.values.get(c).copied().unwrap_or(0.0);
                series.insert(i.to_string(), value);
            }
            data.insert(name.to_string(), series);
        }
        data
    }
}

/// Validation state persisted on a record. Set exactly once per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Validation {
    Unchecked,
    Checked,
    Failed,
}

impl Validation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Validation::Unchecked => "unchecked",
            Validation::Checked => "checked",
            Validation::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unchecked" => Some(Validation::Unchecked),
            "checked" => Some(Validation::Checked),
            "failed" => Some(Validation::Failed),
            _ => None,
        }
    }
}

/// The persisted unit: one accepted window plus its annotations.
///
/// `processed` starts false and is flipped true exactly once by the
/// synchronizer after a successful upstream publish; the record is never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub device: String,
    /// Capture timestamp, ISO-ish string (lexicographically ordered).
    pub date: String,
    pub data: Option<ChannelData>,
    pub label: Option<i64>,
    pub validation: Validation,
    pub outlier_model: Option<String>,
    pub processed: bool,
}

/// Inbound sensor payload as published by a sensor node.
///
/// `date`, `windowSize` and `latency` are stamped sensor-side and tolerated
/// but not required. Non-JSON payloads arrive wrapped as `{"raw_data": ...}`
/// and fail the data-extraction stage gracefully.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, rename = "windowSize", skip_serializing_if = "Option::is_none")]
    pub window_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ChannelData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
    #[serde(default, rename = "raw_data", skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<String>,
}

/// One reduced record inside an upstream training batch: the row-indexed
/// reduced matrix plus the class label (-1 when unlabeled).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReducedEntry {
    #[serde(flatten)]
    pub rows: BTreeMap<String, BTreeMap<String, f64>>,
    pub label: i64,
}

/// Training batch published upstream once per sync cycle. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingBatch {
    pub edge_id: String,
    pub data: Vec<ReducedEntry>,
}

/// Raised when a document body cannot be shaped into a window matrix.
#[derive(Debug)]
pub struct MalformedData(pub String);

impl std::fmt::Display for MalformedData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed window data: {}", self.0)
    }
}

impl std::error::Error for MalformedData {}

/// Build the sample-major window matrix (`N x channels`) from a nested
/// channel mapping. Channels are ordered by name; every channel must carry
/// exactly `window_size` consecutive indices starting at 0.
pub fn channel_matrix(data: &ChannelData, window_size: usize) -> Result<Array2<f64>, MalformedData> {
    if data.is_empty() {
        return Err(MalformedData("no channels present".to_string()));
    }

    let width = data.len();
    let mut matrix = Array2::<f64>::zeros((window_size, width));

    for (c, (name, series)) in data.iter().enumerate() {
        if series.len() != window_size {
            return Err(MalformedData(format!(
                "channel '{}' has {} samples, expected {}",
                name,
                series.len(),
                window_size
            )));
        }
        for i in 0..window_size {
            let value = series.get(&i.to_string()).ok_or_else(|| {
                MalformedData(format!("channel '{}' missing sample index {}", name, i))
            })?;
            matrix[[i, c]] = *value;
        }
    }

    Ok(matrix)
}

/// Row-indexed nested mapping of a matrix: `row index -> column index -> value`.
/// This is the shape reduced rows take inside a training batch entry.
pub fn rows_to_map(matrix: &Array2<f64>) -> BTreeMap<String, BTreeMap<String, f64>> {
    let mut rows = BTreeMap::new();
    for (i, row) in matrix.outer_iter().enumerate() {
        let mut cols = BTreeMap::new();
        for (j, value) in row.iter().enumerate() {
            cols.insert(j.to_string(), *value);
        }
        rows.insert(i.to_string(), cols);
    }
    rows
}

/// ISO-ish UTC timestamp string used for record dates. Lexicographic order
/// matches chronological order, which the store's date filter relies on.
pub fn timestamp_string(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn make_channel_data(window_size: usize, channels: &[&str]) -> ChannelData {
        let mut data = ChannelData::new();
        for (c, name) in channels.iter().enumerate() {
            let mut series = BTreeMap::new();
            for i in 0..window_size {
                series.insert(i.to_string(), (c * 100 + i) as f64);
            }
            data.insert(name.to_string(), series);
        }
        data
    }

    #[test]
    fn test_channel_matrix_shape_and_order() {
        // Channels are ordered by name: a, b
        let data = make_channel_data(3, &["b", "a"]);
        let matrix = channel_matrix(&data, 3).unwrap();

        assert_eq!(matrix.dim(), (3, 2));
        // Column 0 is channel "a" (second inserted, first alphabetically)
        assert_eq!(matrix[[0, 0]], 100.0);
        assert_eq!(matrix[[2, 0]], 102.0);
        // Column 1 is channel "b"
        assert_eq!(matrix[[1, 1]], 1.0);
    }

    #[test]
    fn test_channel_matrix_rejects_short_channel() {
        let mut data = make_channel_data(3, &["a", "b"]);
        data.get_mut("b").unwrap().remove("2");

        let err = channel_matrix(&data, 3).unwrap_err();
        assert!(err.to_string().contains("'b'"));
    }

    #[test]
    fn test_channel_matrix_rejects_empty() {
        let data = ChannelData::new();
        assert!(channel_matrix(&data, 3).is_err());
    }

    #[test]
    fn test_rows_to_map_round_trip() {
        let matrix = array![[1.0, 2.0], [3.0, 4.0]];
        let rows = rows_to_map(&matrix);

        assert_eq!(rows["0"]["0"], 1.0);
        assert_eq!(rows["0"]["1"], 2.0);
        assert_eq!(rows["1"]["0"], 3.0);
        assert_eq!(rows["1"]["1"], 4.0);
    }

    #[test]
    fn test_sensor_message_tolerates_extras() {
        let json = r#"{"device":"sensor01","date":"2026-01-01 00:00:00","windowSize":25,
            "data":{"chest_acc_x":{"0":1.5}},"label":3,"latency":12.5}"#;
        let msg: SensorMessage = serde_json::from_str(json).unwrap();

        assert_eq!(msg.device.as_deref(), Some("sensor01"));
        assert_eq!(msg.window_size, Some(25));
        assert_eq!(msg.label, Some(3));
    }

    #[test]
    fn test_sensor_message_raw_data_wrapper() {
        let msg: SensorMessage = serde_json::from_str(r#"{"raw_data":"garbage"}"#).unwrap();
        assert!(msg.data.is_none());
        assert_eq!(msg.raw_data.as_deref(), Some("garbage"));
    }

    #[test]
    fn test_reduced_entry_wire_shape() {
        let matrix = array![[0.5, 1.5]];
        let entry = ReducedEntry {
            rows: rows_to_map(&matrix),
            label: 2,
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["label"], 2);
        assert_eq!(json["0"]["0"], 0.5);
        assert_eq!(json["0"]["1"], 1.5);
    }

    #[test]
    fn test_window_channel_data_uses_canonical_names() {
        let sample = Sample {
            at: Utc::now(),
            values: (0..CHANNELS.len()).map(|v| v as f64).collect(),
            label: Some(1),
        };
        let window = Window {
            samples: vec![sample],
        };

        let data = window.to_channel_data();
        assert_eq!(data.len(), CHANNELS.len());
        assert_eq!(data["ecg_lead_1"]["0"], 3.0);
        assert_eq!(window.label(), Some(1));
    }
}
