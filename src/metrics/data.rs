//! Data structures for device snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A typed sensor reading, or the marker for a reading that could not be taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SensorValue {
    Float(f64),
    Integer(i64),
    Text(String),
    Unavailable,
}

impl SensorValue {
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            Self::Text(_) | Self::Unavailable => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl Default for SensorValue {
    fn default() -> Self {
        Self::Unavailable
    }
}

impl std::fmt::Display for SensorValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{:.1}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Text(s) => f.write_str(s),
            Self::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// One physical disk from the vendor disk table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskRow {
    /// Row index reported by the agent (1-based)
    pub index: u32,
    /// Disk temperature in Celsius
    pub temperature: SensorValue,
    /// Disk capacity in GB
    pub capacity: SensorValue,
    /// Disk model string
    pub model: SensorValue,
    /// Disk vendor string
    pub vendor: SensorValue,
    /// Disk serial number
    pub serial: SensorValue,
}

impl DiskRow {
    /// A row whose every field is unavailable.
    pub fn unavailable(index: u32) -> Self {
        Self {
            index,
            temperature: SensorValue::Unavailable,
            capacity: SensorValue::Unavailable,
            model: SensorValue::Unavailable,
            vendor: SensorValue::Unavailable,
            serial: SensorValue::Unavailable,
        }
    }

    /// Display label, e.g. `Disk 1 (WDC WD40EFRX)`.
    pub fn label(&self) -> String {
        match self.model.as_text().map(str::trim).filter(|m| !m.is_empty()) {
            Some(model) => format!("Disk {} ({})", self.index, model),
            None => format!("Disk {}", self.index),
        }
    }
}

/// One logical volume from the vendor volume table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeRow {
    pub index: u32,
    pub name: SensorValue,
    pub filesystem: SensorValue,
    pub raid_level: SensorValue,
    /// Volume size in GB
    pub size: SensorValue,
    /// Free space in GB
    pub free_space: SensorValue,
}

/// An immutable set of readings from one poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Monotonically increasing per device; assigned when the snapshot is published
    pub sequence: u64,
    /// When the poll cycle finished (Unix timestamp in milliseconds)
    pub timestamp: i64,
    /// Scalar sensors keyed by sensor key
    pub sensors: BTreeMap<String, SensorValue>,
    /// Disks keyed by row index
    pub disks: BTreeMap<u32, DiskRow>,
    /// Volumes keyed by row index
    pub volumes: BTreeMap<u32, VolumeRow>,
    /// Tables that could not be walked this cycle
    pub unavailable_tables: Vec<String>,
}

impl Snapshot {
    /// Create an empty snapshot stamped with the current time.
    pub fn new() -> Self {
        Self {
            sequence: 0,
            timestamp: chrono::Utc::now().timestamp_millis(),
            sensors: BTreeMap::new(),
            disks: BTreeMap::new(),
            volumes: BTreeMap::new(),
            unavailable_tables: Vec::new(),
        }
    }

    pub fn sensor(&self, key: &str) -> &SensorValue {
        static MISSING: SensorValue = SensorValue::Unavailable;
        self.sensors.get(key).unwrap_or(&MISSING)
    }

    /// Keys of scalar sensors that came back unavailable.
    pub fn unavailable_sensors(&self) -> Vec<&str> {
        self.sensors
            .iter()
            .filter(|(_, v)| !v.is_available())
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}
