//! Sensor catalogue, value normalization and snapshot assembly.
//!
//! This module turns raw SNMP answers from the appliance into typed
//! snapshots: CPU load, memory, temperatures, fan status, network counters,
//! uptime and the per-disk and per-volume tables.

pub mod assembler;
pub mod catalogue;
pub mod data;
pub mod normalize;

// Re-export commonly used items
pub use assembler::SnapshotAssembler;
pub use data::{DiskRow, SensorValue, Snapshot, VolumeRow};
pub use normalize::{normalize, SensorKind};
