//! # NAS SNMP Monitor
//!
//! Polls a WD My Cloud EX2 Ultra NAS over SNMP and publishes a normalized
//! snapshot of its health: system and disk temperatures, fan status, memory,
//! load, uptime, plus per-disk and per-volume tables.
//!
//! ## Features
//!
//! - **SNMPv2c and SNMPv3 sessions**: credentials validated up front
//! - **Bounded table walks**: a misbehaving agent cannot stall a poll
//! - **Vendor quirks handled**: locale-formatted numbers, `Centigrade` strings
//! - **Stale detection**: consumers see when the cached data stops refreshing
//! - **Library + Binary**: embed the coordinator or run the `serve` command
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nas_snmp_monitor::{DeviceRegistry, EngineConnector, MonitorFile};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let file = MonitorFile::load("monitor.toml")?;
//!     let registry = DeviceRegistry::start(&file, Arc::new(EngineConnector::default()))?;
//!
//!     for view in registry.views() {
//!         println!("{}: stale={}", view.name, view.stale);
//!     }
//!     registry.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod snmp;
pub mod web;

// Re-export public API
pub use config::{
    AuthProtocol, CoordinatorSettings, MonitorFile, PollInterval, PrivProtocol, SessionConfig,
    SessionRecord, SnmpVersion,
};
pub use coordinator::{self_test, Coordinator, CoordinatorHandle, DeviceRegistry, DeviceView};
pub use error::{MonitorError, Result};
pub use metrics::{DiskRow, SensorValue, Snapshot, SnapshotAssembler, VolumeRow};
pub use snmp::{Connector, EngineConnector, SnmpTransport};
pub use web::{start_web_server, WebConfig};

/// Consecutive failed polls before a device's cached data is marked stale
pub const DEFAULT_STALE_AFTER_FAILURES: u32 = 2;

/// Lowest accepted staleness threshold; one transient failure never marks data stale
pub const MIN_STALE_AFTER_FAILURES: u32 = 2;

/// Deadline for a single scalar request, in seconds
pub const DEFAULT_SCALAR_TIMEOUT_SECS: u64 = 5;

/// Upper bound on rows read from one table walk
pub const DEFAULT_MAX_TABLE_ROWS: usize = 64;

/// Cap on the deadline of a whole table walk, in seconds
pub const MAX_WALK_TIMEOUT_SECS: u64 = 30;

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 8080;
