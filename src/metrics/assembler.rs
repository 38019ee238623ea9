//! Snapshot assembly for one poll cycle.

use crate::config::CoordinatorSettings;
use crate::error::{MonitorError, Result};
use crate::metrics::catalogue::{self, SensorDef};
use crate::metrics::data::{DiskRow, SensorValue, Snapshot, VolumeRow};
use crate::metrics::normalize::{normalize, SensorKind};
use crate::snmp::{fetch_scalar, RawVariable, SnmpTransport, TableRow, TableWalker};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Drives scalar fetches and table walks over one session.
#[derive(Debug, Clone)]
pub struct SnapshotAssembler {
    sensors: &'static [SensorDef],
    scalar_timeout: Duration,
    walker: TableWalker,
}

impl SnapshotAssembler {
    /// Create an assembler over the full sensor catalogue.
    pub fn new(settings: &CoordinatorSettings) -> Self {
        Self {
            sensors: catalogue::SENSORS,
            scalar_timeout: settings.scalar_timeout(),
            walker: TableWalker::new(settings.max_table_rows, settings.walk_timeout()),
        }
    }

    /// Restrict the scalar set, e.g. for tests or reduced polling.
    pub fn with_sensors(mut self, sensors: &'static [SensorDef]) -> Self {
        self.sensors = sensors;
        self
    }

    /// Assemble one snapshot.
    ///
    /// Unreadable OIDs, rows and tables are recorded as unavailable. Only a
    /// session-level failure, or every scalar timing out, fails the cycle.
    pub async fn assemble(&self, session: &mut dyn SnmpTransport) -> Result<Snapshot> {
        let (snapshot, _) = self.assemble_with_table_errors(session).await?;
        Ok(snapshot)
    }

    /// Assemble one snapshot, failing on the first table that could not be walked.
    pub async fn assemble_strict(&self, session: &mut dyn SnmpTransport) -> Result<Snapshot> {
        let (snapshot, table_errors) = self.assemble_with_table_errors(session).await?;
        match table_errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(snapshot),
        }
    }

    async fn assemble_with_table_errors(
        &self,
        session: &mut dyn SnmpTransport,
    ) -> Result<(Snapshot, Vec<MonitorError>)> {
        let mut snapshot = Snapshot::new();
        let mut table_errors = Vec::new();
        snapshot.sensors = self.collect_scalars(session).await?;

        match self.walker.walk_table(session, catalogue::DISK_COLUMNS).await {
            Ok(table) => snapshot.disks = table.values().map(disk_row).map(|d| (d.index, d)).collect(),
            Err(err) if err.is_session_level() => return Err(err),
            Err(err) => {
                warn!(error = %err, "disk table unavailable this cycle");
                snapshot.unavailable_tables.push("disks".to_string());
                table_errors.push(err);
            }
        }

        match self.walker.walk_table(session, catalogue::VOLUME_COLUMNS).await {
            Ok(table) => {
                snapshot.volumes = table.values().map(volume_row).map(|v| (v.index, v)).collect()
            }
            Err(err) if err.is_session_level() => return Err(err),
            Err(err) => {
                warn!(error = %err, "volume table unavailable this cycle");
                snapshot.unavailable_tables.push("volumes".to_string());
                table_errors.push(err);
            }
        }

        snapshot.timestamp = chrono::Utc::now().timestamp_millis();
        debug!(
            sensors = snapshot.sensors.len(),
            disks = snapshot.disks.len(),
            volumes = snapshot.volumes.len(),
            "snapshot assembled"
        );
        Ok((snapshot, table_errors))
    }

    /// Fetch and normalize every scalar sensor.
    async fn collect_scalars(
        &self,
        session: &mut dyn SnmpTransport,
    ) -> Result<BTreeMap<String, SensorValue>> {
        let mut sensors = BTreeMap::new();
        let mut timeouts = 0;

        for def in self.sensors {
            let value = match fetch_scalar(session, def.oid, self.scalar_timeout).await {
                Ok(raw) => normalize_or_unavailable(&raw, def.kind, def.key),
                Err(err) if err.is_session_level() => return Err(err),
                Err(err) => {
                    if matches!(err, MonitorError::Timeout(_)) {
                        timeouts += 1;
                    }
                    warn!(sensor = def.key, oid = def.oid, error = %err, "sensor unavailable");
                    SensorValue::Unavailable
                }
            };
            sensors.insert(def.key.to_string(), value);
        }

        if !self.sensors.is_empty() && timeouts == self.sensors.len() {
            return Err(MonitorError::timeout("every scalar sensor"));
        }
        Ok(sensors)
    }
}

fn normalize_or_unavailable(raw: &RawVariable, kind: SensorKind, what: &str) -> SensorValue {
    normalize(raw, kind).unwrap_or_else(|err| {
        warn!(sensor = what, error = %err, "could not normalize value");
        SensorValue::Unavailable
    })
}

fn disk_row(row: &TableRow) -> DiskRow {
    let cell = |column: &str, kind: SensorKind| normalize_or_unavailable(row.get(column), kind, column);
    DiskRow {
        index: row.index,
        temperature: cell("temperature", SensorKind::Temperature),
        capacity: cell("capacity", SensorKind::Capacity),
        model: cell("model", SensorKind::Text),
        vendor: cell("vendor", SensorKind::Text),
        serial: cell("serial", SensorKind::Text),
    }
}

fn volume_row(row: &TableRow) -> VolumeRow {
    let cell = |column: &str, kind: SensorKind| normalize_or_unavailable(row.get(column), kind, column);
    VolumeRow {
        index: row.index,
        name: cell("name", SensorKind::Text),
        filesystem: cell("fs_type", SensorKind::Text),
        raid_level: cell("raid_level", SensorKind::Text),
        size: cell("size", SensorKind::Capacity),
        free_space: cell("free_space", SensorKind::Capacity),
    }
}
