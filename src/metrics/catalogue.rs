//! Fixed OID catalogue for the WD My Cloud EX2 Ultra.
//!
//! Vendor objects live under the WD MYCLOUDEX2ULTRA-MIB agent node
//! `enterprises.5127.1.1.1.8.1`; load and memory come from UCD-SNMP-MIB,
//! interface counters and uptime from MIB-II.

use crate::metrics::normalize::SensorKind;
use crate::snmp::TableColumn;

/// enterprises . WD(5127) . product(1) . project(1) . model(1) . submodel(8) . nasAgent(1)
pub const WD_NAS_AGENT: &str = "1.3.6.1.4.1.5127.1.1.1.8.1";

pub const OID_SYSTEM_TEMPERATURE: &str = "1.3.6.1.4.1.5127.1.1.1.8.1.7.0";
pub const OID_FAN_STATUS: &str = "1.3.6.1.4.1.5127.1.1.1.8.1.8.0";
pub const OID_SYS_UPTIME: &str = "1.3.6.1.2.1.1.3.0";

/// Disk table root (`nasAgent.10`).
pub const DISK_TABLE_ROOT: &str = "1.3.6.1.4.1.5127.1.1.1.8.1.10";

/// Volume table root (`nasAgent.9`).
pub const VOLUME_TABLE_ROOT: &str = "1.3.6.1.4.1.5127.1.1.1.8.1.9";

/// A scalar sensor bound to one fixed OID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorDef {
    pub key: &'static str,
    pub name: &'static str,
    pub oid: &'static str,
    pub unit: &'static str,
    pub kind: SensorKind,
}

/// The static scalar sensor set.
pub const SENSORS: &[SensorDef] = &[
    SensorDef {
        key: "cpu_load_1min",
        name: "CPU Load 1min",
        oid: "1.3.6.1.4.1.2021.10.1.3.1",
        unit: "%",
        kind: SensorKind::Numeric,
    },
    SensorDef {
        key: "cpu_load_5min",
        name: "CPU Load 5min",
        oid: "1.3.6.1.4.1.2021.10.1.3.2",
        unit: "%",
        kind: SensorKind::Numeric,
    },
    SensorDef {
        key: "cpu_load_15min",
        name: "CPU Load 15min",
        oid: "1.3.6.1.4.1.2021.10.1.3.3",
        unit: "%",
        kind: SensorKind::Numeric,
    },
    SensorDef {
        key: "ram_total",
        name: "RAM Total",
        oid: "1.3.6.1.4.1.2021.4.5.0",
        unit: "MiB",
        kind: SensorKind::KilobytesToMib,
    },
    SensorDef {
        key: "ram_free",
        name: "RAM Free",
        oid: "1.3.6.1.4.1.2021.4.11.0",
        unit: "MiB",
        kind: SensorKind::KilobytesToMib,
    },
    SensorDef {
        key: "ram_used",
        name: "RAM Used",
        oid: "1.3.6.1.4.1.2021.4.6.0",
        unit: "MiB",
        kind: SensorKind::KilobytesToMib,
    },
    SensorDef {
        key: "system_temperature",
        name: "System Temperature",
        oid: OID_SYSTEM_TEMPERATURE,
        unit: "°C",
        kind: SensorKind::Temperature,
    },
    SensorDef {
        key: "fan_status",
        name: "Fan Status",
        oid: OID_FAN_STATUS,
        unit: "",
        kind: SensorKind::Numeric,
    },
    SensorDef {
        key: "network_in",
        name: "Network In (eth0)",
        oid: "1.3.6.1.2.1.2.2.1.10.2",
        unit: "B",
        kind: SensorKind::Numeric,
    },
    SensorDef {
        key: "network_out",
        name: "Network Out (eth0)",
        oid: "1.3.6.1.2.1.2.2.1.16.2",
        unit: "B",
        kind: SensorKind::Numeric,
    },
    SensorDef {
        key: "system_uptime",
        name: "System Uptime",
        oid: OID_SYS_UPTIME,
        unit: "s",
        kind: SensorKind::Uptime,
    },
];

/// Disk table columns; the first is walked to discover row indices.
pub const DISK_COLUMNS: &[TableColumn] = &[
    TableColumn { name: "num", oid: "1.3.6.1.4.1.5127.1.1.1.8.1.10.1.1" },
    TableColumn { name: "vendor", oid: "1.3.6.1.4.1.5127.1.1.1.8.1.10.1.2" },
    TableColumn { name: "model", oid: "1.3.6.1.4.1.5127.1.1.1.8.1.10.1.3" },
    TableColumn { name: "serial", oid: "1.3.6.1.4.1.5127.1.1.1.8.1.10.1.4" },
    TableColumn { name: "temperature", oid: "1.3.6.1.4.1.5127.1.1.1.8.1.10.1.5" },
    TableColumn { name: "capacity", oid: "1.3.6.1.4.1.5127.1.1.1.8.1.10.1.6" },
];

/// Volume table columns; the first is walked to discover row indices.
pub const VOLUME_COLUMNS: &[TableColumn] = &[
    TableColumn { name: "num", oid: "1.3.6.1.4.1.5127.1.1.1.8.1.9.1.1" },
    TableColumn { name: "name", oid: "1.3.6.1.4.1.5127.1.1.1.8.1.9.1.2" },
    TableColumn { name: "fs_type", oid: "1.3.6.1.4.1.5127.1.1.1.8.1.9.1.3" },
    TableColumn { name: "raid_level", oid: "1.3.6.1.4.1.5127.1.1.1.8.1.9.1.4" },
    TableColumn { name: "size", oid: "1.3.6.1.4.1.5127.1.1.1.8.1.9.1.5" },
    TableColumn { name: "free_space", oid: "1.3.6.1.4.1.5127.1.1.1.8.1.9.1.6" },
];

/// Look up a scalar sensor by key.
pub fn sensor(key: &str) -> Option<&'static SensorDef> {
    SENSORS.iter().find(|s| s.key == key)
}
