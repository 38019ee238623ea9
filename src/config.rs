//! Session and monitor configuration.
//!
//! The setup surface hands us a loosely typed [`SessionRecord`]; validation
//! turns it into an immutable [`SessionConfig`] whose credentials are a sum
//! type, so no other module ever checks for field presence.

use crate::error::{MonitorError, Result};
use crate::web::WebConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default SNMP agent port.
pub const DEFAULT_SNMP_PORT: u16 = 161;

/// Default community string for SNMPv2c.
pub const DEFAULT_COMMUNITY: &str = "public";

/// Strip a leading `http://`/`https://`, trailing `/` and surrounding whitespace.
///
/// Purely textual and idempotent; the remainder keeps its case.
pub fn normalize_host(raw: &str) -> String {
    let mut host = raw;
    loop {
        let next = strip_once(host);
        if next == host {
            return host.to_string();
        }
        host = next;
    }
}

fn strip_once(host: &str) -> &str {
    let mut host = host.trim();
    for scheme in ["http://", "https://"] {
        if let Some(prefix) = host.get(..scheme.len()) {
            if prefix.eq_ignore_ascii_case(scheme) {
                host = &host[scheme.len()..];
                break;
            }
        }
    }
    host.trim_end_matches('/')
}

/// SNMPv3 authentication protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthProtocol {
    #[serde(rename = "MD5")]
    Md5,
    #[serde(rename = "SHA")]
    Sha,
    #[serde(rename = "none")]
    None,
}

/// SNMPv3 privacy protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivProtocol {
    #[serde(rename = "DES")]
    Des,
    #[serde(rename = "AES")]
    Aes,
    #[serde(rename = "none")]
    None,
}

/// SNMP protocol version as named by the setup surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnmpVersion {
    #[serde(rename = "SNMPv2c")]
    V2c,
    #[serde(rename = "SNMPv3")]
    V3,
}

/// Polling cadence; only three values are offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollInterval {
    Secs30,
    #[default]
    Secs60,
    Secs120,
}

impl PollInterval {
    /// Map seconds from the setup surface onto one of the offered values.
    pub fn from_secs(secs: u64) -> Result<Self> {
        match secs {
            30 => Ok(Self::Secs30),
            60 => Ok(Self::Secs60),
            120 => Ok(Self::Secs120),
            other => Err(MonitorError::config_error(format!(
                "scan_interval must be 30, 60 or 120 seconds, got {}",
                other
            ))),
        }
    }

    pub fn as_secs(self) -> u64 {
        match self {
            Self::Secs30 => 30,
            Self::Secs60 => 60,
            Self::Secs120 => 120,
        }
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.as_secs())
    }
}

/// USM user credentials for SNMPv3.
#[derive(Clone, PartialEq, Eq)]
pub struct UsmCredentials {
    pub username: String,
    pub auth_protocol: AuthProtocol,
    pub auth_password: Option<String>,
    pub priv_protocol: PrivProtocol,
    pub priv_password: Option<String>,
}

impl fmt::Debug for UsmCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsmCredentials")
            .field("username", &self.username)
            .field("auth_protocol", &self.auth_protocol)
            .field("auth_password", &self.auth_password.as_ref().map(|_| "<redacted>"))
            .field("priv_protocol", &self.priv_protocol)
            .field("priv_password", &self.priv_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Version-specific credentials. Exactly one variant, matching the version.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    V2c { community: String },
    V3(UsmCredentials),
}

impl Credentials {
    pub fn version(&self) -> SnmpVersion {
        match self {
            Self::V2c { .. } => SnmpVersion::V2c,
            Self::V3(_) => SnmpVersion::V3,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V2c { .. } => f.debug_struct("V2c").field("community", &"<redacted>").finish(),
            Self::V3(usm) => f.debug_tuple("V3").field(usm).finish(),
        }
    }
}

/// Validated, immutable session configuration for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    host: String,
    port: u16,
    credentials: Credentials,
    interval: PollInterval,
}

impl SessionConfig {
    /// Build an SNMPv2c configuration.
    pub fn v2c(host: &str, community: impl Into<String>, interval: PollInterval) -> Result<Self> {
        let (host, port) = split_host_port(host)?;
        Ok(Self {
            host,
            port,
            credentials: Credentials::V2c {
                community: community.into(),
            },
            interval,
        })
    }

    /// Build an SNMPv3 configuration, checking the USM fields the protocols require.
    pub fn v3(host: &str, usm: UsmCredentials, interval: PollInterval) -> Result<Self> {
        let (host, port) = split_host_port(host)?;
        validate_usm(&usm)?;
        Ok(Self {
            host,
            port,
            credentials: Credentials::V3(usm),
            interval,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn version(&self) -> SnmpVersion {
        self.credentials.version()
    }

    pub fn interval(&self) -> PollInterval {
        self.interval
    }

    /// `host:port` target string handed to the SNMP engine.
    pub fn target(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn split_host_port(raw: &str) -> Result<(String, u16)> {
    let host = normalize_host(raw);
    if host.is_empty() {
        return Err(MonitorError::InvalidHost(raw.to_string()));
    }

    // Bare IPv6 literals carry several colons; only `[v6]:port` and `name:port` split.
    if let Some(rest) = host.strip_prefix('[') {
        let Some((addr, tail)) = rest.split_once(']') else {
            return Err(MonitorError::InvalidHost(raw.to_string()));
        };
        if addr.is_empty() {
            return Err(MonitorError::InvalidHost(raw.to_string()));
        }
        let port = match tail {
            "" => DEFAULT_SNMP_PORT,
            _ => match tail.strip_prefix(':') {
                Some(p) => parse_port(raw, p)?,
                None => return Err(MonitorError::InvalidHost(raw.to_string())),
            },
        };
        return Ok((addr.to_string(), port));
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') => {
            if name.is_empty() {
                return Err(MonitorError::InvalidHost(raw.to_string()));
            }
            Ok((name.to_string(), parse_port(raw, port)?))
        }
        _ => Ok((host, DEFAULT_SNMP_PORT)),
    }
}

fn parse_port(raw: &str, port: &str) -> Result<u16> {
    port.parse::<u16>()
        .map_err(|_| MonitorError::InvalidHost(raw.to_string()))
}

fn validate_usm(usm: &UsmCredentials) -> Result<()> {
    if usm.username.trim().is_empty() {
        return Err(MonitorError::MissingCredentialField("username"));
    }
    let has = |field: &Option<String>| field.as_deref().is_some_and(|s| !s.is_empty());
    if usm.auth_protocol != AuthProtocol::None && !has(&usm.auth_password) {
        return Err(MonitorError::MissingCredentialField("auth_password"));
    }
    if usm.priv_protocol != PrivProtocol::None {
        if usm.auth_protocol == AuthProtocol::None {
            return Err(MonitorError::MissingCredentialField("auth_protocol"));
        }
        if !has(&usm.priv_password) {
            return Err(MonitorError::MissingCredentialField("priv_password"));
        }
    }
    Ok(())
}

/// Plain session record as produced by the setup surface or a monitor file.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub snmp_version: Option<SnmpVersion>,
    #[serde(default)]
    pub community: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub auth_protocol: Option<AuthProtocol>,
    #[serde(default)]
    pub auth_password: Option<String>,
    #[serde(default)]
    pub priv_protocol: Option<PrivProtocol>,
    #[serde(default)]
    pub priv_password: Option<String>,
    #[serde(default)]
    pub scan_interval: Option<u64>,
}

impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("host", &self.host)
            .field("snmp_version", &self.snmp_version)
            .field("username", &self.username)
            .field("auth_protocol", &self.auth_protocol)
            .field("priv_protocol", &self.priv_protocol)
            .field("scan_interval", &self.scan_interval)
            .finish_non_exhaustive()
    }
}

impl SessionRecord {
    /// Validate the record into a [`SessionConfig`].
    pub fn validate(&self) -> Result<SessionConfig> {
        let interval = match self.scan_interval {
            Some(secs) => PollInterval::from_secs(secs)?,
            None => PollInterval::default(),
        };

        match self.snmp_version.unwrap_or(SnmpVersion::V2c) {
            SnmpVersion::V2c => {
                let community = self
                    .community
                    .clone()
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| DEFAULT_COMMUNITY.to_string());
                SessionConfig::v2c(&self.host, community, interval)
            }
            SnmpVersion::V3 => {
                let username = self
                    .username
                    .clone()
                    .ok_or(MonitorError::MissingCredentialField("username"))?;
                let auth_protocol = self
                    .auth_protocol
                    .ok_or(MonitorError::MissingCredentialField("auth_protocol"))?;
                let priv_protocol = self
                    .priv_protocol
                    .ok_or(MonitorError::MissingCredentialField("priv_protocol"))?;
                let usm = UsmCredentials {
                    username,
                    auth_protocol,
                    auth_password: self.auth_password.clone(),
                    priv_protocol,
                    priv_password: self.priv_password.clone(),
                };
                SessionConfig::v3(&self.host, usm, interval)
            }
        }
    }
}

/// Coordinator tuning shared by every device in a monitor file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    /// Consecutive session-level failures before sensors are marked stale
    pub stale_after_failures: u32,
    /// Deadline for one scalar request
    pub scalar_timeout_secs: u64,
    /// Row bound for table walks
    pub max_table_rows: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            stale_after_failures: crate::DEFAULT_STALE_AFTER_FAILURES,
            scalar_timeout_secs: crate::DEFAULT_SCALAR_TIMEOUT_SECS,
            max_table_rows: crate::DEFAULT_MAX_TABLE_ROWS,
        }
    }
}

impl CoordinatorSettings {
    pub fn scalar_timeout(&self) -> Duration {
        Duration::from_secs(self.scalar_timeout_secs.max(1))
    }

    /// Deadline for one table walk: proportional to the row bound, capped.
    pub fn walk_timeout(&self) -> Duration {
        let per_row = self.scalar_timeout();
        let rows = self.max_table_rows.max(1) as u32;
        (per_row * rows.min(4)).min(Duration::from_secs(crate::MAX_WALK_TIMEOUT_SECS))
    }

    /// Deadline for a whole poll cycle: every scalar plus both table walks.
    pub fn poll_timeout(&self) -> Duration {
        let scalars = crate::metrics::catalogue::SENSORS.len() as u32;
        self.scalar_timeout() * scalars + self.walk_timeout() * 2
    }
}

/// One named device in a monitor file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub name: String,
    #[serde(flatten)]
    pub session: SessionRecord,
}

/// Contents of a monitor TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorFile {
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceEntry>,
    #[serde(default)]
    pub coordinator: CoordinatorSettings,
    #[serde(default)]
    pub web: WebConfig,
}

impl MonitorFile {
    pub fn from_toml(text: &str) -> Result<Self> {
        let file: MonitorFile = toml::from_str(text)?;
        if file.coordinator.stale_after_failures < crate::MIN_STALE_AFTER_FAILURES {
            return Err(MonitorError::config_error(format!(
                "stale_after_failures must be at least {}, got {}",
                crate::MIN_STALE_AFTER_FAILURES,
                file.coordinator.stale_after_failures
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for device in &file.devices {
            if device.name.trim().is_empty() {
                return Err(MonitorError::config_error("device name must not be empty"));
            }
            if !seen.insert(device.name.as_str()) {
                return Err(MonitorError::config_error(format!(
                    "duplicate device name {:?}",
                    device.name
                )));
            }
        }
        Ok(file)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    pub fn device(&self, name: &str) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.name == name)
    }
}
