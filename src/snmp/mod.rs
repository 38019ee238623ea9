//! SNMP data acquisition: session construction, scalar GET and table WALK.
//!
//! The engine that encodes PDUs and handles USM security sits behind the
//! [`SnmpTransport`] trait. The real adapter lives in [`engine`] and is only
//! compiled with the `snmp` feature; tests drive the same code paths with
//! scripted in-memory agents.

pub mod engine;
pub mod walker;

use crate::config::{Credentials, SessionConfig};
use crate::error::{MonitorError, Result};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;
use tracing::debug;

pub use walker::{TableColumn, TableRow, TableWalker};

/// Decoded but untyped value returned by the engine for one OID.
#[derive(Debug, Clone, PartialEq)]
pub enum RawVariable {
    Integer(i64),
    /// Counter32, Gauge32 and Counter64
    Unsigned(u64),
    /// Hundredths of a second
    TimeTicks(u32),
    OctetString(Vec<u8>),
    /// Any other SMI type, rendered by the engine
    Text(String),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl RawVariable {
    /// Whether this is an SNMP exception value rather than data.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Self::NoSuchObject | Self::NoSuchInstance | Self::EndOfMibView
        )
    }

    pub fn octet_string(text: &str) -> Self {
        Self::OctetString(text.as_bytes().to_vec())
    }
}

impl fmt::Display for RawVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::Unsigned(v) => write!(f, "{}", v),
            Self::TimeTicks(v) => write!(f, "{} ticks", v),
            Self::OctetString(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
            Self::Text(text) => write!(f, "{}", text),
            Self::NoSuchObject => write!(f, "noSuchObject"),
            Self::NoSuchInstance => write!(f, "noSuchInstance"),
            Self::EndOfMibView => write!(f, "endOfMibView"),
        }
    }
}

/// One OID/value pair as returned by GETNEXT.
#[derive(Debug, Clone, PartialEq)]
pub struct VarBinding {
    pub oid: String,
    pub value: RawVariable,
}

/// The two requests this crate issues. One request in flight per call.
#[async_trait]
pub trait SnmpTransport: Send {
    /// GET a single scalar instance.
    async fn get(&mut self, oid: &str) -> Result<RawVariable>;

    /// GETNEXT: the first instance lexicographically after `oid`.
    async fn get_next(&mut self, oid: &str) -> Result<VarBinding>;
}

/// Opens sessions for a coordinator. One session per device, never shared.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &SessionConfig) -> Result<Box<dyn SnmpTransport>>;
}

/// Everything the engine needs to open a session.
#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    pub target: String,
    pub credentials: Credentials,
    pub timeout: Duration,
}

impl SessionDescriptor {
    /// Build a descriptor, failing immediately when no SNMP engine is compiled in.
    pub fn new(config: &SessionConfig, timeout: Duration) -> Result<Self> {
        if !engine::AVAILABLE {
            return Err(MonitorError::SnmpLibraryMissing);
        }
        if config.host().is_empty() {
            return Err(MonitorError::InvalidHost(String::new()));
        }
        Ok(Self {
            target: config.target(),
            credentials: config.credentials().clone(),
            timeout,
        })
    }
}

/// Connector backed by the compiled-in SNMP engine.
#[derive(Debug, Clone)]
pub struct EngineConnector {
    timeout: Duration,
}

impl EngineConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for EngineConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::DEFAULT_SCALAR_TIMEOUT_SECS))
    }
}

#[async_trait]
impl Connector for EngineConnector {
    async fn connect(&self, config: &SessionConfig) -> Result<Box<dyn SnmpTransport>> {
        let descriptor = SessionDescriptor::new(config, self.timeout)?;
        debug!(target = %descriptor.target, version = ?config.version(), "opening SNMP session");
        engine::open(&descriptor).await
    }
}

/// Issue one GET with a deadline. Exception values become `NoSuchObject`.
pub async fn fetch_scalar(
    session: &mut dyn SnmpTransport,
    oid: &str,
    deadline: Duration,
) -> Result<RawVariable> {
    let value = tokio::time::timeout(deadline, session.get(oid))
        .await
        .map_err(|_| MonitorError::timeout(oid))??;
    if value.is_exception() {
        return Err(MonitorError::NoSuchObject(oid.to_string()));
    }
    Ok(value)
}

/// Parse a dotted-numeric OID into arcs. A leading dot is tolerated.
pub fn parse_oid(oid: &str) -> Option<Vec<u32>> {
    let trimmed = oid.strip_prefix('.').unwrap_or(oid);
    if trimmed.is_empty() {
        return None;
    }
    trimmed.split('.').map(|arc| arc.parse().ok()).collect()
}

/// Compare two OIDs arc by arc. Unparseable OIDs sort last.
pub fn compare_oids(a: &str, b: &str) -> Ordering {
    match (parse_oid(a), parse_oid(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Arcs of `oid` below `root`, or `None` when `oid` is outside the subtree.
pub fn subtree_suffix(root: &str, oid: &str) -> Option<Vec<u32>> {
    let root = parse_oid(root)?;
    let oid = parse_oid(oid)?;
    if oid.len() <= root.len() || oid[..root.len()] != root[..] {
        return None;
    }
    Some(oid[root.len()..].to_vec())
}
