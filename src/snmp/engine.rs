//! Adapter onto the `async-snmp` engine.
//!
//! Without the `snmp` feature this module compiles to a stub whose
//! [`AVAILABLE`] flag is false, so session construction reports
//! `SnmpLibraryMissing` up front instead of failing on first use.

use super::{SessionDescriptor, SnmpTransport};
use crate::error::{MonitorError, Result};

/// Whether an SNMP engine is compiled into this build.
pub const AVAILABLE: bool = cfg!(feature = "snmp");

#[cfg(feature = "snmp")]
pub use imp::EngineSession;

/// Open a session on the engine described by `descriptor`.
pub async fn open(descriptor: &SessionDescriptor) -> Result<Box<dyn SnmpTransport>> {
    #[cfg(feature = "snmp")]
    {
        let session = imp::EngineSession::connect(descriptor).await?;
        Ok(Box::new(session))
    }
    #[cfg(not(feature = "snmp"))]
    {
        let _ = descriptor;
        Err(MonitorError::SnmpLibraryMissing)
    }
}

/// Failure classes the engine reports, independent of its error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(feature = "snmp"), allow(dead_code))]
enum EngineFailure {
    Timeout,
    NoSuchName,
    Auth,
    Transport,
}

#[cfg_attr(not(feature = "snmp"), allow(dead_code))]
impl EngineFailure {
    /// Map onto the crate taxonomy. `what` names the OID or target, `detail` is the engine's message.
    fn into_error(self, what: &str, detail: String) -> MonitorError {
        match self {
            Self::Timeout => MonitorError::timeout(what),
            Self::NoSuchName => MonitorError::NoSuchObject(what.to_string()),
            Self::Auth => MonitorError::AuthenticationFailed(detail),
            Self::Transport => MonitorError::session_error(detail),
        }
    }
}

#[cfg(feature = "snmp")]
mod imp {
    use super::super::{RawVariable, SessionDescriptor, SnmpTransport, VarBinding};
    use super::{EngineFailure, MonitorError, Result};
    use crate::config::{self, Credentials, UsmCredentials};
    use async_snmp::{Auth, Client, ErrorStatus, Oid, UdpClient, Value};
    use async_trait::async_trait;
    use tracing::{debug, trace};

    /// A live session on one agent. Dropping it releases the socket.
    pub struct EngineSession {
        client: UdpClient,
        target: String,
    }

    impl EngineSession {
        pub async fn connect(descriptor: &SessionDescriptor) -> Result<Self> {
            let auth = build_auth(&descriptor.credentials);
            let client = Client::builder(descriptor.target.clone(), auth)
                .timeout(descriptor.timeout)
                .retries(0)
                .connect()
                .await
                .map_err(|err| classify(&err, &descriptor.target))?;
            debug!(target = %descriptor.target, "SNMP session ready");
            Ok(Self {
                client,
                target: descriptor.target.clone(),
            })
        }
    }

    #[async_trait]
    impl SnmpTransport for EngineSession {
        async fn get(&mut self, oid: &str) -> Result<RawVariable> {
            let parsed = parse(oid)?;
            trace!(target = %self.target, oid, "GET");
            let binding = self
                .client
                .get(&parsed)
                .await
                .map_err(|err| classify(&err, oid))?;
            Ok(convert(binding.value))
        }

        async fn get_next(&mut self, oid: &str) -> Result<VarBinding> {
            let parsed = parse(oid)?;
            trace!(target = %self.target, oid, "GETNEXT");
            let binding = self
                .client
                .get_next(&parsed)
                .await
                .map_err(|err| classify(&err, oid))?;
            Ok(VarBinding {
                oid: binding.oid.to_string(),
                value: convert(binding.value),
            })
        }
    }

    fn build_auth(credentials: &Credentials) -> Auth {
        match credentials {
            Credentials::V2c { community } => Auth::v2c(community.clone()),
            Credentials::V3(usm) => build_usm(usm),
        }
    }

    fn build_usm(usm: &UsmCredentials) -> Auth {
        let mut builder = Auth::usm(usm.username.clone());
        let auth_password = usm.auth_password.clone().unwrap_or_default();
        builder = match usm.auth_protocol {
            config::AuthProtocol::Md5 => builder.auth(async_snmp::AuthProtocol::Md5, auth_password),
            config::AuthProtocol::Sha => builder.auth(async_snmp::AuthProtocol::Sha1, auth_password),
            config::AuthProtocol::None => builder,
        };
        let priv_password = usm.priv_password.clone().unwrap_or_default();
        builder = match usm.priv_protocol {
            config::PrivProtocol::Des => builder.privacy(async_snmp::PrivProtocol::Des, priv_password),
            config::PrivProtocol::Aes => {
                builder.privacy(async_snmp::PrivProtocol::Aes128, priv_password)
            }
            config::PrivProtocol::None => builder,
        };
        builder.into()
    }

    fn parse(oid: &str) -> Result<Oid> {
        Oid::parse(oid).map_err(|err| MonitorError::config_error(format!("bad OID {}: {}", oid, err)))
    }

    fn convert(value: Value) -> RawVariable {
        match value {
            Value::Integer(v) => RawVariable::Integer(i64::from(v)),
            Value::Counter32(v) | Value::Gauge32(v) => RawVariable::Unsigned(u64::from(v)),
            Value::Counter64(v) => RawVariable::Unsigned(v),
            Value::TimeTicks(v) => RawVariable::TimeTicks(v),
            Value::OctetString(bytes) => RawVariable::OctetString(bytes.to_vec()),
            Value::NoSuchObject => RawVariable::NoSuchObject,
            Value::NoSuchInstance => RawVariable::NoSuchInstance,
            Value::EndOfMibView => RawVariable::EndOfMibView,
            other => RawVariable::Text(other.to_string()),
        }
    }

    fn classify(err: &async_snmp::Error, what: &str) -> MonitorError {
        failure_class(err).into_error(what, err.to_string())
    }

    fn failure_class(err: &async_snmp::Error) -> EngineFailure {
        use async_snmp::Error;
        match err {
            Error::Timeout { .. } => EngineFailure::Timeout,
            Error::Snmp {
                status: ErrorStatus::NoSuchName,
                ..
            } => EngineFailure::NoSuchName,
            Error::Snmp {
                status: ErrorStatus::AuthorizationError | ErrorStatus::NoAccess,
                ..
            }
            | Error::Auth { .. } => EngineFailure::Auth,
            _ => EngineFailure::Transport,
        }
    }

}
