//! Error handling for the NAS SNMP monitor.

/// A specialized `Result` type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// The main error type for session construction, polling and normalization.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MonitorError {
    /// Host string is empty once scheme, slashes and whitespace are stripped
    #[error("Invalid host: {0:?}")]
    InvalidHost(String),

    /// A field required by the declared SNMP version is absent
    #[error("Missing credential field: {0}")]
    MissingCredentialField(&'static str),

    /// The SNMP engine was not compiled into this build
    #[error("SNMP library missing: this build has no SNMP engine (enable the `snmp` feature)")]
    SnmpLibraryMissing,

    /// The agent rejected our community string or USM credentials
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No response within the request deadline
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// The agent has no object at the requested OID
    #[error("No such object: {0}")]
    NoSuchObject(String),

    /// A table walk produced more rows than the configured bound
    #[error("Table walk under {root} exceeded {limit} rows")]
    TableWalkOverflow { root: String, limit: usize },

    /// A temperature payload carried neither a `Centigrade:` token nor a number
    #[error("Unparseable temperature: {0:?}")]
    UnparseableTemperature(String),

    /// Catch-all transport failure
    #[error("Session error: {0}")]
    Session(String),

    /// Malformed configuration file or record
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O failure outside the SNMP transport (config files, sockets for the web surface)
    #[error("I/O error: {0}")]
    Io(String),
}

impl MonitorError {
    /// Create a new session error
    pub fn session_error(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new timeout error for the given OID or operation
    pub fn timeout(what: impl Into<String>) -> Self {
        Self::Timeout(what.into())
    }

    /// Stable, snake_case code reported by the connectivity self-test.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidHost(_) => "invalid_host",
            Self::MissingCredentialField(_) => "missing_credential_field",
            Self::SnmpLibraryMissing => "snmp_library_missing",
            Self::AuthenticationFailed(_) => "invalid_auth",
            Self::Timeout(_) => "timeout",
            Self::NoSuchObject(_) => "no_such_object",
            Self::TableWalkOverflow { .. } => "table_walk_overflow",
            Self::UnparseableTemperature(_) => "unparseable_temperature",
            Self::Session(_) => "cannot_connect",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }

    /// Whether this error means the session itself is unusable.
    ///
    /// Session-level errors abort a whole poll cycle and force the session to
    /// be rebuilt. Everything else concerns a single OID, row or payload and
    /// is absorbed as an `Unavailable` value.
    pub fn is_session_level(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed(_)
                | Self::SnmpLibraryMissing
                | Self::Session(_)
                | Self::InvalidHost(_)
                | Self::MissingCredentialField(_)
        )
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for MonitorError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
