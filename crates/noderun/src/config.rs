//! # Server Configuration
//!
//! Where to listen and which timeouts to advertise in discovery.
//!
//! Values come from defaults, then the environment (`NODED_ADDR`,
//! `NODED_INIT_TIMEOUT`, `NODED_EXEC_TIMEOUT`), then explicit setters.

use pinwire::DiscoveryOptions;

pub const DEFAULT_ADDR: &str = "0.0.0.0:8765";
pub const DEFAULT_INIT_TIMEOUT: f64 = 2.0;
pub const DEFAULT_EXEC_TIMEOUT: f64 = 2.0;

pub const ENV_ADDR: &str = "NODED_ADDR";
pub const ENV_INIT_TIMEOUT: &str = "NODED_INIT_TIMEOUT";
pub const ENV_EXEC_TIMEOUT: &str = "NODED_EXEC_TIMEOUT";

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Invalid { var: String, value: String, reason: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid { var, value, reason } => {
                write!(f, "Invalid value {:?} for {}: {}", value, var, reason)
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub addr: String,
    /// Seconds. Advertised only; the engine enforces it.
    pub init_timeout: f64,
    /// Seconds. Advertised only; the engine enforces it.
    pub exec_timeout: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            init_timeout: DEFAULT_INIT_TIMEOUT,
            exec_timeout: DEFAULT_EXEC_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by whichever `NODED_*` variables are set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(addr) = lookup(ENV_ADDR) {
            config.addr = addr;
        }
        if let Some(value) = lookup(ENV_INIT_TIMEOUT) {
            config.init_timeout = parse_seconds(ENV_INIT_TIMEOUT, &value)?;
        }
        if let Some(value) = lookup(ENV_EXEC_TIMEOUT) {
            config.exec_timeout = parse_seconds(ENV_EXEC_TIMEOUT, &value)?;
        }
        Ok(config)
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn with_init_timeout(mut self, seconds: f64) -> Self {
        self.init_timeout = seconds;
        self
    }

    pub fn with_exec_timeout(mut self, seconds: f64) -> Self {
        self.exec_timeout = seconds;
        self
    }

    /// The `options` block of a discovery reply.
    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            init_timeout: self.init_timeout,
            exec_timeout: self.exec_timeout,
        }
    }
}

fn parse_seconds(var: &str, value: &str) -> Result<f64> {
    let invalid = |reason: &str| Error::Invalid {
        var: var.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let seconds: f64 = value.trim().parse().map_err(|_| invalid("not a number"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(invalid("must be a non-negative number of seconds"));
    }
    Ok(seconds)
}
