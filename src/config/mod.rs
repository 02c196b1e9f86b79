//! Agent configuration.
//!
//! Read from a TOML file; every field has a default so an empty file is a
//! valid configuration.
//!
//! ```toml
//! module = "s2e_opm"
//! document = "s2e_opm.json"
//! log_filter = "agentrest=info"
//!
//! [server]
//! ip = "0.0.0.0"
//! port = 8080
//! max_body_size = 4096
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {}", join(.0))]
    Invalid(Vec<String>),
}

fn join(problems: &[String]) -> String {
    problems.join(", ")
}

/// Root configuration of an agent daemon.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Module prefix the agent registers its routes under.
    pub module: String,

    /// JSON document served by the agent.
    pub document: PathBuf,

    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_filter: String,

    pub server: ServerConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            module: "s2e_opm".to_owned(),
            document: PathBuf::from("s2e_opm.json"),
            log_filter: "agentrest=info".to_owned(),
            server: ServerConfig::default(),
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub ip: String,
    pub port: u16,
    /// Largest accepted request body in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".to_owned(),
            port: 8080,
            max_body_size: 4096,
        }
    }
}

impl ServerConfig {
    /// `ip:port`, bracketing IPv6 literals.
    pub fn bind_address(&self) -> String {
        if self.ip.contains(':') {
            format!("[{}]:{}", self.ip, self.port)
        } else {
            format!("{}:{}", self.ip, self.port)
        }
    }

    /// Limit for a whole request: the body plus room for the header block.
    pub fn max_request_size(&self) -> usize {
        const HEADER_ALLOWANCE: usize = 8 * 1024;
        self.max_body_size.saturating_add(HEADER_ALLOWANCE)
    }
}

impl fmt::Display for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "module={} document={} listen={} max_body_size={}",
            self.module,
            self.document.display(),
            self.server.bind_address(),
            self.server.max_body_size
        )
    }
}

impl AgentConfig {
    /// Parses a configuration from TOML text. Does not validate.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Reads and validates the configuration at `path`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`]
    /// for malformed TOML, and [`ConfigError::Invalid`] if validation fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges, reporting every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        if self.module.is_empty() {
            problems.push("module must not be empty".to_owned());
        } else if self.module.contains(['/', '?']) {
            problems.push(format!("module {:?} must be a single path component", self.module));
        }
        if self.document.as_os_str().is_empty() {
            problems.push("document must not be empty".to_owned());
        }
        if self.server.ip.is_empty() {
            problems.push("server.ip must not be empty".to_owned());
        }
        if self.server.port == 0 {
            problems.push("server.port must be non-zero".to_owned());
        }
        if self.server.max_body_size == 0 {
            problems.push("server.max_body_size must be non-zero".to_owned());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}
