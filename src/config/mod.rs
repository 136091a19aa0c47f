use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Router type used when an instance does not declare one.
pub const DEFAULT_ROUTER_TYPE: &str = "hipache";

const DEFAULT_REDIS_SERVER: &str = "localhost:6379";
const DEFAULT_REDIS_PORT: u16 = 6379;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read conf file from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse yaml conf: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("conf file validation failed: {0}")]
    Invalid(#[from] ValidationErrors),
}

#[derive(Default, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Config::validate_routers"))]
pub struct Config {
    #[serde(default)]
    #[validate(nested)]
    pub log: Log,

    #[serde(default)]
    pub routers: HashMap<String, RouterConfig>,
}

// Config file load and validation
impl Config {
    pub fn load_from_yaml<P>(path: P) -> Result<Self, ConfigError>
    where
        P: AsRef<std::path::Path> + std::fmt::Display,
    {
        let conf_str = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    pub fn from_yaml(conf_str: &str) -> Result<Self, ConfigError> {
        trace!("Read conf file: {conf_str}");
        let conf: Config = serde_yaml::from_str(conf_str)?;

        trace!("Loaded conf: {conf:?}");

        conf.validate()?;

        Ok(conf)
    }

    // `validate(nested)` does not reach into map values, walk them by hand
    fn validate_routers(&self) -> Result<(), ValidationError> {
        for (name, router) in &self.routers {
            if name.is_empty() {
                return Err(ValidationError::new("router_name_required"));
            }
            if router.validate().is_err() {
                let mut err = ValidationError::new("router_invalid");
                err.add_param("router".into(), name);
                return Err(err);
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Log {
    #[serde(default = "Log::default_level")]
    #[validate(length(min = 1))]
    pub level: String,
    pub path: Option<String>,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            path: None,
        }
    }
}

impl Log {
    fn default_level() -> String {
        "info".to_string()
    }
}

/// Configuration scope of one router instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "kebab-case")]
pub struct RouterConfig {
    #[serde(rename = "type")]
    #[validate(length(min = 1))]
    pub router_type: Option<String>,

    #[serde(default = "RouterConfig::default_redis_server")]
    #[validate(custom(function = "RouterConfig::validate_redis_server"))]
    pub redis_server: String,
    pub redis_password: Option<String>,
    pub redis_db: Option<i64>,
    #[serde(default = "RouterConfig::default_dial_timeout")]
    pub redis_dial_timeout: u64,
    #[serde(default = "RouterConfig::default_read_timeout")]
    pub redis_read_timeout: u64,

    #[validate(length(min = 1))]
    pub domain: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            router_type: None,
            redis_server: Self::default_redis_server(),
            redis_password: None,
            redis_db: None,
            redis_dial_timeout: Self::default_dial_timeout(),
            redis_read_timeout: Self::default_read_timeout(),
            domain: None,
        }
    }
}

impl RouterConfig {
    fn default_redis_server() -> String {
        DEFAULT_REDIS_SERVER.to_string()
    }

    fn default_dial_timeout() -> u64 {
        1
    }

    fn default_read_timeout() -> u64 {
        2
    }

    fn validate_redis_server(server: &str) -> Result<(), ValidationError> {
        match split_host_port(server) {
            Some(_) => Ok(()),
            None => Err(ValidationError::new("invalid_redis_server")),
        }
    }

    /// Declared implementation type, falling back to [`DEFAULT_ROUTER_TYPE`].
    pub fn router_type(&self) -> &str {
        self.router_type.as_deref().unwrap_or(DEFAULT_ROUTER_TYPE)
    }

    /// Host and port of the configured store server.
    pub fn redis_host_port(&self) -> Option<(String, u16)> {
        split_host_port(&self.redis_server)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.redis_dial_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.redis_read_timeout)
    }
}

fn split_host_port(server: &str) -> Option<(String, u16)> {
    let server = server.trim();
    if server.is_empty() {
        return None;
    }
    match server.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port.parse::<u16>().ok()?;
            Some((host.to_string(), port))
        }
        Some(_) => None,
        None => Some((server.to_string(), DEFAULT_REDIS_PORT)),
    }
}
