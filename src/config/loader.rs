use std::path::Path;
use thiserror::Error;
use tokio::fs;

use crate::config::models::{DEFAULT_PORT, ServerConfig};

/// Environment variable carrying the listen port.
pub const PORT_ENV: &str = "PORT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

pub async fn load_config<P: AsRef<Path>>(path: P) -> ConfigResult<ServerConfig> {
    let config_content = fs::read_to_string(path).await?;
    let config: ServerConfig = serde_yaml::from_str(&config_content)?;
    Ok(config)
}

/// Pick the listen port: a numeric, non-zero `PORT` value wins, then the
/// configured port, then [`DEFAULT_PORT`].
pub fn resolve_port(env_value: Option<&str>, configured: Option<u16>) -> u16 {
    env_value
        .and_then(|value| value.trim().parse::<u16>().ok())
        .filter(|port| *port != 0)
        .or(configured.filter(|port| *port != 0))
        .unwrap_or(DEFAULT_PORT)
}

/// [`resolve_port`] against the process environment.
pub fn port_from_env(configured: Option<u16>) -> u16 {
    let value = std::env::var(PORT_ENV).ok();
    resolve_port(value.as_deref(), configured)
}
