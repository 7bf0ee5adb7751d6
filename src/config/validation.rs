use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::models::{BareConfig, MountConfig, PublicIpConfig, ServerConfig, TunnelConfig};

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid URL in field '{field}': {url} - {reason}")]
    InvalidUrl {
        field: String,
        url: String,
        reason: String,
    },

    #[error("Invalid listen address: {address} - {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Mount configuration conflict: {message}")]
    MountConflict { message: String },
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validator with detailed error reporting
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a complete server configuration
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if config.mounts.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "mounts".to_string(),
            });
        } else {
            for mount in &config.mounts {
                if let Err(mut mount_errors) = Self::validate_mount(mount) {
                    errors.append(&mut mount_errors);
                }
            }
            if let Err(conflicts) = Self::check_mount_conflicts(&config.mounts) {
                errors.extend(conflicts);
            }
        }

        if let Err(e) = Self::validate_bare(&config.bare) {
            errors.push(e);
        }

        if let Err(mut tunnel_errors) = Self::validate_tunnel(&config.tunnel) {
            errors.append(&mut tunnel_errors);
        }

        if let Err(mut ip_errors) = Self::validate_public_ip(&config.public_ip) {
            errors.append(&mut ip_errors);
        }

        if config.metrics.enabled {
            if let Err(e) = Self::validate_listen_address(&config.metrics.listen_addr) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_mount(mount: &MountConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !mount.prefix.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("mount prefix: {}", mount.prefix),
                message: "Mount prefixes must start with '/'".to_string(),
            });
        }

        if mount.root.trim().is_empty() {
            errors.push(ValidationError::InvalidField {
                field: format!("mount root for {}", mount.prefix),
                message: "Mount root cannot be empty".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Prefixes that only differ by a trailing slash address the same mount.
    fn check_mount_conflicts(mounts: &[MountConfig]) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for mount in mounts {
            let normalized = mount.prefix.trim_end_matches('/');
            if !seen.insert(normalized) {
                errors.push(ValidationError::MountConflict {
                    message: format!("Mount prefix '{}' is declared more than once", mount.prefix),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_bare(config: &BareConfig) -> ValidationResult<()> {
        if !config.enabled {
            return Ok(());
        }
        if !config.directory.starts_with('/') || !config.directory.ends_with('/') {
            return Err(ValidationError::InvalidField {
                field: "bare.directory".to_string(),
                message: "Bare directory must start and end with '/' (e.g. '/bare/')".to_string(),
            });
        }
        Ok(())
    }

    fn validate_tunnel(config: &TunnelConfig) -> Result<(), Vec<ValidationError>> {
        if !config.enabled {
            return Ok(());
        }

        let mut errors = Vec::new();

        if config.suffix.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "tunnel.suffix".to_string(),
            });
        }

        if config.buffer_size == 0 {
            errors.push(ValidationError::InvalidField {
                field: "tunnel.buffer_size".to_string(),
                message: "Buffer size must be greater than zero".to_string(),
            });
        }

        if config.connect_timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "tunnel.connect_timeout_secs".to_string(),
                message: "Connect timeout must be greater than zero".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_public_ip(config: &PublicIpConfig) -> Result<(), Vec<ValidationError>> {
        if !config.enabled {
            return Ok(());
        }

        let errors: Vec<ValidationError> = [
            ("public_ip.ipv4_url", &config.ipv4_url),
            ("public_ip.ipv6_url", &config.ipv6_url),
        ]
        .into_iter()
        .filter_map(|(field, url)| Self::validate_url(url, field).err())
        .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_url(url_str: &str, field: &str) -> ValidationResult<()> {
        let uri: http::Uri = url_str.parse().map_err(|e: http::uri::InvalidUri| {
            ValidationError::InvalidUrl {
                field: field.to_string(),
                url: url_str.to_string(),
                reason: e.to_string(),
            }
        })?;

        match uri.scheme_str() {
            Some("http") | Some("https") if uri.host().is_some() => Ok(()),
            _ => Err(ValidationError::InvalidUrl {
                field: field.to_string(),
                url: url_str.to_string(),
                reason: "URL must use http or https and name a host".to_string(),
            }),
        }
    }

    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:9090')".to_string(),
            });
        }
        Ok(())
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        let mut message = format!("Found {} validation error(s):\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::*;

    fn create_valid_config() -> ServerConfig {
        ServerConfig::default()
    }

    #[test]
    fn test_valid_config() {
        let config = create_valid_config();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_missing_mounts() {
        let mut config = create_valid_config();
        config.mounts.clear();

        let result = ConfigValidator::validate(&config);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Missing required field: mounts")
        );
    }

    #[test]
    fn test_duplicate_mount_prefix() {
        let mut config = create_valid_config();
        config.mounts.push(MountConfig {
            prefix: "/uv".to_string(),
            root: "elsewhere".to_string(),
        });

        let result = ConfigValidator::validate(&config);
        assert!(result.unwrap_err().to_string().contains("more than once"));
    }

    #[test]
    fn test_collects_every_problem() {
        let mut config = create_valid_config();
        config.mounts[1].prefix = "uv/".to_string();
        config.bare.directory = "/bare".to_string();
        config.tunnel.buffer_size = 0;

        let message = ConfigValidator::validate(&config).unwrap_err().to_string();
        assert!(message.contains("Found 3 validation error(s)"));
        assert!(message.contains("must start with '/'"));
        assert!(message.contains("bare.directory"));
        assert!(message.contains("tunnel.buffer_size"));
    }

    #[test]
    fn test_disabled_engines_skip_checks() {
        let mut config = create_valid_config();
        config.bare.enabled = false;
        config.bare.directory = String::new();
        config.tunnel.enabled = false;
        config.tunnel.suffix = String::new();

        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_public_ip_url() {
        let mut config = create_valid_config();
        config.public_ip.ipv4_url = "ftp://example.com/ip".to_string();

        let result = ConfigValidator::validate(&config);
        assert!(result.unwrap_err().to_string().contains("Invalid URL"));
    }

    #[test]
    fn test_invalid_metrics_address() {
        let mut config = create_valid_config();
        config.metrics.enabled = true;
        config.metrics.listen_addr = "localhost".to_string();

        let result = ConfigValidator::validate(&config);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }
}
