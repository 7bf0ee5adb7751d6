use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Port used when the `PORT` environment variable is absent or unusable.
    pub port: Option<u16>,
    pub mounts: Vec<MountConfig>,
    pub bare: BareConfig,
    pub tunnel: TunnelConfig,
    pub public_ip: PublicIpConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub shutdown: ShutdownConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: None,
            mounts: MountConfig::defaults(),
            bare: BareConfig::default(),
            tunnel: TunnelConfig::default(),
            public_ip: PublicIpConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

/// Builder for ServerConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct ServerConfigBuilder {
    port: Option<u16>,
    mounts: Vec<MountConfig>,
    bare: Option<BareConfig>,
    tunnel: Option<TunnelConfig>,
    public_ip: Option<PublicIpConfig>,
    shutdown: Option<ShutdownConfig>,
}

impl ServerConfigBuilder {
    /// Set the fallback listen port
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Append a static mount point; order is preserved
    pub fn mount(mut self, prefix: impl Into<String>, root: impl Into<String>) -> Self {
        self.mounts.push(MountConfig {
            prefix: prefix.into(),
            root: root.into(),
        });
        self
    }

    pub fn bare(mut self, config: BareConfig) -> Self {
        self.bare = Some(config);
        self
    }

    pub fn tunnel(mut self, config: TunnelConfig) -> Self {
        self.tunnel = Some(config);
        self
    }

    pub fn public_ip(mut self, config: PublicIpConfig) -> Self {
        self.public_ip = Some(config);
        self
    }

    pub fn shutdown(mut self, config: ShutdownConfig) -> Self {
        self.shutdown = Some(config);
        self
    }

    /// Build the final ServerConfig
    pub fn build(self) -> Result<ServerConfig, String> {
        if self.mounts.is_empty() {
            return Err("At least one mount point must be configured".to_string());
        }

        Ok(ServerConfig {
            port: self.port,
            mounts: self.mounts,
            bare: self.bare.unwrap_or_default(),
            tunnel: self.tunnel.unwrap_or_default(),
            public_ip: self.public_ip.unwrap_or_default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            shutdown: self.shutdown.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MountConfig {
    pub prefix: String,
    pub root: String,
}

impl MountConfig {
    /// The UI bundle at the root plus the client library bundles.
    pub fn defaults() -> Vec<MountConfig> {
        [
            ("/", "public"),
            ("/uv/", "assets/uv"),
            ("/epoxy/", "assets/epoxy"),
            ("/libcurl/", "assets/libcurl"),
            ("/bareasmodule/", "assets/bareasmodule"),
            ("/baremux/", "assets/baremux"),
            ("/scram/", "scramjet"),
        ]
        .into_iter()
        .map(|(prefix, root)| MountConfig {
            prefix: prefix.to_string(),
            root: root.to_string(),
        })
        .collect()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BareConfig {
    pub enabled: bool,
    pub directory: String,
    /// Refuse remotes that resolve to loopback, private or link-local addresses.
    pub block_local: bool,
    pub maintainer: Option<BareMaintainer>,
}

impl Default for BareConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: "/bare/".to_string(),
            block_local: true,
            maintainer: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BareMaintainer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TunnelConfig {
    pub enabled: bool,
    pub suffix: String,
    pub buffer_size: u32,
    pub allow_udp: bool,
    pub block_local: bool,
    pub connect_timeout_secs: u64,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            suffix: "/wisp/".to_string(),
            buffer_size: 128,
            allow_udp: true,
            block_local: false,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PublicIpConfig {
    pub enabled: bool,
    pub ipv4_url: String,
    pub ipv6_url: String,
    pub timeout_secs: u64,
}

impl Default for PublicIpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ipv4_url: "https://ifconfig.me/ip".to_string(),
            ipv6_url: "https://ifconfig.co/ip".to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    #[default]
    #[serde(rename = "pretty")]
    Pretty,
    #[serde(rename = "json")]
    Json,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time allowed for in-flight HTTP connections to finish. Zero exits at once.
    pub drain_timeout_secs: u64,
}
