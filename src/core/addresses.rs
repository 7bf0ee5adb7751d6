use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::PublicIpConfig;
use crate::ports::http_client::HttpClient;

const HOSTNAME_FILE: &str = "/proc/sys/kernel/hostname";

/// Endpoints the listener is reachable on, printed once it is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressReport {
    pub port: u16,
    pub hostname: String,
}

impl AddressReport {
    pub fn new(port: u16, hostname: impl Into<String>) -> Self {
        Self {
            port,
            hostname: hostname.into(),
        }
    }

    pub fn entries(&self) -> Vec<String> {
        let port = self.port;
        vec![
            format!("http://localhost:{port}"),
            format!("http://{}:{port}", self.hostname),
            format!("http://0.0.0.0:{port}"),
            format!("http://[::]:{port}"),
        ]
    }

    pub fn log(&self) {
        tracing::info!("Listening on:");
        for entry in self.entries() {
            tracing::info!("\t{}", entry);
        }
    }
}

pub fn local_hostname() -> String {
    std::fs::read_to_string(HOSTNAME_FILE)
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|name| !name.is_empty()))
        .unwrap_or_else(|| "localhost".to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicAddresses {
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
}

impl PublicAddresses {
    pub fn is_empty(&self) -> bool {
        self.ipv4.is_none() && self.ipv6.is_none()
    }
}

async fn fetch_address(client: &dyn HttpClient, url: &str, limit: Duration) -> Option<String> {
    match timeout(limit, client.fetch_text(url, limit)).await {
        Ok(Ok(body)) => Some(body.trim().to_string()).filter(|ip| !ip.is_empty()),
        Ok(Err(e)) => {
            tracing::debug!(url, "Public IP lookup failed: {}", e);
            None
        }
        Err(_) => {
            tracing::debug!(url, "Public IP lookup timed out");
            None
        }
    }
}

/// Query both echo endpoints concurrently, each bounded by the timeout.
pub async fn lookup_public_addresses(
    client: &dyn HttpClient,
    config: &PublicIpConfig,
) -> PublicAddresses {
    let limit = Duration::from_secs(config.timeout_secs);
    let (ipv4, ipv6) = tokio::join!(
        fetch_address(client, &config.ipv4_url, limit),
        fetch_address(client, &config.ipv6_url, limit),
    );
    PublicAddresses {
        ipv4,
        ipv6: ipv6.filter(|ip| ip.contains(':')),
    }
}

/// Fire-and-forget lookup; nothing waits on the handle during startup.
pub fn spawn_public_ip_lookup(
    client: Arc<dyn HttpClient>,
    config: PublicIpConfig,
    port: u16,
) -> JoinHandle<PublicAddresses> {
    tokio::spawn(async move {
        let addresses = lookup_public_addresses(client.as_ref(), &config).await;
        if addresses.is_empty() {
            tracing::warn!("Unable to detect public IPs automatically");
        }
        if let Some(ip) = &addresses.ipv4 {
            tracing::info!("\thttp://{}:{}", ip, port);
        }
        if let Some(ip) = &addresses.ipv6 {
            tracing::info!("\thttp://[{}]:{}", ip, port);
        }
        addresses
    })
}
