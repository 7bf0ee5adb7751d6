use std::net::SocketAddr;

use hyper::Uri;

use super::error::BareError;
use crate::utils::net::is_local_ip;

/// Parse the remote URL, accepting only the given schemes.
pub fn parse_remote(raw: &str, id: &str, schemes: &[&str]) -> Result<Uri, BareError> {
    let uri: Uri = raw
        .parse()
        .map_err(|_| BareError::invalid_header(id, "Invalid URL."))?;

    let scheme_ok = uri
        .scheme_str()
        .is_some_and(|scheme| schemes.iter().any(|s| s.eq_ignore_ascii_case(scheme)));
    if !scheme_ok {
        return Err(BareError::invalid_header(id, "Unsupported protocol."));
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(BareError::invalid_header(id, "URL has no host."));
    }
    Ok(uri)
}

fn default_port(uri: &Uri) -> u16 {
    match uri.scheme_str() {
        Some("https") | Some("wss") => 443,
        _ => 80,
    }
}

fn host_port<'a>(uri: &'a Uri, id: &str) -> Result<(&'a str, u16), BareError> {
    let Some(host) = uri.host() else {
        return Err(BareError::invalid_header(id, "URL has no host."));
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok((host, uri.port_u16().unwrap_or_else(|| default_port(uri))))
}

fn refuse_local(addrs: &[SocketAddr], host: &str, id: &str) -> Result<(), BareError> {
    if addrs.iter().any(|addr| is_local_ip(addr.ip())) {
        tracing::debug!(host, "Refusing bare remote that resolves locally");
        return Err(BareError::host_forbidden(id));
    }
    Ok(())
}

/// Refuse remotes that resolve to local addresses when blocking is on.
///
/// Names that fail to resolve are left for the outbound connection to report;
/// its resolver applies the same rule to the addresses it dials.
pub async fn check_remote(uri: &Uri, block_local: bool, id: &str) -> Result<(), BareError> {
    if !block_local {
        return Ok(());
    }
    let (host, port) = host_port(uri, id)?;
    let addrs: Vec<SocketAddr> = match tokio::net::lookup_host((host, port)).await {
        Ok(addrs) => addrs.collect(),
        Err(_) => return Ok(()),
    };
    refuse_local(&addrs, host, id)
}

/// Resolve the remote once; callers dial exactly these addresses.
pub async fn resolve_remote(
    uri: &Uri,
    block_local: bool,
    id: &str,
) -> Result<Vec<SocketAddr>, BareError> {
    let (host, port) = host_port(uri, id)?;
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| BareError::host_not_found())?
        .collect();
    if addrs.is_empty() {
        return Err(BareError::host_not_found());
    }
    if block_local {
        refuse_local(&addrs, host, id)?;
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTTP: &[&str] = &["http", "https"];

    #[test]
    fn test_parse_remote_schemes() {
        assert!(parse_remote("https://example.com/a?b", "x-bare-url", HTTP).is_ok());
        assert!(parse_remote("ftp://example.com/", "x-bare-url", HTTP).is_err());
        assert!(parse_remote("/relative", "x-bare-url", HTTP).is_err());
        assert!(parse_remote("wss://example.com/", "remote", &["ws", "wss"]).is_ok());
    }

    #[tokio::test]
    async fn test_check_remote_blocks_loopback() {
        let uri = parse_remote("http://127.0.0.1:8080/", "x-bare-url", HTTP).unwrap();
        let err = check_remote(&uri, true, "x-bare-url").await.unwrap_err();
        assert_eq!(err.code, "HOST_FORBIDDEN");

        let uri = parse_remote("http://[::1]/", "x-bare-url", HTTP).unwrap();
        assert!(check_remote(&uri, true, "x-bare-url").await.is_err());

        assert!(check_remote(&uri, false, "x-bare-url").await.is_ok());
    }

    #[tokio::test]
    async fn test_resolve_remote_returns_checked_addresses() {
        let uri = parse_remote("ws://127.0.0.1:9001/", "remote", &["ws", "wss"]).unwrap();
        let addrs = resolve_remote(&uri, false, "remote").await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:9001".parse::<SocketAddr>().unwrap()]);

        let err = resolve_remote(&uri, true, "remote").await.unwrap_err();
        assert_eq!(err.code, "HOST_FORBIDDEN");

        let uri = parse_remote("wss://[::1]/", "remote", &["ws", "wss"]).unwrap();
        let addrs = resolve_remote(&uri, false, "remote").await.unwrap();
        assert_eq!(addrs[0].port(), 443);
    }
}
