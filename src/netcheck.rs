use std::net::IpAddr;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time;

use crate::error::NetError;

/// Whether `host:port` accepts a TCP connection within `timeout`.
///
/// Only the transport handshake is attempted; nothing is sent. Name resolution
/// counts against the same timeout.
pub async fn is_reachable(host: &str, port: u16, timeout: Duration) -> bool {
    match time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            tracing::debug!(host, port, error = %e, "connect failed");
            false
        }
        Err(_) => {
            tracing::debug!(host, port, "connect timed out");
            false
        }
    }
}

/// Bounds for [`wait_until_reachable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    pub connect_timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 30,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Poll `host:port` until it accepts a connection.
///
/// Returns the 1-based attempt that succeeded, or `NetError::Unreachable`
/// once `max_attempts` have failed. Never sleeps after the last attempt.
pub async fn wait_until_reachable(
    host: &str,
    port: u16,
    policy: WaitPolicy,
) -> Result<u32, NetError> {
    for attempt in 1..=policy.max_attempts {
        if is_reachable(host, port, policy.connect_timeout).await {
            tracing::info!(host, port, attempt, max = policy.max_attempts, "service is responding");
            return Ok(attempt);
        }
        tracing::info!(host, port, attempt, max = policy.max_attempts, "not ready yet");
        if attempt < policy.max_attempts {
            time::sleep(policy.interval).await;
        }
    }
    Err(NetError::Unreachable {
        host: host.to_string(),
        port,
        attempts: policy.max_attempts,
    })
}

/// Resolve a host name to its addresses, deduplicated and in resolver order.
pub async fn resolve_host(host: &str) -> std::io::Result<Vec<IpAddr>> {
    let mut out: Vec<IpAddr> = Vec::new();
    for addr in lookup_host((host, 0)).await? {
        if !out.contains(&addr.ip()) {
            out.push(addr.ip());
        }
    }
    Ok(out)
}

/// Check each port in order with [`is_reachable`].
pub async fn scan_ports(host: &str, ports: &[u16], timeout: Duration) -> Vec<(u16, bool)> {
    let mut out = Vec::with_capacity(ports.len());
    for &port in ports {
        out.push((port, is_reachable(host, port, timeout).await));
    }
    out
}

/// Parse a comma separated port list like `80,443,8080`.
pub fn parse_port_list(s: &str) -> Result<Vec<u16>, String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| match p.parse::<u16>() {
            Ok(0) | Err(_) => Err(format!("invalid port: {p}")),
            Ok(v) => Ok(v),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_list() {
        assert_eq!(parse_port_list("80, 443,8080,").unwrap(), vec![80, 443, 8080]);
        assert!(parse_port_list("80,0").is_err());
        assert!(parse_port_list("http").is_err());
    }

    #[test]
    fn default_policy_is_bounded() {
        let p = WaitPolicy::default();
        assert_eq!(p.max_attempts, 30);
        assert_eq!(p.interval, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn resolves_localhost() {
        let ips = resolve_host("localhost").await.unwrap();
        assert!(ips.iter().any(|ip| ip.is_loopback()));
    }
}
