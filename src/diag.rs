use ::time::OffsetDateTime;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time;
use tokio_native_tls::TlsConnector as TokioTlsConnector;
use url::Url;
use x509_parser::parse_x509_certificate;

use crate::netcheck;
use crate::probe::{self, MESSAGE_LIMIT};
use crate::types::{url_host, TargetOutcome, TransportKind};

/// Ports probed by `diagnose` when none are given.
pub const DEFAULT_DIAG_PORTS: &[u16] = &[80, 443, 8080, 10000];

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DnsReport {
    pub addresses: Vec<String>,
    pub error: Option<String>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortStatus {
    pub port: u16,
    pub open: bool,
}

/// Result of a direct (non-proxied) GET against the proxy host itself.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DirectAccess {
    pub url: String,
    #[serde(flatten)]
    pub outcome: TargetOutcome,
    pub snippet: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TlsInspection {
    pub port: u16,
    pub handshake_ok: bool,
    pub cert_days_remaining: Option<i64>,
    pub error: Option<String>,
}

/// Everything `diagnose` learned about a proxy host. Sections fail independently.
#[derive(Serialize, Debug, Clone)]
pub struct Diagnosis {
    pub host: String,
    pub dns: DnsReport,
    pub ports: Vec<PortStatus>,
    pub direct_http: DirectAccess,
    pub direct_https: DirectAccess,
    pub tls: TlsInspection,
}

/// Collect DNS, port, direct-access and TLS facts about `host`.
pub async fn diagnose(host: &str, ports: &[u16], timeout: Duration) -> Diagnosis {
    let dns = match netcheck::resolve_host(host).await {
        Ok(ips) => DnsReport {
            addresses: ips.iter().map(ToString::to_string).collect(),
            error: None,
        },
        Err(e) => DnsReport {
            addresses: Vec::new(),
            error: Some(e.to_string()),
        },
    };

    let ports = netcheck::scan_ports(host, ports, timeout)
        .await
        .into_iter()
        .map(|(port, open)| PortStatus { port, open })
        .collect();

    let authority = url_host(host);
    let direct_http = direct_access(&format!("http://{authority}"), timeout).await;
    let direct_https = direct_access(&format!("https://{authority}"), timeout).await;
    let tls = inspect_tls(host, 443, timeout).await;

    Diagnosis {
        host: host.to_string(),
        dns,
        ports,
        direct_http,
        direct_https,
        tls,
    }
}

async fn direct_access(raw: &str, timeout: Duration) -> DirectAccess {
    let url = match Url::parse(raw) {
        Ok(u) => u,
        Err(e) => {
            return DirectAccess {
                url: raw.to_string(),
                outcome: TargetOutcome::TransportError {
                    kind: TransportKind::Other,
                    message: e.to_string(),
                },
                snippet: None,
            }
        }
    };
    let fetch = probe::fetch_direct(&url, timeout, true).await;
    DirectAccess {
        url: url.to_string(),
        outcome: fetch.outcome,
        snippet: fetch.echo,
    }
}

/// TLS handshake against `host:port` accepting any certificate, reporting
/// how many days the presented leaf certificate remains valid.
pub async fn inspect_tls(host: &str, port: u16, timeout: Duration) -> TlsInspection {
    let failed = |error: String| TlsInspection {
        port,
        handshake_ok: false,
        cert_days_remaining: None,
        error: Some(probe::truncate(&error, MESSAGE_LIMIT)),
    };

    let der = match time::timeout(timeout, peer_certificate_der(host, port)).await {
        Ok(Ok(der)) => der,
        Ok(Err(e)) => return failed(format!("{e:#}")),
        Err(_) => return failed("TLS handshake timed out".into()),
    };

    match cert_days_remaining(&der, OffsetDateTime::now_utc().unix_timestamp()) {
        Ok(days) => TlsInspection {
            port,
            handshake_ok: true,
            cert_days_remaining: Some(days),
            error: None,
        },
        Err(e) => TlsInspection {
            port,
            handshake_ok: true,
            cert_days_remaining: None,
            error: Some(format!("{e:#}")),
        },
    }
}

async fn peer_certificate_der(host: &str, port: u16) -> Result<Vec<u8>> {
    let mut builder = native_tls::TlsConnector::builder();
    builder.danger_accept_invalid_certs(true);
    let connector = TokioTlsConnector::from(builder.build()?);

    let stream = TcpStream::connect((host, port)).await?;
    let tls_stream = connector.connect(host, stream).await?;

    let cert = tls_stream
        .get_ref()
        .peer_certificate()?
        .ok_or_else(|| anyhow!("server presented no certificate"))?;
    Ok(cert.to_der()?)
}

/// Whole days between `now` (unix seconds) and the certificate's notAfter.
/// Negative once expired.
pub fn cert_days_remaining(der: &[u8], now: i64) -> Result<i64> {
    let (_, parsed) =
        parse_x509_certificate(der).map_err(|e| anyhow!("invalid certificate: {e}"))?;
    let not_after = parsed.validity().not_after.timestamp();
    Ok((not_after - now) / 86400)
}
