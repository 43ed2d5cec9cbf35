use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;
use url::Host;

use crate::error::ConfigError;

/// Scheme used to talk to the proxy itself (not to the diagnostic target).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proxy basic-auth credentials. The password never leaves this struct in
/// `Debug` output or serialized summaries.
#[derive(Serialize, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// One candidate proxy configuration.
///
/// `host` holds IPv6 literals without brackets so it can be dialed directly.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub scheme: Scheme,
    pub host: String,
    pub port: Option<u16>,
    pub credentials: Option<Credentials>,
    pub label: Option<String>,
}

impl ProxyConfig {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
            credentials: None,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attach credentials unless this configuration already carries its own.
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        if self.credentials.is_none() {
            self.credentials = credentials;
        }
        self
    }

    /// Canonical endpoint URL: `scheme://host[:port]`, never including credentials.
    pub fn endpoint_url(&self) -> String {
        let host = url_host(&self.host);
        match self.port {
            Some(port) => format!("{}://{}:{}", self.scheme, host, port),
            None => format!("{}://{}", self.scheme, host),
        }
    }

    /// Port actually dialed, falling back to the scheme's default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.scheme.default_port())
    }

    pub fn display_name(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.endpoint_url())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost(self.endpoint_url()));
        }
        let host_ok = if self.host.contains(':') {
            self.host.parse::<Ipv6Addr>().is_ok()
        } else {
            Host::parse(&self.host).is_ok()
        };
        if !host_ok {
            return Err(ConfigError::InvalidUrl {
                url: self.endpoint_url(),
                reason: format!("invalid host {:?}", self.host),
            });
        }
        if self.port == Some(0) {
            return Err(ConfigError::InvalidPort(self.endpoint_url()));
        }
        if let Some(creds) = &self.credentials {
            if creds.username.is_empty() {
                return Err(ConfigError::EmptyUsername(self.endpoint_url()));
            }
        }
        Ok(())
    }
}

/// Host as written inside a URL authority: IPv6 literals get brackets.
pub fn url_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.credentials {
            Some(c) => write!(
                f,
                "{}://{}:****@{}{}",
                self.scheme,
                c.username,
                url_host(&self.host),
                self.port.map(|p| format!(":{p}")).unwrap_or_default()
            ),
            None => f.write_str(&self.endpoint_url()),
        }
    }
}

/// The two fixed diagnostic targets every configuration is probed against.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Plaintext,
    Encrypted,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Plaintext => f.write_str("HTTP"),
            TargetKind::Encrypted => f.write_str("HTTPS"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// TLS handshake with the proxy or through the tunnel failed.
    EncryptionNegotiation,
    /// The proxy refused to relay (CONNECT refused, proxy auth required).
    ProxyRejected,
    Timeout,
    Connect,
    Other,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportKind::EncryptionNegotiation => "encryption negotiation failure",
            TransportKind::ProxyRejected => "proxy rejection",
            TransportKind::Timeout => "timeout",
            TransportKind::Connect => "connect failure",
            TransportKind::Other => "transport failure",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TargetOutcome {
    Success { status: u16 },
    HttpError { status: u16 },
    TransportError { kind: TransportKind, message: String },
}

impl TargetOutcome {
    /// Any final status below 400 counts as relayed; redirects are not followed.
    pub fn from_status(status: u16) -> Self {
        if status < 400 {
            TargetOutcome::Success { status }
        } else {
            TargetOutcome::HttpError { status }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TargetOutcome::Success { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TargetOutcome::Success { status } | TargetOutcome::HttpError { status } => {
                Some(*status)
            }
            TargetOutcome::TransportError { .. } => None,
        }
    }
}

impl fmt::Display for TargetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetOutcome::Success { status } => write!(f, "PASS ({status})"),
            TargetOutcome::HttpError { status } => write!(f, "FAIL (HTTP {status})"),
            TargetOutcome::TransportError { kind, message } => {
                write!(f, "FAIL ({kind}: {message})")
            }
        }
    }
}

/// Outcome of one probe plus what the diagnostic target echoed back.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub target: TargetKind,
    #[serde(flatten)]
    pub outcome: TargetOutcome,
    pub echo: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfigStatus {
    BothWork,
    PlaintextOnly,
    EncryptedOnly,
    BothFail,
}

impl fmt::Display for ConfigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfigStatus::BothWork => "BOTH WORK",
            ConfigStatus::PlaintextOnly => "HTTP ONLY",
            ConfigStatus::EncryptedOnly => "HTTPS ONLY",
            ConfigStatus::BothFail => "BOTH FAIL",
        };
        f.write_str(s)
    }
}

/// Result for one configuration: always exactly one report per target.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub config: ProxyConfig,
    pub endpoint: String,
    pub plaintext: TargetReport,
    pub encrypted: TargetReport,
}

impl ProbeResult {
    pub fn status(&self) -> ConfigStatus {
        match (
            self.plaintext.outcome.is_success(),
            self.encrypted.outcome.is_success(),
        ) {
            (true, true) => ConfigStatus::BothWork,
            (true, false) => ConfigStatus::PlaintextOnly,
            (false, true) => ConfigStatus::EncryptedOnly,
            (false, false) => ConfigStatus::BothFail,
        }
    }

    pub fn fully_works(&self) -> bool {
        self.status() == ConfigStatus::BothWork
    }

    pub fn partially_works(&self) -> bool {
        self.status() != ConfigStatus::BothFail
    }

    pub fn reports(&self) -> [&TargetReport; 2] {
        [&self.plaintext, &self.encrypted]
    }
}

/// What counts as a "working" configuration when picking a recommendation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Both targets must succeed.
    #[default]
    Strict,
    /// At least one target must succeed.
    Relaxed,
}

/// Aggregate of a whole sweep, in probe order.
#[derive(Serialize, Debug, Clone)]
pub struct Summary {
    pub started_at: String,
    pub strictness: Strictness,
    pub results: Vec<ProbeResult>,
}

impl Summary {
    pub fn new(started_at: String, strictness: Strictness, results: Vec<ProbeResult>) -> Self {
        Self {
            started_at,
            strictness,
            results,
        }
    }

    /// Configurations where both targets succeeded, in probe order.
    pub fn working(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|r| r.fully_works())
    }

    pub fn recommended_index(&self) -> Option<usize> {
        let qualifies = |r: &ProbeResult| match self.strictness {
            Strictness::Strict => r.fully_works(),
            Strictness::Relaxed => r.partially_works(),
        };
        self.results.iter().position(qualifies)
    }

    pub fn recommended(&self) -> Option<&ProbeResult> {
        self.recommended_index().map(|i| &self.results[i])
    }

    /// 0 when at least one configuration fully works, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.working().next().is_some() {
            0
        } else {
            1
        }
    }
}

/// One named request sent through a single proxy by `run_checks`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub url: String,
    #[serde(flatten)]
    pub outcome: TargetOutcome,
    pub echo: Option<String>,
    pub elapsed_ms: u64,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.outcome.is_success()
    }
}
