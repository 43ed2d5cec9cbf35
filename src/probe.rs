use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt::Write;
use std::time::Duration;
use unicode_truncate::UnicodeTruncateStr;
use url::Url;

use crate::types::{ProxyConfig, TargetOutcome, TransportKind};

/// Upper bound (in display columns) for error messages and echoed bodies kept in results.
pub const MESSAGE_LIMIT: usize = 100;

pub const DEFAULT_PLAINTEXT_TARGET: &str = "http://httpbin.org/ip";
pub const DEFAULT_ENCRYPTED_TARGET: &str = "https://httpbin.org/ip";

/// The two diagnostic endpoints every configuration is probed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTargets {
    pub plaintext: Url,
    pub encrypted: Url,
}

impl ProbeTargets {
    pub fn new(plaintext: Url, encrypted: Url) -> Self {
        Self {
            plaintext,
            encrypted,
        }
    }
}

impl Default for ProbeTargets {
    fn default() -> Self {
        Self {
            plaintext: Url::parse(DEFAULT_PLAINTEXT_TARGET).expect("static url"),
            encrypted: Url::parse(DEFAULT_ENCRYPTED_TARGET).expect("static url"),
        }
    }
}

/// What one request through one proxy produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetch {
    pub outcome: TargetOutcome,
    pub echo: Option<String>,
}

impl Fetch {
    pub fn outcome(outcome: TargetOutcome) -> Self {
        Self {
            outcome,
            echo: None,
        }
    }
}

/// Issues a single GET through a proxy. Implementations must never fail:
/// every error is folded into the returned outcome.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn fetch(&self, config: &ProxyConfig, target: &Url, timeout: Duration) -> Fetch;
}

/// Production prober backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestProber {
    user_agent: String,
}

impl ReqwestProber {
    pub fn new() -> Self {
        Self {
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }

    fn client_for(&self, config: &ProxyConfig, timeout: Duration) -> reqwest::Result<reqwest::Client> {
        let mut proxy = reqwest::Proxy::all(config.endpoint_url())?;
        if let Some(creds) = &config.credentials {
            proxy = proxy.basic_auth(&creds.username, &creds.password);
        }
        reqwest::Client::builder()
            .proxy(proxy)
            .timeout(timeout)
            .user_agent(self.user_agent.as_str())
            .build()
    }
}

impl Default for ReqwestProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for ReqwestProber {
    async fn fetch(&self, config: &ProxyConfig, target: &Url, timeout: Duration) -> Fetch {
        let client = match self.client_for(config, timeout) {
            Ok(c) => c,
            Err(e) => return Fetch::outcome(classify_reqwest(&e)),
        };

        match client.get(target.clone()).send().await {
            Ok(resp) => {
                let outcome = TargetOutcome::from_status(resp.status().as_u16());
                let echo = resp
                    .text()
                    .await
                    .ok()
                    .map(|body| truncate(body.trim(), MESSAGE_LIMIT))
                    .filter(|body| !body.is_empty());
                Fetch { outcome, echo }
            }
            Err(e) => {
                let outcome = classify_reqwest(&e);
                tracing::debug!(endpoint = %config.endpoint_url(), url = %target, error = %report(&e), "probe failed");
                Fetch::outcome(outcome)
            }
        }
    }
}

/// Send a plain GET without any proxy. Used for direct-access diagnosis.
pub async fn fetch_direct(url: &Url, timeout: Duration, accept_invalid_certs: bool) -> Fetch {
    let client = reqwest::Client::builder()
        .no_proxy()
        .timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build();
    let client = match client {
        Ok(c) => c,
        Err(e) => return Fetch::outcome(classify_reqwest(&e)),
    };
    match client.get(url.clone()).send().await {
        Ok(resp) => {
            let outcome = TargetOutcome::from_status(resp.status().as_u16());
            let echo = resp
                .text()
                .await
                .ok()
                .map(|body| truncate(body.trim(), MESSAGE_LIMIT));
            Fetch { outcome, echo }
        }
        Err(e) => Fetch::outcome(classify_reqwest(&e)),
    }
}

/// Map a reqwest failure into a transport outcome with a bounded message.
///
/// The top-level message embeds the target URL, so only its causes are classified.
pub fn classify_reqwest(err: &reqwest::Error) -> TargetOutcome {
    let kind = match err.source() {
        Some(cause) => classify_chain(cause, err.is_timeout(), err.is_connect()),
        None => fallback_kind(err.is_timeout(), err.is_connect()),
    };
    TargetOutcome::TransportError {
        kind,
        message: truncate(&report(err), MESSAGE_LIMIT),
    }
}

/// Decide the transport kind from a chain of causes.
///
/// A `native_tls::Error` anywhere in the chain wins, then a TLS library
/// message, then proxy refusal, then the timeout/connect flags reported by
/// the client. `err` must not carry caller-supplied text such as a URL.
pub fn classify_chain(
    err: &(dyn StdError + 'static),
    is_timeout: bool,
    is_connect: bool,
) -> TransportKind {
    let mut tls = false;
    let mut rejected = false;
    let mut cur: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = cur {
        if e.is::<native_tls::Error>() {
            tls = true;
        }
        let msg = e.to_string().to_ascii_lowercase();
        if ["tls", "ssl", "handshake", "certificate"]
            .iter()
            .any(|needle| msg.contains(needle))
        {
            tls = true;
        }
        if msg.contains("tunnel") || msg.contains("proxy authentication required") {
            rejected = true;
        }
        cur = e.source();
    }

    if tls {
        TransportKind::EncryptionNegotiation
    } else if rejected {
        TransportKind::ProxyRejected
    } else {
        fallback_kind(is_timeout, is_connect)
    }
}

fn fallback_kind(is_timeout: bool, is_connect: bool) -> TransportKind {
    if is_timeout {
        TransportKind::Timeout
    } else if is_connect {
        TransportKind::Connect
    } else {
        TransportKind::Other
    }
}

/// Flatten an error and its sources into one line.
pub fn report(mut err: &(dyn StdError + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let _ = write!(s, ": {}", src);
        err = src;
    }
    s
}

/// Truncate to at most `limit` display columns without splitting a character.
pub fn truncate(s: &str, limit: usize) -> String {
    let (head, _) = s.unicode_truncate(limit);
    head.to_string()
}
