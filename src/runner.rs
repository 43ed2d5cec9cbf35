use ::time::{format_description::well_known, OffsetDateTime};
use std::time::Duration;
use tokio::time::{self, Instant};
use url::Url;

use crate::error::ConfigError;
use crate::probe::{ProbeTargets, Prober, ReqwestProber};
use crate::types::{
    CheckResult, ProbeResult, ProxyConfig, Strictness, Summary, TargetKind, TargetReport,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(1);

/// Probes candidate proxy configurations one after another.
///
/// Each configuration gets one request to the plaintext target and one to the
/// encrypted target. Probe failures are recorded in the summary, never returned.
pub struct ProbeRunner<P = ReqwestProber> {
    prober: P,
    targets: ProbeTargets,
    timeout: Duration,
    pause: Duration,
    strictness: Strictness,
}

impl Default for ProbeRunner<ReqwestProber> {
    fn default() -> Self {
        Self::new(ReqwestProber::new())
    }
}

impl<P: Prober> ProbeRunner<P> {
    pub fn new(prober: P) -> Self {
        Self {
            prober,
            targets: ProbeTargets::default(),
            timeout: DEFAULT_TIMEOUT,
            pause: DEFAULT_PAUSE,
            strictness: Strictness::default(),
        }
    }

    pub fn with_targets(mut self, targets: ProbeTargets) -> Self {
        self.targets = targets;
        self
    }

    /// Per-request bound; applies to every probe.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay between consecutive configurations. Zero disables it.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    pub fn targets(&self) -> &ProbeTargets {
        &self.targets
    }

    /// Probe every configuration in order and summarize.
    ///
    /// The whole list is validated up front; a malformed entry fails the run
    /// before any request is sent.
    pub async fn run(&self, configs: &[ProxyConfig]) -> Result<Summary, ConfigError> {
        for config in configs {
            config.validate()?;
        }

        let started_at = rfc3339_now_utc();
        let total = configs.len();
        let mut results = Vec::with_capacity(total);

        for (idx, config) in configs.iter().enumerate() {
            tracing::info!(
                test = idx + 1,
                total,
                endpoint = %config.endpoint_url(),
                name = %config.display_name(),
                "probing configuration"
            );

            let plaintext = self.probe_target(config, TargetKind::Plaintext).await;
            let encrypted = self.probe_target(config, TargetKind::Encrypted).await;
            let result = ProbeResult {
                endpoint: config.endpoint_url(),
                config: config.clone(),
                plaintext,
                encrypted,
            };
            tracing::info!(endpoint = %result.endpoint, status = %result.status(), "configuration probed");
            results.push(result);

            if idx + 1 < total && !self.pause.is_zero() {
                time::sleep(self.pause).await;
            }
        }

        Ok(Summary::new(started_at, self.strictness, results))
    }

    async fn probe_target(&self, config: &ProxyConfig, kind: TargetKind) -> TargetReport {
        let target = match kind {
            TargetKind::Plaintext => &self.targets.plaintext,
            TargetKind::Encrypted => &self.targets.encrypted,
        };
        let start = Instant::now();
        let fetch = self.prober.fetch(config, target, self.timeout).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::info!(url = %target, outcome = %fetch.outcome, elapsed_ms, "probe {kind}");
        TargetReport {
            target: kind,
            outcome: fetch.outcome,
            echo: fetch.echo,
            elapsed_ms,
        }
    }
}

/// A named request used by single-proxy checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedTarget {
    pub name: String,
    pub url: Url,
}

impl NamedTarget {
    pub fn new(name: impl Into<String>, url: Url) -> Self {
        Self {
            name: name.into(),
            url,
        }
    }

    /// Parse `name=url`, or a bare URL named after its host.
    pub fn parse(s: &str) -> Result<Self, url::ParseError> {
        match s.split_once('=') {
            Some((name, url)) if !name.contains("://") => Ok(Self::new(name.trim(), Url::parse(url.trim())?)),
            _ => {
                let url = Url::parse(s.trim())?;
                let name = url.host_str().unwrap_or("target").to_string();
                Ok(Self::new(name, url))
            }
        }
    }
}

/// Targets checked by `run_checks` when none are given.
pub fn default_check_targets() -> Vec<NamedTarget> {
    [
        ("HTTP", "http://httpbin.org/ip"),
        ("HTTPS", "https://httpbin.org/ip"),
        ("Google", "https://www.google.com"),
        ("API", "https://api.ipify.org?format=json"),
    ]
    .into_iter()
    .filter_map(|(name, url)| Url::parse(url).ok().map(|u| NamedTarget::new(name, u)))
    .collect()
}

/// Send one configuration against a list of targets, sequentially and in order.
pub async fn run_checks<P: Prober>(
    prober: &P,
    config: &ProxyConfig,
    targets: &[NamedTarget],
    timeout: Duration,
) -> Result<Vec<CheckResult>, ConfigError> {
    config.validate()?;

    let mut out = Vec::with_capacity(targets.len());
    for target in targets {
        let start = Instant::now();
        let fetch = prober.fetch(config, &target.url, timeout).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::info!(name = %target.name, url = %target.url, outcome = %fetch.outcome, elapsed_ms, "check");
        out.push(CheckResult {
            name: target.name.clone(),
            url: target.url.to_string(),
            outcome: fetch.outcome,
            echo: fetch.echo,
            elapsed_ms,
        });
    }
    Ok(out)
}

/// Sweep start stamp; falls back to the epoch if formatting ever fails.
fn rfc3339_now_utc() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_owned())
}
