//! Human-readable rendering of sweep summaries, checks and diagnoses.
use std::fmt::Write;

use crate::diag::Diagnosis;
use crate::probe::truncate;
use crate::types::{CheckResult, ProbeResult, Strictness, Summary, TargetOutcome};

const RULE_WIDTH: usize = 70;
const ERROR_WIDTH: usize = 80;

pub const TROUBLESHOOTING: &[&str] = &[
    "Check that the proxy deployment is running",
    "Check the proxy service logs for errors",
    "Verify the proxy host name and ports are correct",
    "Wait a few minutes after a fresh deployment before testing",
];

fn rule(out: &mut String, c: char) {
    let _ = writeln!(out, "{}", c.to_string().repeat(RULE_WIDTH));
}

/// Short reason a configuration failed, taken from its first failing target.
fn first_error(result: &ProbeResult) -> Option<String> {
    result.reports().iter().find_map(|r| match &r.outcome {
        TargetOutcome::Success { .. } => None,
        TargetOutcome::HttpError { status } => Some(format!("{}: HTTP {status}", r.target)),
        TargetOutcome::TransportError { kind, message } => {
            Some(format!("{}: {kind}: {}", r.target, truncate(message, ERROR_WIDTH)))
        }
    })
}

pub fn render_summary(summary: &Summary) -> String {
    let mut out = String::new();
    rule(&mut out, '=');
    let _ = writeln!(out, "FINAL RESULTS SUMMARY (started {})", summary.started_at);
    rule(&mut out, '=');

    let status_w = 10usize;
    for (i, result) in summary.results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {:<status_w$} - {}",
            i + 1,
            result.status().to_string(),
            result.config.display_name(),
            status_w = status_w
        );
        let _ = writeln!(out, "   URL: {}", result.config);
        for report in result.reports() {
            let _ = writeln!(
                out,
                "   {:<5} {} in {}ms",
                report.target.to_string(),
                report.outcome,
                report.elapsed_ms
            );
            if let Some(echo) = &report.echo {
                let _ = writeln!(out, "         echo: {echo}");
            }
        }
        if let Some(err) = first_error(result) {
            let _ = writeln!(out, "   Error: {err}");
        }
        let _ = writeln!(out);
    }

    rule(&mut out, '=');
    let _ = writeln!(out, "RECOMMENDATIONS");
    rule(&mut out, '=');

    let working = summary.working().count();
    match summary.recommended() {
        Some(best) => {
            if working > 0 {
                let _ = writeln!(out, "Found {working} working configuration(s).");
            } else if summary.strictness == Strictness::Relaxed {
                let _ = writeln!(out, "No configuration relays both HTTP and HTTPS; best partial match:");
            }
            let _ = writeln!(out, "BEST CONFIG TO USE: {}", best.config.display_name());
            let _ = writeln!(out, "   Proxy URL : {}", best.endpoint);
            let _ = writeln!(out, "   Scheme    : {}", best.config.scheme);
            let _ = writeln!(out, "   Port      : {}", best.config.effective_port());
        }
        None => {
            let _ = writeln!(out, "No working configuration found.");
            let _ = writeln!(out, "Troubleshooting steps:");
            for (i, step) in TROUBLESHOOTING.iter().enumerate() {
                let _ = writeln!(out, "   {}. {step}", i + 1);
            }
        }
    }
    rule(&mut out, '=');
    out
}

pub fn render_checks(proxy: &str, results: &[CheckResult]) -> String {
    let mut out = String::new();
    let name_w = results.iter().map(|r| r.name.len()).max().unwrap_or(4).max(20);
    let _ = writeln!(out, "Proxy: {proxy}");
    rule(&mut out, '=');
    for r in results {
        let verdict = if r.passed() { "PASS" } else { "FAIL" };
        let _ = writeln!(out, "{:<name_w$} {verdict}  {}", r.name, r.outcome, name_w = name_w);
        if let Some(echo) = &r.echo {
            let _ = writeln!(out, "{:<name_w$} echo: {echo}", "", name_w = name_w);
        }
    }
    let passed = results.iter().filter(|r| r.passed()).count();
    rule(&mut out, '=');
    let _ = writeln!(out, "Total: {passed}/{} tests passed", results.len());
    out
}

pub fn render_diagnosis(d: &Diagnosis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Proxy host diagnosis: {}", d.host);
    rule(&mut out, '=');

    let _ = writeln!(out, "1. DNS resolution:");
    match &d.dns.error {
        Some(e) => {
            let _ = writeln!(out, "   DNS error: {e}");
        }
        None => {
            let _ = writeln!(out, "   {} resolves to {}", d.host, d.dns.addresses.join(", "));
        }
    }

    let _ = writeln!(out, "2. Port connectivity:");
    for p in &d.ports {
        let state = if p.open { "OPEN" } else { "CLOSED" };
        let _ = writeln!(out, "   Port {:>5} is {state}", p.port);
    }

    for (n, access) in [(3, &d.direct_http), (4, &d.direct_https)] {
        let _ = writeln!(out, "{n}. Direct access {}:", access.url);
        let _ = writeln!(out, "   {}", access.outcome);
        if let Some(snippet) = &access.snippet {
            let _ = writeln!(out, "   Response: {snippet}");
        }
    }

    let _ = writeln!(out, "5. TLS on port {}:", d.tls.port);
    match (d.tls.handshake_ok, d.tls.cert_days_remaining, &d.tls.error) {
        (true, Some(days), _) => {
            let _ = writeln!(out, "   handshake OK, certificate valid for {days} more day(s)");
        }
        (true, None, err) => {
            let _ = writeln!(
                out,
                "   handshake OK, certificate unreadable: {}",
                err.as_deref().unwrap_or("unknown")
            );
        }
        (false, _, err) => {
            let _ = writeln!(out, "   handshake failed: {}", err.as_deref().unwrap_or("unknown"));
        }
    }
    rule(&mut out, '=');
    out
}
