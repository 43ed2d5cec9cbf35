mod support;

use std::time::{Duration, Instant};

use proxy_probe_rs::configs::parse_proxy_url;
use proxy_probe_rs::error::NetError;
use proxy_probe_rs::netcheck::{is_reachable, scan_ports, wait_until_reachable, WaitPolicy};
use support::closed_port;
use tokio::net::TcpListener;

fn quick_policy(max_attempts: u32) -> WaitPolicy {
    WaitPolicy {
        interval: Duration::from_millis(20),
        max_attempts,
        connect_timeout: Duration::from_millis(500),
    }
}

#[tokio::test]
async fn listening_port_is_reachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    assert!(is_reachable("127.0.0.1", port, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn closed_port_fails_fast() {
    let port = closed_port();
    let start = Instant::now();
    assert!(!is_reachable("127.0.0.1", port, Duration::from_secs(2)).await);
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn unresolvable_host_is_unreachable() {
    assert!(!is_reachable("host.invalid", 80, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn ipv6_config_host_is_dialable() {
    // Hosts without an IPv6 loopback cannot run this.
    let Ok(listener) = TcpListener::bind("[::1]:0").await else {
        return;
    };
    let port = listener.local_addr().unwrap().port();
    let config = parse_proxy_url(&format!("http://[::1]:{port}")).unwrap();
    assert!(is_reachable(&config.host, config.effective_port(), Duration::from_secs(2)).await);
}

#[tokio::test]
async fn wait_returns_first_successful_attempt() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let attempt = wait_until_reachable("127.0.0.1", port, quick_policy(3)).await.unwrap();
    assert_eq!(attempt, 1);
}

#[tokio::test]
async fn wait_gives_up_after_max_attempts() {
    let port = closed_port();
    let err = wait_until_reachable("127.0.0.1", port, quick_policy(3))
        .await
        .unwrap_err();
    match err {
        NetError::Unreachable { attempts, port: p, .. } => {
            assert_eq!(attempts, 3);
            assert_eq!(p, port);
        }
    }
}

#[tokio::test]
async fn scan_keeps_requested_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap().port();
    let closed = closed_port();
    let states = scan_ports("127.0.0.1", &[closed, open], Duration::from_secs(1)).await;
    assert_eq!(states, vec![(closed, false), (open, true)]);
}
