#![allow(dead_code)]

use std::net::SocketAddr;

use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

/// Local stand-in for the external diagnostic targets.
///
/// - `GET /ip` echoes a fixed origin as JSON
/// - `GET /status/{code}` answers with that status
pub async fn spawn_target() -> SocketAddr {
    let app = Router::new()
        .route("/ip", get(|| async { Json(json!({ "origin": "127.0.0.1" })) }))
        .route(
            "/status/{code}",
            get(|Path(code): Path<u16>| async move {
                StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[derive(Debug, Clone, Default)]
pub struct ProxyBehavior {
    /// Answer every CONNECT with 403.
    pub reject_connect: bool,
    /// Expected `Proxy-Authorization` value; missing or wrong yields 407.
    pub required_auth: Option<&'static str>,
}

/// Minimal forward proxy: absolute-form GET relay plus CONNECT tunnels.
/// A TLS ClientHello gets a plaintext 400, like a proxy that does not speak TLS.
pub async fn spawn_proxy(behavior: ProxyBehavior) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let behavior = behavior.clone();
            tokio::spawn(async move {
                if let Err(e) = handle(socket, behavior).await {
                    eprintln!("[test proxy] connection error: {e}");
                }
            });
        }
    });
    addr
}

/// A port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
const FORBIDDEN: &[u8] = b"HTTP/1.1 403 Forbidden\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
const AUTH_REQUIRED: &[u8] = b"HTTP/1.1 407 Proxy Authentication Required\r\nproxy-authenticate: Basic realm=\"test\"\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
const BAD_GATEWAY: &[u8] = b"HTTP/1.1 502 Bad Gateway\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";

async fn handle(mut socket: TcpStream, behavior: ProxyBehavior) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf[0] == 0x16 {
            socket.write_all(BAD_REQUEST).await?;
            return Ok(());
        }
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let rest = buf[header_end + 4..].to_vec();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    if let Some(expected) = behavior.required_auth {
        let authorized = headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("proxy-authorization") && v == expected);
        if !authorized {
            socket.write_all(AUTH_REQUIRED).await?;
            return Ok(());
        }
    }

    if method == "CONNECT" {
        if behavior.reject_connect {
            socket.write_all(FORBIDDEN).await?;
            return Ok(());
        }
        let mut upstream = match TcpStream::connect(target.as_str()).await {
            Ok(s) => s,
            Err(_) => {
                socket.write_all(BAD_GATEWAY).await?;
                return Ok(());
            }
        };
        socket
            .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
            .await?;
        upstream.write_all(&rest).await?;
        tokio::io::copy_bidirectional(&mut socket, &mut upstream).await?;
        return Ok(());
    }

    let Ok(url) = Url::parse(&target) else {
        socket.write_all(BAD_REQUEST).await?;
        return Ok(());
    };
    let host = url.host_str().unwrap_or_default().to_string();
    let port = url.port_or_known_default().unwrap_or(80);
    let mut upstream = match TcpStream::connect((host.as_str(), port)).await {
        Ok(s) => s,
        Err(_) => {
            socket.write_all(BAD_GATEWAY).await?;
            return Ok(());
        }
    };

    let mut path = url.path().to_string();
    if let Some(q) = url.query() {
        path.push('?');
        path.push_str(q);
    }
    let mut forwarded = format!("{method} {path} HTTP/1.1\r\n");
    for (k, v) in &headers {
        let lower = k.to_ascii_lowercase();
        if lower.starts_with("proxy-") || lower == "connection" {
            continue;
        }
        forwarded.push_str(&format!("{k}: {v}\r\n"));
    }
    forwarded.push_str("Connection: close\r\n\r\n");
    upstream.write_all(forwarded.as_bytes()).await?;
    upstream.write_all(&rest).await?;

    tokio::io::copy(&mut upstream, &mut socket).await?;
    socket.shutdown().await?;
    Ok(())
}
