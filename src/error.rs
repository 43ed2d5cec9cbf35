use std::path::PathBuf;

use thiserror::Error;

/// Malformed configuration input. Always fatal: a sweep never starts with one of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("line {line}")]
    Line {
        line: usize,
        #[source]
        source: Box<ConfigError>,
    },
    #[error("invalid proxy URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported proxy scheme {0:?} (expected http or https)")]
    UnsupportedScheme(String),
    #[error("missing host in {0}")]
    MissingHost(String),
    #[error("invalid port in {0}")]
    InvalidPort(String),
    #[error("empty username for {0}")]
    EmptyUsername(String),
    #[error("proxy URL must not carry a path, query or fragment: {0}")]
    UnexpectedPath(String),
    #[error("failed to read configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn at_line(self, line: usize) -> Self {
        ConfigError::Line {
            line,
            source: Box::new(self),
        }
    }
}

#[derive(Debug, Error)]
pub enum NetError {
    #[error("{host}:{port} did not accept a connection after {attempts} attempt(s)")]
    Unreachable {
        host: String,
        port: u16,
        attempts: u32,
    },
}
