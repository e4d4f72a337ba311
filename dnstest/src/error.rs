use core::time::Duration;
use std::{io, path::PathBuf};

use thiserror::Error;
use tokio_rustls::rustls;

/// Invalid configuration, detected before any worker starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("protocol is wrong ({0}), expected one of: udp, tcp, tls")]
    InvalidMode(String),
    #[error("dial warning timeout ({soft:?}) exceeds max dial timeout ({hard:?})")]
    DialTimeouts { soft: Duration, hard: Duration },
    #[error("time limit must be positive")]
    ZeroDuration,
    #[error("invalid TLS server name '{0}'")]
    ServerName(String),
    #[error("TLS mode requires a CA certificate")]
    MissingCredential,
}

/// Trust material is missing or can not be used.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("error reading {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("could not read root certs from {}", .0.display())]
    NoCertificates(PathBuf),
    #[error("failed to init TLS config: {0}")]
    Tls(#[from] rustls::Error),
}

/// Domain corpus can not be loaded.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("error reading {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid domain name '{name}' at line {line}: {reason}")]
    InvalidName { line: usize, name: String, reason: String },
    #[error("no domain names in {}", .0.display())]
    Empty(PathBuf),
}

/// A request message can not be built.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid domain name '{name}': {reason}")]
    Name { name: String, reason: String },
    #[error("failed to compose message: {0}")]
    Push(String),
}

/// A new connection can not be established.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("dial timed out after {0:?}")]
    Timeout(Duration),
    #[error("dial error: {0}")]
    Io(#[from] io::Error),
    #[error("TLS handshake failed: {0}")]
    Tls(io::Error),
}

/// A single request/response round trip failed.
///
/// Every variant poisons the connection the exchange was performed on.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("write failed: {0}")]
    Write(io::Error),
    #[error("read failed: {0}")]
    Read(io::Error),
    #[error("id mismatch: expected {expected}, got {actual}")]
    IdMismatch { expected: u16, actual: u16 },
    #[error("bad rcode: {}", rcode_name(*.0))]
    BadRcode(u8),
}

fn rcode_name(rcode: u8) -> String {
    let name = match rcode {
        0 => "NOERROR",
        1 => "FORMERR",
        2 => "SERVFAIL",
        3 => "NXDOMAIN",
        4 => "NOTIMP",
        5 => "REFUSED",
        6 => "YXDOMAIN",
        7 => "YXRRSET",
        8 => "NXRRSET",
        9 => "NOTAUTH",
        10 => "NOTZONE",
        v => return format!("RCODE{v}"),
    };

    name.to_string()
}
