use core::{
    fmt::{self, Display, Formatter},
    net::SocketAddr,
    num::NonZero,
    str::FromStr,
    time::Duration,
};
use std::path::PathBuf;

use crate::{cmd::Cmd, error::ConfigError};

/// Transport used to carry DNS messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Plain datagrams, one message per datagram.
    Udp,
    /// Plain stream with length-prefixed messages.
    Tcp,
    /// TLS-encrypted stream with length-prefixed messages.
    Tls,
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            "tls" => Ok(Self::Tls),
            v => Err(ConfigError::InvalidMode(v.to_string())),
        }
    }
}

impl Display for Mode {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), fmt::Error> {
        let name = match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Tls => "tls",
        };

        fmt.write_str(name)
    }
}

/// Validated run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Transport mode.
    pub mode: Mode,
    /// Resolver endpoint.
    pub addr: SocketAddr,
    /// PEM CA bundle, used only in TLS mode.
    pub ca_path: PathBuf,
    /// Name verified against the server certificate, if differs from the
    /// endpoint IP.
    pub tls_server_name: Option<String>,
    /// Connection pool capacity.
    pub connections: NonZero<usize>,
    /// Number of concurrent workers.
    pub workers: NonZero<usize>,
    /// Number of threads the workers are spread over.
    pub threads: NonZero<usize>,
    /// Run duration.
    pub duration: Duration,
    /// Whether each query name is made unique to bypass resolver caches.
    pub uncached: bool,
    /// Whether a random client subnet option is attached to each query.
    pub ecs: bool,
    /// Domain corpus file. The built-in corpus is used if none given.
    pub corpus_path: Option<PathBuf>,
    /// Read deadline for a single response.
    pub read_timeout: Duration,
    /// Dial duration after which a warning is logged.
    pub dial_timeout: Duration,
    /// Dial deadline.
    pub max_dial_timeout: Duration,
    /// Print the final report as JSON.
    pub json: bool,
}

impl TryFrom<Cmd> for Config {
    type Error = ConfigError;

    fn try_from(cmd: Cmd) -> Result<Self, Self::Error> {
        let Cmd {
            mode,
            server,
            ca_path,
            tls_server_name,
            clients,
            workers,
            threads,
            limit,
            uncached,
            ecs,
            corpus,
            read_timeout,
            dial_timeout,
            max_dial_timeout,
            json,
            verbose: _,
        } = cmd;

        if limit == 0 {
            return Err(ConfigError::ZeroDuration);
        }

        let dial_timeout = Duration::from_secs(dial_timeout);
        let max_dial_timeout = Duration::from_secs(max_dial_timeout);
        if dial_timeout > max_dial_timeout {
            return Err(ConfigError::DialTimeouts { soft: dial_timeout, hard: max_dial_timeout });
        }

        // More threads than workers would leave some of them idle.
        let threads = threads.min(workers);

        let m = Self {
            mode,
            addr: server,
            ca_path,
            tls_server_name,
            connections: clients,
            workers,
            threads,
            duration: Duration::from_secs(limit),
            uncached,
            ecs,
            corpus_path: corpus,
            read_timeout: Duration::from_secs(read_timeout),
            dial_timeout,
            max_dial_timeout,
            json,
        };

        Ok(m)
    }
}

#[cfg(test)]
impl Config {
    /// Single worker, single connection, short timeouts.
    pub(crate) fn for_test(mode: Mode, addr: SocketAddr) -> Self {
        Self {
            mode,
            addr,
            ca_path: PathBuf::new(),
            tls_server_name: None,
            connections: NonZero::<usize>::MIN,
            workers: NonZero::<usize>::MIN,
            threads: NonZero::<usize>::MIN,
            duration: Duration::from_secs(1),
            uncached: false,
            ecs: false,
            corpus_path: None,
            read_timeout: Duration::from_secs(1),
            dial_timeout: Duration::from_secs(1),
            max_dial_timeout: Duration::from_secs(2),
            json: false,
        }
    }
}
