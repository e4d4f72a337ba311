use core::{net::SocketAddr, num::NonZero};
use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::cfg::Mode;

/// DNS load generator.
///
/// Drives a fixed pool of connections to a single resolver from a set of
/// concurrent workers and reports the achieved QPS and the average RTT.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Cmd {
    /// Protocol [udp, tcp, tls].
    #[clap(short = 'p', long = "proto", default_value = "udp")]
    pub mode: Mode,
    /// Server endpoint (addr:port).
    #[clap(short, long, default_value = "127.0.0.1:53")]
    pub server: SocketAddr,
    /// CA cert path (for TLS mode).
    #[clap(short = 'c', long, value_name = "PATH", default_value = "publickey.cer")]
    pub ca_path: PathBuf,
    /// Name to verify the server certificate against (for TLS mode).
    ///
    /// Defaults to the IP address of the server endpoint.
    #[clap(long, value_name = "NAME")]
    pub tls_server_name: Option<String>,
    /// Number of clients to emulate, i.e. the connection pool size.
    #[clap(short = 'n', long, default_value_t = NonZero::new(100).unwrap())]
    pub clients: NonZero<usize>,
    /// Number of workers.
    ///
    /// If there are more workers than clients, the excess workers wait for a
    /// free connection.
    #[clap(short, long, default_value_t = NonZero::new(100).unwrap())]
    pub workers: NonZero<usize>,
    /// Number of threads the workers are spread over.
    #[clap(short, long, default_value_t = std::thread::available_parallelism().unwrap_or(NonZero::<usize>::MIN))]
    pub threads: NonZero<usize>,
    /// Time limit (seconds).
    #[clap(short, long, default_value_t = 10)]
    pub limit: u64,
    /// Use uncached queries.
    #[clap(short, long)]
    pub uncached: bool,
    /// Insert random ECS to queries.
    #[clap(short, long)]
    pub ecs: bool,
    /// Data filename (use predefined list if empty).
    #[clap(short = 'f', long = "file", value_name = "PATH")]
    pub corpus: Option<PathBuf>,
    /// Read timeout (seconds).
    #[clap(long, default_value_t = 5)]
    pub read_timeout: u64,
    /// Dial timeout (seconds), exceeding it is reported as a warning.
    #[clap(long, default_value_t = 2)]
    pub dial_timeout: u64,
    /// Max dial timeout (seconds), exceeding it fails the dial.
    #[clap(long, default_value_t = 10)]
    pub max_dial_timeout: u64,
    /// Print the final report as JSON.
    #[clap(long)]
    pub json: bool,
    /// Be verbose in terms of logging.
    #[clap(short, action = ArgAction::Count)]
    pub verbose: u8,
}
