use core::{error::Error, future};
use std::{thread::Builder, time::Instant};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::{
    cfg::{Config, Mode},
    corpus::Corpus,
    engine::{Dial, Dialer, Engine},
    message::MessageFactory,
    stat::Snapshot,
    tls,
};

/// Run orchestrator.
///
/// Loads everything the engine needs, runs it for the configured duration
/// (or until interrupted), then stops every worker and takes the final
/// statistics snapshot.
#[derive(Debug)]
pub struct Runtime {
    cfg: Config,
    cancel: CancellationToken,
}

impl Runtime {
    pub fn new(cfg: Config) -> Self {
        Self { cfg, cancel: CancellationToken::new() }
    }

    /// Returns the token that stops this run early when cancelled.
    #[inline]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(self) -> Result<Snapshot, Box<dyn Error>> {
        let credential = match self.cfg.mode {
            Mode::Tls => Some(tls::load(&self.cfg.ca_path)?),
            Mode::Udp | Mode::Tcp => None,
        };

        let corpus = match &self.cfg.corpus_path {
            Some(path) => Corpus::from_fs(path)?,
            None => Corpus::default(),
        };
        log::debug!("using {} domain names", corpus.len());

        let dialer = Dialer::new(&self.cfg, credential)?;
        let factory = MessageFactory::new(corpus, self.cfg.uncached, self.cfg.ecs);
        let engine = Engine::new(&self.cfg, dialer, factory);

        self.run_engine(engine).await
    }

    async fn run_engine<D>(&self, engine: Engine<D>) -> Result<Snapshot, Box<dyn Error>>
    where
        D: Dial + Send + Sync + 'static,
        D::Conn: Send + 'static,
    {
        let cfg = &self.cfg;
        log::info!(
            "running {} against {} - connections: {}, workers: {}, threads: {}, duration: {:?}",
            cfg.mode,
            cfg.addr,
            cfg.connections,
            cfg.workers,
            cfg.threads,
            cfg.duration,
        );

        let stat = engine.stat();
        let now = Instant::now();

        // Resolves once the engine returns, or panics and drops the sender.
        let (tx, stopped) = oneshot::channel::<()>();
        let engine = {
            let cancel = self.cancel.clone();
            Builder::new().name("dnstest:engine".into()).spawn(move || {
                let rc = engine.run(cancel);
                let _ = tx.send(());
                rc
            })?
        };

        tokio::select! {
            _ = tokio::time::sleep(cfg.duration) => {}
            _ = interrupted() => {
                log::info!("interrupted, stopping");
            }
            _ = self.cancel.cancelled() => {}
            _ = stopped => {
                log::warn!("engine stopped before the run was over");
            }
        }
        let elapsed = now.elapsed();
        self.cancel.cancel();

        tokio::task::spawn_blocking(move || engine.join())
            .await?
            .map_err(|_| "engine thread panicked")??;

        let snapshot = stat.snapshot(elapsed);
        log::info!(
            "finished in {elapsed:?} - sockets created: {}, dial errors: {}, exchange errors: {}, \
             RTT p50: {:.6}, p90: {:.6}, p99: {:.6}",
            snapshot.sock_created,
            snapshot.dial_errors,
            snapshot.exchange_errors,
            snapshot.p50,
            snapshot.p90,
            snapshot.p99,
        );

        Ok(snapshot)
    }
}

/// Resolves on Ctrl-C.
///
/// Never resolves if the signal handler can not be installed.
async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::warn!("failed to listen for interrupts: {err}");
        future::pending::<()>().await;
    }
}

#[cfg(test)]
mod test {
    use core::{num::NonZero, time::Duration};
    use std::{io::Write, path::PathBuf};

    use tokio::net::UdpSocket;

    use super::*;
    use crate::{
        engine::Connection,
        error::{CorpusError, CredentialError, DialError},
    };

    /// Brings down the worker thread on the first dial.
    struct PanicDialer;

    impl Dial for PanicDialer {
        type Conn = Connection;

        async fn dial(&self) -> Result<Connection, DialError> {
            panic!("dial failed");
        }
    }

    /// Answers every query with NOERROR.
    async fn responder() -> std::net::SocketAddr {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = sock.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = vec![0; 512];
            loop {
                let (n, peer) = sock.recv_from(&mut buf).await.unwrap();
                buf[2] |= 0x80;
                sock.send_to(&buf[..n], peer).await.unwrap();
            }
        });

        addr
    }

    fn config(mode: Mode, addr: std::net::SocketAddr) -> Config {
        let mut cfg = Config::for_test(mode, addr);
        cfg.connections = NonZero::new(2).unwrap();
        cfg.workers = NonZero::new(4).unwrap();
        cfg.threads = NonZero::new(2).unwrap();
        cfg.duration = Duration::from_millis(300);
        cfg
    }

    #[tokio::test]
    async fn udp_run_against_loopback() {
        let cfg = config(Mode::Udp, responder().await);

        let snapshot = Runtime::new(cfg).run().await.unwrap();

        assert!(snapshot.completed > 0);
        assert!(snapshot.qps > 0);
        assert!(snapshot.rtt > 0.0);
        assert!(snapshot.sock_created <= 2);
        assert_eq!(0, snapshot.dial_errors);
    }

    #[tokio::test]
    async fn cancel_stops_run_early() {
        let mut cfg = config(Mode::Udp, responder().await);
        cfg.duration = Duration::from_secs(3600);

        let runtime = Runtime::new(cfg);
        let cancel = runtime.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let snapshot = runtime.run().await.unwrap();
        assert!(snapshot.completed > 0);
    }

    #[tokio::test]
    async fn tls_without_ca_file_fails() {
        let mut cfg = config(Mode::Tls, "127.0.0.1:853".parse().unwrap());
        cfg.ca_path = PathBuf::from("/nonexistent/ca.pem");

        let err = Runtime::new(cfg).run().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CredentialError>(), Some(CredentialError::Io { .. })));
    }

    #[tokio::test]
    async fn invalid_corpus_fails() {
        let path = std::env::temp_dir().join(format!("dnstest-runtime-corpus-{}", std::process::id()));
        std::fs::File::create(&path).unwrap().write_all(b"\n  \n").unwrap();

        let mut cfg = config(Mode::Udp, "127.0.0.1:53".parse().unwrap());
        cfg.corpus_path = Some(path.clone());

        let err = Runtime::new(cfg).run().await.unwrap_err();
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(err.downcast_ref::<CorpusError>(), Some(CorpusError::Empty(..))));
    }

    #[tokio::test]
    async fn engine_failure_ends_run_early() {
        let mut cfg = config(Mode::Udp, "127.0.0.1:53".parse().unwrap());
        cfg.duration = Duration::from_secs(3600);
        let factory = MessageFactory::new(Corpus::default(), false, false);
        let engine = Engine::new(&cfg, PanicDialer, factory);

        let runtime = Runtime::new(cfg);
        let rc = tokio::time::timeout(Duration::from_secs(10), runtime.run_engine(engine)).await;

        assert!(matches!(rc, Ok(Err(..))));
    }
}
