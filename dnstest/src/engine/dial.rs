use core::{
    future::Future,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};

use tokio::{
    net::{TcpStream, UdpSocket},
    time::Instant,
};
use tokio_rustls::rustls::pki_types::ServerName;

use super::conn::{Connection, Transport};
use crate::{
    cfg::{Config, Mode},
    error::{ConfigError, DialError},
    tls::Credential,
};

/// Connection factory.
pub trait Dial {
    type Conn: Transport;

    /// Establishes a new connection.
    ///
    /// Never retries: a failed dial is reported to the caller.
    fn dial(&self) -> impl Future<Output = Result<Self::Conn, DialError>>;
}

/// Dialer for the configured transport mode and endpoint.
#[derive(Debug)]
pub struct Dialer {
    addr: SocketAddr,
    proto: Proto,
    /// Dial duration after which a warning is logged.
    soft_timeout: Duration,
    /// Dial deadline.
    hard_timeout: Duration,
}

#[derive(Debug)]
enum Proto {
    Udp,
    Tcp,
    Tls {
        credential: Credential,
        server_name: ServerName<'static>,
    },
}

impl Dialer {
    /// Constructs a dialer from the given config.
    ///
    /// A credential is required in TLS mode and ignored otherwise.
    pub fn new(cfg: &Config, credential: Option<Credential>) -> Result<Self, ConfigError> {
        let proto = match (cfg.mode, credential) {
            (Mode::Udp, ..) => Proto::Udp,
            (Mode::Tcp, ..) => Proto::Tcp,
            (Mode::Tls, credential) => {
                let server_name = match &cfg.tls_server_name {
                    Some(name) => ServerName::try_from(name.clone()).map_err(|_| ConfigError::ServerName(name.clone()))?,
                    None => ServerName::from(cfg.addr.ip()),
                };
                let credential = credential.ok_or(ConfigError::MissingCredential)?;

                Proto::Tls { credential, server_name }
            }
        };

        let m = Self {
            addr: cfg.addr,
            proto,
            soft_timeout: cfg.dial_timeout,
            hard_timeout: cfg.max_dial_timeout,
        };

        Ok(m)
    }

    async fn connect(&self) -> Result<Connection, DialError> {
        let conn = match &self.proto {
            Proto::Udp => {
                let bind: SocketAddr = match self.addr {
                    SocketAddr::V4(..) => (Ipv4Addr::UNSPECIFIED, 0).into(),
                    SocketAddr::V6(..) => (Ipv6Addr::UNSPECIFIED, 0).into(),
                };
                let sock = UdpSocket::bind(bind).await?;
                // Connected socket: no need to pass the address on each send,
                // and datagrams from other peers are filtered out.
                sock.connect(self.addr).await?;

                Connection::Udp(sock)
            }
            Proto::Tcp => Connection::Tcp(TcpStream::connect(self.addr).await?),
            Proto::Tls { credential, server_name } => {
                let stream = TcpStream::connect(self.addr).await?;
                let stream = credential
                    .connector()
                    .connect(server_name.clone(), stream)
                    .await
                    .map_err(DialError::Tls)?;

                Connection::Tls(Box::new(stream))
            }
        };

        Ok(conn)
    }

    /// Warns if a dial took longer than the soft threshold, returning whether
    /// it did.
    fn check_delay(&self, elapsed: Duration) -> bool {
        let is_slow = elapsed > self.soft_timeout;
        if is_slow {
            log::warn!("dial warning - delay: {elapsed:?}");
        }

        is_slow
    }
}

impl Dial for Dialer {
    type Conn = Connection;

    async fn dial(&self) -> Result<Connection, DialError> {
        let now = Instant::now();
        let rc = tokio::time::timeout(self.hard_timeout, self.connect()).await;

        self.check_delay(now.elapsed());

        match rc {
            Ok(rc) => rc,
            Err(..) => Err(DialError::Timeout(self.hard_timeout)),
        }
    }
}
