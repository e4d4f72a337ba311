use core::future::Future;
use std::io::{Error, ErrorKind};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpStream, UdpSocket},
};
use tokio_rustls::client::TlsStream;

/// Maximum size of a DNS message over any transport.
const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// Message-oriented connection to the resolver.
///
/// Implementations carry exactly one DNS message per `send`/`recv` call and
/// hide transport framing.
pub trait Transport {
    /// Sends a single message.
    fn send(&mut self, msg: &[u8]) -> impl Future<Output = Result<(), Error>>;

    /// Receives a single message.
    fn recv(&mut self) -> impl Future<Output = Result<Vec<u8>, Error>>;
}

/// Live connection for one of the supported transports.
#[derive(Debug)]
pub enum Connection {
    Udp(UdpSocket),
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport for Connection {
    async fn send(&mut self, msg: &[u8]) -> Result<(), Error> {
        match self {
            Self::Udp(sock) => {
                let n = sock.send(msg).await?;
                if n != msg.len() {
                    return Err(Error::new(ErrorKind::WriteZero, "truncated datagram"));
                }
                Ok(())
            }
            Self::Tcp(stream) => write_frame(stream, msg).await,
            Self::Tls(stream) => write_frame(stream.as_mut(), msg).await,
        }
    }

    async fn recv(&mut self) -> Result<Vec<u8>, Error> {
        match self {
            Self::Udp(sock) => {
                let mut buf = vec![0; MAX_MESSAGE_SIZE];
                let n = sock.recv(&mut buf).await?;
                buf.truncate(n);
                Ok(buf)
            }
            Self::Tcp(stream) => read_frame(stream).await,
            Self::Tls(stream) => read_frame(stream.as_mut()).await,
        }
    }
}

/// Writes a message prefixed with its 2-byte length, as a single write.
pub(super) async fn write_frame<S>(stream: &mut S, msg: &[u8]) -> Result<(), Error>
where
    S: AsyncWrite + Unpin,
{
    let len = u16::try_from(msg.len()).map_err(|_| Error::new(ErrorKind::InvalidInput, "message too large"))?;

    let mut buf = Vec::with_capacity(2 + msg.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(msg);
    stream.write_all(&buf).await?;
    stream.flush().await
}

/// Reads a single length-prefixed message.
pub(super) async fn read_frame<S>(stream: &mut S) -> Result<Vec<u8>, Error>
where
    S: AsyncRead + Unpin,
{
    let len = stream.read_u16().await? as usize;
    let mut buf = vec![0; len];
    stream.read_exact(&mut buf).await?;

    Ok(buf)
}
