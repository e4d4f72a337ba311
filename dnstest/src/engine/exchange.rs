use core::time::Duration;
use std::io::{Error, ErrorKind};

use domain::base::Message;
use tokio::time::Instant;

use super::conn::Transport;
use crate::{error::ExchangeError, message::Request, stat::Stat};

/// Response codes treated as a successful resolution: NOERROR and NXDOMAIN.
const ACCEPTED_RCODES: [u8; 2] = [0, 3];

/// Performs a single request/response round trip over the given connection.
///
/// Statistics are updated only when the response correlates with the request
/// and carries an accepted response code. Any error means the connection
/// must not be reused.
pub async fn exchange<C>(conn: &mut C, req: &Request, read_timeout: Duration, stat: &Stat) -> Result<(), ExchangeError>
where
    C: Transport,
{
    let now = Instant::now();

    conn.send(req.as_slice()).await.map_err(ExchangeError::Write)?;

    let buf = match tokio::time::timeout(read_timeout, conn.recv()).await {
        Ok(buf) => buf.map_err(ExchangeError::Read)?,
        Err(..) => {
            return Err(ExchangeError::Read(Error::new(ErrorKind::TimedOut, "read timed out")));
        }
    };

    let msg = Message::from_octets(buf)
        .map_err(|err| ExchangeError::Read(Error::new(ErrorKind::InvalidData, err.to_string())))?;

    let header = msg.header();
    if header.id() != req.id() {
        return Err(ExchangeError::IdMismatch { expected: req.id(), actual: header.id() });
    }

    let rcode = header.rcode().to_int();
    if !ACCEPTED_RCODES.contains(&rcode) {
        return Err(ExchangeError::BadRcode(rcode));
    }

    stat.on_exchange(now.elapsed());

    Ok(())
}
