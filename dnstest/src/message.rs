//! Request construction.

use core::{
    net::{IpAddr, Ipv4Addr},
    sync::atomic::{AtomicU64, Ordering},
};

use domain::base::{iana::Rtype, MessageBuilder, Name};
use rand::Rng;

use crate::{corpus::Corpus, error::MessageError};

/// EDNS UDP payload size advertised with the client subnet option.
const UDP_PAYLOAD_SIZE: u16 = 4096;
/// Source prefix length of generated client subnets.
const SUBNET_PREFIX_LEN: u8 = 24;

/// Single DNS query, ready to be sent.
#[derive(Debug, Clone)]
pub struct Request {
    id: u16,
    qname: String,
    wire: Vec<u8>,
}

impl Request {
    /// Returns the transaction identifier.
    #[inline]
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Returns the question name.
    #[inline]
    pub fn qname(&self) -> &str {
        &self.qname
    }

    /// Returns the message in wire format, without any transport framing.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.wire
    }
}

/// Thread-safe request producer.
///
/// Each [`MessageFactory::next`] call advances the shared sequence number, so
/// concurrent callers never observe the same sequence.
#[derive(Debug)]
pub struct MessageFactory {
    corpus: Corpus,
    seq: AtomicU64,
    uncached: bool,
    ecs: bool,
}

impl MessageFactory {
    pub fn new(corpus: Corpus, uncached: bool, ecs: bool) -> Self {
        Self {
            corpus,
            seq: AtomicU64::new(0),
            uncached,
            ecs,
        }
    }

    /// Advances the sequence number and builds the corresponding request.
    #[inline]
    pub fn next(&self) -> Result<Request, MessageError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.build(seq)
    }

    /// Builds the request for the given sequence number.
    ///
    /// The question name depends on the sequence only. The transaction id
    /// and the client subnet address are random.
    pub fn build(&self, seq: u64) -> Result<Request, MessageError> {
        let domain = self.corpus.get(seq);
        let qname = if self.uncached {
            format!("{seq}.{domain}")
        } else {
            domain.to_string()
        };

        let name = Name::<Vec<u8>>::vec_from_str(&qname).map_err(|err| MessageError::Name {
            name: qname.clone(),
            reason: err.to_string(),
        })?;

        let mut msg = MessageBuilder::new_vec();
        msg.header_mut().set_random_id();
        msg.header_mut().set_rd(true);
        let id = msg.header().id();

        let mut msg = msg.question();
        msg.push((name, Rtype::A))
            .map_err(|err| MessageError::Push(err.to_string()))?;

        let wire = if self.ecs {
            let addr = random_subnet();
            let mut msg = msg.additional();
            msg.opt(|opt| {
                opt.set_udp_payload_size(UDP_PAYLOAD_SIZE);
                opt.client_subnet(SUBNET_PREFIX_LEN, 0, addr)
            })
            .map_err(|err| MessageError::Push(err.to_string()))?;
            msg.finish()
        } else {
            msg.finish()
        };

        let m = Request { id, qname, wire };

        Ok(m)
    }
}

/// Returns a random IPv4 /24 network address with non-zero, non-broadcast
/// octets.
fn random_subnet() -> IpAddr {
    let mut rng = rand::thread_rng();
    let o1 = rng.gen_range(1..=254);
    let o2 = rng.gen_range(1..=254);
    let o3 = rng.gen_range(1..=254);

    IpAddr::V4(Ipv4Addr::new(o1, o2, o3, 0))
}
