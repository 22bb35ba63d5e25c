//! Sending queries to name servers.
//!
//! [`NetTransport`] sends over UDP and falls back to TCP when a reply is
//! truncated. Each attempt has its own timeout; only timeouts are retried
//! here, other failures are left to the caller to try another server.

pub mod tcp;
pub mod udp;

use std::net::SocketAddr;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use rand::Rng;
use tracing::{debug, trace};

use crate::dns::Message;
use crate::error::TransportError;

/// Smallest UDP payload every DNS implementation must accept.
pub const MIN_UDP_SIZE: u16 = 512;

/// Exchanges a query with one server.
///
/// Implementations choose the query ID; the reply's question section has
/// already been checked against the query.
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        query: &'a Message,
        server: SocketAddr,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Message, TransportError>>;
}

/// Transport protocol identifier for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    pub do_udp: bool,
    pub do_tcp: bool,
    /// Largest UDP payload we advertise; longer queries go over TCP.
    pub edns_buffer_size: u16,
    /// Receive buffer for UDP replies.
    pub max_udp_size: u16,
    /// Extra attempts after a timeout.
    pub retries: u32,
    pub backoff_base: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            do_udp: true,
            do_tcp: true,
            edns_buffer_size: 1232,
            max_udp_size: 4096,
            retries: 3,
            backoff_base: Duration::from_millis(50),
        }
    }
}

/// UDP with TCP fallback over the host's sockets.
pub struct NetTransport {
    udp: udp::UdpMultiplexer,
    options: TransportOptions,
}

impl NetTransport {
    pub fn new(options: TransportOptions) -> Self {
        Self {
            udp: udp::UdpMultiplexer::new(options.max_udp_size),
            options,
        }
    }

    async fn attempt(
        &self,
        query: &Message,
        server: SocketAddr,
        timeout: Duration,
    ) -> Result<Message, TransportError> {
        let use_udp = self.options.do_udp
            && query.encode().len() <= self.options.edns_buffer_size.max(MIN_UDP_SIZE) as usize;

        if use_udp {
            let reply = self.udp.query(query, server, timeout).await?;
            if !reply.is_truncated() || !self.options.do_tcp {
                return Ok(reply);
            }
            debug!(%server, "truncated reply, retrying over TCP");
        } else if !self.options.do_tcp {
            return Err(TransportError::Io("neither UDP nor TCP is usable".to_string()));
        }

        tcp::query(query, server, timeout).await
    }

    async fn send_with_retry(
        &self,
        query: &Message,
        server: SocketAddr,
        timeout: Duration,
    ) -> Result<Message, TransportError> {
        let mut attempt = 0;
        loop {
            match self.attempt(query, server, timeout).await {
                Err(TransportError::Timeout) if attempt < self.options.retries => {
                    let delay = backoff(self.options.backoff_base, attempt);
                    trace!(%server, attempt, ?delay, "timeout, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl Default for NetTransport {
    fn default() -> Self {
        Self::new(TransportOptions::default())
    }
}

impl Transport for NetTransport {
    fn send<'a>(
        &'a self,
        query: &'a Message,
        server: SocketAddr,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Message, TransportError>> {
        self.send_with_retry(query, server, timeout).boxed()
    }
}

/// Exponential backoff with up to 50% random jitter.
pub fn backoff(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1 << attempt.min(6));
    let jitter = rand::rng().random_range(0..=exp.as_millis() as u64 / 2);
    exp + Duration::from_millis(jitter)
}
