//! UDP transport for DNS queries.
//!
//! One socket per address family is shared by every outstanding query.
//! Replies are routed back by query ID and source address; a reply that
//! matches neither, or whose question differs from the one asked, is
//! dropped and the query keeps waiting.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::Rng;
use rustc_hash::FxHashMap;
use tokio::net::UdpSocket;
use tokio::sync::{OnceCell, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::Protocol;
use crate::dns::{Message, Question};
use crate::error::{TransportError, WireError};

type PendingKey = (u16, SocketAddr);
type PendingTable = Arc<Mutex<FxHashMap<PendingKey, PendingQuery>>>;

struct PendingQuery {
    questions: Vec<Question>,
    reply: oneshot::Sender<Result<Message, WireError>>,
}

/// Removes the pending entry when the attempt finishes or is dropped.
struct PendingGuard {
    pending: PendingTable,
    key: PendingKey,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.key);
    }
}

fn lock(table: &PendingTable) -> std::sync::MutexGuard<'_, FxHashMap<PendingKey, PendingQuery>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SharedSocket {
    socket: Arc<UdpSocket>,
    pending: PendingTable,
    receiver: JoinHandle<()>,
}

impl SharedSocket {
    async fn bind(local: SocketAddr, max_udp_size: u16) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(local).await?);
        let pending: PendingTable = Arc::default();
        let receiver = tokio::spawn(run(
            socket.clone(),
            pending.clone(),
            max_udp_size as usize,
        ));
        debug!(local = %socket.local_addr()?, "UDP socket bound");
        Ok(Self {
            socket,
            pending,
            receiver,
        })
    }

    /// Claim an ID not already pending for `server`.
    fn register(
        &self,
        server: SocketAddr,
        questions: &[Question],
    ) -> (u16, oneshot::Receiver<Result<Message, WireError>>, PendingGuard) {
        let (tx, rx) = oneshot::channel();
        let mut table = lock(&self.pending);
        let mut rng = rand::rng();
        let id = loop {
            let id: u16 = rng.random();
            if !table.contains_key(&(id, server)) {
                break id;
            }
        };
        table.insert(
            (id, server),
            PendingQuery {
                questions: questions.to_vec(),
                reply: tx,
            },
        );
        let guard = PendingGuard {
            pending: self.pending.clone(),
            key: (id, server),
        };
        (id, rx, guard)
    }
}

impl Drop for SharedSocket {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

/// Receive loop: route each datagram to the query waiting for it.
async fn run(socket: Arc<UdpSocket>, pending: PendingTable, max_udp_size: usize) {
    let mut buf = vec![0u8; max_udp_size.max(super::MIN_UDP_SIZE as usize)];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                // ICMP errors surface here on some platforms; keep going.
                trace!(error = %e, "UDP recv error");
                continue;
            }
        };

        dispatch(&pending, &buf[..len], src);
    }
}

fn dispatch(pending: &PendingTable, datagram: &[u8], src: SocketAddr) {
    if datagram.len() < 2 {
        return;
    }
    let id = u16::from_be_bytes([datagram[0], datagram[1]]);
    let key = (id, src);

    let mut table = lock(pending);
    let Some(waiting) = table.get(&key) else {
        debug!(id, %src, "discarding reply with unknown id or source");
        return;
    };

    let outcome = match Message::decode(datagram) {
        Ok(reply) if !reply.header.qr || reply.questions != waiting.questions => {
            debug!(id, %src, "discarding reply with mismatched question");
            return;
        }
        Ok(reply) => Ok(reply),
        Err(e) => {
            warn!(id, %src, error = %e, "malformed reply");
            Err(e)
        }
    };

    if let Some(waiting) = table.remove(&key) {
        let _ = waiting.reply.send(outcome);
    }
}

/// Multiplexes queries over lazily bound IPv4 and IPv6 sockets.
pub struct UdpMultiplexer {
    v4: OnceCell<SharedSocket>,
    v6: OnceCell<SharedSocket>,
    max_udp_size: u16,
}

impl UdpMultiplexer {
    pub fn new(max_udp_size: u16) -> Self {
        Self {
            v4: OnceCell::new(),
            v6: OnceCell::new(),
            max_udp_size,
        }
    }

    async fn socket_for(&self, server: SocketAddr) -> io::Result<&SharedSocket> {
        let (cell, local) = match server {
            SocketAddr::V4(_) => (&self.v4, SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))),
            SocketAddr::V6(_) => (&self.v6, SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))),
        };
        cell.get_or_try_init(|| SharedSocket::bind(local, self.max_udp_size))
            .await
    }

    /// Send `query` to `server` and wait up to `timeout` for the matching
    /// reply. Dropping the returned future abandons the attempt.
    pub async fn query(
        &self,
        query: &Message,
        server: SocketAddr,
        timeout: Duration,
    ) -> Result<Message, TransportError> {
        let shared = self.socket_for(server).await?;
        let (id, rx, _guard) = shared.register(server, &query.questions);

        let mut outgoing = query.clone();
        outgoing.header.id = id;
        shared.socket.send_to(&outgoing.encode(), server).await?;
        trace!(
            protocol = Protocol::Udp.as_str(),
            id,
            %server,
            "query sent"
        );

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply?),
            Ok(Err(_)) => Err(TransportError::Io("UDP receiver stopped".to_string())),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Queries currently waiting for a reply.
    pub fn pending(&self) -> usize {
        [&self.v4, &self.v6]
            .iter()
            .filter_map(|cell| cell.get())
            .map(|shared| lock(&shared.pending).len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{RData, Record, class, rtype};

    fn query(name: &str) -> Message {
        Message::query(
            0,
            Question::new(name.parse().unwrap(), rtype::A, class::IN),
            false,
        )
    }

    fn answer(query: &Message, last_octet: u8) -> Message {
        let mut reply = Message::response_to(query);
        reply.answers.push(Record::from_data(
            query.questions[0].name.clone(),
            class::IN,
            60,
            &RData::A(Ipv4Addr::new(192, 0, 2, last_octet)),
        ));
        reply
    }

    #[tokio::test]
    async fn mismatched_replies_are_discarded() {
        let server_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = server_socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, peer) = server_socket.recv_from(&mut buf).await.unwrap();
            let query = Message::decode(&buf[..len]).unwrap();

            // Wrong id.
            let mut spoof = answer(&query, 66);
            spoof.header.id = query.header.id.wrapping_add(1);
            server_socket.send_to(&spoof.encode(), peer).await.unwrap();

            // Right id, wrong question.
            let mut other = answer(&query, 67);
            other.questions[0].name = "evil.example".parse().unwrap();
            server_socket.send_to(&other.encode(), peer).await.unwrap();

            // Garbage.
            server_socket.send_to(&[0xff], peer).await.unwrap();

            server_socket
                .send_to(&answer(&query, 1).encode(), peer)
                .await
                .unwrap();
        });

        let mux = UdpMultiplexer::new(4096);
        let reply = mux
            .query(&query("example.com"), server, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(
            reply.answers[0].data().unwrap(),
            RData::A(Ipv4Addr::new(192, 0, 2, 1))
        );
        assert_eq!(mux.pending(), 0);
    }

    #[tokio::test]
    async fn concurrent_queries_share_one_socket() {
        let server_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = server_socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let mut held = Vec::new();
            // Answer in reverse arrival order.
            for _ in 0..2 {
                let (len, peer) = server_socket.recv_from(&mut buf).await.unwrap();
                held.push((Message::decode(&buf[..len]).unwrap(), peer));
            }
            for (i, (query, peer)) in held.iter().rev().enumerate() {
                server_socket
                    .send_to(&answer(query, i as u8 + 10).encode(), peer)
                    .await
                    .unwrap();
            }
        });

        let mux = UdpMultiplexer::new(4096);
        let qa = query("a.example");
        let qb = query("b.example");
        let (a, b) = tokio::join!(
            mux.query(&qa, server, Duration::from_secs(2)),
            mux.query(&qb, server, Duration::from_secs(2)),
        );
        assert_eq!(a.unwrap().questions[0].name, "a.example".parse().unwrap());
        assert_eq!(b.unwrap().questions[0].name, "b.example".parse().unwrap());
    }

    #[tokio::test]
    async fn dropped_attempt_deregisters() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = silent.local_addr().unwrap();
        let mux = UdpMultiplexer::new(4096);

        let q = query("example.com");
        let attempt = mux.query(&q, server, Duration::from_secs(30));
        let result = tokio::time::timeout(Duration::from_millis(50), attempt).await;
        assert!(result.is_err());
        assert_eq!(mux.pending(), 0);
        drop(silent);
    }
}
