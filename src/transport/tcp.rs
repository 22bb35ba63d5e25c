//! TCP transport for DNS queries.
//!
//! Used when a UDP reply comes back truncated or the query is too large for
//! a datagram. One connection per query; messages carry a 2-byte length
//! prefix.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::trace;

use super::Protocol;
use crate::dns::Message;
use crate::error::{TransportError, WireError};

/// Send `query` to `server` over a fresh connection.
pub async fn query(
    query: &Message,
    server: SocketAddr,
    timeout: Duration,
) -> Result<Message, TransportError> {
    let mut outgoing = query.clone();
    outgoing.header.id = rand::rng().random();

    let reply = tokio::time::timeout(timeout, exchange(&outgoing, server))
        .await
        .map_err(|_| TransportError::Timeout)??;

    if !reply.answers_query(&outgoing) {
        return Err(TransportError::Mismatch);
    }
    Ok(reply)
}

async fn exchange(query: &Message, server: SocketAddr) -> Result<Message, TransportError> {
    let mut stream = TcpStream::connect(server).await?;
    trace!(protocol = Protocol::Tcp.as_str(), %server, "connected");

    write_dns_message(&mut stream, &query.encode()).await?;
    let bytes = read_dns_message(&mut stream).await?;
    Ok(Message::decode(&bytes)?)
}

/// Write one length-prefixed DNS message.
pub async fn write_dns_message<W>(stream: &mut W, message: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let len = u16::try_from(message.len()).map_err(|_| WireError::TooLarge(u16::MAX as usize))?;
    let mut framed = Vec::with_capacity(2 + message.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(message);
    stream.write_all(&framed).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one length-prefixed DNS message, without its prefix.
pub async fn read_dns_message<R>(stream: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = stream.read_u16().await? as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}
