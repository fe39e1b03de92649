//! Upstream DNS exchange.
//!
//! The resolver talks to upstreams only through [`UpstreamClient`], so tests
//! and alternative transports can be injected.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::trace;

use crate::dns::{DnsQuery, DnsResponse, Question};
use crate::error::UpstreamError;
use crate::transport::MAX_DNS_PACKET_SIZE;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Sends one question to one upstream server.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn query(
        &self,
        question: &Question,
        server: SocketAddr,
    ) -> Result<DnsResponse, UpstreamError>;
}

/// UDP client that retries over TCP when the reply is truncated.
///
/// The whole exchange, including any TCP retry, is bounded by `timeout`.
pub struct NetworkClient {
    timeout: Duration,
}

impl NetworkClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn exchange(
        &self,
        query: &DnsQuery,
        server: SocketAddr,
    ) -> Result<DnsResponse, UpstreamError> {
        let wire = query.to_bytes();
        let response = query_udp(&wire, query.id, server).await?;

        if response.is_truncated() {
            trace!(%server, "Response truncated, retrying with TCP");
            let response = query_tcp(&wire, server).await?;
            check_id(&response, query.id, server)?;
            return Ok(response);
        }

        Ok(response)
    }
}

impl Default for NetworkClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl UpstreamClient for NetworkClient {
    async fn query(
        &self,
        question: &Question,
        server: SocketAddr,
    ) -> Result<DnsResponse, UpstreamError> {
        let query = DnsQuery::new(rand::random(), question);

        timeout(self.timeout, self.exchange(&query, server))
            .await
            .map_err(|_| UpstreamError::Timeout(server))?
    }
}

fn check_id(response: &DnsResponse, id: u16, server: SocketAddr) -> Result<(), UpstreamError> {
    if response.id != id {
        return Err(UpstreamError::IdMismatch(server));
    }
    Ok(())
}

/// Datagrams that do not parse or carry another ID are skipped; the caller's
/// timeout bounds the wait for the real reply.
async fn query_udp(
    wire: &[u8],
    id: u16,
    server: SocketAddr,
) -> Result<DnsResponse, UpstreamError> {
    let bind = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(server).await?;
    socket.send(wire).await?;

    let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];
    loop {
        let len = socket.recv(&mut buf).await?;
        match DnsResponse::parse(&buf[..len]) {
            Ok(response) if response.id == id => return Ok(response),
            Ok(response) => {
                trace!(%server, expected = id, got = response.id, "Ignoring stray reply")
            }
            Err(e) => trace!(%server, error = %e, "Ignoring malformed reply"),
        }
    }
}

/// TCP DNS messages are prefixed with a 2-byte big-endian length.
async fn query_tcp(wire: &[u8], server: SocketAddr) -> Result<DnsResponse, UpstreamError> {
    let mut stream = TcpStream::connect(server).await?;

    let mut framed = Vec::with_capacity(wire.len() + 2);
    framed.extend_from_slice(&(wire.len() as u16).to_be_bytes());
    framed.extend_from_slice(wire);
    stream.write_all(&framed).await?;

    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let mut buf = vec![0u8; u16::from_be_bytes(len_buf) as usize];
    stream.read_exact(&mut buf).await?;

    Ok(DnsResponse::parse(&buf)?)
}
