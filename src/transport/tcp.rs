//! TCP transport for DNS queries.
//!
//! Each client connection is handled independently. A connection may carry
//! several queries; each is answered in order. TCP DNS messages are prefixed
//! with a 2-byte length.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, trace, warn};

use crate::lifecycle::StopSignal;
use crate::resolver::Resolver;

use super::{Protocol, QueryLogger, handle_query};

/// Idle time allowed between queries on one connection.
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP listener feeding the resolver.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawn the accept loop. It exits when `stop` fires; open connections
    /// finish their current query.
    pub fn start(
        self,
        resolver: Arc<Resolver>,
        verbose: bool,
        stop: StopSignal,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(run_accept_loop(
            self.listener,
            resolver,
            QueryLogger::new(Protocol::Tcp, verbose),
            stop,
        ))
    }
}

async fn run_accept_loop(
    listener: TcpListener,
    resolver: Arc<Resolver>,
    logger: QueryLogger,
    mut stop: StopSignal,
) {
    loop {
        tokio::select! {
            _ = stop.stopped() => {
                debug!("TCP listener stopping");
                return;
            }
            result = listener.accept() => match result {
                Ok((client, peer)) => {
                    let resolver = resolver.clone();
                    tokio::spawn(handle_connection(client, peer, resolver, logger, stop.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
}

async fn handle_connection(
    mut client: TcpStream,
    peer: SocketAddr,
    resolver: Arc<Resolver>,
    logger: QueryLogger,
    mut stop: StopSignal,
) {
    loop {
        let query = tokio::select! {
            _ = stop.stopped() => return,
            read = tokio::time::timeout(IDLE_TIMEOUT, read_dns_message(&mut client)) => match read {
                Ok(Some(query)) => query,
                Ok(None) => return,
                Err(_) => {
                    trace!(client = %peer, "TCP connection idle, closing");
                    return;
                }
            }
        };

        let Some(reply) = handle_query(&resolver, &query, &logger).await else {
            return;
        };

        if let Err(e) = write_dns_message(&mut client, &reply).await {
            warn!(client = %peer, error = %e, "TCP response error");
            return;
        }
    }
}

/// Read one length-prefixed DNS message, without its prefix.
///
/// Returns `None` on EOF or a read error.
async fn read_dns_message(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await.ok()?;

    let mut buf = vec![0u8; u16::from_be_bytes(len_buf) as usize];
    stream.read_exact(&mut buf).await.ok()?;

    Some(buf)
}

async fn write_dns_message(stream: &mut TcpStream, message: &[u8]) -> io::Result<()> {
    let mut framed = Vec::with_capacity(message.len() + 2);
    framed.extend_from_slice(&(message.len() as u16).to_be_bytes());
    framed.extend_from_slice(message);

    stream.write_all(&framed).await
}
