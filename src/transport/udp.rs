//! UDP transport for DNS queries.
//!
//! Each datagram is resolved on its own task, so a slow upstream never
//! holds up the receive loop.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::dns::HEADER_LEN;
use crate::lifecycle::StopSignal;
use crate::resolver::Resolver;

use super::{MAX_DNS_PACKET_SIZE, Protocol, QueryLogger, handle_query};

/// UDP listener feeding the resolver.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawn the receive loop. It exits when `stop` fires.
    pub fn start(
        self,
        resolver: Arc<Resolver>,
        verbose: bool,
        stop: StopSignal,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(run(
            self.socket,
            resolver,
            QueryLogger::new(Protocol::Udp, verbose),
            stop,
        ))
    }
}

async fn run(
    socket: Arc<UdpSocket>,
    resolver: Arc<Resolver>,
    logger: QueryLogger,
    mut stop: StopSignal,
) {
    let mut buf = [0u8; MAX_DNS_PACKET_SIZE];

    loop {
        tokio::select! {
            _ = stop.stopped() => {
                debug!("UDP listener stopping");
                return;
            }
            result = socket.recv_from(&mut buf) => {
                let (len, src) = match result {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(error = %e, "UDP recv error");
                        continue;
                    }
                };

                if len < HEADER_LEN {
                    continue;
                }

                let packet = buf[..len].to_vec();
                let socket = socket.clone();
                let resolver = resolver.clone();
                tokio::spawn(async move {
                    let Some(reply) = handle_query(&resolver, &packet, &logger).await else {
                        return;
                    };
                    if let Err(e) = socket.send_to(&reply, src).await {
                        warn!(client = %src, error = %e, "UDP response error");
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::dns::{DnsQuery, DnsResponse, Question, RecordType};
    use crate::filter::Blocklist;
    use crate::lifecycle::Lifecycle;
    use crate::resolver::EngineConfig;
    use crate::upstream::NetworkClient;
    use std::time::Duration;

    #[tokio::test]
    async fn answers_blocked_query_and_stops() {
        let blocklist = Blocklist::new();
        blocklist.add_domain("ads.example");
        let ctx = Context {
            blocklist: Some(blocklist),
            ..Context::default()
        };
        let resolver = Arc::new(Resolver::new(
            Arc::new(ctx),
            Arc::new(NetworkClient::default()),
            EngineConfig::default(),
        ));

        let lifecycle = Lifecycle::new();
        lifecycle.start().unwrap();
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = transport.local_addr().unwrap();
        let handle = transport.start(resolver, false, lifecycle.stop_signal());

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let query = DnsQuery::new(0x4242, &Question::new("tracker.ads.example", RecordType::A));
        client.send_to(&query.to_bytes(), addr).await.unwrap();

        let mut buf = [0u8; 512];
        let (len, _) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let response = DnsResponse::parse(&buf[..len]).unwrap();
        assert_eq!(response.id, 0x4242);
        assert_eq!(response.answers[0].value(), "0.0.0.0");

        lifecycle.request_stop();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
