//! Benchmarks for TCP and UDP DNS request handling.
//!
//! Measures end-to-end proxy performance against a mock upstream with
//! realistic latency based on public DNS benchmarks:
//! - Cloudflare (1.1.1.1): ~5-18ms average
//! - Google (8.8.8.8): ~7-24ms average
//! We simulate ~15ms average with ±5ms jitter.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::runtime::Runtime;

use fanout::context::Context;
use fanout::dns::{DnsQuery, DnsRecord, DnsResponse, Question, RData, RecordType};
use fanout::lifecycle::Lifecycle;
use fanout::resolver::{EngineConfig, Resolver};
use fanout::servers::ServerRegistry;
use fanout::transport::MAX_DNS_PACKET_SIZE;
use fanout::transport::tcp::TcpTransport;
use fanout::transport::udp::UdpTransport;
use fanout::upstream::NetworkClient;

const TCP_PROXY_ADDR: &str = "127.0.0.1:15354";
const UDP_PROXY_ADDR: &str = "127.0.0.1:15355";
const UPSTREAM_PORT: u16 = 15357;

/// Simulated upstream latency (based on real-world DNS benchmarks)
const BASE_LATENCY_MS: u64 = 15;
const JITTER_MS: u64 = 5;

static NEXT_NAME: AtomicU32 = AtomicU32::new(0);

/// A name never asked before, so the query misses the cache.
fn fresh_question() -> Question {
    let n = NEXT_NAME.fetch_add(1, Ordering::Relaxed);
    Question::new(format!("host{}.example.com", n), RecordType::A)
}

/// Simulate realistic upstream latency with jitter
async fn simulate_upstream_latency() {
    let jitter = rand::rng().random_range(0..=JITTER_MS * 2);
    let latency = BASE_LATENCY_MS - JITTER_MS + jitter;
    tokio::time::sleep(Duration::from_millis(latency)).await;
}

/// Mock authoritative UDP upstream answering every A query with one address.
async fn mock_udp_upstream(socket: Arc<UdpSocket>) {
    let mut buf = [0u8; MAX_DNS_PACKET_SIZE];
    loop {
        let Ok((len, src)) = socket.recv_from(&mut buf).await else {
            continue;
        };
        let Some(query) = DnsQuery::parse(&buf[..len]) else {
            continue;
        };
        let socket = socket.clone();
        tokio::spawn(async move {
            simulate_upstream_latency().await;
            let rdata = RData::A([93, 184, 216, 34].into());
            let answer = DnsRecord::new(query.domain.clone(), RecordType::A, 300, rdata);
            let response = DnsResponse::answer(&query, vec![answer], true);
            let _ = socket.send_to(&response.to_bytes(), src).await;
        });
    }
}

/// Start the mock upstream and both proxy transports on a background runtime.
fn start_proxy() {
    std::thread::spawn(|| {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let upstream_addr: SocketAddr = format!("127.0.0.1:{}", UPSTREAM_PORT).parse().unwrap();
            let socket = Arc::new(UdpSocket::bind(upstream_addr).await.unwrap());
            tokio::spawn(mock_udp_upstream(socket));

            let servers = ServerRegistry::default();
            servers
                .add("127.0.0.1", &[format!("port:{}", UPSTREAM_PORT)])
                .unwrap();
            let ctx = Context {
                servers,
                ..Context::default()
            };
            let resolver = Arc::new(Resolver::new(
                Arc::new(ctx),
                Arc::new(NetworkClient::default()),
                EngineConfig::default(),
            ));

            let lifecycle = Lifecycle::new();
            lifecycle.start().unwrap();
            let tcp = TcpTransport::bind(TCP_PROXY_ADDR.parse().unwrap()).await.unwrap();
            let udp = UdpTransport::bind(UDP_PROXY_ADDR.parse().unwrap()).await.unwrap();
            let _tcp = tcp.start(resolver.clone(), false, lifecycle.stop_signal());
            let _udp = udp.start(resolver, false, lifecycle.stop_signal());

            std::future::pending::<()>().await;
        });
    });

    std::thread::sleep(Duration::from_millis(100));
}

async fn udp_request(proxy_addr: SocketAddr, query: &DnsQuery) -> usize {
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&query.to_bytes(), proxy_addr).await.unwrap();

    let mut buf = [0u8; MAX_DNS_PACKET_SIZE];
    tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap()
        .0
}

async fn tcp_request(proxy_addr: SocketAddr, query: &DnsQuery) -> usize {
    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let wire = query.to_bytes();
    let mut framed = (wire.len() as u16).to_be_bytes().to_vec();
    framed.extend_from_slice(&wire);
    client.write_all(&framed).await.unwrap();

    let mut len_buf = [0u8; 2];
    client.read_exact(&mut len_buf).await.unwrap();
    let mut buf = vec![0u8; u16::from_be_bytes(len_buf) as usize];
    client.read_exact(&mut buf).await.unwrap();
    buf.len()
}

fn bench_udp_request(c: &mut Criterion) {
    start_proxy();

    let rt = Runtime::new().unwrap();
    let proxy_addr: SocketAddr = UDP_PROXY_ADDR.parse().unwrap();
    let cached = DnsQuery::new(1, &fresh_question());
    rt.block_on(udp_request(proxy_addr, &cached));

    let mut group = c.benchmark_group("udp");
    group.throughput(Throughput::Elements(1));

    group.bench_function(BenchmarkId::new("request_handling", "forwarded"), |b| {
        b.to_async(&rt).iter(|| async {
            let query = DnsQuery::new(rand::random(), &fresh_question());
            udp_request(proxy_addr, &query).await
        });
    });

    group.bench_function(BenchmarkId::new("request_handling", "cached"), |b| {
        b.to_async(&rt).iter(|| udp_request(proxy_addr, &cached));
    });

    group.finish();
}

fn bench_tcp_request(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let proxy_addr: SocketAddr = TCP_PROXY_ADDR.parse().unwrap();

    let mut group = c.benchmark_group("tcp");
    group.throughput(Throughput::Elements(1));

    group.bench_function(BenchmarkId::new("request_handling", "forwarded"), |b| {
        b.to_async(&rt).iter(|| async {
            let query = DnsQuery::new(rand::random(), &fresh_question());
            tcp_request(proxy_addr, &query).await
        });
    });

    group.finish();
}

criterion_group!(benches, bench_udp_request, bench_tcp_request);
criterion_main!(benches);
