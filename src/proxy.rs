//! DNS proxy orchestration.
//!
//! Loads persisted state, binds transports, runs until Ctrl-C or a stop
//! request, then writes the cache and server table back.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::cache::RecordCache;
use crate::commands::ingest;
use crate::context::Context;
use crate::error::ProxyError;
use crate::filter::Blocklist;
use crate::lifecycle::Lifecycle;
use crate::records::RecordStore;
use crate::resolver::{EngineConfig, Resolver};
use crate::servers::ServerRegistry;
use crate::store::DataDir;
use crate::transport::{tcp::TcpTransport, udp::UdpTransport};
use crate::upstream::NetworkClient;

/// Configuration for the DNS proxy.
pub struct ProxyConfig {
    /// Local address to bind (e.g., 127.0.0.1:5353)
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    /// Per-upstream exchange timeout
    pub upstream_timeout: Duration,
    pub engine: EngineConfig,
    /// Hosts-format block lists, as paths or http(s) URLs
    pub blocklists: Vec<String>,
    pub stats_interval: Duration,
    /// Log every query at info instead of debug
    pub verbose: bool,
}

/// Build the shared context from the data directory and block-list sources.
///
/// A source that fails to load is logged and skipped. Blocking is disabled
/// when neither the stored list nor any source yields a domain.
pub async fn load_context(dir: &DataDir, blocklists: &[String]) -> Result<Context, ProxyError> {
    let servers = ServerRegistry::new(dir.servers().load()?);
    let records = RecordStore::new(dir.records().load()?);
    let cache = RecordCache::from_entries(dir.cache().load()?);

    let blocklist = Blocklist::new();
    blocklist.add_domains(dir.blocklist().load()?);
    for source in blocklists {
        if let Err(e) = ingest(&blocklist, source).await {
            warn!(source = %source, error = %e, "Skipping block list");
        }
    }
    let blocklist = (!blocklist.is_empty()).then_some(blocklist);

    Ok(Context::new(blocklist, servers, cache, records))
}

/// Run the DNS proxy with the given configuration.
///
/// Returns once the lifecycle has been stopped, either by Ctrl-C or by
/// [`Lifecycle::request_stop`].
pub async fn run(config: ProxyConfig, lifecycle: Arc<Lifecycle>) -> Result<(), ProxyError> {
    let dir = DataDir::new(&config.data_dir);
    let ctx = Arc::new(load_context(&dir, &config.blocklists).await?);
    let upstream = Arc::new(NetworkClient::new(config.upstream_timeout));
    let resolver = Arc::new(Resolver::new(ctx.clone(), upstream, config.engine.clone()));

    let udp = UdpTransport::bind(config.bind_addr)
        .await
        .map_err(|source| ProxyError::Bind {
            addr: config.bind_addr,
            source,
        })?;
    let tcp = TcpTransport::bind(config.bind_addr)
        .await
        .map_err(|source| ProxyError::Bind {
            addr: config.bind_addr,
            source,
        })?;

    lifecycle.start()?;

    info!(
        bind = %config.bind_addr,
        servers = ctx.servers.len(),
        records = ctx.records.list().len(),
        cached = ctx.cache.len(),
        blocked = ctx.blocklist.as_ref().map_or(0, Blocklist::len),
        fallback = ?config.engine.fallback,
        "DNS proxy listening"
    );

    let listeners = [
        udp.start(resolver.clone(), config.verbose, lifecycle.stop_signal()),
        tcp.start(resolver.clone(), config.verbose, lifecycle.stop_signal()),
    ];
    let ticker = tokio::spawn(report_stats(ctx.clone(), config.stats_interval, lifecycle.clone()));

    let mut stop = lifecycle.stop_signal();
    tokio::select! {
        _ = stop.stopped() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Shutting down");
            lifecycle.request_stop();
        }
    }

    for handle in listeners {
        let _ = handle.await;
    }
    let _ = ticker.await;

    if let Err(e) = dir.cache().save(&ctx.cache.list()) {
        error!(error = %e, "Failed to save cache");
    }
    if let Err(e) = dir.servers().save(&ctx.servers.list()) {
        error!(error = %e, "Failed to save servers");
    }

    lifecycle.finish();
    Ok(())
}

async fn report_stats(ctx: Arc<Context>, every: Duration, lifecycle: Arc<Lifecycle>) {
    let mut stop = lifecycle.stop_signal();
    let mut interval = tokio::time::interval(every);
    interval.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            _ = stop.stopped() => return,
            _ = interval.tick() => {
                let stats = ctx.stats.snapshot();
                info!(
                    uptime = stats.uptime_secs(),
                    cache = ctx.cache.len(),
                    queries = stats.total_queries,
                    forwarded = stats.forwarded,
                    answered = stats.answered,
                    cached = stats.cache_hits,
                    blocked = stats.blocks,
                    avg_response_ms = stats.avg_response_ms,
                    "Stats"
                );
            }
        }
    }
}
