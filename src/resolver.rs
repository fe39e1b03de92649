//! DNS query resolution logic.
//!
//! Handles the core query processing pipeline:
//! 1. Cache lookup
//! 2. Filter (block ads/trackers)
//! 3. Static records
//! 4. Upstream selection (whitelist routing vs. global servers)
//! 5. Race the selected upstreams, falling back if none is authoritative
//! 6. Cache the answer
//!
//! Transports handle the actual I/O, the resolver handles decisions.

use chrono::Utc;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::context::Context;
use crate::dns::{DnsQuery, DnsRecord, DnsResponse, Question, rcode};
use crate::domain;
use crate::error::ResolveError;
use crate::filter::filter_query;
use crate::servers::Selection;
use crate::upstream::UpstreamClient;

/// Resolver settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Last-resort upstream for globally routed names.
    pub fallback: Option<SocketAddr>,
    /// Only authoritative replies may win a race.
    pub require_authoritative: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback: None,
            require_authoritative: true,
        }
    }
}

/// How a query was answered.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Served from fresh cache entries.
    Cached(Vec<DnsRecord>),
    /// Matched the blocklist, sinkhole answer.
    Blocked(Vec<DnsRecord>),
    /// Answered from static records.
    Local(Vec<DnsRecord>),
    /// Reply from an upstream (race winner or fallback).
    Forwarded {
        server: SocketAddr,
        response: DnsResponse,
    },
}

impl Resolution {
    /// Build the reply for the client's query.
    pub fn into_response(self, query: &DnsQuery) -> DnsResponse {
        match self {
            Resolution::Cached(records) | Resolution::Blocked(records) => {
                DnsResponse::answer(query, records, false)
            }
            Resolution::Local(records) => DnsResponse::answer(query, records, true),
            Resolution::Forwarded { response, .. } => DnsResponse::relay(query, response),
        }
    }
}

impl ResolveError {
    /// Response code to send the client for this failure.
    pub fn rcode(&self) -> u8 {
        match self {
            ResolveError::WhitelistDenied(_) => rcode::REFUSED,
            _ => rcode::SERVFAIL,
        }
    }
}

/// Resolver runs the query pipeline against shared state.
///
/// Contains all shared logic between transports: caching, filtering,
/// upstream selection and racing. Transports call this for every query.
pub struct Resolver {
    ctx: Arc<Context>,
    upstream: Arc<dyn UpstreamClient>,
    config: EngineConfig,
}

impl Resolver {
    pub fn new(ctx: Arc<Context>, upstream: Arc<dyn UpstreamClient>, config: EngineConfig) -> Self {
        Self {
            ctx,
            upstream,
            config,
        }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Resolve one question.
    ///
    /// Dropping the returned future cancels every upstream request it started.
    pub async fn resolve(&self, question: &Question) -> Result<Resolution, ResolveError> {
        let start = Instant::now();
        self.ctx.stats.record_query();

        let question = Question::new(domain::normalize(&question.name), question.qtype);
        let result = self.run_pipeline(&question).await;

        self.ctx.stats.record_response_time(start.elapsed());
        result
    }

    async fn run_pipeline(&self, question: &Question) -> Result<Resolution, ResolveError> {
        let ctx = &self.ctx;

        let cached = ctx.cache.lookup(&question.name, question.qtype, Utc::now());
        if !cached.is_empty() {
            ctx.stats.record_cache_hit();
            return Ok(Resolution::Cached(cached));
        }

        if let Some(sinkhole) = filter_query(ctx.blocklist.as_ref(), question) {
            ctx.stats.record_blocked();
            return Ok(Resolution::Blocked(sinkhole));
        }

        let local = ctx.records.lookup(&question.name, question.qtype);
        if !local.is_empty() {
            return Ok(Resolution::Local(local));
        }

        let selection = ctx.servers.select(&question.name, true);
        let (server, response) = self.forward(question, selection).await?;

        let answered = response.rcode() == rcode::NOERROR && !response.answers.is_empty();
        if answered {
            for record in &response.answers {
                ctx.cache.add(record);
            }
        }
        ctx.stats.record_forwarded(answered);

        Ok(Resolution::Forwarded { server, response })
    }

    async fn forward(
        &self,
        question: &Question,
        selection: Selection,
    ) -> Result<(SocketAddr, DnsResponse), ResolveError> {
        match selection {
            Selection::Denied => {
                debug!(question = %question, "Whitelist servers inactive, refusing");
                Err(ResolveError::WhitelistDenied(question.name.clone()))
            }
            Selection::Exclusive(servers) => self
                .race(question, &servers)
                .await
                .ok_or_else(|| ResolveError::NoAuthoritativeAnswer(question.name.clone())),
            Selection::Global(servers) => {
                if !servers.is_empty() {
                    if let Some(winner) = self.race(question, &servers).await {
                        return Ok(winner);
                    }
                }
                match self.config.fallback {
                    Some(fallback) => self.query_fallback(question, fallback).await,
                    None if servers.is_empty() => {
                        Err(ResolveError::NoUpstream(question.name.clone()))
                    }
                    None => Err(ResolveError::NoAuthoritativeAnswer(question.name.clone())),
                }
            }
        }
    }

    /// Query every server at once; the first acceptable reply wins.
    ///
    /// Returning drops the remaining in-flight requests.
    async fn race(
        &self,
        question: &Question,
        servers: &[SocketAddr],
    ) -> Option<(SocketAddr, DnsResponse)> {
        debug!(question = %question, servers = servers.len(), "Racing upstreams");
        self.ctx.servers.mark_used(servers, Utc::now());

        let upstream = &self.upstream;
        let mut racers: FuturesUnordered<_> = servers
            .iter()
            .map(|&server| async move { (server, upstream.query(question, server).await) })
            .collect();

        while let Some((server, result)) = racers.next().await {
            match result {
                Ok(response) if self.accepts(&response) => {
                    debug!(%server, "Upstream won race");
                    self.ctx.servers.mark_success(server, Utc::now());
                    return Some((server, response));
                }
                Ok(response) => {
                    debug!(
                        %server,
                        rcode = response.rcode(),
                        authoritative = response.is_authoritative(),
                        "Upstream reply rejected"
                    );
                }
                Err(e) => debug!(%server, error = %e, "Upstream failed"),
            }
        }

        None
    }

    async fn query_fallback(
        &self,
        question: &Question,
        fallback: SocketAddr,
    ) -> Result<(SocketAddr, DnsResponse), ResolveError> {
        debug!(question = %question, %fallback, "No race winner, using fallback");
        self.ctx.servers.mark_used(&[fallback], Utc::now());

        match self.upstream.query(question, fallback).await {
            Ok(response) => {
                self.ctx.servers.mark_success(fallback, Utc::now());
                Ok((fallback, response))
            }
            Err(source) => Err(ResolveError::Fallback {
                server: fallback,
                source,
            }),
        }
    }

    fn accepts(&self, response: &DnsResponse) -> bool {
        response.rcode() == rcode::NOERROR
            && (!self.config.require_authoritative || response.is_authoritative())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{RData, RecordType};
    use crate::error::UpstreamError;
    use crate::filter::Blocklist;
    use crate::records::{Record, RecordStore};
    use async_trait::async_trait;
    use rustc_hash::FxHashMap;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const NONE: &[&str] = &[];

    #[derive(Clone)]
    enum Behavior {
        Answer {
            delay: Duration,
            authoritative: bool,
            code: u8,
            ip: [u8; 4],
        },
        Fail,
        Hang,
    }

    fn answer(delay_ms: u64, authoritative: bool, ip: [u8; 4]) -> Behavior {
        Behavior::Answer {
            delay: Duration::from_millis(delay_ms),
            authoritative,
            code: rcode::NOERROR,
            ip,
        }
    }

    /// Increments a counter when an in-flight request is dropped.
    struct DropGuard(Arc<AtomicUsize>);

    impl Drop for DropGuard {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MockUpstream {
        behaviors: FxHashMap<SocketAddr, Behavior>,
        calls: Mutex<Vec<SocketAddr>>,
        dropped: Arc<AtomicUsize>,
    }

    impl MockUpstream {
        fn with(mut self, server: &str, behavior: Behavior) -> Self {
            self.behaviors.insert(addr(server), behavior);
            self
        }

        fn calls(&self) -> Vec<SocketAddr> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UpstreamClient for MockUpstream {
        async fn query(
            &self,
            question: &Question,
            server: SocketAddr,
        ) -> Result<DnsResponse, UpstreamError> {
            self.calls.lock().unwrap().push(server);
            let guard = DropGuard(self.dropped.clone());

            let result = match self.behaviors.get(&server).cloned().unwrap_or(Behavior::Fail) {
                Behavior::Answer {
                    delay,
                    authoritative,
                    code,
                    ip,
                } => {
                    tokio::time::sleep(delay).await;
                    let mut flags = 0x8180 | code as u16;
                    if authoritative {
                        flags |= 0x0400;
                    }
                    let answers = if code == rcode::NOERROR {
                        vec![DnsRecord::new(
                            question.name.clone(),
                            question.qtype,
                            120,
                            RData::A(Ipv4Addr::from(ip)),
                        )]
                    } else {
                        Vec::new()
                    };
                    Ok(DnsResponse {
                        id: 0,
                        flags,
                        questions: Vec::new(),
                        answers,
                        authorities: Vec::new(),
                    })
                }
                Behavior::Fail => Err(UpstreamError::Timeout(server)),
                Behavior::Hang => std::future::pending().await,
            };

            std::mem::forget(guard);
            result
        }
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn question(name: &str) -> Question {
        Question::new(name, RecordType::A)
    }

    /// Global servers 10.0.0.1 and 10.0.0.2, whitelist server 10.0.0.9 for corp.example.
    fn context() -> Context {
        let ctx = Context::default();
        ctx.servers.add("10.0.0.1", NONE).unwrap();
        ctx.servers.add("10.0.0.2", NONE).unwrap();
        ctx.servers.add("10.0.0.9", &["whitelist:corp.example"]).unwrap();
        ctx
    }

    fn resolver(ctx: Context, upstream: Arc<MockUpstream>, fallback: Option<&str>) -> Resolver {
        let config = EngineConfig {
            fallback: fallback.map(addr),
            ..EngineConfig::default()
        };
        Resolver::new(Arc::new(ctx), upstream, config)
    }

    fn ips(records: &[DnsRecord]) -> Vec<String> {
        records.iter().map(DnsRecord::value).collect()
    }

    #[tokio::test]
    async fn cached_answer_skips_upstreams() {
        let ctx = context();
        let cached = RData::A(Ipv4Addr::new(9, 9, 9, 9));
        ctx.cache.add(&DnsRecord::new("cached.com", RecordType::A, 300, cached));
        let upstream = Arc::new(
            MockUpstream::default().with("10.0.0.1:53", answer(0, true, [1, 1, 1, 1])),
        );
        let resolver = resolver(ctx, upstream.clone(), None);

        let resolution = resolver.resolve(&question("Cached.COM.")).await.unwrap();

        let Resolution::Cached(records) = resolution else {
            panic!("expected cache hit, got {resolution:?}");
        };
        assert_eq!(ips(&records), ["9.9.9.9"]);
        assert!(upstream.calls().is_empty());

        let stats = resolver.context().stats.snapshot();
        assert_eq!((stats.total_queries, stats.cache_hits), (1, 1));
        assert_eq!((stats.blocks, stats.forwarded, stats.answered), (0, 0, 0));
    }

    #[tokio::test]
    async fn blocked_domain_skips_upstreams() {
        let mut ctx = context();
        let blocklist = Blocklist::new();
        blocklist.add_domain("ads.com");
        ctx.blocklist = Some(blocklist);
        let upstream = Arc::new(
            MockUpstream::default().with("10.0.0.1:53", answer(0, true, [1, 1, 1, 1])),
        );
        let resolver = resolver(ctx, upstream.clone(), None);

        let resolution = resolver.resolve(&question("tracker.ads.com")).await.unwrap();

        let Resolution::Blocked(records) = resolution else {
            panic!("expected block, got {resolution:?}");
        };
        assert_eq!(ips(&records), ["0.0.0.0"]);
        assert!(upstream.calls().is_empty());

        let stats = resolver.context().stats.snapshot();
        assert_eq!((stats.blocks, stats.cache_hits, stats.forwarded), (1, 0, 0));
    }

    #[tokio::test]
    async fn static_record_is_authoritative_and_not_cached() {
        let mut ctx = context();
        let nas = Record::new("nas.home", RecordType::A, "192.168.1.5", 60).unwrap();
        ctx.records = RecordStore::new(vec![nas]);
        let upstream = Arc::new(MockUpstream::default());
        let resolver = resolver(ctx, upstream.clone(), None);

        let resolution = resolver.resolve(&question("nas.home")).await.unwrap();

        assert!(matches!(resolution, Resolution::Local(ref r) if ips(r) == ["192.168.1.5"]));
        assert!(upstream.calls().is_empty());
        assert!(resolver.context().cache.is_empty());
    }

    #[tokio::test]
    async fn fast_authoritative_upstream_wins_without_waiting() {
        let upstream = Arc::new(
            MockUpstream::default()
                .with("10.0.0.1:53", answer(5_000, true, [1, 1, 1, 1]))
                .with("10.0.0.2:53", answer(10, true, [2, 2, 2, 2])),
        );
        let resolver = resolver(context(), upstream.clone(), None);

        let start = Instant::now();
        let resolution = resolver.resolve(&question("example.com")).await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(2));
        let Resolution::Forwarded { server, response } = resolution else {
            panic!("expected forwarded answer, got {resolution:?}");
        };
        assert_eq!(server, addr("10.0.0.2:53"));
        assert_eq!(ips(&response.answers), ["2.2.2.2"]);

        // The slow racer was abandoned.
        assert_eq!(upstream.dropped.load(Ordering::SeqCst), 1);

        let ctx = resolver.context();
        assert_eq!(ips(&ctx.cache.lookup("example.com", RecordType::A, Utc::now())), ["2.2.2.2"]);
        let stats = ctx.stats.snapshot();
        assert_eq!((stats.forwarded, stats.answered, stats.cache_hits), (1, 1, 0));

        let winner = ctx.servers.list().into_iter().find(|s| s.socket_addr() == server).unwrap();
        assert!(winner.last_success.is_some());
    }

    #[tokio::test]
    async fn non_authoritative_reply_does_not_win() {
        let upstream = Arc::new(
            MockUpstream::default()
                .with("10.0.0.1:53", answer(0, false, [1, 1, 1, 1]))
                .with("10.0.0.2:53", answer(50, true, [2, 2, 2, 2])),
        );
        let resolver = resolver(context(), upstream, None);

        let resolution = resolver.resolve(&question("example.com")).await.unwrap();

        assert!(matches!(
            resolution,
            Resolution::Forwarded { server, .. } if server == addr("10.0.0.2:53")
        ));
    }

    #[tokio::test]
    async fn non_authoritative_accepted_when_configured() {
        let upstream = Arc::new(
            MockUpstream::default().with("10.0.0.1:53", answer(0, false, [1, 1, 1, 1])),
        );
        let config = EngineConfig {
            require_authoritative: false,
            ..EngineConfig::default()
        };
        let resolver = Resolver::new(Arc::new(context()), upstream, config);

        let resolution = resolver.resolve(&question("example.com")).await.unwrap();

        assert!(matches!(
            resolution,
            Resolution::Forwarded { server, .. } if server == addr("10.0.0.1:53")
        ));
    }

    #[tokio::test]
    async fn exclusive_failure_never_falls_back() {
        let upstream = Arc::new(
            MockUpstream::default()
                .with("10.0.0.1:53", answer(0, true, [1, 1, 1, 1]))
                .with("10.0.0.9:53", Behavior::Fail)
                .with("9.9.9.9:53", answer(0, true, [9, 9, 9, 9])),
        );
        let resolver = resolver(context(), upstream.clone(), Some("9.9.9.9:53"));

        let err = resolver.resolve(&question("git.corp.example")).await.unwrap_err();

        assert!(matches!(err, ResolveError::NoAuthoritativeAnswer(_)));
        assert_eq!(err.rcode(), rcode::SERVFAIL);
        assert_eq!(upstream.calls(), [addr("10.0.0.9:53")]);
        assert!(resolver.context().cache.is_empty());
    }

    #[tokio::test]
    async fn inactive_whitelist_server_is_refused() {
        let ctx = context();
        ctx.servers.update("10.0.0.9", &["active:false"]).unwrap();
        let upstream = Arc::new(
            MockUpstream::default().with("10.0.0.1:53", answer(0, true, [1, 1, 1, 1])),
        );
        let resolver = resolver(ctx, upstream.clone(), Some("10.0.0.1:53"));

        let err = resolver.resolve(&question("corp.example")).await.unwrap_err();

        assert!(matches!(err, ResolveError::WhitelistDenied(_)));
        assert_eq!(err.rcode(), rcode::REFUSED);
        assert!(upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn global_race_without_winner_uses_fallback_once() {
        let upstream = Arc::new(
            MockUpstream::default()
                .with("10.0.0.1:53", Behavior::Fail)
                .with("10.0.0.2:53", answer(0, false, [2, 2, 2, 2]))
                .with(
                    "9.9.9.9:53",
                    Behavior::Answer {
                        delay: Duration::ZERO,
                        authoritative: false,
                        code: rcode::NXDOMAIN,
                        ip: [0; 4],
                    },
                ),
        );
        let resolver = resolver(context(), upstream.clone(), Some("9.9.9.9:53"));

        let resolution = resolver.resolve(&question("missing.com")).await.unwrap();

        let Resolution::Forwarded { server, response } = resolution else {
            panic!("expected fallback reply, got {resolution:?}");
        };
        assert_eq!(server, addr("9.9.9.9:53"));
        assert_eq!(response.rcode(), rcode::NXDOMAIN);

        let calls = upstream.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls.iter().filter(|&&c| c == addr("9.9.9.9:53")).count(), 1);

        let stats = resolver.context().stats.snapshot();
        assert_eq!((stats.forwarded, stats.answered), (1, 0));
        assert!(resolver.context().cache.is_empty());
    }

    #[tokio::test]
    async fn fallback_transport_error_is_a_failure() {
        let upstream = Arc::new(MockUpstream::default());
        let resolver = resolver(context(), upstream, Some("9.9.9.9:53"));

        let err = resolver.resolve(&question("example.com")).await.unwrap_err();

        assert!(matches!(
            err,
            ResolveError::Fallback { server, .. } if server == addr("9.9.9.9:53")
        ));
    }

    #[tokio::test]
    async fn no_servers_and_no_fallback() {
        let upstream = Arc::new(MockUpstream::default());
        let ctx = Arc::new(Context::default());
        let resolver = Resolver::new(ctx, upstream, EngineConfig::default());

        let err = resolver.resolve(&question("example.com")).await.unwrap_err();

        assert!(matches!(err, ResolveError::NoUpstream(_)));
    }

    #[tokio::test]
    async fn no_servers_uses_fallback() {
        let upstream = Arc::new(
            MockUpstream::default().with("9.9.9.9:53", answer(0, true, [9, 9, 9, 9])),
        );
        let resolver = resolver(Context::default(), upstream, Some("9.9.9.9:53"));

        let resolution = resolver.resolve(&question("example.com")).await.unwrap();

        assert!(matches!(
            resolution,
            Resolution::Forwarded { server, .. } if server == addr("9.9.9.9:53")
        ));
    }

    #[tokio::test]
    async fn dropping_resolution_cancels_racers() {
        let upstream = Arc::new(
            MockUpstream::default()
                .with("10.0.0.1:53", Behavior::Hang)
                .with("10.0.0.2:53", Behavior::Hang),
        );
        let resolver = resolver(context(), upstream.clone(), None);

        let query = question("example.com");
        let resolve = resolver.resolve(&query);
        let result = tokio::time::timeout(Duration::from_millis(50), resolve).await;

        assert!(result.is_err());
        assert_eq!(upstream.dropped.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_query_hits_cache() {
        let upstream = Arc::new(
            MockUpstream::default().with("10.0.0.1:53", answer(0, true, [1, 1, 1, 1])),
        );
        let resolver = resolver(context(), upstream.clone(), None);

        resolver.resolve(&question("example.com")).await.unwrap();
        let again = resolver.resolve(&question("example.com")).await.unwrap();

        assert!(matches!(again, Resolution::Cached(_)));
        assert_eq!(upstream.calls().len(), 2); // both globals raced once
    }

    #[test]
    fn into_response_flags() {
        let query = DnsQuery::new(42, &question("nas.home"));
        let record = DnsRecord::new("nas.home", RecordType::A, 60, RData::A(Ipv4Addr::LOCALHOST));

        let local = Resolution::Local(vec![record.clone()]).into_response(&query);
        assert!(local.is_authoritative());
        assert_eq!(local.id, 42);

        let cached = Resolution::Cached(vec![record]).into_response(&query);
        assert!(!cached.is_authoritative());
        assert_eq!(cached.rcode(), rcode::NOERROR);
    }
}
