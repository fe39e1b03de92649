//! Client-facing listeners.
//!
//! Both transports decode the query, hand it to the [`Resolver`] and encode
//! whatever comes back; they differ only in framing.

pub mod tcp;
pub mod udp;

/// Maximum size of a DNS packet (with some headroom).
pub const MAX_DNS_PACKET_SIZE: usize = 4096;

/// Largest UDP reply for a client that did not advertise EDNS0.
pub const CLASSIC_UDP_LIMIT: usize = 512;

use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use crate::dns::{DnsQuery, DnsResponse, Question};
use crate::error::ResolveError;
use crate::resolver::{Resolution, Resolver};

/// Transport protocol identifier for logging.
#[derive(Debug, Clone, Copy)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }

    /// Largest reply this protocol may carry for `query`. TCP is unbounded.
    fn reply_limit(self, query: &DnsQuery) -> Option<usize> {
        match self {
            Protocol::Tcp => None,
            Protocol::Udp => Some(match query.udp_payload {
                Some(payload) => {
                    (payload as usize).clamp(CLASSIC_UDP_LIMIT, MAX_DNS_PACKET_SIZE)
                }
                None => CLASSIC_UDP_LIMIT,
            }),
        }
    }
}

/// Per-query log events. Emitted at info when verbose, otherwise debug.
#[derive(Debug, Clone, Copy)]
pub struct QueryLogger {
    protocol: Protocol,
    verbose: bool,
}

impl QueryLogger {
    pub fn new(protocol: Protocol, verbose: bool) -> Self {
        Self { protocol, verbose }
    }

    pub fn resolved(&self, question: &Question, resolution: &Resolution, elapsed: Duration) {
        let proto = self.protocol.as_str();
        let total_ms = elapsed.as_secs_f64() * 1000.0;
        let (outcome, upstream) = match resolution {
            Resolution::Cached(_) => ("CACHED", None),
            Resolution::Blocked(_) => ("BLOCKED", None),
            Resolution::Local(_) => ("LOCAL", None),
            Resolution::Forwarded { server, .. } => ("FORWARDED", Some(server.to_string())),
        };
        let upstream = upstream.as_deref().unwrap_or("-");
        let (domain, qtype) = (&question.name, question.qtype);

        if self.verbose {
            info!(proto, %domain, %qtype, outcome, upstream, total_ms, "Query");
        } else {
            debug!(proto, %domain, %qtype, outcome, upstream, total_ms, "Query");
        }
    }

    pub fn failed(&self, question: &Question, error: &ResolveError, elapsed: Duration) {
        let proto = self.protocol.as_str();
        let total_ms = elapsed.as_secs_f64() * 1000.0;
        let (domain, qtype) = (&question.name, question.qtype);

        if self.verbose {
            info!(proto, %domain, %qtype, %error, total_ms, "Query failed");
        } else {
            debug!(proto, %domain, %qtype, %error, total_ms, "Query failed");
        }
    }
}

/// Resolve one wire-format query and encode the reply.
///
/// A reply too large for the logger's protocol is cut down to header and
/// question with TC set, so the client retries over TCP. Returns `None` when
/// the packet cannot be parsed as a query; there is no ID to answer to in
/// that case.
pub async fn handle_query(
    resolver: &Resolver,
    packet: &[u8],
    logger: &QueryLogger,
) -> Option<Vec<u8>> {
    let Some(query) = DnsQuery::parse(packet) else {
        trace!(len = packet.len(), "Dropping unparseable query");
        return None;
    };
    let question = query.question();
    let start = Instant::now();

    let mut response = match resolver.resolve(&question).await {
        Ok(resolution) => {
            logger.resolved(&question, &resolution, start.elapsed());
            resolution.into_response(&query)
        }
        Err(e) => {
            logger.failed(&question, &e, start.elapsed());
            DnsResponse::failure(&query, e.rcode())
        }
    };

    let mut reply = response.to_bytes();
    if let Some(limit) = logger.protocol.reply_limit(&query) {
        if reply.len() > limit {
            trace!(len = reply.len(), limit, "Reply too large, truncating");
            response.truncate();
            reply = response.to_bytes();
        }
    }

    Some(reply)
}
