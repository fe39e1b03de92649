//! DNS query filtering module.
//!
//! Provides ad-blocking functionality by filtering DNS queries against
//! a blocklist of known ad/tracking domains. Every helper here accepts an
//! optional blocklist; `None` behaves as an empty list.

mod blocklist;

pub use blocklist::{Blocklist, parse_hosts};

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::dns::{DnsRecord, Question, RData, RecordType};

/// TTL handed out on sinkhole answers.
const BLOCKED_TTL: u32 = 300;

/// Check a domain against an optional blocklist.
pub fn is_blocked(blocklist: Option<&Blocklist>, domain: &str) -> bool {
    blocklist.is_some_and(|b| b.is_blocked(domain))
}

/// Check if a DNS query should be blocked and return the sinkhole answer.
///
/// Returns `Some(records)` if the query should be blocked, `None` if it should
/// be resolved normally. A/AAAA queries get an unspecified address, other
/// types an empty answer.
pub fn filter_query(blocklist: Option<&Blocklist>, question: &Question) -> Option<Vec<DnsRecord>> {
    if !is_blocked(blocklist, &question.name) {
        return None;
    }

    let sinkhole = match question.qtype {
        RecordType::A => Some(RData::A(Ipv4Addr::UNSPECIFIED)),
        RecordType::AAAA => Some(RData::AAAA(Ipv6Addr::UNSPECIFIED)),
        _ => None,
    };

    Some(
        sinkhole
            .map(|data| DnsRecord::new(question.name.clone(), question.qtype, BLOCKED_TTL, data))
            .into_iter()
            .collect(),
    )
}
