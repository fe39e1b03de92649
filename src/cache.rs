//! DNS record cache with TTL-based expiry.
//!
//! Entries are unique per `(name, type, value)`. Repeat observations refresh
//! the existing entry. Nothing is evicted implicitly: expired entries stay
//! until [`RecordCache::purge_expired`] or an explicit removal.

use chrono::{DateTime, Duration, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{PoisonError, RwLock};

use crate::dns::{DnsRecord, RecordType};
use crate::domain;
use crate::error::ConfigError;
use crate::notice::Notice;
use crate::records::Record;

/// A cached record with its freshness bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRecord {
    #[serde(rename = "dns_record")]
    pub record: Record,
    #[serde(default)]
    pub expiry: DateTime<Utc>,
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub last_query: DateTime<Utc>,
}

impl CachedRecord {
    fn observe(record: Record, now: DateTime<Utc>) -> Self {
        let expiry = now + Duration::seconds(i64::from(record.ttl));
        Self {
            record: Record {
                last_query: Some(now),
                ..record
            },
            expiry,
            timestamp: now,
            last_query: now,
        }
    }

    fn refresh(&mut self, ttl: u32, now: DateTime<Utc>) {
        self.record.ttl = ttl;
        self.record.last_query = Some(now);
        self.expiry = now + Duration::seconds(i64::from(ttl));
        self.last_query = now;
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expiry > now
    }

    /// Seconds left before expiry, zero once expired.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> u32 {
        let secs = (self.expiry - now).num_seconds();
        u32::try_from(secs.max(0)).unwrap_or(u32::MAX)
    }
}

impl fmt::Display for CachedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ttl={} expires={}",
            self.record.name,
            self.record.rtype,
            self.record.value,
            self.record.ttl,
            self.expiry.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// Result of [`RecordCache::remove`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed(CachedRecord),
    NotFound,
    /// Several entries matched; nothing was removed.
    Ambiguous(Vec<CachedRecord>),
}

impl RemoveOutcome {
    pub fn notices(&self) -> Vec<Notice> {
        match self {
            RemoveOutcome::Removed(entry) => vec![Notice::info(format!("removed {}", entry))],
            RemoveOutcome::NotFound => vec![Notice::warning("no matching cache entry")],
            RemoveOutcome::Ambiguous(candidates) => {
                let mut notices = vec![Notice::warning(format!(
                    "{} entries match; specify type and value",
                    candidates.len()
                ))];
                notices.extend(candidates.iter().map(|c| Notice::warning(format!("  {}", c))));
                notices
            }
        }
    }
}

type Bucket = Vec<CachedRecord>;

/// TTL-aware record cache.
///
/// Uses a 2-level map (type -> name -> entries) so lookups don't allocate.
pub struct RecordCache {
    entries: RwLock<FxHashMap<RecordType, FxHashMap<String, Bucket>>>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    /// Rebuild a cache from persisted entries, merging duplicates.
    pub fn from_entries(entries: Vec<CachedRecord>) -> Self {
        let cache = Self::new();
        {
            let mut map = cache.entries.write().unwrap_or_else(PoisonError::into_inner);
            for mut entry in entries {
                entry.record.name = domain::normalize(&entry.record.name);
                let bucket = map
                    .entry(entry.record.rtype)
                    .or_default()
                    .entry(entry.record.name.clone())
                    .or_default();
                match bucket.iter_mut().find(|e| e.record.value == entry.record.value) {
                    Some(existing) if existing.expiry < entry.expiry => *existing = entry,
                    Some(_) => {}
                    None => bucket.push(entry),
                }
            }
        }
        cache
    }

    /// Record an observed answer.
    pub fn add(&self, record: &DnsRecord) {
        self.add_at(record, Utc::now());
    }

    /// Record an observed answer at `now`. Returns true if a new entry was created.
    pub fn add_at(&self, record: &DnsRecord, now: DateTime<Utc>) -> bool {
        let name = domain::normalize(&record.name);
        let value = record.value();

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let bucket = entries
            .entry(record.rtype)
            .or_default()
            .entry(name.clone())
            .or_default();

        if let Some(existing) = bucket.iter_mut().find(|e| e.record.value == value) {
            existing.refresh(record.ttl, now);
            return false;
        }

        bucket.push(CachedRecord::observe(
            Record {
                name,
                rtype: record.rtype,
                value,
                ttl: record.ttl,
                last_query: None,
            },
            now,
        ));
        true
    }

    /// Fresh entries for `name`/`rtype` as wire records carrying their remaining TTL.
    pub fn lookup(&self, name: &str, rtype: RecordType, now: DateTime<Utc>) -> Vec<DnsRecord> {
        let name = domain::normalize(name);
        let Ok(entries) = self.entries.read() else {
            return Vec::new();
        };
        let Some(bucket) = entries.get(&rtype).and_then(|inner| inner.get(&name)) else {
            return Vec::new();
        };

        bucket
            .iter()
            .filter(|e| e.is_fresh(now))
            .filter_map(|e| e.record.to_dns_record(e.remaining_ttl(now)).ok())
            .collect()
    }

    /// Remove a single entry identified by name and, if needed, type and value.
    pub fn remove(
        &self,
        name: &str,
        rtype: Option<RecordType>,
        value: Option<&str>,
    ) -> Result<RemoveOutcome, ConfigError> {
        let name = domain::normalize(name);
        if name.is_empty() {
            return Err(ConfigError::MissingName);
        }
        let value = value.map(str::trim);

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let mut matches: Vec<(RecordType, usize)> = Vec::new();
        for (&t, inner) in entries.iter() {
            if rtype.is_some_and(|wanted| wanted != t) {
                continue;
            }
            let Some(bucket) = inner.get(&name) else {
                continue;
            };
            for (i, entry) in bucket.iter().enumerate() {
                if value.is_none_or(|v| v.eq_ignore_ascii_case(&entry.record.value)) {
                    matches.push((t, i));
                }
            }
        }

        match matches.as_slice() {
            [] => Ok(RemoveOutcome::NotFound),
            &[(t, i)] => {
                let Some(inner) = entries.get_mut(&t) else {
                    return Ok(RemoveOutcome::NotFound);
                };
                let Some(bucket) = inner.get_mut(&name) else {
                    return Ok(RemoveOutcome::NotFound);
                };
                let removed = bucket.remove(i);
                if bucket.is_empty() {
                    inner.remove(&name);
                }
                Ok(RemoveOutcome::Removed(removed))
            }
            _ => {
                let mut candidates: Vec<CachedRecord> = matches
                    .iter()
                    .filter_map(|(t, i)| entries.get(t)?.get(&name)?.get(*i).cloned())
                    .collect();
                candidates.sort_by(|a, b| a.record.value.cmp(&b.record.value));
                Ok(RemoveOutcome::Ambiguous(candidates))
            }
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut purged = 0;
        for inner in entries.values_mut() {
            for bucket in inner.values_mut() {
                let before = bucket.len();
                bucket.retain(|e| e.is_fresh(now));
                purged += before - bucket.len();
            }
            inner.retain(|_, bucket| !bucket.is_empty());
        }
        entries.retain(|_, inner| !inner.is_empty());
        purged
    }

    /// Every entry, oldest first.
    pub fn list(&self) -> Vec<CachedRecord> {
        let Ok(entries) = self.entries.read() else {
            return Vec::new();
        };
        let mut all: Vec<CachedRecord> = entries
            .values()
            .flat_map(|inner| inner.values())
            .flatten()
            .cloned()
            .collect();
        all.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.record.name.cmp(&b.record.name))
                .then_with(|| a.record.value.cmp(&b.record.value))
        });
        all
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .map(|e| e.values().flat_map(|inner| inner.values()).map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RecordCache {
    fn default() -> Self {
        Self::new()
    }
}
