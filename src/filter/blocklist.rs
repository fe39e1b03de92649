//! Blocklist for ad/tracking domains.
//!
//! Holds a concurrent set of normalized domains and loads them from
//! hosts-format text, either from disk or over HTTP.

use rustc_hash::FxHashSet;
use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain;
use crate::error::IngestError;

/// Sink addresses that mark a hosts-file line as a block entry.
const BLOCK_ADDRS: [&str; 4] = ["0.0.0.0", "127.0.0.1", "::", "::1"];

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// A set of blocked domains for efficient lookup.
pub struct Blocklist {
    domains: RwLock<FxHashSet<String>>,
}

impl Blocklist {
    /// Create an empty blocklist.
    pub fn new() -> Self {
        Self {
            domains: RwLock::new(FxHashSet::default()),
        }
    }

    /// Check if a domain should be blocked.
    ///
    /// Performs exact match and subdomain matching (e.g., blocks
    /// "ads.example.com" if "example.com" is in the blocklist).
    pub fn is_blocked(&self, domain: &str) -> bool {
        let domain = domain::normalize(domain);
        let Ok(domains) = self.domains.read() else {
            return false;
        };
        domain::ancestors(&domain).any(|candidate| domains.contains(candidate))
    }

    pub fn add_domain(&self, domain: &str) {
        self.add_domains([domain]);
    }

    /// Add several domains under a single write lock.
    pub fn add_domains<I, S>(&self, domains: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Ok(mut set) = self.domains.write() else {
            return;
        };
        for domain in domains {
            let domain = domain::normalize(domain.as_ref());
            if !domain.is_empty() {
                set.insert(domain);
            }
        }
    }

    /// Remove a single entry. Returns true if it was present.
    pub fn remove_domain(&self, domain: &str) -> bool {
        let domain = domain::normalize(domain);
        self.domains
            .write()
            .map(|mut set| set.remove(&domain))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut set) = self.domains.write() {
            set.clear();
        }
    }

    /// Returns the number of domains in the blocklist.
    pub fn len(&self) -> usize {
        self.domains.read().map(|set| set.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All blocked domains, sorted.
    pub fn all(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .domains
            .read()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        all.sort_unstable();
        all
    }

    /// Load hosts-format entries from a file. Returns how many were parsed.
    pub fn load_from_file(&self, path: impl AsRef<Path>) -> Result<usize, IngestError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let domains = parse_hosts(&text);
        let count = domains.len();
        self.add_domains(domains);
        info!(path = %path.display(), count, "Loaded blocklist file");

        Ok(count)
    }

    /// Fetch hosts-format entries over HTTP. Returns how many were parsed.
    pub async fn load_from_url(&self, url: &str) -> Result<usize, IngestError> {
        let http_err = |source: reqwest::Error| IngestError::Http {
            url: url.to_string(),
            source,
        };

        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(http_err)?;
        let response = client.get(url).send().await.map_err(http_err)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(IngestError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response.text().await.map_err(http_err)?;
        let domains = parse_hosts(&text);
        let count = domains.len();
        self.add_domains(domains);
        info!(url, count, "Fetched blocklist");

        Ok(count)
    }
}

impl Default for Blocklist {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract blocked domains from hosts-format text.
///
/// Lines look like `0.0.0.0 ads.example.com tracker.example.net`. Anything
/// after `#` is a comment. Lines not starting with a sink address are skipped.
pub fn parse_hosts(text: &str) -> Vec<String> {
    let mut domains = Vec::new();

    for line in text.lines() {
        let line = line.split('#').next().unwrap_or_default();
        let mut fields = line.split_whitespace();

        let Some(addr) = fields.next() else {
            continue;
        };
        if !BLOCK_ADDRS.contains(&addr) {
            debug!(line, "Skipping non-block hosts line");
            continue;
        }

        domains.extend(
            fields
                .map(domain::normalize)
                .filter(|domain| !domain.is_empty()),
        );
    }

    domains
}
