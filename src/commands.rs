//! Offline table management.
//!
//! Each command loads one JSON document, mutates it through the same tables
//! the proxy uses and writes it back when something changed.

use chrono::Utc;
use tracing::error;

use crate::cache::{CachedRecord, RecordCache};
use crate::dns::RecordType;
use crate::error::{CommandError, ConfigError, StoreError};
use crate::filter::Blocklist;
use crate::notice::Notice;
use crate::records::{Record, RecordStore};
use crate::servers::{ServerRegistry, UpstreamServer};
use crate::store::{DataDir, JsonFile};

fn changed(notices: &[Notice]) -> bool {
    notices.iter().any(|n| !n.is_warning())
}

fn persist<T>(file: &JsonFile<T>, value: &T) -> Result<(), StoreError>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Default,
{
    file.save(value).inspect_err(|e| {
        error!(path = %file.path().display(), error = %e, "Failed to save");
    })
}

fn with_servers<F>(dir: &DataDir, mutate: F) -> Result<Vec<Notice>, CommandError>
where
    F: FnOnce(&ServerRegistry) -> Result<Vec<Notice>, ConfigError>,
{
    let file = dir.servers();
    let registry = ServerRegistry::new(file.load()?);
    let notices = mutate(&registry)?;
    if changed(&notices) {
        persist(&file, &registry.list())?;
    }
    Ok(notices)
}

pub fn server_add(
    dir: &DataDir,
    address: &str,
    params: &[String],
) -> Result<Vec<Notice>, CommandError> {
    with_servers(dir, |registry| registry.add(address, params))
}

pub fn server_update(
    dir: &DataDir,
    address: &str,
    params: &[String],
) -> Result<Vec<Notice>, CommandError> {
    with_servers(dir, |registry| registry.update(address, params))
}

pub fn server_remove(dir: &DataDir, address: &str) -> Result<Vec<Notice>, CommandError> {
    with_servers(dir, |registry| registry.remove(address))
}

pub fn server_list(dir: &DataDir) -> Result<Vec<UpstreamServer>, CommandError> {
    Ok(dir.servers().load()?)
}

fn with_records<F>(dir: &DataDir, mutate: F) -> Result<Vec<Notice>, CommandError>
where
    F: FnOnce(&RecordStore) -> Result<Vec<Notice>, ConfigError>,
{
    let file = dir.records();
    let store = RecordStore::new(file.load()?);
    let notices = mutate(&store)?;
    if changed(&notices) {
        persist(&file, &store.list())?;
    }
    Ok(notices)
}

pub fn record_add(
    dir: &DataDir,
    name: &str,
    rtype: RecordType,
    value: &str,
    ttl: u32,
) -> Result<Vec<Notice>, CommandError> {
    let record = Record::new(name, rtype, value, ttl)?;
    with_records(dir, |store| Ok(store.add(record)))
}

pub fn record_remove(
    dir: &DataDir,
    name: &str,
    rtype: Option<RecordType>,
) -> Result<Vec<Notice>, CommandError> {
    with_records(dir, |store| store.remove(name, rtype))
}

pub fn record_list(dir: &DataDir) -> Result<Vec<Record>, CommandError> {
    Ok(dir.records().load()?)
}

pub fn cache_list(dir: &DataDir) -> Result<Vec<CachedRecord>, CommandError> {
    let cache = RecordCache::from_entries(dir.cache().load()?);
    Ok(cache.list())
}

pub fn cache_remove(
    dir: &DataDir,
    name: &str,
    rtype: Option<RecordType>,
    value: Option<&str>,
) -> Result<Vec<Notice>, CommandError> {
    let file = dir.cache();
    let cache = RecordCache::from_entries(file.load()?);
    let outcome = cache.remove(name, rtype, value)?;
    let notices = outcome.notices();
    if changed(&notices) {
        persist(&file, &cache.list())?;
    }
    Ok(notices)
}

pub fn cache_purge(dir: &DataDir) -> Result<Vec<Notice>, CommandError> {
    let file = dir.cache();
    let cache = RecordCache::from_entries(file.load()?);
    let purged = cache.purge_expired(Utc::now());
    if purged > 0 {
        persist(&file, &cache.list())?;
    }
    Ok(vec![Notice::info(format!("purged {} expired entries", purged))])
}

fn load_blocklist(file: &JsonFile<Vec<String>>) -> Result<Blocklist, StoreError> {
    let blocklist = Blocklist::new();
    blocklist.add_domains(file.load()?);
    Ok(blocklist)
}

pub fn block_add(dir: &DataDir, domains: &[String]) -> Result<Vec<Notice>, CommandError> {
    let file = dir.blocklist();
    let blocklist = load_blocklist(&file)?;
    let before = blocklist.len();
    blocklist.add_domains(domains);
    let added = blocklist.len() - before;
    if added > 0 {
        persist(&file, &blocklist.all())?;
    }
    Ok(vec![Notice::info(format!("blocked {} new domain(s)", added))])
}

pub fn block_remove(dir: &DataDir, domains: &[String]) -> Result<Vec<Notice>, CommandError> {
    let file = dir.blocklist();
    let blocklist = load_blocklist(&file)?;
    let mut notices = Vec::new();
    for domain in domains {
        if blocklist.remove_domain(domain) {
            notices.push(Notice::info(format!("unblocked {}", domain)));
        } else {
            notices.push(Notice::warning(format!("{} was not blocked", domain)));
        }
    }
    if changed(&notices) {
        persist(&file, &blocklist.all())?;
    }
    Ok(notices)
}

pub fn block_clear(dir: &DataDir) -> Result<Vec<Notice>, CommandError> {
    persist(&dir.blocklist(), &Vec::new())?;
    Ok(vec![Notice::info("block list cleared")])
}

pub fn block_list(dir: &DataDir) -> Result<Vec<String>, CommandError> {
    Ok(load_blocklist(&dir.blocklist())?.all())
}

/// Merge a hosts-format source (file path or http(s) URL) into the stored list.
pub async fn block_load(dir: &DataDir, source: &str) -> Result<Vec<Notice>, CommandError> {
    let file = dir.blocklist();
    let blocklist = load_blocklist(&file)?;
    let parsed = ingest(&blocklist, source).await?;
    persist(&file, &blocklist.all())?;
    Ok(vec![Notice::info(format!(
        "loaded {} entries from {} ({} domains blocked)",
        parsed,
        source,
        blocklist.len()
    ))])
}

/// Load `source` into `blocklist`, by URL or by path.
pub async fn ingest(
    blocklist: &Blocklist,
    source: &str,
) -> Result<usize, crate::error::IngestError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        blocklist.load_from_url(source).await
    } else {
        blocklist.load_from_file(source)
    }
}
