//! Shared state handed to the resolver and its collaborators.

use crate::cache::RecordCache;
use crate::filter::Blocklist;
use crate::records::RecordStore;
use crate::servers::ServerRegistry;
use crate::stats::Stats;

/// Everything a resolution reads or writes.
///
/// Each component guards itself; there are no cross-component locks.
#[derive(Default)]
pub struct Context {
    /// `None` disables blocking entirely.
    pub blocklist: Option<Blocklist>,
    pub servers: ServerRegistry,
    pub cache: RecordCache,
    pub records: RecordStore,
    pub stats: Stats,
}

impl Context {
    pub fn new(
        blocklist: Option<Blocklist>,
        servers: ServerRegistry,
        cache: RecordCache,
        records: RecordStore,
    ) -> Self {
        Self {
            blocklist,
            servers,
            cache,
            records,
            stats: Stats::new(),
        }
    }
}
