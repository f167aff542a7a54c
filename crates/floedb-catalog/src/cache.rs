//! Hot metadata cache.
//!
//! Process-local TTL cache of resolved metadata locations. Best effort only:
//! every commit re-resolves before acting, so cross-process staleness is
//! acceptable and the cache never gates correctness. Invalidated locally on
//! every successful commit.

use crate::catalog::ResolvedTable;
use floedb_commons::TableIdent;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct CacheEntry {
    resolved: ResolvedTable,
    resolved_at: Instant,
}

/// TTL cache of `(tenant, namespace, table) → metadata location`.
pub struct MetadataCache {
    entries: RwLock<HashMap<TableIdent, CacheEntry>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fetch a live entry; expired entries count as misses and are evicted
    /// lazily on the next insert or invalidate.
    pub fn get(&self, ident: &TableIdent) -> Option<ResolvedTable> {
        let entries = self.entries.read();
        match entries.get(ident) {
            Some(entry) if entry.resolved_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.resolved.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, resolved: ResolvedTable) {
        let mut entries = self.entries.write();
        entries.insert(
            resolved.ident.clone(),
            CacheEntry {
                resolved,
                resolved_at: Instant::now(),
            },
        );
    }

    /// Drop the entry for one table. Called after every successful commit.
    pub fn invalidate(&self, ident: &TableIdent) {
        self.entries.write().remove(ident);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
