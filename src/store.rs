//! Capacity-limited key-value blob store
//!
//! Holds encoded images (or any other bytes) under a byte budget. When a write
//! would overflow the budget, older entries are evicted: non-essential ones
//! first, then essential ones, always oldest-first within each group. The
//! entry being written is never evicted.

use crate::error::{BgRemovalError, Result};
use std::collections::HashMap;

/// Key-value storage for encoded blobs
pub trait BlobStore {
    /// Store `data` under `key`, replacing any previous value
    ///
    /// Returns the keys evicted to make room, oldest first.
    ///
    /// # Errors
    /// - `QuotaExceeded` when `data` alone is larger than the store capacity
    fn put(&mut self, key: &str, data: Vec<u8>, essential: bool) -> Result<Vec<String>>;

    fn get(&self, key: &str) -> Option<&[u8]>;

    fn remove(&mut self, key: &str) -> Option<Vec<u8>>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently held
    fn used_bytes(&self) -> usize;

    /// Maximum bytes the store will hold
    fn capacity_bytes(&self) -> usize;
}

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Vec<u8>,
    essential: bool,
    sequence: u64,
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobStoreStats {
    pub entries: usize,
    pub essential_entries: usize,
    pub used_bytes: usize,
    pub capacity_bytes: usize,
    /// Entries evicted since creation
    pub evictions: u64,
    pub hits: u64,
    pub misses: u64,
}

impl BlobStoreStats {
    /// Fraction of the capacity in use
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.capacity_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / self.capacity_bytes as f64
        }
    }
}

/// In-memory [`BlobStore`] with a fixed byte capacity
#[derive(Debug)]
pub struct MemoryBlobStore {
    entries: HashMap<String, StoredBlob>,
    capacity: usize,
    used: usize,
    next_sequence: u64,
    evictions: u64,
    hits: std::cell::Cell<u64>,
    misses: std::cell::Cell<u64>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn with_capacity(capacity_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity_bytes,
            used: 0,
            next_sequence: 0,
            evictions: 0,
            hits: std::cell::Cell::new(0),
            misses: std::cell::Cell::new(0),
        }
    }

    /// Keys in eviction order: non-essential oldest first, then essential oldest first
    #[must_use]
    pub fn eviction_order(&self) -> Vec<String> {
        let mut ranked: Vec<_> = self
            .entries
            .iter()
            .map(|(key, blob)| (blob.essential, blob.sequence, key))
            .collect();
        ranked.sort_unstable();
        ranked.into_iter().map(|(_, _, key)| key.clone()).collect()
    }

    /// Whether the entry under `key` is marked essential
    #[must_use]
    pub fn is_essential(&self, key: &str) -> Option<bool> {
        self.entries.get(key).map(|blob| blob.essential)
    }

    #[must_use]
    pub fn stats(&self) -> BlobStoreStats {
        BlobStoreStats {
            entries: self.entries.len(),
            essential_entries: self.entries.values().filter(|b| b.essential).count(),
            used_bytes: self.used,
            capacity_bytes: self.capacity,
            evictions: self.evictions,
            hits: self.hits.get(),
            misses: self.misses.get(),
        }
    }

    /// Drop every entry, returning how many were removed
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.used = 0;
        count
    }

    fn next_victim(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|(_, blob)| (blob.essential, blob.sequence))
            .map(|(key, _)| key.clone())
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&mut self, key: &str, data: Vec<u8>, essential: bool) -> Result<Vec<String>> {
        let requested = data.len();
        if requested > self.capacity {
            return Err(BgRemovalError::QuotaExceeded {
                requested,
                capacity: self.capacity,
            });
        }

        // A replaced value frees its bytes before eviction is considered
        if let Some(previous) = self.entries.remove(key) {
            self.used -= previous.data.len();
        }

        let mut evicted = Vec::new();
        while self.used + requested > self.capacity {
            let Some(victim) = self.next_victim() else {
                break;
            };
            if let Some(blob) = self.entries.remove(&victim) {
                self.used -= blob.data.len();
                self.evictions += 1;
                log::debug!(
                    "Evicted blob '{}' ({} bytes, essential: {})",
                    victim,
                    blob.data.len(),
                    blob.essential
                );
            }
            evicted.push(victim);
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.used += requested;
        self.entries.insert(
            key.to_string(),
            StoredBlob {
                data,
                essential,
                sequence,
            },
        );

        Ok(evicted)
    }

    fn get(&self, key: &str) -> Option<&[u8]> {
        let found = self.entries.get(key).map(|blob| blob.data.as_slice());
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.set(counter.get() + 1);
        found
    }

    fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        let blob = self.entries.remove(key)?;
        self.used -= blob.data.len();
        Some(blob.data)
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn used_bytes(&self) -> usize {
        self.used
    }

    fn capacity_bytes(&self) -> usize {
        self.capacity
    }
}

/// Format a byte count for display
#[must_use]
pub fn format_size(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
