// In-process query result cache
// Bounded, least-recently-used eviction, keyed by a BLAKE3 digest of SQL + params.
// Correctness relies on the manager clearing it on every mutation.

use std::collections::HashMap;

use rusqlite::types::Value as SqlValue;

use super::row::Row;

pub type CacheKey = blake3::Hash;

/// Digest a statement and its bind parameters into a cache key.
pub fn cache_key(sql: &str, params: &[SqlValue]) -> CacheKey {
    let mut hasher = blake3::Hasher::new();
    hasher.update(sql.as_bytes());
    for param in params {
        // Tag each value so Text("1") and Integer(1) never collide
        match param {
            SqlValue::Null => {
                hasher.update(&[0]);
            }
            SqlValue::Integer(i) => {
                hasher.update(&[1]);
                hasher.update(&i.to_le_bytes());
            }
            SqlValue::Real(f) => {
                hasher.update(&[2]);
                hasher.update(&f.to_bits().to_le_bytes());
            }
            SqlValue::Text(s) => {
                hasher.update(&[3]);
                hasher.update(&(s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
            SqlValue::Blob(b) => {
                hasher.update(&[4]);
                hasher.update(&(b.len() as u64).to_le_bytes());
                hasher.update(b);
            }
        }
    }
    hasher.finalize()
}

struct Entry {
    rows: Vec<Row>,
    last_used: u64,
}

pub struct QueryCache {
    capacity: usize,
    entries: HashMap<CacheKey, Entry>,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity.min(1024)),
            tick: 0,
            hits: 0,
            misses: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<Vec<Row>> {
        self.tick += 1;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = self.tick;
                self.hits += 1;
                Some(entry.rows.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: CacheKey, rows: Vec<Row>) {
        if !self.is_enabled() {
            return;
        }
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.evict_one();
        }
        self.tick += 1;
        self.entries.insert(key, Entry { rows, last_used: self.tick });
    }

    fn evict_one(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| *key);
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
