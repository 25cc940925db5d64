//! LRU cache for text embeddings.
//!
//! Prompt lists tend to repeat ("a photo of a cat" against every image in
//! a folder). Keyed by the caller's original text; entries expire after a
//! TTL and the least recently used one is evicted at capacity.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use ndarray::Array1;
use parking_lot::Mutex;
use tracing::debug;

struct Entry {
    embedding: Array1<f32>,
    inserted_at: Instant,
}

struct Inner {
    entries: HashMap<String, Entry>,
    /// Most recently used at the back.
    recency: VecDeque<String>,
}

impl Inner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            if let Some(k) = self.recency.remove(pos) {
                self.recency.push_back(k);
            }
        }
    }

    fn forget(&mut self, key: &str) {
        self.entries.remove(key);
        self.recency.retain(|k| k != key);
    }
}

/// Thread-safe text → embedding cache.
pub struct EmbeddingCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

impl EmbeddingCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity),
                recency: VecDeque::with_capacity(capacity),
            }),
            capacity,
            ttl,
        }
    }

    /// Cached embedding for `text`, if present and not expired.
    pub fn get(&self, text: &str) -> Option<Array1<f32>> {
        let mut inner = self.inner.lock();

        let expired = inner.entries.get(text)?.inserted_at.elapsed() >= self.ttl;
        if expired {
            inner.forget(text);
            return None;
        }

        inner.touch(text);
        inner.entries.get(text).map(|e| e.embedding.clone())
    }

    pub fn put(&self, text: &str, embedding: Array1<f32>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock();

        if inner.entries.contains_key(text) {
            inner.touch(text);
        } else {
            while inner.entries.len() >= self.capacity {
                let Some(oldest) = inner.recency.pop_front() else {
                    break;
                };
                debug!("Evicting cached embedding for {:?}", oldest);
                inner.entries.remove(&oldest);
            }
            inner.recency.push_back(text.to_string());
        }

        inner.entries.insert(
            text.to_string(),
            Entry {
                embedding,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.recency.clear();
    }
}
