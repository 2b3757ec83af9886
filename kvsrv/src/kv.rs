use super::{KvService, Phase};

use labrpc::anyhow::Result;
use log::trace;
use std::collections::HashMap;

/// In-memory store. The server owns it exclusively and feeds it one request
/// at a time, so no locking is involved.
#[derive(Debug, Default)]
pub struct KvStore {
    data: HashMap<String, String>,
    // Reply of every pending request id, kept until it is committed.
    pending: HashMap<u64, String>,
}

impl KvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of request ids whose reply is cached.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn dedup<F>(&mut self, id: u64, phase: Phase, apply: F) -> String
    where
        F: FnOnce(&mut HashMap<String, String>) -> String,
    {
        match phase {
            Phase::Committed => {
                self.pending.remove(&id);
                String::new()
            }
            Phase::Pending => {
                if let Some(v) = self.pending.get(&id) {
                    trace!("replaying request {}", id);
                    return v.clone();
                }
                let v = apply(&mut self.data);
                self.pending.insert(id, v.clone());
                v
            }
        }
    }
}

#[labrpc::async_trait]
impl KvService for KvStore {
    async fn get(&mut self, id: u64, phase: Phase, key: String) -> Result<String> {
        Ok(self.dedup(id, phase, |data| data.get(&key).cloned().unwrap_or_default()))
    }

    async fn put(&mut self, id: u64, phase: Phase, key: String, value: String) -> Result<()> {
        self.dedup(id, phase, |data| {
            data.insert(key, value.clone());
            value
        });
        Ok(())
    }

    /// Returns the value held before appending.
    async fn append(&mut self, id: u64, phase: Phase, key: String, value: String) -> Result<String> {
        Ok(self.dedup(id, phase, |data| {
            let old = data.entry(key).or_default();
            let prev = old.clone();
            old.push_str(&value);
            prev
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn get(kv: &mut KvStore, key: &str) -> String {
        let v = kv.get(u64::MAX, Phase::Pending, key.to_owned()).await.unwrap();
        kv.get(u64::MAX, Phase::Committed, key.to_owned()).await.unwrap();
        v
    }

    #[tokio::test]
    async fn test_retried_put_is_one_write() {
        let mut kv = KvStore::new();
        kv.put(5, Phase::Pending, "k".into(), "a".into()).await.unwrap();
        kv.put(6, Phase::Pending, "k".into(), "b".into()).await.unwrap();
        // A late retry of request 5 must not overwrite the newer write.
        kv.put(5, Phase::Pending, "k".into(), "a".into()).await.unwrap();
        assert_eq!(get(&mut kv, "k").await, "b");

        kv.put(5, Phase::Committed, "k".into(), "a".into()).await.unwrap();
        kv.put(6, Phase::Committed, "k".into(), "b".into()).await.unwrap();
        assert_eq!(kv.data["k"], "b");
        assert_eq!(kv.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_retried_append_applies_once() {
        let mut kv = KvStore::new();
        let first = kv.append(5, Phase::Pending, "k".into(), "x".into()).await.unwrap();
        let retry = kv.append(5, Phase::Pending, "k".into(), "x".into()).await.unwrap();
        assert_eq!(first, "");
        assert_eq!(retry, "");
        assert_eq!(kv.data["k"], "x");

        assert_eq!(kv.pending_len(), 1);
        kv.append(5, Phase::Committed, "k".into(), "x".into()).await.unwrap();
        assert_eq!(kv.pending_len(), 0);
        let prev = kv.append(6, Phase::Pending, "k".into(), "y".into()).await.unwrap();
        assert_eq!(prev, "x");
        assert_eq!(kv.data["k"], "xy");
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let mut kv = KvStore::new();
        assert_eq!(kv.get(1, Phase::Pending, "nope".into()).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_retried_get_replays_cached_value() {
        let mut kv = KvStore::new();
        kv.put(1, Phase::Pending, "k".into(), "old".into()).await.unwrap();
        kv.put(1, Phase::Committed, "k".into(), String::new()).await.unwrap();

        assert_eq!(kv.get(2, Phase::Pending, "k".into()).await.unwrap(), "old");
        kv.put(3, Phase::Pending, "k".into(), "new".into()).await.unwrap();
        // Stale until request 2 is committed.
        assert_eq!(kv.get(2, Phase::Pending, "k".into()).await.unwrap(), "old");
        kv.get(2, Phase::Committed, "k".into()).await.unwrap();
        assert_eq!(get(&mut kv, "k").await, "new");
        // Request 3 was never committed.
        assert_eq!(kv.pending_len(), 1);
        kv.put(3, Phase::Committed, "k".into(), String::new()).await.unwrap();
        assert_eq!(kv.pending_len(), 0);
    }
}
