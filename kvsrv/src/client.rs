use super::{KvClient, Phase};

use labrpc::{anyhow::Result, futures::Future};
use log::debug;
use rand::Rng;
use std::time::Duration;

/// Pause between two attempts of the same request.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

/// Client of the KV store. Every operation is retried until the server
/// answers, then committed.
#[derive(Debug, Clone)]
pub struct Clerk {
    client: KvClient,
    backoff: Duration,
}

impl Clerk {
    /// Create a clerk talking through `client`.
    pub fn new(client: KvClient) -> Self {
        Self::with_backoff(client, DEFAULT_BACKOFF)
    }

    /// Create a clerk pausing `backoff` after each failed attempt.
    pub fn with_backoff(client: KvClient, backoff: Duration) -> Self {
        Self { client, backoff }
    }

    /// Current value of `key`, or the empty string.
    pub async fn get(&self, key: &str) -> String {
        let id = request_id();
        let value = self
            .retry(|| self.client.get(id, Phase::Pending, key.to_owned()))
            .await;
        self.retry(|| self.client.get(id, Phase::Committed, key.to_owned()))
            .await;
        value
    }

    /// Set `key` to `value`.
    pub async fn put(&self, key: &str, value: &str) {
        let id = request_id();
        for phase in [Phase::Pending, Phase::Committed] {
            self.retry(|| self.client.put(id, phase, key.to_owned(), value.to_owned()))
                .await;
        }
    }

    /// Append `value` to `key`, returning the previous value.
    pub async fn append(&self, key: &str, value: &str) -> String {
        let id = request_id();
        let prev = self
            .retry(|| self.client.append(id, Phase::Pending, key.to_owned(), value.to_owned()))
            .await;
        self.retry(|| self.client.append(id, Phase::Committed, key.to_owned(), value.to_owned()))
            .await;
        prev
    }

    async fn retry<T, F, Fut>(&self, mut call: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        loop {
            match call().await {
                Ok(v) => return v,
                Err(e) => {
                    debug!("retrying in {:?}: {}", self.backoff, e);
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }
}

fn request_id() -> u64 {
    rand::thread_rng().gen_range(0..1u64 << 62)
}
