// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Key-value stores for quota state.
//!
//! The quota accountant only needs `get` and `put` with a retention TTL.
//! Values are opaque strings; interpretation lives in [`crate::quota`].
//!
//! Backends:
//! - [`MemoryStore`]: in-process map with expiry, for a single instance
//! - [`RedisStore`]: shared state across instances (feature `redis`)

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Store failure. Never surfaced to callers; quota accounting fails open.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Port for the external quota state store.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Fetch the raw value for `key`; `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` under `key`, expiring after `ttl`.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;
}

/// How often a bound [`MemoryStore`] sweeps expired entries.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Entry {
    value: String,
    /// `None` when the TTL reaches past what `Instant` can represent
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-process store with per-entry expiry.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries (should be called periodically).
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Expired quota entries removed");
        }
    }

    /// Run [`MemoryStore::cleanup`] every `every` on a background task.
    pub fn spawn_cleanup(&self, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                store.cleanup().await;
            }
        })
    }

    /// Number of live and not-yet-swept entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl QuotaStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }
}

#[cfg(feature = "redis")]
pub use self::redis_store::RedisStore;

#[cfg(feature = "redis")]
mod redis_store {
    use super::{QuotaStore, StoreError};
    use async_trait::async_trait;
    use redis::aio::{ConnectionManager, ConnectionManagerConfig};
    use redis::{AsyncCommands, Client};
    use std::fmt;
    use std::time::Duration;
    use tokio::sync::OnceCell;

    const CONNECTION_TIMEOUT: Duration = Duration::from_secs(1);

    /// Redis-backed store shared by every gatekeeper instance.
    ///
    /// The connection is opened on first use. Until it succeeds every call
    /// returns an error, so accounting fails open per request and resumes
    /// once Redis is reachable.
    #[derive(Clone)]
    pub struct RedisStore {
        client: Client,
        connection: std::sync::Arc<OnceCell<ConnectionManager>>,
    }

    impl fmt::Debug for RedisStore {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("RedisStore")
                .field("connected", &self.connection.initialized())
                .finish_non_exhaustive()
        }
    }

    impl RedisStore {
        /// Prepare a store for `url`, e.g. `redis://127.0.0.1/`.
        ///
        /// Only the URL is checked here; no connection is made.
        pub fn open(url: &str) -> Result<Self, StoreError> {
            Ok(Self {
                client: Client::open(url)?,
                connection: Default::default(),
            })
        }

        async fn connection(&self) -> Result<ConnectionManager, StoreError> {
            let connection = self
                .connection
                .get_or_try_init(|| async {
                    let config = ConnectionManagerConfig::new()
                        .set_number_of_retries(0)
                        .set_connection_timeout(CONNECTION_TIMEOUT);
                    let manager =
                        ConnectionManager::new_with_config(self.client.clone(), config).await?;
                    tracing::info!("Connected to Redis quota store");
                    Ok::<_, StoreError>(manager)
                })
                .await?;
            Ok(connection.clone())
        }
    }

    #[async_trait]
    impl QuotaStore for RedisStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            let mut conn = self.connection().await?;
            let value: Option<String> = conn.get(key).await?;
            Ok(value)
        }

        async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
            let mut conn = self.connection().await?;
            // SET EX rejects a zero expiry.
            let ttl_secs = ttl.as_secs().max(1);
            conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
            Ok(())
        }
    }
}

/// Build the store named by `url`, or `None` when no store is bound.
///
/// An in-process store gets a background sweep every [`CLEANUP_INTERVAL`].
/// A Redis store connects lazily, so an outage at startup only makes
/// individual requests fail open.
pub async fn connect(url: Option<&str>) -> Option<Arc<dyn QuotaStore>> {
    let url = match url {
        Some(url) => url,
        None => {
            warn!("No quota store configured; submissions will not be rate limited");
            return None;
        }
    };

    if url.eq_ignore_ascii_case("memory") {
        let store = MemoryStore::new();
        store.spawn_cleanup(CLEANUP_INTERVAL);
        info!("Using in-process quota store");
        return Some(Arc::new(store));
    }

    #[cfg(feature = "redis")]
    {
        if url.starts_with("redis://") || url.starts_with("rediss://") {
            return match RedisStore::open(url) {
                Ok(store) => {
                    info!("Using Redis quota store");
                    Some(Arc::new(store))
                }
                Err(e) => {
                    warn!(error = %e, "Invalid Redis URL; continuing without rate limiting");
                    None
                }
            };
        }
    }

    warn!("Unsupported quota store URL scheme; continuing without rate limiting");
    None
}
