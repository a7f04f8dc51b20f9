use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{cache_key, CACHE_KEYS_KEY};
use crate::core::store::{KvStore, KvStoreExt};

const MAX_TTL_DAYS: i64 = 36_500;

#[derive(Serialize, Deserialize)]
struct CachedPage {
    expires_at: DateTime<Utc>,
    body: String,
}

/// Time-limited store of rendered pages, shared by every visitor.
pub struct PageCache<'a> {
    store: &'a dyn KvStore,
    ttl: Duration,
}

impl<'a> PageCache<'a> {
    /// `ttl` is capped at a century so expiry times stay representable.
    pub fn new(store: &'a dyn KvStore, ttl: Duration) -> Self {
        Self {
            store,
            ttl: ttl.min(Duration::days(MAX_TTL_DAYS)),
        }
    }

    pub fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        match self.store.get_json::<CachedPage>(&cache_key(key))? {
            Some(page) if Utc::now() < page.expires_at => {
                debug!(key, "page cache hit");
                Ok(Some(page.body))
            }
            Some(_) => {
                debug!(key, "page cache entry expired");
                self.store.delete(&cache_key(key))?;
                Ok(None)
            }
            None => {
                debug!(key, "page cache miss");
                Ok(None)
            }
        }
    }

    pub fn put(&self, key: &str, body: &str) -> anyhow::Result<()> {
        let page = CachedPage {
            expires_at: Utc::now() + self.ttl,
            body: body.to_string(),
        };
        self.store.set_json(&cache_key(key), &page)?;

        self.store.update_json(CACHE_KEYS_KEY, |keys: &mut Vec<String>| {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        })
    }

    /// Drops every cached page.
    pub fn clear(&self) -> anyhow::Result<()> {
        let keys = self
            .store
            .update_json(CACHE_KEYS_KEY, |keys: &mut Vec<String>| std::mem::take(keys))?;
        for key in &keys {
            self.store.delete(&cache_key(key))?;
        }
        debug!(entries = keys.len(), "page cache cleared");
        Ok(())
    }
}
