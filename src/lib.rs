pub mod auth;
pub mod comments;
pub mod config;
pub mod core;
pub mod feed;
pub mod follow;
pub mod groups;
pub mod handlers;
pub mod models;
pub mod posts;
pub mod static_server;
pub mod templates;
pub mod users;

#[cfg(not(target_arch = "wasm32"))]
pub mod server;

use chrono::Duration;

use crate::config::{Settings, DEFAULT_INDEX_CACHE_SECONDS};
use crate::core::cache::PageCache;
use crate::core::store::KvStore;

/// Everything a request handler needs: storage and settings.
pub struct Blog {
    store: Box<dyn KvStore>,
    settings: Settings,
}

impl Blog {
    pub fn new(store: impl KvStore + 'static, settings: Settings) -> Self {
        Self {
            store: Box::new(store),
            settings,
        }
    }

    pub fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Cache for the rendered home listing.
    pub fn index_cache(&self) -> PageCache<'_> {
        let ttl = Duration::try_seconds(self.settings.index_cache_seconds)
            .unwrap_or_else(|| Duration::seconds(DEFAULT_INDEX_CACHE_SECONDS));
        PageCache::new(self.store(), ttl)
    }
}

// === Component entrypoint ===
#[cfg(target_arch = "wasm32")]
#[spin_sdk::http_component]
fn handle(req: spin_sdk::http::Request) -> anyhow::Result<spin_sdk::http::Response> {
    let store = crate::core::store::SpinStore::open_default()?;
    let blog = Blog::new(store, Settings::from_env());
    handlers::route(&blog, req)
}
