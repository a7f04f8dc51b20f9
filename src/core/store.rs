use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::sequence_key;

/// Byte-oriented key-value storage the whole application runs on.
pub trait KvStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Replaces the value at `key` with `f(current)`. Stores that can hold a
    /// lock across the read and the write do so, making the update atomic.
    /// `f` must not touch the store.
    fn modify(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<Vec<u8>>) -> anyhow::Result<Vec<u8>>,
    ) -> anyhow::Result<()> {
        let next = f(self.get(key)?)?;
        self.set(key, &next)
    }
}

/// JSON helpers available on every store, trait objects included.
pub trait KvStoreExt: KvStore {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        self.set(key, &serde_json::to_vec(value)?)
    }

    /// Read-modify-write of a JSON value through `KvStore::modify`. A missing
    /// key starts from `T::default()`.
    fn update_json<T, R, F>(&self, key: &str, mut f: F) -> anyhow::Result<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnMut(&mut T) -> R,
    {
        let mut result = None;
        self.modify(key, &mut |current| {
            let mut value: T = match current {
                Some(bytes) => serde_json::from_slice(&bytes)?,
                None => T::default(),
            };
            result = Some(f(&mut value));
            Ok(serde_json::to_vec(&value)?)
        })?;
        result.ok_or_else(|| anyhow::anyhow!("update of {} did not run", key))
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}

/// Returns the next id for `kind`, starting at 1.
pub fn next_id(store: &dyn KvStore, kind: &str) -> anyhow::Result<u64> {
    store.update_json(&sequence_key(kind), |last: &mut u64| {
        *last += 1;
        *last
    })
}

/// In-process store used by the native server and the tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.lock()?.contains_key(key))
    }

    fn modify(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<Vec<u8>>) -> anyhow::Result<Vec<u8>>,
    ) -> anyhow::Result<()> {
        let mut map = self.lock()?;
        let next = f(map.get(key).cloned())?;
        map.insert(key.to_string(), next);
        Ok(())
    }
}

/// The Spin key-value store of the running component.
pub struct SpinStore {
    inner: spin_sdk::key_value::Store,
}

impl SpinStore {
    pub fn open_default() -> anyhow::Result<Self> {
        let inner = spin_sdk::key_value::Store::open_default()
            .map_err(|e| anyhow::anyhow!("failed to open KV store: {:?}", e))?;
        Ok(Self { inner })
    }
}

impl KvStore for SpinStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.inner
            .get(key)
            .map_err(|e| anyhow::anyhow!("KV get {} failed: {:?}", key, e))
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.inner
            .set(key, value)
            .map_err(|e| anyhow::anyhow!("KV set {} failed: {:?}", key, e))
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.inner
            .delete(key)
            .map_err(|e| anyhow::anyhow!("KV delete {} failed: {:?}", key, e))
    }
}
