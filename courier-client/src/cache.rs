//! Response caching keyed by request descriptor.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::descriptor::CacheKey;

/// Type-erased decoded object stored next to the raw bytes.
pub type CachedObject = Arc<dyn Any + Send + Sync>;

/// A cached artifact: raw response bytes, a decoded object, or both.
#[derive(Clone, Default)]
pub struct CacheItem {
    /// Raw response bytes.
    pub bytes: Option<Bytes>,
    /// Decoded object, retrieved by downcast.
    pub object: Option<CachedObject>,
}

impl CacheItem {
    /// Check if neither field is populated.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_none() && self.object.is_none()
    }

    fn merge(&mut self, bytes: Option<Bytes>, object: Option<CachedObject>) {
        if bytes.is_some() {
            self.bytes = bytes;
        }
        if object.is_some() {
            self.object = object;
        }
    }
}

impl fmt::Debug for CacheItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheItem")
            .field("bytes", &self.bytes.as_ref().map(Bytes::len))
            .field("object", &self.object.is_some())
            .finish()
    }
}

/// Key-value store mapping a request descriptor to a cached artifact.
///
/// `get` and `set` must be safe to call from the parse pipeline concurrently
/// with reads triggered by new dispatches.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Get the cached item for `key`.
    async fn get(&self, key: &CacheKey) -> Option<CacheItem>;

    /// Store `bytes` and/or `object` for `key`.
    ///
    /// A call with both fields `None` is a no-op: it never clobbers a
    /// populated entry. Otherwise the fields merge into any existing item, so
    /// a bytes-only write followed by an object-only write yields an item
    /// with both populated.
    async fn set(&self, key: &CacheKey, bytes: Option<Bytes>, object: Option<CachedObject>);

    /// Remove the entry for `key`.
    async fn remove(&self, key: &CacheKey);

    /// Remove all entries.
    async fn clear(&self);
}

/// In-memory cache provider.
#[derive(Default)]
pub struct MemoryCacheProvider {
    entries: RwLock<HashMap<CacheKey, CacheItem>>,
}

impl MemoryCacheProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn get(&self, key: &CacheKey) -> Option<CacheItem> {
        self.entries.read().get(key).cloned()
    }

    async fn set(&self, key: &CacheKey, bytes: Option<Bytes>, object: Option<CachedObject>) {
        if bytes.is_none() && object.is_none() {
            return;
        }
        self.entries
            .write()
            .entry(key.clone())
            .or_default()
            .merge(bytes, object);
    }

    async fn remove(&self, key: &CacheKey) {
        self.entries.write().remove(key);
    }

    async fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::RequestDescriptor;
    use http::Method;

    fn key() -> CacheKey {
        RequestDescriptor::builder(Method::GET, "https://example.com/")
            .build()
            .unwrap()
            .cache_key()
    }

    #[tokio::test]
    async fn round_trip_both_fields() {
        let cache = MemoryCacheProvider::new();
        let key = key();

        let object: CachedObject = Arc::new("decoded".to_string());
        cache
            .set(&key, Some(Bytes::from_static(b"raw")), Some(object))
            .await;

        let item = cache.get(&key).await.unwrap();
        assert_eq!(item.bytes.unwrap(), Bytes::from_static(b"raw"));
        assert_eq!(
            item.object.unwrap().downcast_ref::<String>().unwrap(),
            "decoded"
        );
    }

    #[tokio::test]
    async fn empty_set_is_a_no_op() {
        let cache = MemoryCacheProvider::new();
        let key = key();

        cache.set(&key, None, None).await;
        assert!(cache.get(&key).await.is_none());

        cache.set(&key, Some(Bytes::from_static(b"raw")), None).await;
        cache.set(&key, None, None).await;

        let item = cache.get(&key).await.unwrap();
        assert_eq!(item.bytes.unwrap(), Bytes::from_static(b"raw"));
    }

    #[tokio::test]
    async fn writes_merge_into_existing_items() {
        let cache = MemoryCacheProvider::new();
        let key = key();

        cache.set(&key, Some(Bytes::from_static(b"raw")), None).await;
        let object: CachedObject = Arc::new(42u32);
        cache.set(&key, None, Some(object)).await;

        let item = cache.get(&key).await.unwrap();
        assert_eq!(item.bytes.unwrap(), Bytes::from_static(b"raw"));
        assert_eq!(*item.object.unwrap().downcast_ref::<u32>().unwrap(), 42);
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let cache = MemoryCacheProvider::new();
        let key = key();

        cache.set(&key, Some(Bytes::from_static(b"raw")), None).await;
        cache.remove(&key).await;
        assert!(cache.get(&key).await.is_none());

        cache.set(&key, Some(Bytes::from_static(b"raw")), None).await;
        cache.clear().await;
        assert!(cache.get(&key).await.is_none());
    }
}
