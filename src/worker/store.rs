//! Named cache buckets holding request/response pairs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Url;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::net::Response;

/// Returns the key a request URL is stored under. Fragments are ignored.
#[must_use]
pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

/// Abstraction over the host's named cache storage.
///
/// Buckets are kept in creation order; [`lookup`](Self::lookup) searches
/// them in that order.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Opens a bucket, creating it empty if it does not exist.
    async fn open(&self, bucket: &str) -> Result<()>;

    /// Lists bucket names in creation order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Stores every entry in `bucket`, or none of them on failure.
    async fn put_all(&self, bucket: &str, entries: Vec<(Url, Response)>) -> Result<()>;

    /// Looks up a URL in one bucket.
    async fn lookup_in(&self, bucket: &str, url: &Url) -> Result<Option<Response>>;

    /// Deletes a bucket. Returns false if it did not exist.
    async fn delete(&self, bucket: &str) -> Result<bool>;

    /// Looks up a URL across all buckets.
    async fn lookup(&self, url: &Url) -> Result<Option<Response>> {
        for bucket in self.keys().await? {
            if let Some(response) = self.lookup_in(&bucket, url).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    /// Deletes every bucket whose name matches `predicate` and returns their names.
    async fn delete_where(
        &self,
        predicate: &(dyn for<'p> Fn(&'p str) -> bool + Send + Sync),
    ) -> Result<Vec<String>> {
        let doomed: Vec<String> = self
            .keys()
            .await?
            .into_iter()
            .filter(|name| predicate(name))
            .collect();

        for result in join_all(doomed.iter().map(|name| self.delete(name))).await {
            result?;
        }
        Ok(doomed)
    }
}

#[async_trait]
impl<T: CacheStore + ?Sized> CacheStore for Arc<T> {
    async fn open(&self, bucket: &str) -> Result<()> {
        (**self).open(bucket).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        (**self).keys().await
    }

    async fn put_all(&self, bucket: &str, entries: Vec<(Url, Response)>) -> Result<()> {
        (**self).put_all(bucket, entries).await
    }

    async fn lookup_in(&self, bucket: &str, url: &Url) -> Result<Option<Response>> {
        (**self).lookup_in(bucket, url).await
    }

    async fn delete(&self, bucket: &str) -> Result<bool> {
        (**self).delete(bucket).await
    }

    async fn lookup(&self, url: &Url) -> Result<Option<Response>> {
        (**self).lookup(url).await
    }
}

type Bucket = (String, HashMap<String, Response>);

/// In-memory [`CacheStore`].
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    buckets: RwLock<Vec<Bucket>>,
}

impl MemoryCacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries in a bucket, if it exists.
    pub async fn len(&self, bucket: &str) -> Option<usize> {
        self.buckets
            .read()
            .await
            .iter()
            .find(|(name, _)| name == bucket)
            .map(|(_, entries)| entries.len())
    }
}

fn bucket_mut<'a>(buckets: &'a mut Vec<Bucket>, name: &str) -> &'a mut HashMap<String, Response> {
    let index = match buckets.iter().position(|(n, _)| n == name) {
        Some(index) => index,
        None => {
            buckets.push((name.to_string(), HashMap::new()));
            buckets.len() - 1
        }
    };
    &mut buckets[index].1
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self, bucket: &str) -> Result<()> {
        bucket_mut(&mut *self.buckets.write().await, bucket);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .buckets
            .read()
            .await
            .iter()
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn put_all(&self, bucket: &str, entries: Vec<(Url, Response)>) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        let target = bucket_mut(&mut buckets, bucket);
        for (url, response) in entries {
            target.insert(cache_key(&url), response);
        }
        Ok(())
    }

    async fn lookup_in(&self, bucket: &str, url: &Url) -> Result<Option<Response>> {
        let key = cache_key(url);
        Ok(self
            .buckets
            .read()
            .await
            .iter()
            .find(|(name, _)| name == bucket)
            .and_then(|(_, entries)| entries.get(&key).cloned()))
    }

    async fn delete(&self, bucket: &str) -> Result<bool> {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|(name, _)| name != bucket);
        Ok(buckets.len() != before)
    }
}
