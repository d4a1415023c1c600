//! On-disk [`CacheStore`] backed by `tokio::fs`.
//!
//! Layout under the root directory:
//!
//! ```text
//! index.json                 bucket names in creation order
//! <hex bucket name>/
//!     <sha256 of url>.json   status, content type, and URL
//!     <sha256 of url>.body   response body
//! ```
//!
//! `put_all` stages every entry as `.part` files and renames them only once
//! all writes succeeded.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use super::store::{CacheStore, cache_key};
use crate::error::Result;
use crate::net::Response;

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    status: u16,
    content_type: Option<String>,
}

fn bucket_dir_name(bucket: &str) -> String {
    bucket.bytes().map(|b| format!("{b:02x}")).collect()
}

fn entry_stem(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

fn with_part(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Keys a batch by [`cache_key`]. A later entry replaces an earlier one with
/// the same key but keeps its position.
fn unique_by_key(entries: Vec<(Url, Response)>) -> Vec<(String, Response)> {
    let mut unique: Vec<(String, Response)> = Vec::with_capacity(entries.len());
    for (url, response) in entries {
        let key = cache_key(&url);
        match unique.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = response,
            None => unique.push((key, response)),
        }
    }
    unique
}

/// Persistent cache buckets in a directory.
#[derive(Debug)]
pub struct DiskCacheStore {
    root: PathBuf,
    // Serializes index updates and staged writes.
    lock: Mutex<()>,
}

impl DiskCacheStore {
    /// Creates a store rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket_dir_name(bucket))
    }

    async fn read_index(&self) -> Result<Vec<String>> {
        match tokio::fs::read(self.root.join(INDEX_FILE)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_index(&self, names: &[String]) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(INDEX_FILE);
        let part = with_part(&path);
        tokio::fs::write(&part, serde_json::to_vec(names)?).await?;
        tokio::fs::rename(&part, &path).await?;
        Ok(())
    }

    /// Creates the bucket if missing. Caller holds `self.lock`.
    async fn ensure_bucket(&self, bucket: &str) -> Result<PathBuf> {
        let mut names = self.read_index().await?;
        if !names.iter().any(|n| n == bucket) {
            names.push(bucket.to_string());
            self.write_index(&names).await?;
            log::debug!("Created cache bucket {bucket}");
        }
        let dir = self.bucket_dir(bucket);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Writes every entry as `.part` files, recording `(part, final)` pairs in `staged`.
    async fn stage(
        dir: &Path,
        entries: &[(String, Response)],
        staged: &mut Vec<(PathBuf, PathBuf)>,
    ) -> Result<()> {
        for (key, response) in entries {
            let stem = entry_stem(key);
            let meta = EntryMeta {
                url: key.clone(),
                status: response.status,
                content_type: response.content_type.clone(),
            };

            let body_path = dir.join(format!("{stem}.body"));
            let body_part = with_part(&body_path);
            tokio::fs::write(&body_part, &response.body).await?;
            staged.push((body_part, body_path));

            let meta_path = dir.join(format!("{stem}.json"));
            let meta_part = with_part(&meta_path);
            tokio::fs::write(&meta_part, serde_json::to_vec(&meta)?).await?;
            staged.push((meta_part, meta_path));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn open(&self, bucket: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.ensure_bucket(bucket).await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.read_index().await
    }

    async fn put_all(&self, bucket: &str, entries: Vec<(Url, Response)>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let dir = self.ensure_bucket(bucket).await?;

        let entries = unique_by_key(entries);
        let mut staged = Vec::with_capacity(entries.len() * 2);
        if let Err(e) = Self::stage(&dir, &entries, &mut staged).await {
            for (part, _) in &staged {
                let _ = tokio::fs::remove_file(part).await;
            }
            return Err(e);
        }

        for (part, path) in &staged {
            tokio::fs::rename(part, path).await?;
        }
        log::debug!("Stored {} entries in cache bucket {bucket}", entries.len());
        Ok(())
    }

    async fn lookup_in(&self, bucket: &str, url: &Url) -> Result<Option<Response>> {
        let dir = self.bucket_dir(bucket);
        let stem = entry_stem(&cache_key(url));

        let meta: EntryMeta = match tokio::fs::read(dir.join(format!("{stem}.json"))).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let body = match tokio::fs::read(dir.join(format!("{stem}.body"))).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(Response {
            status: meta.status,
            content_type: meta.content_type,
            body: body.into(),
        }))
    }

    async fn delete(&self, bucket: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut names = self.read_index().await?;
        let before = names.len();
        names.retain(|n| n != bucket);
        if names.len() == before {
            return Ok(false);
        }
        self.write_index(&names).await?;

        match tokio::fs::remove_dir_all(self.bucket_dir(bucket)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn bucket_names_are_hex_encoded() {
        assert_eq!(bucket_dir_name("v1"), "7631");
        assert_eq!(bucket_dir_name("../x"), "2e2e2f78");
    }

    #[test]
    fn entry_stem_is_sha256_hex() {
        let stem = entry_stem("https://store.example/");
        assert_eq!(stem.len(), 64);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(stem, entry_stem("https://store.example/index.html"));
    }

    #[tokio::test]
    async fn put_and_lookup_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::new(dir.path());
        let page = url("https://store.example/style.css");
        let response = Response::new(200, "body { }").with_content_type("text/css");

        store
            .put_all("noppo-store-v3", vec![(page.clone(), response.clone())])
            .await
            .unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["noppo-store-v3"]);
        assert_eq!(store.lookup(&page).await.unwrap(), Some(response));
        assert!(store
            .lookup(&url("https://store.example/other.css"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn buckets_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let page = url("https://store.example/");
        {
            let store = DiskCacheStore::new(dir.path());
            store.open("a").await.unwrap();
            store
                .put_all("b", vec![(page.clone(), Response::new(200, "hi"))])
                .await
                .unwrap();
        }

        let store = DiskCacheStore::new(dir.path());
        assert_eq!(store.keys().await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.lookup(&page).await.unwrap().unwrap().body, "hi");
    }

    #[tokio::test]
    async fn delete_removes_bucket_and_files() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::new(dir.path());
        let page = url("https://store.example/");
        store
            .put_all("old", vec![(page.clone(), Response::new(200, "x"))])
            .await
            .unwrap();
        store.open("new").await.unwrap();

        let removed = store
            .delete_where(&|name: &str| name != "new")
            .await
            .unwrap();
        assert_eq!(removed, vec!["old"]);
        assert_eq!(store.keys().await.unwrap(), vec!["new"]);
        assert!(!store.bucket_dir("old").exists());
        assert!(store.lookup(&page).await.unwrap().is_none());
        assert!(!store.delete("old").await.unwrap());
    }

    #[tokio::test]
    async fn no_part_files_left_after_put() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::new(dir.path());
        store
            .put_all(
                "v1",
                vec![
                    (url("https://store.example/"), Response::new(200, "a")),
                    (url("https://store.example/b"), Response::new(200, "b")),
                ],
            )
            .await
            .unwrap();

        let mut files = std::fs::read_dir(store.bucket_dir("v1"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        files.sort();
        assert_eq!(files.len(), 4);
        assert!(files.iter().all(|f| !f.ends_with(".part")));
    }

    #[tokio::test]
    async fn batch_with_shared_key_keeps_last_entry() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::new(dir.path());
        let root = url("https://store.example/");

        store
            .put_all(
                "v1",
                vec![
                    (root.clone(), Response::new(200, "x")),
                    (url("https://store.example/#top"), Response::new(200, "y")),
                ],
            )
            .await
            .unwrap();

        assert_eq!(store.lookup(&root).await.unwrap().unwrap().body, "y");
        let files = std::fs::read_dir(store.bucket_dir("v1")).unwrap().count();
        assert_eq!(files, 2);

        let memory = crate::worker::MemoryCacheStore::new();
        memory
            .put_all(
                "v1",
                vec![
                    (root.clone(), Response::new(200, "x")),
                    (url("https://store.example/#top"), Response::new(200, "y")),
                ],
            )
            .await
            .unwrap();
        assert_eq!(memory.lookup(&root).await.unwrap().unwrap().body, "y");
    }
}
