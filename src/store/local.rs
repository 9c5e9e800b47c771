//! A filesystem-backed implementation of the [`KvStore`][super::KvStore]
//! trait.
//!
//! Keys are interpreted as relative paths below the bucket directory.
//! Intermediate directories are created with mode `0700`, values are written
//! with mode `0600`. Writes are not atomic; a crash mid-write can leave a
//! partial file, which readers tolerate by revalidating decoded state.

use crate::error::Error;
use crate::store::KvStore;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub struct LocalStore {
    bucket: PathBuf,
}

impl LocalStore {
    /// Open (creating if necessary) a store rooted at the `bucket`
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] when the bucket directory cannot be created.
    pub async fn open(bucket: impl AsRef<Path>) -> Result<Self, Error> {
        let bucket = bucket.as_ref().to_path_buf();
        create_private_dir(&bucket).await?;
        Ok(LocalStore { bucket })
    }

    fn absolute_path(&self, key: &str) -> PathBuf {
        self.bucket.join(key)
    }

    async fn is_file(&self, key: &str) -> Result<bool, Error> {
        match fs::metadata(self.absolute_path(key)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

async fn create_private_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(path).await
}

#[async_trait::async_trait]
impl KvStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, Error> {
        if !self.is_file(key).await? {
            return Err(Error::KeyNotFound(key.to_string()));
        }
        Ok(fs::read(self.absolute_path(key)).await?)
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        let path = self.absolute_path(key);
        if let Some(parent) = path.parent() {
            create_private_dir(parent).await?;
        }
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&path).await?;
        file.write_all(value).await?;
        file.flush().await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, Error> {
        let mut entries = Vec::new();
        let mut pending = vec![self.absolute_path(prefix)];
        while let Some(dir) = pending.pop() {
            let mut read_dir = match fs::read_dir(&dir).await {
                Ok(read_dir) => read_dir,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let key = path
                        .strip_prefix(&self.bucket)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .into_owned();
                    let value = fs::read(&path).await?;
                    entries.push((key, value));
                }
            }
        }
        Ok(entries)
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        self.is_file(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        if !self.is_file(key).await? {
            return Err(Error::KeyNotFound(key.to_string()));
        }
        Ok(fs::remove_file(self.absolute_path(key)).await?)
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn make_store() -> (TempDir, LocalStore) {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open(tmp.path().join("bucket")).await.unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let (_tmp, store) = make_store().await;
        store.put("user.json", b"{}").await.unwrap();
        assert_eq!(store.get("user.json").await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn get_missing_key_is_not_found() {
        let (_tmp, store) = make_store().await;
        match store.get("missing").await {
            Err(Error::KeyNotFound(key)) => assert_eq!(key, "missing"),
            other => panic!("expected KeyNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn put_creates_parent_directories() {
        let (_tmp, store) = make_store().await;
        store.put("certs/example.com.json", b"cert").await.unwrap();
        assert!(store.exists("certs/example.com.json").await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn entries_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let (_tmp, store) = make_store().await;
        store.put("certs/example.com.json", b"cert").await.unwrap();

        let dir = fs::metadata(store.absolute_path("certs")).await.unwrap();
        assert_eq!(dir.permissions().mode() & 0o777, 0o700);
        let file = fs::metadata(store.absolute_path("certs/example.com.json"))
            .await
            .unwrap();
        assert_eq!(file.permissions().mode() & 0o777, 0o600);
    }

    #[tokio::test]
    async fn list_returns_entries_below_prefix() {
        let (_tmp, store) = make_store().await;
        store.put("certs/a.json", b"a").await.unwrap();
        store.put("certs/nested/b.json", b"b").await.unwrap();
        store.put("user.json", b"u").await.unwrap();

        let mut keys: Vec<String> = store
            .list("certs/")
            .await
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["certs/a.json", "certs/nested/b.json"]);
    }

    #[tokio::test]
    async fn list_of_absent_prefix_is_empty() {
        let (_tmp, store) = make_store().await;
        assert!(store.list("certs/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_the_entry() {
        let (_tmp, store) = make_store().await;
        store.put("user.json", b"{}").await.unwrap();
        store.delete("user.json").await.unwrap();
        assert!(!store.exists("user.json").await.unwrap());
        assert!(matches!(
            store.delete("user.json").await,
            Err(Error::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn directories_are_not_keys() {
        let (_tmp, store) = make_store().await;
        store.put("certs/a.json", b"a").await.unwrap();
        assert!(!store.exists("certs").await.unwrap());
        assert!(matches!(
            store.get("certs").await,
            Err(Error::KeyNotFound(_))
        ));
    }
}
