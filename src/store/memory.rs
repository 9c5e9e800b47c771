//! An in-memory implementation of the [`KvStore`][super::KvStore] trait.
//!
//! Makes no effort to persist values between restarts. Useful for tests and
//! throwaway deployments.

use crate::error::Error;
use crate::store::KvStore;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default, Debug)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

#[async_trait::async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, Error> {
        self.entries
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, Error> {
        Ok(self
            .entries
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        match self.entries.write().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(Error::KeyNotFound(key.to_string())),
        }
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_is_limited_to_the_prefix() {
        let store = InMemoryStore::default();
        store.put("certs/a.json", b"a").await.unwrap();
        store.put("certs/b.json", b"b").await.unwrap();
        store.put("user.json", b"u").await.unwrap();

        let keys: Vec<String> = store
            .list("certs/")
            .await
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec!["certs/a.json", "certs/b.json"]);
    }

    #[tokio::test]
    async fn delete_of_missing_key_is_not_found() {
        let store = InMemoryStore::default();
        assert!(matches!(
            store.delete("nope").await,
            Err(Error::KeyNotFound(_))
        ));
    }
}
