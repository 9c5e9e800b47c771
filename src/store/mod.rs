//! Durable key/value storage for account and certificate state.
//!
//! Keys are slash-separated relative paths (`user.json`,
//! `certs/example.com.json`). The interface is deliberately tiny: the
//! certificate store only ever gets, puts and prefix-lists opaque byte
//! blobs.
//!
//! Two drivers are provided, [`local::LocalStore`] and
//! [`memory::InMemoryStore`]. The former persists every entry as a file
//! below a bucket directory and is the default. The latter keeps entries in
//! process memory and is primarily useful for tests.

use crate::error::Error;
use std::sync::Arc;

pub mod local;
pub mod memory;

#[allow(clippy::module_name_repetitions)]
pub use local::LocalStore;
#[allow(clippy::module_name_repetitions)]
pub use memory::InMemoryStore;

/// `DynKvStore` is a shared handle to a [`KvStore`] backend.
#[allow(clippy::module_name_repetitions)]
pub type DynKvStore = Arc<dyn KvStore + Send + Sync>;

/// An async trait describing the storage operations the certificate store
/// relies on. Backends are safe for concurrent use on distinct keys; no
/// atomicity is guaranteed for a single key (callers revalidate what they
/// read).
#[async_trait::async_trait]
pub trait KvStore {
    /// Fetch the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] when the key does not exist.
    async fn get(&self, key: &str) -> Result<Vec<u8>, Error>;

    /// Durably store `value` under `key`, creating parent directories as
    /// needed.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), Error>;

    /// All entries whose key begins with `prefix`. Order is unspecified but
    /// stable within one call. An absent prefix yields an empty list.
    async fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, Error>;

    /// Whether `key` currently holds a value.
    async fn exists(&self, key: &str) -> Result<bool, Error>;

    /// Remove the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] when the key does not exist.
    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// Release any resources held by the backend.
    async fn close(&self);
}
