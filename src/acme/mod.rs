//! The contracts between the certificate store and the ACME machinery.
//!
//! [`AcmeClient`] is everything the store needs from an ACME protocol
//! implementation: one-time account registration and a blocking
//! obtain-certificate call. [`ChallengeProvider`] is the seam the client
//! publishes DNS-01 proof through; the built-in implementation is the
//! CNAME-redirect responder in [`crate::dns`], which serves the TXT token
//! itself instead of editing the real authoritative zone.

use crate::certstore::Account;
use crate::error::Error;
use std::sync::Arc;

pub mod client;

#[allow(clippy::module_name_repetitions)]
pub use client::InstantAcmeClient;

/// `DynAcmeClient` is a shared handle to an [`AcmeClient`].
#[allow(clippy::module_name_repetitions)]
pub type DynAcmeClient = Arc<dyn AcmeClient + Send + Sync>;

/// `DynChallengeProvider` is a shared handle to a [`ChallengeProvider`].
pub type DynChallengeProvider = Arc<dyn ChallengeProvider + Send + Sync>;

/// One successfully issued certificate, PEM-encoded throughout.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    /// The common name the certificate was requested for.
    pub domain: String,
    /// The leaf certificate on its own.
    pub certificate: Vec<u8>,
    /// The issuer chain, possibly empty.
    pub issuer: Vec<u8>,
    /// The certificate's private key.
    pub private_key: Vec<u8>,
}

/// The ACME operations the certificate store sequences.
#[async_trait::async_trait]
pub trait AcmeClient {
    /// Create a fresh account with the directory, agreeing to its terms of
    /// service. Returns the opaque registration blob the caller persists.
    async fn register(&self, email: &str) -> Result<serde_json::Value, Error>;

    /// Run one certificate order for `names` (the first entry is the common
    /// name), performing DNS-01 validation along the way. Requires a
    /// registered account.
    async fn obtain(
        &self,
        account: &Account,
        names: &[String],
    ) -> Result<IssuedCertificate, Error>;
}

/// The DNS-01 publication contract.
///
/// `present` publishes the TXT proof for `domain` and blocks while another
/// challenge for the same domain is in flight; every `present` must be
/// paired with a `clean_up`, which removes the proof and releases the
/// domain.
#[async_trait::async_trait]
pub trait ChallengeProvider {
    async fn present(&self, domain: &str, token: &str, key_auth: &str) -> Result<(), Error>;

    async fn clean_up(&self, domain: &str, token: &str, key_auth: &str) -> Result<(), Error>;
}
