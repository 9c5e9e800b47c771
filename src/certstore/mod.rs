//! Certificate acquisition and caching.
//!
//! [`CertStore`] answers every certificate request: it returns a stored
//! record when one still satisfies the request (name coverage and remaining
//! validity), and otherwise runs one ACME exchange - registering the account
//! on first use - then persists and returns the fresh record.
//!
//! All requests are serialized on a single mutex. Concurrent orders against
//! the same account trip directory rate limits and fight over nonces, while
//! the cache-hit path is short; one in-flight exchange at a time is the
//! safer trade. Cross-instance coordination, if ever needed, belongs to the
//! storage backend.

mod account;
mod certificate;
mod request;

pub use account::{Account, ACCOUNT_KEY};
pub use certificate::CertificateRecord;
pub use request::{CertRequest, DEFAULT_VALID_DAYS};

use crate::acme::DynAcmeClient;
use crate::error::Error;
use crate::store::DynKvStore;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Storage prefix holding certificate records.
const CERTS_PREFIX: &str = "certs/";

pub struct CertStore {
    storage: DynKvStore,
    acme: DynAcmeClient,
    /// Serializes every [`get_certificate`][CertStore::get_certificate]
    /// call and guards the account record.
    account: Mutex<Account>,
}

impl CertStore {
    /// Load (or materialize) the account and persist it once, which also
    /// proves the storage is writable before any request arrives.
    ///
    /// # Errors
    ///
    /// Returns storage errors and account decoding/key-generation errors.
    pub async fn new(
        storage: DynKvStore,
        acme: DynAcmeClient,
        email: &str,
    ) -> Result<Self, Error> {
        let account = Account::load(&storage, email).await?;
        account.save(&storage).await?;
        Ok(CertStore {
            storage,
            acme,
            account: Mutex::new(account),
        })
    }

    /// Return a stored certificate satisfying `request`, or obtain a fresh
    /// one from the ACME directory, persist it and return it.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the lookup, registration errors on first
    /// use, and ACME errors from the order. A persistence failure *after* a
    /// successful order is only logged; the issued certificate is returned
    /// rather than wasting the issuance.
    pub async fn get_certificate(
        &self,
        request: &CertRequest,
    ) -> Result<CertificateRecord, Error> {
        if request.domain.is_empty() {
            return Err(Error::EmptyDomain);
        }

        let mut account = self.account.lock().await;

        if let Some(record) = self.lookup(request).await? {
            return Ok(record);
        }

        self.ensure_registration(&mut account).await?;

        let issued = self.acme.obtain(&account, &request.names()).await?;
        let record = CertificateRecord {
            domain: issued.domain,
            private_key: issued.private_key,
            certificate: issued.certificate,
            issuer: issued.issuer,
        };

        match serde_json::to_vec(&record) {
            Ok(raw) => {
                if let Err(err) = self.storage.put(&request.storage_key(), &raw).await {
                    warn!("could not save cert for \"{}\": {err}", record.domain);
                }
            }
            Err(err) => warn!("could not encode cert for \"{}\": {err}", record.domain),
        }

        Ok(record)
    }

    /// Find a stored record satisfying `request`, either under the common
    /// name's own key or by searching everything under the certs prefix.
    async fn lookup(&self, request: &CertRequest) -> Result<Option<CertificateRecord>, Error> {
        if request.domain_is_cn {
            return self.lookup_by_cn(request).await;
        }
        self.find_stored(request).await
    }

    async fn lookup_by_cn(
        &self,
        request: &CertRequest,
    ) -> Result<Option<CertificateRecord>, Error> {
        let raw = match self.storage.get(&request.storage_key()).await {
            Ok(raw) => raw,
            Err(Error::KeyNotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        let record: CertificateRecord = serde_json::from_slice(&raw)?;
        match request.matches(&record) {
            Ok(true) => Ok(Some(record)),
            Ok(false) => {
                info!("cert for \"{}\" no longer satisfies the request, renewing", request.domain);
                Ok(None)
            }
            Err(err) => {
                warn!("stored cert for \"{}\" is unreadable, renewing: {err}", request.domain);
                Ok(None)
            }
        }
    }

    async fn find_stored(
        &self,
        request: &CertRequest,
    ) -> Result<Option<CertificateRecord>, Error> {
        for (key, raw) in self.storage.list(CERTS_PREFIX).await? {
            let record: CertificateRecord = match serde_json::from_slice(&raw) {
                Ok(record) => record,
                Err(err) => {
                    warn!("could not decode json from \"{key}\": {err}");
                    continue;
                }
            };
            match request.matches(&record) {
                Ok(true) => return Ok(Some(record)),
                Ok(false) => {}
                Err(err) => warn!("skipping unreadable record at \"{key}\": {err}"),
            }
        }
        Ok(None)
    }

    /// Register the account on first use and persist the registration.
    ///
    /// A persistence failure here fails the request: losing a fresh
    /// registration would mean registering again next call, which some
    /// directories reject as a duplicate. The in-memory registration is
    /// kept so a retry after a transient storage error does not re-register.
    async fn ensure_registration(&self, account: &mut Account) -> Result<(), Error> {
        if account.registration.is_some() {
            return Ok(());
        }
        info!("registering new ACME account for {}", account.email);
        let registration = self.acme.register(&account.email).await?;
        account.registration = Some(registration);
        if let Err(err) = account.save(&self.storage).await {
            warn!("could not save account registration: {err}");
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acme::{AcmeClient, IssuedCertificate};
    use crate::store::{DynKvStore, InMemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use time::{Duration, OffsetDateTime};

    fn mint(names: &[String], valid_for_days: i64) -> (Vec<u8>, Vec<u8>) {
        let key = rcgen::KeyPair::generate().unwrap();
        let mut params = rcgen::CertificateParams::new(names.to_vec()).unwrap();
        params.not_after = OffsetDateTime::now_utc() + Duration::days(valid_for_days);
        let cert = params.self_signed(&key).unwrap();
        (cert.pem().into_bytes(), key.serialize_pem().into_bytes())
    }

    fn record(names: &[&str], valid_for_days: i64) -> CertificateRecord {
        let names: Vec<String> = names.iter().map(ToString::to_string).collect();
        let (certificate, private_key) = mint(&names, valid_for_days);
        CertificateRecord {
            domain: names[0].clone(),
            private_key,
            certificate,
            issuer: Vec::new(),
        }
    }

    /// Scripted ACME client: mints a certificate covering the requested
    /// names and records every call and the observed concurrency.
    #[derive(Default)]
    struct ScriptedAcme {
        calls: std::sync::Mutex<Vec<Vec<String>>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl AcmeClient for ScriptedAcme {
        async fn register(&self, _email: &str) -> Result<serde_json::Value, Error> {
            Ok(serde_json::json!({"scripted": true}))
        }

        async fn obtain(
            &self,
            _account: &Account,
            names: &[String],
        ) -> Result<IssuedCertificate, Error> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.calls.lock().unwrap().push(names.to_vec());
            let (certificate, private_key) = mint(names, 90);
            Ok(IssuedCertificate {
                domain: names[0].clone(),
                certificate,
                issuer: Vec::new(),
                private_key,
            })
        }
    }

    fn request(domain: &str, san: &[&str], domain_is_cn: bool, valid_days: i64) -> CertRequest {
        CertRequest {
            domain: domain.to_string(),
            san: san.iter().map(ToString::to_string).collect(),
            domain_is_cn,
            valid_days,
        }
    }

    async fn store_with(
        records: &[CertificateRecord],
    ) -> (DynKvStore, Arc<ScriptedAcme>, CertStore) {
        let storage: DynKvStore = Arc::new(InMemoryStore::default());
        for record in records {
            let key = format!("certs/{}.json", record.domain.to_lowercase());
            storage
                .put(&key, &serde_json::to_vec(record).unwrap())
                .await
                .unwrap();
        }
        let acme = Arc::new(ScriptedAcme::default());
        let store = CertStore::new(storage.clone(), acme.clone(), "ops@example.com")
            .await
            .unwrap();
        (storage, acme, store)
    }

    #[tokio::test]
    async fn cache_hit_by_common_name_skips_acme() {
        let preloaded = record(&["example.com"], 90);
        let (_storage, acme, store) = store_with(std::slice::from_ref(&preloaded)).await;

        let found = store
            .get_certificate(&request("example.com", &[], true, 30))
            .await
            .unwrap();
        assert_eq!(found, preloaded);
        assert!(acme.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cache_miss_obtains_and_persists() {
        let (storage, acme, store) = store_with(&[]).await;

        let issued = store
            .get_certificate(&request("foo.test", &["bar.test"], false, 30))
            .await
            .unwrap();
        assert_eq!(issued.domain, "foo.test");

        let calls = acme.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![vec!["foo.test".to_string(), "bar.test".to_string()]]);

        let raw = storage.get("certs/foo.test.json").await.unwrap();
        let stored: CertificateRecord = serde_json::from_slice(&raw).unwrap();
        assert_eq!(stored, issued);
    }

    #[tokio::test]
    async fn free_search_finds_a_covering_wildcard() {
        let wildcard = record(&["*.example.com"], 60);
        let (_storage, acme, store) = store_with(std::slice::from_ref(&wildcard)).await;

        let found = store
            .get_certificate(&request("a.example.com", &[], false, 30))
            .await
            .unwrap();
        assert_eq!(found, wildcard);
        assert!(acme.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_short_expiry_window_forces_renewal() {
        let stale = record(&["foo.test"], 10);
        let (storage, acme, store) = store_with(std::slice::from_ref(&stale)).await;

        let renewed = store
            .get_certificate(&request("foo.test", &[], false, 30))
            .await
            .unwrap();
        assert_ne!(renewed, stale);
        assert_eq!(acme.calls.lock().unwrap().len(), 1);

        let raw = storage.get("certs/foo.test.json").await.unwrap();
        let stored: CertificateRecord = serde_json::from_slice(&raw).unwrap();
        assert_eq!(stored, renewed);
    }

    #[tokio::test]
    async fn corrupt_records_are_skipped_in_free_search() {
        let good = record(&["good.test"], 90);
        let (storage, acme, store) = store_with(std::slice::from_ref(&good)).await;
        storage.put("certs/bad.test.json", b"not json").await.unwrap();

        let found = store
            .get_certificate(&request("good.test", &[], false, 30))
            .await
            .unwrap();
        assert_eq!(found, good);
        assert!(acme.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn registration_happens_once_and_is_persisted() {
        let (storage, _acme, store) = store_with(&[]).await;

        store
            .get_certificate(&request("foo.test", &[], false, 30))
            .await
            .unwrap();
        store
            .get_certificate(&request("bar.test", &[], false, 30))
            .await
            .unwrap();

        let raw = storage.get(ACCOUNT_KEY).await.unwrap();
        let account: Account = serde_json::from_slice(&raw).unwrap();
        assert_eq!(
            account.registration,
            Some(serde_json::json!({"scripted": true}))
        );
    }

    #[tokio::test]
    async fn concurrent_requests_issue_sequentially() {
        let (_storage, acme, store) = store_with(&[]).await;
        let store = Arc::new(store);

        let first = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .get_certificate(&request("one.test", &[], false, 30))
                    .await
            })
        };
        let second = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .get_certificate(&request("two.test", &[], false, 30))
                    .await
            })
        };

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(acme.calls.lock().unwrap().len(), 2);
        assert_eq!(acme.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_domains_are_rejected() {
        let (_storage, _acme, store) = store_with(&[]).await;
        assert!(matches!(
            store.get_certificate(&request("", &[], false, 30)).await,
            Err(Error::EmptyDomain)
        ));
    }
}
