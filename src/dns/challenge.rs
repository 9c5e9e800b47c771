use crate::acme::ChallengeProvider;
use crate::error::Error;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use trust_dns_server::client::rr::{LowerName, Name};

/// The TXT values currently served for the challenge zone, keyed by the
/// fully qualified record name. Owned by the DNS responder; the challenge
/// provider inserts and removes entries around each validation.
#[derive(Default)]
pub struct ChallengeTable {
    records: RwLock<HashMap<LowerName, String>>,
}

impl ChallengeTable {
    /// The TXT value served for `name`, if any.
    pub async fn get(&self, name: &LowerName) -> Option<String> {
        self.records.read().await.get(name).cloned()
    }

    async fn insert(&self, name: LowerName, value: String) {
        self.records.write().await.insert(name, value);
    }

    async fn remove(&self, name: &LowerName) {
        self.records.write().await.remove(name);
    }
}

/// [`ChallengeProvider`] backed by the embedded DNS server.
///
/// Operators publish `_acme-challenge.<fqdn> CNAME <fqdn>.<zone>.` once in
/// their real zone; when the CA resolves the challenge name it follows the
/// CNAME into the zone this server is authoritative for, so the TXT token
/// for any hostname can be served here without touching the real
/// authoritative DNS.
///
/// Challenges for the same domain are serialized: `present` blocks on a
/// per-domain mutex that is only released by the matching `clean_up`, so at
/// any instant the table holds at most one record per challenge name.
pub struct DnsCnameProvider {
    zone: Name,
    table: Arc<ChallengeTable>,
    /// One mutex per domain, created on first use under the map lock and
    /// kept forever; the set of domains a deployment issues for is small.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Guards held between `present` and `clean_up`.
    in_flight: Mutex<HashMap<String, OwnedMutexGuard<()>>>,
}

impl DnsCnameProvider {
    pub fn new(zone: Name, table: Arc<ChallengeTable>) -> Self {
        DnsCnameProvider {
            zone,
            table,
            locks: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// The record name serving the TXT token for `domain`: the domain (with
    /// any wildcard label stripped) prepended to the challenge zone.
    fn challenge_name(&self, domain: &str) -> Result<LowerName, Error> {
        let base = domain.strip_prefix("*.").unwrap_or(domain);
        let name = Name::from_str(base.trim_end_matches('.'))?.append_domain(&self.zone)?;
        Ok(LowerName::from(name))
    }

    async fn domain_lock(&self, domain: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(domain.to_string()).or_default().clone()
    }
}

#[async_trait::async_trait]
impl ChallengeProvider for DnsCnameProvider {
    async fn present(&self, domain: &str, _token: &str, key_auth: &str) -> Result<(), Error> {
        let lock = self.domain_lock(domain).await;
        let guard = lock.lock_owned().await;

        let name = self.challenge_name(domain)?;
        self.table.insert(name, dns01_value(key_auth)).await;
        self.in_flight.lock().await.insert(domain.to_string(), guard);
        Ok(())
    }

    async fn clean_up(&self, domain: &str, _token: &str, _key_auth: &str) -> Result<(), Error> {
        let name = self.challenge_name(domain)?;
        self.table.remove(&name).await;
        // dropping the guard releases the domain for the next challenge
        self.in_flight.lock().await.remove(domain);
        Ok(())
    }
}

/// The RFC 8555 DNS-01 record value: base64url(SHA-256(key authorization)),
/// unpadded.
fn dns01_value(key_auth: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(key_auth.as_bytes()))
}
