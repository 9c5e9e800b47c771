use crate::error::Error;
use crate::store::DynKvStore;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;

/// Storage key of the serialized account.
pub const ACCOUNT_KEY: &str = "user.json";

const ACCOUNT_KEY_BITS: usize = 4096;

/// The single ACME account this daemon issues under: the contact email, the
/// account's long-term RSA key (PKCS#1 DER) and the opaque registration
/// resource handed back by the directory.
///
/// Created once on first start; mutated only to attach the registration.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Account {
    pub email: String,
    pub registration: Option<serde_json::Value>,
    #[serde_as(as = "Base64")]
    pub key: Vec<u8>,
}

impl Account {
    /// Load the stored account, or materialize a fresh unregistered one
    /// with a newly generated RSA-4096 key. The fresh account is not
    /// persisted; the caller saves it.
    ///
    /// # Errors
    ///
    /// Returns storage errors other than a missing key, decoding errors for
    /// a corrupt stored account, and [`Error::AccountKey`] when key
    /// generation fails.
    pub async fn load(storage: &DynKvStore, email: &str) -> Result<Self, Error> {
        match storage.get(ACCOUNT_KEY).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(Error::KeyNotFound(_)) => Ok(Account {
                email: email.to_string(),
                registration: None,
                key: new_account_key()?,
            }),
            Err(err) => Err(err),
        }
    }

    /// Persist the account under [`ACCOUNT_KEY`].
    pub async fn save(&self, storage: &DynKvStore) -> Result<(), Error> {
        let raw = serde_json::to_vec(self)?;
        storage.put(ACCOUNT_KEY, &raw).await
    }
}

/// PKCS#1 DER bytes of a fresh RSA-4096 private key.
fn new_account_key() -> Result<Vec<u8>, Error> {
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), ACCOUNT_KEY_BITS)
        .map_err(|err| Error::AccountKey(err.to_string()))?;
    let der = key
        .to_pkcs1_der()
        .map_err(|err| Error::AccountKey(err.to_string()))?;
    Ok(der.as_bytes().to_vec())
}
