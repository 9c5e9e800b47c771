//! [`AcmeClient`] implementation backed by the `instant-acme` crate.

use crate::acme::{AcmeClient, DynChallengeProvider, IssuedCertificate};
use crate::certstore::Account as AccountRecord;
use crate::error::Error;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewAccount,
    NewOrder, Order, OrderStatus, RetryPolicy,
};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use x509_parser::pem::parse_x509_pem;

const ORDER_TIMEOUT: Duration = Duration::from_secs(120);

const PEM_CERT_BEGIN: &str = "-----BEGIN CERTIFICATE-----";

/// Drives the ACME order flow against a directory, publishing DNS-01 proof
/// through the configured [`ChallengeProvider`][crate::acme::ChallengeProvider].
///
/// The directory account is created by [`register`][AcmeClient::register] or
/// restored lazily from the registration blob of the stored account record.
pub struct InstantAcmeClient {
    directory_url: String,
    preferred_chain: String,
    provider: DynChallengeProvider,
    account: RwLock<Option<Account>>,
}

struct PresentedChallenge {
    domain: String,
    token: String,
    key_auth: String,
}

impl InstantAcmeClient {
    pub fn new(
        directory_url: impl Into<String>,
        preferred_chain: impl Into<String>,
        provider: DynChallengeProvider,
    ) -> Self {
        InstantAcmeClient {
            directory_url: directory_url.into(),
            preferred_chain: preferred_chain.into(),
            provider,
            account: RwLock::new(None),
        }
    }

    /// Restore the directory account from the record's registration blob,
    /// unless one is already live.
    async fn ensure_account(&self, record: &AccountRecord) -> Result<(), Error> {
        if self.account.read().await.is_some() {
            return Ok(());
        }
        let Some(registration) = &record.registration else {
            return Err(Error::Unregistered);
        };
        let credentials: AccountCredentials = serde_json::from_value(registration.clone())?;
        let account = Account::builder()?.from_credentials(credentials).await?;
        *self.account.write().await = Some(account);
        Ok(())
    }

    /// Publish proof for every pending authorization and wait for the order
    /// to become ready. Presented challenges are pushed to `presented` so
    /// the caller can clean them up on every path.
    async fn validate(
        &self,
        order: &mut Order,
        presented: &mut Vec<PresentedChallenge>,
    ) -> Result<(), Error> {
        let mut authorizations = order.authorizations();
        while let Some(result) = authorizations.next().await {
            let mut authz = result?;
            match authz.status {
                AuthorizationStatus::Pending => {}
                AuthorizationStatus::Valid => continue,
                status => {
                    return Err(Error::AcmeOrder(format!(
                        "authorization in unexpected status {status:?}"
                    )))
                }
            }

            let identifier = authz.identifier();
            let domain = match &identifier.identifier {
                Identifier::Dns(domain) => domain.clone(),
                other => {
                    return Err(Error::AcmeOrder(format!(
                        "unsupported identifier type {other:?}"
                    )))
                }
            };

            let mut challenge = authz.challenge(ChallengeType::Dns01).ok_or_else(|| {
                Error::AcmeOrder(format!("no DNS-01 challenge offered for \"{domain}\""))
            })?;

            let key_auth = challenge.key_authorization();
            self.provider
                .present(&domain, &challenge.token, key_auth.as_str())
                .await?;
            presented.push(PresentedChallenge {
                domain: domain.clone(),
                token: challenge.token.clone(),
                key_auth: key_auth.as_str().to_string(),
            });

            debug!("published DNS-01 proof for \"{domain}\"");
            challenge.set_ready().await?;
        }

        let retry = RetryPolicy::default().timeout(ORDER_TIMEOUT);
        let status = order.poll_ready(&retry).await?;
        if status != OrderStatus::Ready {
            return Err(Error::AcmeOrder(format!(
                "order is not ready, status: {status:?}"
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AcmeClient for InstantAcmeClient {
    async fn register(&self, email: &str) -> Result<serde_json::Value, Error> {
        let (account, credentials) = Account::builder()?
            .create(
                &NewAccount {
                    contact: &[&format!("mailto:{email}")],
                    terms_of_service_agreed: true,
                    only_return_existing: false,
                },
                self.directory_url.clone(),
                None,
            )
            .await?;
        let registration = serde_json::to_value(&credentials)?;
        *self.account.write().await = Some(account);
        info!("registered ACME account for {email}");
        Ok(registration)
    }

    async fn obtain(
        &self,
        account: &AccountRecord,
        names: &[String],
    ) -> Result<IssuedCertificate, Error> {
        let common_name = names
            .first()
            .ok_or(Error::EmptyDomain)?
            .clone();
        self.ensure_account(account).await?;
        let guard = self.account.read().await;
        let directory_account = guard.as_ref().ok_or(Error::Unregistered)?;

        let identifiers: Vec<Identifier> = names
            .iter()
            .map(|name| Identifier::Dns(name.clone()))
            .collect();
        let mut order = directory_account
            .new_order(&NewOrder::new(&identifiers))
            .await?;

        let mut presented = Vec::new();
        let validated = self.validate(&mut order, &mut presented).await;
        for challenge in &presented {
            if let Err(err) = self
                .provider
                .clean_up(&challenge.domain, &challenge.token, &challenge.key_auth)
                .await
            {
                warn!(
                    "could not clean up DNS-01 proof for \"{}\": {err}",
                    challenge.domain
                );
            }
        }
        validated?;

        let private_key = order.finalize().await?;
        let retry = RetryPolicy::default().timeout(ORDER_TIMEOUT);
        let chain = order.poll_certificate(&retry).await?;
        let (certificate, issuer) = split_chain(&chain)?;

        if !self.preferred_chain.is_empty() && !chain_matches(&chain, &self.preferred_chain) {
            // The directory's default chain is all this client can fetch.
            debug!(
                "issued chain has no certificate matching preferred issuer \"{}\"",
                self.preferred_chain
            );
        }

        info!("obtained certificate for \"{common_name}\"");
        Ok(IssuedCertificate {
            domain: common_name,
            certificate: certificate.into_bytes(),
            issuer: issuer.into_bytes(),
            private_key: private_key.into_bytes(),
        })
    }
}

/// Split a bundled chain into the leading leaf block and the rest.
fn split_chain(chain: &str) -> Result<(String, String), Error> {
    let Some(first) = chain.find(PEM_CERT_BEGIN) else {
        return Err(Error::InvalidCertificate(
            "no PEM blocks in issued chain".to_string(),
        ));
    };
    let after_leaf = first + PEM_CERT_BEGIN.len();
    match chain[after_leaf..].find(PEM_CERT_BEGIN) {
        Some(offset) => {
            let second = after_leaf + offset;
            Ok((chain[..second].to_string(), chain[second..].to_string()))
        }
        None => Ok((chain.to_string(), String::new())),
    }
}

/// Whether any certificate in the bundled chain carries `preferred` in a
/// subject common name.
fn chain_matches(chain: &str, preferred: &str) -> bool {
    let mut rest = chain.as_bytes();
    while let Ok((tail, pem)) = parse_x509_pem(rest) {
        if let Ok(certificate) = pem.parse_x509() {
            let matched = certificate.subject().iter_common_name().any(|cn| {
                cn.as_str()
                    .map(|value| value.contains(preferred))
                    .unwrap_or(false)
            });
            if matched {
                return true;
            }
        }
        if tail.len() == rest.len() || tail.is_empty() {
            break;
        }
        rest = tail;
    }
    false
}
