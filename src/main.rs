use anyhow::{anyhow, Result};
use certforge::acme::{DynChallengeProvider, InstantAcmeClient};
use certforge::certstore::CertStore;
use certforge::config::{Config, SharedConfig, PROVIDER_DNS_CNAME};
use certforge::dns::{ChallengeTable, DnsCnameProvider};
use certforge::error::Error;
use certforge::error::Error::DNSError;
use certforge::store::{DynKvStore, InMemoryStore, LocalStore};
use std::sync::Arc;
use tokio::signal;
use tokio::signal::unix::{signal as unix_signal, SignalKind};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let mut first_args = std::env::args().take(2);
    let (program_name, config_file) = (
        first_args.next().unwrap_or("certforge".to_string()),
        first_args.next(),
    );

    let config = config_init(&program_name, config_file)?;
    let storage = storage_from_config(&config).await?;

    if config.provider != PROVIDER_DNS_CNAME {
        // Third-party DNS-01 providers are not built in; see the docs.
        return Err(Error::UnknownProvider(config.provider.clone()).into());
    }

    // The DNS responder is a mandatory dependency for issuance; failing to
    // bind it is fatal.
    let challenges = Arc::new(ChallengeTable::default());
    tracing::info!("DNS listening on UDP and TCP {}", &config.dns.listen);
    let dns_server = certforge::dns::server::new(config.clone(), challenges.clone()).await?;
    let dns_handle = tokio::spawn(dns_server.block_until_done());

    let provider: DynChallengeProvider =
        Arc::new(DnsCnameProvider::new(config.zone_name()?, challenges));
    let acme = Arc::new(InstantAcmeClient::new(
        config.server.clone(),
        config.preferred_chain.clone(),
        provider,
    ));
    let store = Arc::new(CertStore::new(storage.clone(), acme, &config.email).await?);

    tracing::info!("API listening on {}", &config.listen);
    let api_server = certforge::api::server::new(config.clone(), store);
    let api_handle = tokio::spawn(api_server);

    let mut sigterm = unix_signal(SignalKind::terminate())?;
    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("quitting from signal");
        },
        _ = sigterm.recv() => {
            tracing::info!("quitting from signal");
        },
        Ok(dns_res) = dns_handle => {
            if let Err(err) = dns_res {
                return Err(DNSError(err).into())
            }
        }
        Ok(api_res) = api_handle => {
            if let Err(err) = api_res {
                return Err(err.into())
            }
        }
    }
    storage.close().await;
    tracing::info!("goodbye");
    Ok(())
}

fn tracing_init() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "certforge=info".into()),
        )
        .init();
}

fn config_init(program_name: &str, config_file: Option<String>) -> Result<SharedConfig> {
    match config_file {
        None => Err(anyhow!("usage: {program_name} /path/to/config.json")),
        Some(config_file) => {
            let config = Config::try_from_file(&config_file)?;
            tracing::debug!("loaded config from {config_file}");
            Ok(Arc::new(config))
        }
    }
}

async fn storage_from_config(config: &SharedConfig) -> Result<DynKvStore, Error> {
    match config.storage.driver.as_str() {
        "local" => {
            tracing::debug!("using local storage at {}", &config.storage.path);
            Ok(Arc::new(LocalStore::open(&config.storage.path).await?))
        }
        "memory" => {
            tracing::debug!("using in-memory storage");
            Ok(Arc::new(InMemoryStore::default()))
        }
        other => Err(Error::UnknownStorage(other.to_string())),
    }
}
