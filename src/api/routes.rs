use crate::api::api_error::APIError;
use crate::api::model::CertQuery;
use crate::api::server::AppState;
use crate::certstore::CertificateRecord;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

pub(super) fn new(state: AppState) -> Router {
    Router::new()
        .route("/cert/:domain", get(get_record))
        .route("/cert/:domain/cert", get(get_cert))
        .route("/cert/:domain/ca", get(get_ca))
        .route("/cert/:domain/key", get(get_key))
        .route("/cert/:domain/bundle", get(get_bundle))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Look up or obtain the certificate every endpoint renders a view of.
///
/// Runs detached so a client hanging up does not cancel an in-flight
/// issuance; the obtained certificate still lands in the store.
async fn fetch(
    state: &AppState,
    domain: String,
    query: CertQuery,
) -> Result<CertificateRecord, APIError> {
    let request = query.into_request(domain)?;
    let store = state.store.clone();
    let record = tokio::spawn(async move { store.get_certificate(&request).await })
        .await
        .map_err(|err| anyhow::anyhow!("certificate task failed: {err}"))??;
    Ok(record)
}

async fn get_record(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(query): Query<CertQuery>,
) -> Result<Json<CertificateRecord>, APIError> {
    Ok(Json(fetch(&state, domain, query).await?))
}

async fn get_cert(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(query): Query<CertQuery>,
) -> Result<Vec<u8>, APIError> {
    let record = fetch(&state, domain, query).await?;
    Ok(record.leaf_only()?)
}

async fn get_ca(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(query): Query<CertQuery>,
) -> Result<Vec<u8>, APIError> {
    let record = fetch(&state, domain, query).await?;
    Ok(record.issuer)
}

async fn get_key(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(query): Query<CertQuery>,
) -> Result<Vec<u8>, APIError> {
    let record = fetch(&state, domain, query).await?;
    Ok(record.private_key)
}

async fn get_bundle(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(query): Query<CertQuery>,
) -> Result<Vec<u8>, APIError> {
    let record = fetch(&state, domain, query).await?;
    // PEM framing is self-delimiting, no separator needed
    let mut bundle = record.leaf_only()?;
    bundle.extend_from_slice(&record.issuer);
    Ok(bundle)
}
