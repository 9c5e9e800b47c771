use crate::api::routes;
use crate::certstore::CertStore;
use crate::config::SharedConfig;
use std::future::Future;
use std::sync::Arc;

#[derive(Clone)]
pub(super) struct AppState {
    pub store: Arc<CertStore>,
}

pub fn new(
    config: SharedConfig,
    store: Arc<CertStore>,
) -> impl Future<Output = hyper::Result<()>> {
    axum::Server::bind(&config.listen).serve(routes::new(AppState { store }).into_make_service())
}
