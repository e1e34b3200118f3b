//! `serve`: the authoring-side program store over HTTP

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use bytconfig::Config;
use bytstore::api::store_api_router;
use bytstore::openapi::ApiDoc;
use bytstore::{ProgramStore, StoreConfigExt};
use tokio::net::TcpListener;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::shutdown_signal;

pub async fn run(config: Arc<Config>, port: Option<u16>) -> anyhow::Result<()> {
    let store = Arc::new(ProgramStore::open(config.store_dir()?).await?);
    info!(
        directory = %store.directory().display(),
        programs = store.list_ids().await?.len(),
        fingerprint = %store.fingerprint().await?,
        "Program store opened"
    );

    let app = Router::new()
        .nest("/api", store_api_router(store))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let port = port.unwrap_or_else(|| config.get_http_port());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Program store listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Program store stopped");
    Ok(())
}
