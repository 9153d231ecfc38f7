use std::sync::Arc;

use anyhow::Result;
use axum::http::{header, Method};
use axum::middleware;
use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use nutri_api::config::AppConfig;
use nutri_api::credentials::{BreachCorpus, PgCredentialStore};
use nutri_api::observability::{self, Observability};
use nutri_api::rate_limit::{self, InMemoryRateLimitStore};
use nutri_api::records::PgRecordStore;
use nutri_api::routes;
use nutri_api::state::AppState;
use nutri_api::validation::{Collaborators, ValidationPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv().ok();

    let config = AppConfig::from_env()?;
    let obs = Observability::init(config.log_format)?;

    let rate_limits = InMemoryRateLimitStore::new();
    rate_limit::spawn_purge_task(rate_limits.clone(), config.purge_interval);

    let mut deps = Collaborators::in_memory()
        .with_rate_limits(Arc::new(rate_limits))
        .with_limits(config.rate_limits.clone());

    match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            tracing::info!("Database connected; record and credential lookups use Postgres");
            deps = deps
                .with_records(Arc::new(PgRecordStore::new(pool.clone())))
                .with_credentials(Arc::new(PgCredentialStore::new(pool)));
        }
        None => tracing::warn!(
            "DATABASE_URL not set; record and credential lookups use in-memory stores"
        ),
    }

    if let Some(path) = &config.breach_corpus_path {
        let corpus = BreachCorpus::from_file(path)
            .map_err(|source| nutri_api::config::ConfigError::BreachCorpus {
                path: path.clone(),
                source,
            })?
            .extend(BreachCorpus::with_common_passwords());
        tracing::info!(entries = corpus.len(), "breach corpus loaded");
        deps = deps.with_breaches(Arc::new(corpus));
    }

    let state = AppState::new(ValidationPipeline::new(deps), obs.registry);

    let cors = CorsLayer::new()
        .allow_origin(config.allowed_origins.clone())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    let app = routes::router()
        .layer(middleware::from_fn(observability::request_logger))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = config.listen_addr();
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
