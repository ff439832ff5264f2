mod analysis;
mod api;
mod auth;
mod config;
mod credentials;
mod dataset;
mod db;
mod emotions;
mod gemini;
mod ranker;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::analysis::SYSTEM_INSTRUCTION;
use crate::config::Config;
use crate::db::{NoopDocumentStore, PgDocumentStore, TrailDocuments};
use crate::gemini::{EmotionAnalyzer, GeminiBackend, ModelBackend, REQUEST_GRACE};
use crate::ranker::Ranker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env(dotenv);
    config.log_summary();

    let table = match dataset::load_score_table(&config.score_csv_path) {
        Ok(table) => Some(Arc::new(table)),
        Err(e) => {
            warn!("⚠️ Score dataset unavailable, trail recommendations disabled: {}", e);
            None
        }
    };

    let store: Arc<dyn TrailDocuments> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            db::init_db(&pool).await?;
            info!("🗄️ Document store connected");
            Arc::new(PgDocumentStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, trail enrichment and music taste disabled");
            Arc::new(NoopDocumentStore)
        }
    };

    let backend: Option<Arc<dyn ModelBackend>> = match &config.gemini_api_key {
        Some(key) => {
            let backend = GeminiBackend::new(
                key,
                &config.gemini_api_base,
                &config.gemini_model,
                SYSTEM_INSTRUCTION.as_str(),
                config.gemini_timeout.saturating_add(REQUEST_GRACE),
            )?;
            Some(Arc::new(backend))
        }
        None => None,
    };
    let analyzer = Arc::new(EmotionAnalyzer::new(backend, config.gemini_timeout));

    if analyzer.is_configured() {
        let warm = analyzer.clone();
        tokio::spawn(async move {
            warm.warm_up().await;
        });
    }

    let port = config.port;
    let state = Arc::new(api::AppState {
        config,
        analyzer,
        ranker: Ranker::new(table, store.clone()),
        store,
    });

    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("🚀 Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
