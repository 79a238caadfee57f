pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::config::{Settings, StoreBackend};
use crate::core::{state::AppState, telemetry};
use crate::repositories::exams::{ExamStore, MemoryExamStore, PgExamStore};
use crate::services::notifications;

async fn build_store(settings: &Settings) -> anyhow::Result<Arc<dyn ExamStore>> {
    match settings.exam().store {
        StoreBackend::Postgres => {
            let pool = db::init_pool(settings).await?;
            db::run_migrations(&pool).await?;
            tracing::info!("Exam store backed by Postgres");
            Ok(Arc::new(PgExamStore::new(pool)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Exam store is in-memory; data is lost on restart");
            Ok(Arc::new(MemoryExamStore::new()))
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let store = build_store(&settings).await?;
    let notifier = notifications::from_settings(&settings)?;
    let state = AppState::new(settings, store, notifier);

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        store = state.settings().exam().store.as_str(),
        "Gradegate API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    tracing::info!("Gradegate API stopped");
    Ok(())
}
