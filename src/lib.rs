pub mod analysis;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod routes;
pub mod storage;
pub mod telemetry;

use std::sync::Arc;

use sqlx::PgPool;

pub use config::Config;

use pipeline::ReportPipeline;
use storage::LocalStorage;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub storage: Arc<LocalStorage>,
    pub pipeline: Arc<ReportPipeline>,
}
