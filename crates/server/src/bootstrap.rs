use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use bookworm_agent::{AgentDependencies, AgentRuntime};
use bookworm_core::config::{AppConfig, ConfigError, LoadOptions};
use bookworm_db::{connect_with_config, migrations, DbPool, SqlOrderRepository};

use crate::catalog::GraphqlCatalog;
use crate::oracle::OpenAiCompatibleClient;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Opens and migrates the order store, then wires the oracle and catalog
/// clients into a shared agent runtime.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = open_order_store(&config).await?;
    let runtime = Arc::new(AgentRuntime::new(dependencies(&config, &db_pool)?));
    Ok(Application { config, db_pool, runtime })
}

async fn open_order_store(config: &AppConfig) -> Result<DbPool, BootstrapError> {
    let pool = connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.store_ready",
        correlation_id = "bootstrap",
        database_url = %config.database.url,
        "order store connected and migrated"
    );
    Ok(pool)
}

fn dependencies(config: &AppConfig, db_pool: &DbPool) -> Result<AgentDependencies, BootstrapError> {
    let oracle = OpenAiCompatibleClient::from_config(&config.llm).map_err(BootstrapError::HttpClient)?;
    let catalog = GraphqlCatalog::from_config(&config.catalog).map_err(BootstrapError::HttpClient)?;
    info!(
        event_name = "system.bootstrap.collaborators_ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        llm_model = %config.llm.model,
        oracle_endpoint = %oracle.endpoint(),
        catalog_endpoint = %config.catalog.api_url,
        "oracle and catalog clients initialized"
    );

    Ok(AgentDependencies {
        llm: Arc::new(oracle),
        catalog: Arc::new(catalog),
        orders: Arc::new(SqlOrderRepository::new(db_pool.clone())),
        conversation: config.conversation.clone(),
        fallback_image_url: config.catalog.fallback_image_url.clone(),
    })
}
