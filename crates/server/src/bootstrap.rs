use std::sync::Arc;

use insight_agent::{AnalysisOrchestrator, TracingAuditSink};
use insight_core::config::{AppConfig, ConfigError};
use insight_core::CapabilityError;
use insight_db::{
    connect, load_dataset, migrations, DbError, DbPool, SqlDataSource, HR_SCHEMA_DESCRIPTION,
};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub dataset_rows: usize,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("dataset could not be loaded: {0}")]
    Dataset(#[source] DbError),
    #[error("analysis runtime could not be assembled: {0}")]
    Runtime(#[source] CapabilityError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let dataset = load_dataset(&db_pool).await.map_err(BootstrapError::Dataset)?;
    let dataset_rows = dataset.row_count();
    if dataset_rows == 0 {
        warn!(
            event_name = "system.bootstrap.dataset_empty",
            correlation_id = "bootstrap",
            "dataset is empty; run `insight seed` before asking causal questions"
        );
    } else {
        info!(
            event_name = "system.bootstrap.dataset_loaded",
            correlation_id = "bootstrap",
            dataset_rows,
            "dataset loaded for significance testing"
        );
    }

    let schema = config
        .analysis
        .schema_description
        .clone()
        .unwrap_or_else(|| HR_SCHEMA_DESCRIPTION.to_owned());
    let orchestrator = AnalysisOrchestrator::from_config(
        &config,
        Arc::new(SqlDataSource::new(db_pool.clone())),
        Arc::new(dataset),
        &schema,
        Arc::new(TracingAuditSink),
    )
    .map_err(BootstrapError::Runtime)?;

    Ok(Application { config, db_pool, orchestrator: Arc::new(orchestrator), dataset_rows })
}

#[cfg(test)]
mod tests {
    use insight_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use insight_db::HrSeedDataset;

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?).await
    }

    fn overrides(database_url: &str, llm_base_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                llm_base_url: Some(llm_base_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_llm_endpoint() {
        let result = bootstrap(overrides("sqlite::memory:", "not-a-url")).await;

        let message = match result {
            Ok(_) => panic!("bootstrap should reject the endpoint"),
            Err(error) => error.to_string(),
        };
        assert!(message.contains("llm.base_url"), "{message}");
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_loads_an_empty_dataset() {
        let app = bootstrap(overrides("sqlite::memory:", "http://127.0.0.1:1234/v1"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'hr_employee_attrition'",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema lookup");
        assert_eq!(table_count, 1);
        assert_eq!(app.dataset_rows, 0);

        HrSeedDataset::load(&app.db_pool).await.expect("seed");
        app.db_pool.close().await;
    }
}
