use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use orderline_agent::llm::{HttpAgentModel, ModelError};
use orderline_agent::runtime::AgentRuntime;
use orderline_core::catalog::CatalogResolver;
use orderline_core::config::{AppConfig, ConfigError, LoadOptions};
use orderline_db::repositories::{
    SqlOrderRepository, SqlRestaurantRepository, SqlSettingsRepository,
};
use orderline_db::{connect_with_settings, migrations, DbPool};
use orderline_voice::driver::ConversationDriver;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub driver: Arc<ConversationDriver>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("agent model initialization failed: {0}")]
    Model(#[from] ModelError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
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

    let restaurants = Arc::new(SqlRestaurantRepository::new(db_pool.clone()));
    let orders = Arc::new(SqlOrderRepository::new(db_pool.clone()));
    let settings = Arc::new(SqlSettingsRepository::new(db_pool.clone()));

    let model = Arc::new(HttpAgentModel::from_config(&config.llm)?);
    let runtime = Arc::new(AgentRuntime::new(
        model,
        orders.clone(),
        restaurants.clone(),
        CatalogResolver::new(config.catalog.match_threshold),
        config.agent.max_tool_steps,
        config.agent.cache_max_entries,
    ));

    let driver = Arc::new(ConversationDriver::new(
        restaurants,
        orders,
        settings,
        runtime,
        config.telephony.development,
    ));

    Ok(Application { config, db_pool, driver })
}

#[cfg(test)]
mod tests {
    use orderline_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_builds_the_driver() {
        let app = bootstrap(valid_overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('restaurant', 'menu_item', 'orders', 'order_item', 'order_event')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected foundation tables to be available after bootstrap");
        assert_eq!(table_count, 5, "bootstrap should expose baseline order-path tables");

        // No greeting is seeded yet, so opening a call reports the missing
        // configuration instead of panicking.
        assert!(app.driver.open_call().await.is_err());

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_database_url() {
        let result = bootstrap(valid_overrides("postgres://localhost/orderline")).await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("database.url"));
    }
}
