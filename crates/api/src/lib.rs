pub mod routes;

use crate::routes::{
    auth::{authorize, oauth_callback_form, oauth_callback_query},
    health::health_check,
};
use axum::{routing::get, Router};
use config::{ApiConfig, AuthConfig, LoggingConfig};
use database::Database;
use services::auth::{
    AllowListValidator, ConfigAllowList, OAuthCallbackService, OAuthCallbackServiceTrait,
    OAuthManager, StaticProviderResolver, UserRepository, UuidTokenGenerator,
};
use std::{sync::Arc, time::Duration};

/// Shared state handed to every route
#[derive(Clone)]
pub struct AppState {
    pub callback_service: Arc<dyn OAuthCallbackServiceTrait>,
}

/// Build the HTTP application
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/oauth/{platform}",
            get(oauth_callback_query).post(oauth_callback_form),
        )
        .route("/oauth/{platform}/authorize", get(authorize))
        .with_state(state)
}

/// Initialize database connection and run migrations
pub async fn init_database(db_config: &config::DatabaseConfig) -> anyhow::Result<Arc<Database>> {
    let database = Arc::new(Database::from_config(db_config).await?);

    tracing::info!("Starting database migrations...");
    database.run_migrations().await?;
    tracing::info!("Database migrations completed.");

    Ok(database)
}

/// Wire the callback pipeline against the given stores
pub fn build_callback_service(
    auth: &AuthConfig,
    allow_list: Arc<dyn AllowListValidator>,
    users: Arc<dyn UserRepository>,
) -> anyhow::Result<OAuthCallbackService> {
    let resolver = StaticProviderResolver::from_config(auth);
    if resolver.configured().is_empty() {
        tracing::warn!("No OAuth provider configured, every callback will be rejected");
    }
    for provider in resolver.configured() {
        tracing::info!(%provider, "OAuth provider configured");
    }

    let identity_provider = OAuthManager::new(Duration::from_secs(auth.exchange_timeout_secs))?;

    Ok(OAuthCallbackService::new(
        Arc::new(resolver),
        Arc::new(identity_provider),
        allow_list,
        Arc::new(UuidTokenGenerator),
        users,
        auth.default_site.clone(),
    ))
}

/// Initialize the callback service on top of PostgreSQL.
/// A static allow-list from configuration takes precedence over the database table.
pub fn init_oauth_services(database: &Database, config: &ApiConfig) -> anyhow::Result<AppState> {
    let allow_list: Arc<dyn AllowListValidator> = if config.auth.has_static_allow_list() {
        tracing::info!(
            emails = config.auth.allowed_emails.len(),
            domains = config.auth.allowed_domains.len(),
            "Using allow list from configuration"
        );
        Arc::new(ConfigAllowList::new(config.auth.clone()))
    } else {
        tracing::info!("Using allow list from database");
        database.allow_list.clone() as Arc<dyn AllowListValidator>
    };

    let users = database.users.clone() as Arc<dyn UserRepository>;
    let service = build_callback_service(&config.auth, allow_list, users)?;

    Ok(AppState {
        callback_service: Arc::new(service),
    })
}

/// Build the `EnvFilter` directive string from the logging configuration
pub fn tracing_filter(logging_config: &LoggingConfig) -> String {
    let mut modules: Vec<_> = logging_config.modules.iter().collect();
    modules.sort();

    let mut filter = logging_config.level.clone();
    for (module, level) in modules {
        filter.push_str(&format!(",{module}={level}"));
    }
    filter
}

pub fn init_tracing(logging_config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(tracing_filter(logging_config)));

    match logging_config.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .compact()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_tracing_filter_appends_modules() {
        let config = LoggingConfig {
            level: "info".to_string(),
            format: "json".to_string(),
            modules: HashMap::from([
                ("services".to_string(), "debug".to_string()),
                ("api".to_string(), "trace".to_string()),
            ]),
        };

        assert_eq!(tracing_filter(&config), "info,api=trace,services=debug");
    }

    #[test]
    fn test_tracing_filter_level_only() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            format: "pretty".to_string(),
            modules: HashMap::new(),
        };

        assert_eq!(tracing_filter(&config), "warn");
    }
}
