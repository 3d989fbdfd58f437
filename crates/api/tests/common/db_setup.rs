use database::Database;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Global once cell so migrations run a single time across parallel tests
static MIGRATIONS_INITIALIZED: OnceCell<()> = OnceCell::const_new();

fn db_config_for_tests() -> config::DatabaseConfig {
    // Falls back to localhost defaults when no configuration is available
    match config::ApiConfig::load() {
        Ok(mut config) => {
            // Each test opens its own pool
            config.database.max_connections = 4;
            config.database
        }
        Err(_) => config::DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            database: "oauth_callback".to_string(),
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            max_connections: 4,
        },
    }
}

/// Connect and migrate, or `None` when no PostgreSQL server is reachable
pub async fn init_test_database() -> Option<Arc<Database>> {
    let config = db_config_for_tests();
    let database = match Database::from_config(&config).await {
        Ok(database) => Arc::new(database),
        Err(e) => {
            eprintln!("Skipping database test, PostgreSQL unavailable: {e}");
            return None;
        }
    };

    MIGRATIONS_INITIALIZED
        .get_or_init(|| async {
            database
                .run_migrations()
                .await
                .expect("Failed to run database migrations");
        })
        .await;

    Some(database)
}

/// An id no other test run will collide with
pub fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}
