use serde::Deserialize;
use std::{collections::HashMap, env};

pub const DEFAULT_SITE: &str = "google";
pub const DEFAULT_EXCHANGE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl ApiConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            auth: AuthConfig::from_env()?,
        })
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_connections() -> usize {
    5
}

impl DatabaseConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            host: env::var("DATABASE_HOST").map_err(|_| "DATABASE_HOST not set")?,
            port: env::var("DATABASE_PORT")
                .map_err(|_| "DATABASE_PORT not set")?
                .parse()
                .map_err(|_| "DATABASE_PORT must be a valid port number")?,
            database: env::var("DATABASE_NAME").map_err(|_| "DATABASE_NAME not set")?,
            username: env::var("DATABASE_USERNAME").map_err(|_| "DATABASE_USERNAME not set")?,
            password: env::var("DATABASE_PASSWORD").map_err(|_| "DATABASE_PASSWORD not set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| "DATABASE_MAX_CONNECTIONS must be a valid number")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| "SERVER_PORT must be a valid port number")?,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Logging Configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

impl LoggingConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        let mut modules = HashMap::new();

        // Load module-specific log levels
        if let Ok(level) = env::var("LOG_MODULE_API") {
            modules.insert("api".to_string(), level);
        }
        if let Ok(level) = env::var("LOG_MODULE_SERVICES") {
            modules.insert("services".to_string(), level);
        }
        if let Ok(level) = env::var("LOG_MODULE_DATABASE") {
            modules.insert("database".to_string(), level);
        }

        Ok(Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            modules,
        })
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut modules = HashMap::new();
        modules.insert("api".to_string(), "debug".to_string());
        modules.insert("services".to_string(), "debug".to_string());

        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            modules,
        }
    }
}

/// Authentication configuration for the OAuth callback pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub google: Option<OAuthClientConfig>,
    #[serde(default)]
    pub github: Option<OAuthClientConfig>,
    /// Provider used when the state blob carries no `site`
    #[serde(default = "default_site")]
    pub default_site: String,
    /// Exact email addresses allowed to sign in (case-insensitive)
    #[serde(default)]
    pub allowed_emails: Vec<String>,
    /// Email domains whose addresses are all allowed to sign in
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    /// Upper bound for the whole code exchange, in seconds
    #[serde(default = "default_exchange_timeout")]
    pub exchange_timeout_secs: u64,
}

fn default_site() -> String {
    DEFAULT_SITE.to_string()
}

fn default_exchange_timeout() -> u64 {
    DEFAULT_EXCHANGE_TIMEOUT_SECS
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            google: None,
            github: None,
            default_site: default_site(),
            allowed_emails: Vec::new(),
            allowed_domains: Vec::new(),
            exchange_timeout_secs: DEFAULT_EXCHANGE_TIMEOUT_SECS,
        }
    }
}

impl AuthConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            google: OAuthClientConfig::from_env_with_prefix("GOOGLE"),
            github: OAuthClientConfig::from_env_with_prefix("GITHUB"),
            default_site: env::var("AUTH_DEFAULT_SITE")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(default_site),
            allowed_emails: env::var("AUTH_ALLOWED_EMAILS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            allowed_domains: env::var("AUTH_ALLOWED_DOMAINS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            exchange_timeout_secs: env::var("AUTH_EXCHANGE_TIMEOUT")
                .unwrap_or_else(|_| DEFAULT_EXCHANGE_TIMEOUT_SECS.to_string())
                .parse()
                .map_err(|_| "AUTH_EXCHANGE_TIMEOUT must be a number of seconds")?,
        })
    }

    /// Whether an allow-list is configured statically (instead of in the database)
    pub fn has_static_allow_list(&self) -> bool {
        !self.allowed_emails.is_empty() || !self.allowed_domains.is_empty()
    }

    /// Check an email against the configured emails and domains
    pub fn is_allowed_email(&self, email: &str) -> bool {
        if self
            .allowed_emails
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(email))
        {
            return true;
        }

        // Extract domain from email (everything after the last @)
        match email.rsplit_once('@') {
            Some((local, domain)) if !local.is_empty() => self
                .allowed_domains
                .iter()
                .any(|allowed| domain.eq_ignore_ascii_case(allowed)),
            _ => false,
        }
    }
}

/// Client credentials for one OAuth provider, with optional endpoint overrides
#[derive(Clone, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub user_info_url: Option<String>,
}

impl OAuthClientConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: None,
            token_url: None,
            user_info_url: None,
        }
    }

    /// Reads `<PREFIX>_CLIENT_ID` and `<PREFIX>_CLIENT_SECRET`; both must be set
    pub fn from_env_with_prefix(prefix: &str) -> Option<Self> {
        let client_id = env::var(format!("{prefix}_CLIENT_ID")).ok()?;
        let client_secret = env::var(format!("{prefix}_CLIENT_SECRET")).ok()?;

        Some(Self {
            client_id,
            client_secret,
            auth_url: env::var(format!("{prefix}_AUTH_URL")).ok(),
            token_url: env::var(format!("{prefix}_TOKEN_URL")).ok(),
            user_info_url: env::var(format!("{prefix}_USER_INFO_URL")).ok(),
        })
    }
}

impl std::fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("user_info_url", &self.user_info_url)
            .finish()
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_config(emails: &[&str], domains: &[&str]) -> AuthConfig {
        AuthConfig {
            allowed_emails: emails.iter().map(|s| s.to_string()).collect(),
            allowed_domains: domains.iter().map(|s| s.to_string()).collect(),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_is_allowed_email() {
        let config = auth_config(&["alice@partner.io"], &["example.com", "example.org"]);

        assert!(config.is_allowed_email("alice@partner.io"));
        assert!(config.is_allowed_email("ALICE@Partner.io")); // Case insensitive
        assert!(config.is_allowed_email("bob@example.com"));
        assert!(config.is_allowed_email("carol@EXAMPLE.ORG"));

        assert!(!config.is_allowed_email("mallory@partner.io"));
        assert!(!config.is_allowed_email("attacker@example.com.evil.com"));
        assert!(!config.is_allowed_email("@example.com"));
        assert!(!config.is_allowed_email("invalid-email"));
        assert!(!config.is_allowed_email(""));
    }

    #[test]
    fn test_is_allowed_email_empty_config() {
        let config = auth_config(&[], &[]);

        assert!(!config.has_static_allow_list());
        assert!(!config.is_allowed_email("admin@example.com"));
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list(" a@x.io, ,b@y.io,"),
            vec!["a@x.io".to_string(), "b@y.io".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_client_secret_is_redacted() {
        let client = OAuthClientConfig::new("id-123", "super-secret");
        let debug = format!("{client:?}");

        assert!(debug.contains("id-123"));
        assert!(!debug.contains("super-secret"));
    }
}
