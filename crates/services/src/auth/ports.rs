use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

/// Identity providers the callback can be completed against
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Google,
    Github,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Google => "google",
            ProviderId::Github => "github",
        }
    }

    /// Site selectors are matched exactly, the way clients write them into the state
    pub fn from_site(site: &str) -> Option<Self> {
        match site {
            "google" => Some(ProviderId::Google),
            "github" => Some(ProviderId::Github),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client variant that completed the login; selects the callback path and the response
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    Desktop,
    Mobile,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Web => "web",
            Platform::Desktop => "desktop",
            Platform::Mobile => "mobile",
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Platform::Web),
            "desktop" => Ok(Platform::Desktop),
            "mobile" => Ok(Platform::Mobile),
            other => Err(format!("Unknown platform: {other}")),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw inputs of an inbound callback request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRequest {
    pub code: String,
    pub encoded_state: String,
}

impl AuthRequest {
    pub fn new(code: impl Into<String>, encoded_state: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            encoded_state: encoded_state.into(),
        }
    }
}

/// Everything the callback needs, parsed out of the code and the state blob
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OAuthDetails {
    pub code: String,
    pub redirect_url: String,
    /// Backend base URL without its trailing slash
    pub backend_url: String,
    pub site: String,
}

impl OAuthDetails {
    /// Redirect URI registered with the provider for this platform
    pub fn callback_url(&self, platform: Platform) -> String {
        format!("{}/oauth/{}", self.backend_url, platform)
    }
}

/// Fully resolved OAuth client configuration for a single request
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider_id: ProviderId,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    pub user_info_url: String,
    pub redirect_uri: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider_id", &self.provider_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("user_info_url", &self.user_info_url)
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Normalized identity returned by a provider exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityClaims {
    pub subject_id: String,
    pub display_name: String,
    pub email: String,
    pub email_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedToken {
    pub token_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedUser {
    /// Provider-issued subject id
    pub id: String,
    pub name: String,
    pub tokens: Vec<PersistedToken>,
    pub created_at: DateTime<Utc>,
}

/// Which branch of the upsert ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Appended,
}

/// Successful result of the callback pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackOutcome {
    pub redirect_url: String,
    pub bearer_token: String,
    pub provider: ProviderId,
    pub created_user: bool,
}

/// Coarse classification used to pick the response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Policy,
    Provider,
    Internal,
}

// Error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OAuthError {
    #[error("Code is empty")]
    MissingCode,

    #[error("State is empty")]
    MissingState,

    #[error("Malformed state: {0}")]
    MalformedState(String),

    #[error("Redirect URL is empty")]
    MissingRedirect,

    #[error("Backend URL is empty")]
    MissingBackend,

    #[error("Unsupported OAuth provider: {0}")]
    UnsupportedProvider(String),

    #[error("Provider configuration error: {0}")]
    ProviderConfigError(String),

    #[error("Identity exchange failed: {0}")]
    IdentityExchangeFailed(String),

    #[error("Email not found in allow list")]
    EmailNotAllowed,

    #[error("Email is not verified")]
    EmailNotVerified,

    #[error("Email cannot be validated in allow list: {0}")]
    AllowListCheckFailed(String),

    #[error("Could not generate bearer token: {0}")]
    TokenGenerationFailed(String),

    #[error("Store error: {0}")]
    StoreError(String),
}

impl OAuthError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            OAuthError::MissingCode
            | OAuthError::MissingState
            | OAuthError::MalformedState(_)
            | OAuthError::MissingRedirect
            | OAuthError::MissingBackend => ErrorCategory::Input,
            OAuthError::EmailNotAllowed | OAuthError::EmailNotVerified => ErrorCategory::Policy,
            OAuthError::UnsupportedProvider(_)
            | OAuthError::ProviderConfigError(_)
            | OAuthError::IdentityExchangeFailed(_) => ErrorCategory::Provider,
            OAuthError::AllowListCheckFailed(_)
            | OAuthError::TokenGenerationFailed(_)
            | OAuthError::StoreError(_) => ErrorCategory::Internal,
        }
    }

    /// Input and policy failures are the caller's to fix; the rest are ours
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Input | ErrorCategory::Policy
        )
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::MissingCode => "missing_code",
            OAuthError::MissingState => "missing_state",
            OAuthError::MalformedState(_) => "malformed_state",
            OAuthError::MissingRedirect => "missing_redirect",
            OAuthError::MissingBackend => "missing_backend",
            OAuthError::UnsupportedProvider(_) => "unsupported_provider",
            OAuthError::ProviderConfigError(_) => "provider_config_error",
            OAuthError::IdentityExchangeFailed(_) => "identity_exchange_failed",
            OAuthError::EmailNotAllowed => "email_not_allowed",
            OAuthError::EmailNotVerified => "email_not_verified",
            OAuthError::AllowListCheckFailed(_) => "allow_list_check_failed",
            OAuthError::TokenGenerationFailed(_) => "token_generation_failed",
            OAuthError::StoreError(_) => "store_error",
        }
    }
}

// Ports consumed by the callback pipeline

#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait AllowListValidator: Send + Sync {
    /// `Ok(false)` is a definitive "not listed"; `Err` means the lookup itself failed
    async fn is_allowed(&self, email: &str) -> anyhow::Result<bool>;
}

#[cfg_attr(any(test, feature = "test-mocks"), automock)]
pub trait ProviderResolver: Send + Sync {
    fn resolve(&self, site: &str, callback_url: &str) -> Result<ProviderConfig, OAuthError>;
}

#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn fetch_identity(
        &self,
        config: &ProviderConfig,
        details: &OAuthDetails,
    ) -> Result<IdentityClaims, OAuthError>;
}

#[cfg_attr(any(test, feature = "test-mocks"), automock)]
pub trait TokenGenerator: Send + Sync {
    fn generate(&self) -> anyhow::Result<String>;
}

// Repository traits
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<PersistedUser>>;

    /// Create a user holding a single token; fails if the id is taken
    async fn create(&self, id: &str, name: &str, token_id: &str) -> anyhow::Result<PersistedUser>;

    /// Append a token to an existing user; `Ok(false)` when the user does not exist
    async fn append_token(&self, id: &str, token_id: &str) -> anyhow::Result<bool>;

    /// Create-or-append as one atomic step per id
    async fn upsert_with_token(
        &self,
        id: &str,
        name: &str,
        token_id: &str,
    ) -> anyhow::Result<UpsertOutcome>;
}

// Service trait
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait OAuthCallbackServiceTrait: Send + Sync {
    /// Run the whole callback: state, provider, identity, policy, token issue
    async fn handle_callback(
        &self,
        platform: Platform,
        request: &AuthRequest,
    ) -> Result<CallbackOutcome, OAuthError>;

    /// Provider authorization URL carrying the given redirect/backend/site as state
    async fn authorize_url(
        &self,
        platform: Platform,
        redirect_url: &str,
        backend_url: &str,
        site: Option<String>,
    ) -> Result<String, OAuthError>;
}
