//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CART_SYNC_URL` - Remote cart store write endpoint (POST)
//! - `CART_FETCH_URL` - Remote cart store read endpoint (GET)
//! - `CATALOG_ROWS_URL` - Product table rows endpoint of the catalog store
//! - `CATALOG_API_TOKEN` - Catalog store database token
//! - `FIREBASE_API_KEY` - Identity provider web API key
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_BASE_URL` - Public URL (default: `http://localhost:3000`)
//! - `OPENAI_API_KEY` - Chat completion key; without it the assistant answers
//!   with its fallback message
//! - `OPENAI_MODEL` - Completion model (default: gpt-3.5-turbo)
//! - `OPENAI_MAX_TOKENS` - Reply length cap (default: 150)
//! - `OPENAI_CHAT_COMPLETIONS_URL` - Completion endpoint override
//! - `CART_SYNC_DEBOUNCE_MS` - Cart write debounce window (default: 500)
//! - `HTTP_TIMEOUT_SECS` - Outbound request timeout (default: 15)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Default chat-completion endpoint.
pub const DEFAULT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
/// Default chat-completion model.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
/// Default reply length cap.
pub const DEFAULT_MAX_TOKENS: u32 = 150;
/// Default cart write debounce window.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "your_",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Remote cart store endpoints
    pub cart: CartStoreConfig,
    /// Catalog store configuration
    pub catalog: CatalogConfig,
    /// Chat completion configuration
    pub assistant: AssistantConfig,
    /// Identity provider configuration
    pub identity: IdentityConfig,
    /// Outbound HTTP request timeout
    pub http_timeout: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Remote cart store endpoints and sync tuning.
#[derive(Debug, Clone)]
pub struct CartStoreConfig {
    /// Write endpoint (POST full snapshot)
    pub sync_url: Url,
    /// Read endpoint (GET snapshot for the bearer's user)
    pub fetch_url: Url,
    /// Debounce window for outbound writes
    pub debounce: Duration,
}

/// Catalog store configuration.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct CatalogConfig {
    /// Rows endpoint of the product table
    pub rows_url: Url,
    /// Database token
    pub api_token: SecretString,
}

impl std::fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("rows_url", &self.rows_url.as_str())
            .field("api_token", &"[REDACTED]")
            .finish()
    }
}

/// Chat completion configuration.
///
/// Implements `Debug` manually to redact the key.
#[derive(Clone)]
pub struct AssistantConfig {
    /// API key; `None` degrades every reply to the fallback message
    pub api_key: Option<SecretString>,
    /// Completion endpoint
    pub completions_url: Url,
    /// Model name
    pub model: String,
    /// Reply length cap
    pub max_tokens: u32,
}

impl std::fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("completions_url", &self.completions_url.as_str())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Identity provider configuration.
///
/// Implements `Debug` manually to redact the key.
#[derive(Clone)]
pub struct IdentityConfig {
    /// Web API key
    pub api_key: SecretString,
    /// Identity Toolkit base URL
    pub identity_base_url: Url,
    /// Secure token base URL
    pub token_base_url: Url,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("api_key", &"[REDACTED]")
            .field("identity_base_url", &self.identity_base_url.as_str())
            .field("token_base_url", &self.token_base_url.as_str())
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("STOREFRONT_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_HOST".to_string(), e.to_string())
            })?;
        let port = parse_env_or_default("STOREFRONT_PORT", 3000_u16)?;
        let base_url = get_env_or_default("STOREFRONT_BASE_URL", "http://localhost:3000");

        let cart = CartStoreConfig::from_env()?;
        let catalog = CatalogConfig::from_env()?;
        let assistant = AssistantConfig::from_env()?;
        let identity = IdentityConfig::from_env()?;
        let http_timeout = Duration::from_secs(parse_env_or_default("HTTP_TIMEOUT_SECS", 15_u64)?);

        Ok(Self {
            host,
            port,
            base_url,
            cart,
            catalog,
            assistant,
            identity,
            http_timeout,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl CartStoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            sync_url: get_required_url("CART_SYNC_URL")?,
            fetch_url: get_required_url("CART_FETCH_URL")?,
            debounce: Duration::from_millis(parse_env_or_default(
                "CART_SYNC_DEBOUNCE_MS",
                DEFAULT_DEBOUNCE_MS,
            )?),
        })
    }
}

impl CatalogConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            rows_url: get_required_url("CATALOG_ROWS_URL")?,
            api_token: get_validated_secret("CATALOG_API_TOKEN")?,
        })
    }
}

impl AssistantConfig {
    fn from_env() -> Result<Self, ConfigError> {
        // A missing key is allowed; a placeholder key is a misconfiguration.
        let api_key = match get_optional_env("OPENAI_API_KEY") {
            Some(value) if !value.trim().is_empty() => {
                validate_secret_strength(&value, "OPENAI_API_KEY")?;
                Some(SecretString::from(value))
            }
            _ => None,
        };

        Ok(Self {
            api_key,
            completions_url: parse_url(
                "OPENAI_CHAT_COMPLETIONS_URL",
                &get_env_or_default("OPENAI_CHAT_COMPLETIONS_URL", DEFAULT_COMPLETIONS_URL),
            )?,
            model: get_env_or_default("OPENAI_MODEL", DEFAULT_MODEL),
            max_tokens: parse_env_or_default("OPENAI_MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
        })
    }
}

impl IdentityConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: get_validated_secret("FIREBASE_API_KEY")?,
            identity_base_url: parse_url(
                "FIREBASE_IDENTITY_URL",
                &get_env_or_default(
                    "FIREBASE_IDENTITY_URL",
                    "https://identitytoolkit.googleapis.com/v1/",
                ),
            )?,
            token_base_url: parse_url(
                "FIREBASE_TOKEN_URL",
                &get_env_or_default("FIREBASE_TOKEN_URL", "https://securetoken.googleapis.com/v1/"),
            )?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to a default when unset.
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Parse an absolute http(s) URL.
fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must start with http:// or https://".to_string(),
        ));
    }
    Ok(url)
}

/// Get a required environment variable as a URL.
fn get_required_url(key: &str) -> Result<Url, ConfigError> {
    parse_url(key, &get_required_env(key)?)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key issued by the provider."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
