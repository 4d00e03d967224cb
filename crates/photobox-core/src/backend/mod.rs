//! REST boundary to the hosted backend (identity provider + object store).
//!
//! Everything above this module deals in [`BackendError`]; provider wording
//! only leaks through `BackendError::message`, which the classifiers in
//! `auth` and `upload` inspect.

pub mod auth;
pub mod storage;

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;

pub use auth::{AuthApi, AuthUser, SignInResponse, SignUpResponse};
pub use storage::{ObjectEntry, StorageApi};

use crate::config::Config;

/// Standard User-Agent header for photobox API requests.
pub const USER_AGENT: &str = concat!("photobox/", env!("CARGO_PKG_VERSION"));

/// Resolves the anon key with precedence: config > env.
///
/// # Errors
/// Returns an error if no key is available from either source.
pub fn resolve_anon_key(config_anon_key: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(key) = config_anon_key {
        let trimmed = key.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    std::env::var(env_var).context(format!(
        "No anon key available. Set {env_var} or anon_key in [backend]."
    ))
}

/// Resolves a base URL with precedence: env > config > default.
///
/// # Errors
/// Returns an error if the chosen URL is malformed.
pub fn resolve_base_url(
    config_base_url: Option<&str>,
    env_var: &str,
    default_url: &str,
    label: &str,
) -> Result<String> {
    if let Ok(env_url) = std::env::var(env_var) {
        let trimmed = env_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed, label)?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }
    }

    if let Some(config_url) = config_base_url {
        let trimmed = config_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed, label)?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }
    }

    Ok(default_url.to_string())
}

fn validate_url(url: &str, label: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid {label} URL: {url}"))?;
    Ok(())
}

/// Connection settings shared by [`AuthApi`] and [`StorageApi`].
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    pub timeout: Option<Duration>,
}

impl BackendConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            timeout: None,
        }
    }

    /// Builds backend settings from the loaded config and environment.
    ///
    /// # Errors
    /// Returns an error if the URL is malformed or no anon key is set.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            url: config.effective_backend_url()?,
            anon_key: config.effective_anon_key()?,
            timeout: config.request_timeout(),
        })
    }

    /// Builds the shared HTTP client.
    ///
    /// # Errors
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build().context("Failed to build HTTP client")
    }
}

/// Categories of backend errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The provider answered with a non-success status
    HttpStatus,
    /// Request or connect timeout
    Timeout,
    /// Server could not be reached at all
    Connect,
    /// Any other transport failure (reset, body read, redirect loop)
    Network,
    /// The provider answered 2xx with a body we could not interpret
    Parse,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendErrorKind::HttpStatus => write!(f, "http_status"),
            BackendErrorKind::Timeout => write!(f, "timeout"),
            BackendErrorKind::Connect => write!(f, "connect"),
            BackendErrorKind::Network => write!(f, "network"),
            BackendErrorKind::Parse => write!(f, "parse"),
        }
    }
}

/// Structured error from the backend with kind and details.
#[derive(Debug, Clone)]
pub struct BackendError {
    pub kind: BackendErrorKind,
    /// HTTP status for `HttpStatus` errors
    pub status: Option<u16>,
    /// Provider message (or transport description)
    pub message: String,
    /// Raw response body, when there was one
    pub details: Option<String>,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            details: None,
        }
    }

    /// Creates an HTTP status error, pulling the provider message out of the
    /// JSON body when one of the usual fields is present.
    pub fn http_status(status: u16, body: &str) -> Self {
        let message = extract_provider_message(body).unwrap_or_default();
        Self {
            kind: BackendErrorKind::HttpStatus,
            status: Some(status),
            message,
            details: (!body.is_empty()).then(|| body.to_string()),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Parse, message)
    }

    /// Returns true when the provider message contains `needle` (case-insensitive).
    pub fn message_contains(&self, needle: &str) -> bool {
        self.message
            .to_ascii_lowercase()
            .contains(&needle.to_ascii_lowercase())
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.message.is_empty()) {
            (Some(status), true) => write!(f, "HTTP {status}"),
            (Some(status), false) => write!(f, "HTTP {status}: {}", self.message),
            (None, _) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for BackendError {}

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Classifies a reqwest error into a `BackendError`.
pub fn classify_reqwest_error(e: &reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::new(BackendErrorKind::Timeout, format!("Request timed out: {e}"))
    } else if e.is_connect() {
        BackendError::new(BackendErrorKind::Connect, format!("Connection failed: {e}"))
    } else if e.is_decode() {
        BackendError::parse(format!("Failed to decode response: {e}"))
    } else {
        BackendError::new(BackendErrorKind::Network, format!("Network error: {e}"))
    }
}

/// Auth and storage use different error envelopes:
/// `{"msg"}`, `{"error_description"}`, `{"message"}` or `{"error": "..."}`.
fn extract_provider_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    ["msg", "error_description", "message", "error"]
        .iter()
        .find_map(|field| json.get(*field).and_then(Value::as_str))
        .map(str::to_string)
        .or_else(|| {
            json.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
}

/// Reads a non-success response into a `BackendError`.
async fn error_from_response(response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    BackendError::http_status(status, &body)
}
