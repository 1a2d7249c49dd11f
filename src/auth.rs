//! Credential providers for the library API
//!
//! The pipeline only needs a bearer token per request. Acquiring the first
//! grant (browser consent) happens outside this crate; what lives here is
//! loading an existing grant and keeping its access token fresh.

use crate::config::AuthConfig;
use crate::error::AuthError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Refresh this long before the reported expiry
const EXPIRY_MARGIN_SECS: i64 = 60;

/// A bearer token and when it stops being valid
#[derive(Clone, Debug)]
pub struct Credential {
    /// OAuth access token
    pub access_token: String,
    /// Expiry, if known
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// Whether the token is expired or about to expire
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => at - ChronoDuration::seconds(EXPIRY_MARGIN_SECS) <= now,
            None => false,
        }
    }
}

/// Source of valid credentials for every API call
///
/// Implementations refresh transparently and must be safe to call from
/// several tasks at once.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return a credential that is valid right now
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] when no valid credential can be produced;
    /// callers treat that as fatal for the whole run.
    async fn credential(&self) -> Result<Credential, AuthError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// A fixed bearer token that is never refreshed
#[derive(Clone, Debug)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    /// Wrap a bearer token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn credential(&self) -> Result<Credential, AuthError> {
        if self.token.is_empty() {
            return Err(AuthError::Missing("static access token is empty".into()));
        }
        Ok(Credential {
            access_token: self.token.clone(),
            expires_at: None,
        })
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Authorized-user grant as stored on disk
#[derive(Clone, Debug, Deserialize)]
pub struct TokenFile {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Long-lived refresh token
    pub refresh_token: String,
    /// Cached access token, if any
    #[serde(default, alias = "token")]
    pub access_token: Option<String>,
    /// Expiry of the cached access token
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    /// Token endpoint recorded alongside the grant
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl TokenFile {
    /// Read and parse a token file
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let raw = std::fs::read_to_string(path).map_err(|e| AuthError::InvalidTokenFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| AuthError::InvalidTokenFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Access token kept fresh with the OAuth refresh-token grant
///
/// The cached credential sits behind an async mutex, so concurrent callers
/// wait for one in-flight refresh instead of each starting their own.
pub struct RefreshingToken {
    grant: TokenFile,
    token_uri: String,
    http: reqwest::Client,
    cached: Mutex<Option<Credential>>,
}

impl RefreshingToken {
    /// Build from a parsed grant; `token_uri` is used when the grant does not name one
    pub fn new(grant: TokenFile, token_uri: impl Into<String>) -> Self {
        let token_uri = grant.token_uri.clone().unwrap_or_else(|| token_uri.into());
        let cached = grant.access_token.clone().map(|access_token| Credential {
            access_token,
            expires_at: grant.expiry,
        });
        Self {
            grant,
            token_uri,
            http: reqwest::Client::new(),
            cached: Mutex::new(cached),
        }
    }

    /// Load the grant from `path`
    pub fn from_file(path: &Path, token_uri: impl Into<String>) -> Result<Self, AuthError> {
        Ok(Self::new(TokenFile::load(path)?, token_uri))
    }

    async fn refresh(&self) -> Result<Credential, AuthError> {
        tracing::info!(token_uri = %self.token_uri, "refreshing access token");

        let response = self
            .http
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.grant.client_id.as_str()),
                ("client_secret", self.grant.client_secret.as_str()),
                ("refresh_token", self.grant.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::RefreshFailed(format!("token endpoint unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RefreshFailed(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AuthError::RefreshFailed(format!("unreadable token response: {}", e)))?;

        Ok(Credential {
            access_token: refreshed.access_token,
            expires_at: refreshed
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
        })
    }
}

#[async_trait]
impl CredentialProvider for RefreshingToken {
    async fn credential(&self) -> Result<Credential, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(credential) = cached.as_ref() {
            if !credential.is_stale(Utc::now()) {
                return Ok(credential.clone());
            }
        }

        let fresh = self.refresh().await?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    fn name(&self) -> &'static str {
        "refresh_token"
    }
}

/// Pick a provider from configuration
///
/// A configured static token wins; otherwise the token file must exist.
pub fn provider_from_config(config: &AuthConfig) -> Result<Arc<dyn CredentialProvider>, AuthError> {
    if let Some(token) = &config.access_token {
        return Ok(Arc::new(StaticToken::new(token.clone())));
    }
    if !config.token_file.exists() {
        return Err(AuthError::Missing(format!(
            "token file {} not found",
            config.token_file.display()
        )));
    }
    let provider = RefreshingToken::from_file(&config.token_file, config.token_uri.clone())?;
    Ok(Arc::new(provider))
}
