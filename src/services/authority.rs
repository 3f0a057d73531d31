//! Typed client for the licensing authority ("keys API").
//!
//! One POST in, one JSON object out. No retries and no local state; the
//! caller decides what a failure means.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::config::Config;
use crate::crypto::obfuscation::HandshakePayload;
use crate::error::{AppError, Result};

/// Header carrying the shared secret on every authority call.
pub const API_KEY_HEADER: &str = "x-internal-api-key";

/// Which loader check an obfuscated frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStage {
    Prehandshake,
    Heartbeat,
}

impl HandshakeStage {
    fn secure_path(self) -> &'static str {
        match self {
            HandshakeStage::Prehandshake => "/internal/loader/prehandshake/secure",
            HandshakeStage::Heartbeat => "/internal/loader/heartbeat/secure",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HandshakeStage::Prehandshake => "prehandshake",
            HandshakeStage::Heartbeat => "heartbeat",
        }
    }
}

/// Request to mint a key for a settled payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueKeyRequest {
    pub username: String,
    pub plan: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub payment_id: String,
    pub order_id: String,
}

/// What the authority returns after issuing a key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IssuedKey {
    #[serde(default, alias = "key", alias = "sub_key")]
    pub key_id: Option<String>,
}

/// Answer to an integrity validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IntegrityVerdict {
    #[serde(default)]
    pub integrity_ok: bool,
}

/// Answer to an authenticated key check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthVerdict {
    #[serde(default)]
    pub auth_ok: bool,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub subscription_expires_at: Option<ExpiryStamp>,
}

/// A subscription expiry as the authority reports it: epoch milliseconds
/// or an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExpiryStamp {
    Millis(i64),
    Text(String),
}

impl ExpiryStamp {
    /// The instant this stamp names, if it names one.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            ExpiryStamp::Millis(ms) => DateTime::from_timestamp_millis(*ms),
            ExpiryStamp::Text(raw) => DateTime::parse_from_rfc3339(raw.trim())
                .ok()
                .map(|at| at.with_timezone(&Utc)),
        }
    }
}

impl fmt::Display for ExpiryStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiryStamp::Millis(ms) => write!(f, "{ms}"),
            ExpiryStamp::Text(raw) => f.write_str(raw),
        }
    }
}

/// A key the authority holds for a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthoritySubscription {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default, alias = "key", alias = "sub_key")]
    pub key_id: Option<String>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct UserSubscriptions {
    #[serde(default)]
    subscriptions: Vec<AuthoritySubscription>,
}

/// Operations the rest of the service needs from the authority.
#[async_trait]
pub trait AuthorityApi: Send + Sync {
    async fn issue_key(&self, request: &IssueKeyRequest) -> Result<IssuedKey>;

    async fn key_info(&self, key_id: &str) -> Result<sonic_rs::Value>;

    async fn user_security_state(&self, username: &str) -> Result<sonic_rs::Value>;

    async fn user_subscriptions(&self, username: &str) -> Result<Vec<AuthoritySubscription>>;

    async fn register_build(&self, version: &str, expected_hash: &str) -> Result<()>;

    /// Plain variant: the decoded `{version, hash}` pair.
    async fn validate_integrity(&self, payload: &HandshakePayload) -> Result<IntegrityVerdict>;

    /// Obfuscated variant: the untouched `{d}` frame.
    async fn validate_integrity_secure(
        &self,
        stage: HandshakeStage,
        frame: &str,
    ) -> Result<IntegrityVerdict>;

    async fn auth_key_secure(&self, frame: &str, ip: &str) -> Result<AuthVerdict>;
}

/// Normalizes the configured base address: secure scheme by default, no
/// trailing separator. Blank input yields `None`.
pub fn normalize_base_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    Some(with_scheme.trim_end_matches('/').to_string())
}

/// `AuthorityApi` over JSON-over-HTTP.
#[derive(Clone)]
pub struct HttpAuthorityClient {
    http: reqwest::Client,
    base_url: Option<String>,
    api_key: Zeroizing<String>,
}

impl HttpAuthorityClient {
    /// Builds the client once at startup; it is shared by every request.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.authority_timeout)
            .connect_timeout(config.authority_timeout.min(std::time::Duration::from_secs(2)))
            .build()?;

        Ok(Self {
            http,
            base_url: config.authority_url.as_deref().and_then(normalize_base_url),
            api_key: config.authority_api_key.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    fn endpoint(&self, path: &str) -> Result<String> {
        let base = self.base_url.as_deref().ok_or_else(|| {
            AppError::Configuration("DATABASE_KEYS_API_URL not set".to_string())
        })?;
        Ok(format!("{}{}", base, path))
    }

    async fn request<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let payload = sonic_rs::to_string(body)
            .map_err(|e| AppError::Internal(format!("Keys API request encoding: {}", e)))?;

        tracing::debug!("➡️ Keys API POST {}", path);
        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, self.api_key.as_str())
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Authority {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        sonic_rs::from_slice(&bytes).map_err(|e| AppError::Authority {
            status: status.as_u16(),
            body: format!("malformed response from {}: {}", path, e),
        })
    }
}

#[async_trait]
impl AuthorityApi for HttpAuthorityClient {
    async fn issue_key(&self, request: &IssueKeyRequest) -> Result<IssuedKey> {
        self.request("/internal/keys/issue", request).await
    }

    async fn key_info(&self, key_id: &str) -> Result<sonic_rs::Value> {
        self.request("/internal/keys/info", &sonic_rs::json!({ "key_id": key_id }))
            .await
    }

    async fn user_security_state(&self, username: &str) -> Result<sonic_rs::Value> {
        self.request("/internal/users/security", &sonic_rs::json!({ "username": username }))
            .await
    }

    async fn user_subscriptions(&self, username: &str) -> Result<Vec<AuthoritySubscription>> {
        let list: UserSubscriptions = self
            .request(
                "/internal/users/subscriptions",
                &sonic_rs::json!({ "username": username }),
            )
            .await?;
        Ok(list.subscriptions)
    }

    async fn register_build(&self, version: &str, expected_hash: &str) -> Result<()> {
        let _: sonic_rs::Value = self
            .request(
                "/internal/loader/integrity/register",
                &sonic_rs::json!({ "version": version, "expected_hash": expected_hash }),
            )
            .await?;
        Ok(())
    }

    async fn validate_integrity(&self, payload: &HandshakePayload) -> Result<IntegrityVerdict> {
        self.request(
            "/internal/loader/integrity/validate",
            &sonic_rs::json!({ "version": payload.version.as_str(), "hash": payload.hash_hex() }),
        )
        .await
    }

    async fn validate_integrity_secure(
        &self,
        stage: HandshakeStage,
        frame: &str,
    ) -> Result<IntegrityVerdict> {
        self.request(stage.secure_path(), &sonic_rs::json!({ "d": frame }))
            .await
    }

    async fn auth_key_secure(&self, frame: &str, ip: &str) -> Result<AuthVerdict> {
        self.request("/internal/keys/auth/secure", &sonic_rs::json!({ "d": frame, "ip": ip }))
            .await
    }
}
