use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

/// How the gateway forwards integrity checks to the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityMode {
    /// Forward the untouched `{d}` frame to the secure endpoints.
    Obfuscated,
    /// Forward the decoded `{version, hash}` pair.
    Plain,
}

impl FromStr for IntegrityMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "obfuscated" => Ok(IntegrityMode::Obfuscated),
            "plain" => Ok(IntegrityMode::Plain),
            other => anyhow::bail!("LOADER_INTEGRITY_MODE must be obfuscated or plain, got {other}"),
        }
    }
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// The URL of the PostgreSQL database holding users and subscriptions.
    pub database_url: String,
    /// Maximum number of pooled database connections.
    pub db_pool_max_size: usize,
    /// Secret used to sign principal tokens.
    pub jwt_secret: Zeroizing<String>,
    /// Cookie that may carry the principal token.
    pub auth_cookie_name: String,
    /// Base address of the licensing authority. Unset fails each call.
    pub authority_url: Option<String>,
    /// Value of the `x-internal-api-key` header sent to the authority.
    pub authority_api_key: Zeroizing<String>,
    /// Timeout applied to every authority call.
    pub authority_timeout: Duration,
    /// Forwarding mode for prehandshake and heartbeat.
    pub integrity_mode: IntegrityMode,
    /// Shared secret for webhook signatures. Unset fails each webhook.
    pub ipn_secret: Option<Zeroizing<String>>,
    /// Payment provider API key. Unset fails payment creation.
    pub nowpayments_api_key: Option<Zeroizing<String>>,
    /// Callback URL handed to the payment provider.
    pub ipn_callback_url: String,
    /// Where the provider sends the buyer after checkout.
    pub frontend_base_url: String,
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        let jwt_secret = Zeroizing::new(
            env::var("JWT_SECRET")
                .context("JWT_SECRET must be set (generate with: openssl rand -hex 32)")?,
        );
        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters");
        }

        let ipn_callback_url = optional("NOWPAYMENTS_IPN_URL").unwrap_or_else(|| {
            format!(
                "{}/nowpayments/ipn",
                optional("PUBLIC_BACKEND_URL")
                    .unwrap_or_default()
                    .trim_end_matches('/')
            )
        });

        let authority_url = optional("DATABASE_KEYS_API_URL");
        if authority_url.is_none() {
            tracing::warn!("DATABASE_KEYS_API_URL not set; loader and provisioning calls will fail");
        }

        Ok(Self {
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:4000".to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            db_pool_max_size: env::var("DB_POOL_MAX_SIZE")
                .unwrap_or_else(|_| "16".to_string())
                .parse()
                .context("Invalid DB_POOL_MAX_SIZE")?,
            jwt_secret,
            auth_cookie_name: env::var("AUTH_COOKIE_NAME")
                .unwrap_or_else(|_| "auth_token".to_string()),
            authority_url,
            authority_api_key: Zeroizing::new(
                env::var("DATABASE_KEYS_API_KEY").unwrap_or_default(),
            ),
            authority_timeout: Duration::from_secs(
                env::var("AUTHORITY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .context("Invalid AUTHORITY_TIMEOUT_SECS")?,
            ),
            integrity_mode: env::var("LOADER_INTEGRITY_MODE")
                .unwrap_or_else(|_| "obfuscated".to_string())
                .parse()?,
            ipn_secret: optional("NOWPAYMENTS_IPN_SECRET").map(Zeroizing::new),
            nowpayments_api_key: optional("NOWPAYMENTS_API_KEY").map(Zeroizing::new),
            ipn_callback_url,
            frontend_base_url: optional("FRONTEND_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
        })
    }
}
