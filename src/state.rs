use std::sync::Arc;

use crate::config::Config;
use crate::crypto::ipn_signature::IpnVerifier;
use crate::crypto::token::TokenService;
use crate::error::Result;
use crate::repositories::subscription::{PgSubscriptionStore, SubscriptionStore};
use crate::repositories::user::{PgUserDirectory, UserDirectory};
use crate::services::authority::{AuthorityApi, HttpAuthorityClient};
use crate::services::payments::{NowPaymentsClient, PaymentGateway};

/// The application's state.
///
/// Every collaborator is built once at startup and shared read-only
/// across requests.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Arc<Config>,
    /// Client for the licensing authority.
    pub authority: Arc<dyn AuthorityApi>,
    /// Local subscription mirrors.
    pub subscriptions: Arc<dyn SubscriptionStore>,
    /// Account lookups.
    pub users: Arc<dyn UserDirectory>,
    /// Payment provider checkout API.
    pub payments: Arc<dyn PaymentGateway>,
    /// Webhook signature verification.
    pub ipn: IpnVerifier,
    /// Principal token signing and verification.
    pub tokens: TokenService,
    /// Whether an authority address is configured.
    pub authority_configured: bool,
}

impl AppState {
    /// Creates a new `AppState` wired to PostgreSQL and the real upstreams.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url, config.db_pool_max_size)?;
        tracing::info!("✅ PostgreSQL pool initialized (max {})", config.db_pool_max_size);

        let authority = HttpAuthorityClient::new(config)?;
        tracing::info!(
            "✅ Keys API client initialized (timeout {:?}, configured: {})",
            config.authority_timeout,
            authority.is_configured()
        );

        let payments = NowPaymentsClient::new(
            reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()?,
            config.nowpayments_api_key.clone(),
        );

        Ok(Self::from_parts(
            config.clone(),
            Arc::new(authority),
            Arc::new(PgSubscriptionStore::new(db.clone())),
            Arc::new(PgUserDirectory::new(db)),
            Arc::new(payments),
        ))
    }

    /// Assembles state from already-built collaborators.
    pub fn from_parts(
        config: Config,
        authority: Arc<dyn AuthorityApi>,
        subscriptions: Arc<dyn SubscriptionStore>,
        users: Arc<dyn UserDirectory>,
        payments: Arc<dyn PaymentGateway>,
    ) -> Self {
        let ipn = IpnVerifier::new(config.ipn_secret.clone());
        let tokens = TokenService::new(config.jwt_secret.clone());
        let authority_configured = config.authority_url.is_some();

        Self {
            config: Arc::new(config),
            authority,
            subscriptions,
            users,
            payments,
            ipn,
            tokens,
            authority_configured,
        }
    }
}
