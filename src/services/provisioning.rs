//! Turns a settled payment notification into a key and its local mirror.
//!
//! The authority issuance and the mirror insert are two writes to two
//! systems with no shared transaction. Both are keyed by `order_id`:
//! a redelivered notification finds the existing mirror and stops, and a
//! notification whose mirror insert failed is reissued on redelivery (the
//! authority deduplicates by `order_id`). Keys without a mirror are found
//! by [`crate::services::reconcile`].

use chrono::{DateTime, Utc};

use crate::crypto::ipn_signature::IpnVerifier;
use crate::crypto::nonce;
use crate::error::{AppError, Result};
use crate::models::ipn::IpnEvent;
use crate::models::subscription::{InsertOutcome, NewSubscription, Subscription};
use crate::repositories::subscription::SubscriptionStore;
use crate::repositories::user::UserDirectory;
use crate::services::authority::{AuthorityApi, IssueKeyRequest};
use crate::validation::order::parse_order_id;

/// What happened to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Not a settled payment; acknowledged without side effects.
    Ignored { status: String },
    /// Key issued and mirrored.
    Provisioned(Subscription),
    /// The order was provisioned by an earlier delivery.
    AlreadyProvisioned { order_id: String },
}

/// The collaborators a provisioning run needs.
pub struct Provisioner<'a> {
    pub verifier: &'a IpnVerifier,
    pub authority: &'a dyn AuthorityApi,
    pub subscriptions: &'a dyn SubscriptionStore,
    pub users: &'a dyn UserDirectory,
}

impl Provisioner<'_> {
    /// Runs the whole pipeline over the raw webhook body.
    pub async fn handle_notification(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ProvisionOutcome> {
        if !self.verifier.verify(raw_body, signature)? {
            return Err(AppError::InvalidSignature);
        }

        let event: IpnEvent = sonic_rs::from_slice(raw_body)
            .map_err(|_| AppError::Validation("Invalid IPN body.".to_string()))?;

        self.provision(&event, now).await
    }

    /// Provisions an already authenticated event.
    pub async fn provision(&self, event: &IpnEvent, now: DateTime<Utc>) -> Result<ProvisionOutcome> {
        if !event.is_settled() {
            let status = event.payment_status.clone().unwrap_or_default();
            tracing::debug!(status = %status, "IPN status not settled; acknowledged");
            return Ok(ProvisionOutcome::Ignored { status });
        }

        let order_id = event.order_id.as_deref().unwrap_or_default();
        let order = parse_order_id(order_id)?;
        let payment_id = event.payment_id_text();

        let user = self
            .users
            .find_by_username(order.username)
            .await?
            .ok_or_else(|| AppError::Validation("Unknown user in order_id.".to_string()))?;

        if self.subscriptions.find_by_order_id(order_id).await?.is_some() {
            tracing::info!(order_id, payment_id = %payment_id, "IPN redelivered for provisioned order");
            return Ok(ProvisionOutcome::AlreadyProvisioned {
                order_id: order_id.to_string(),
            });
        }

        let (starts_at, ends_at) = order.plan.validity_window(now);

        let issued = self
            .authority
            .issue_key(&IssueKeyRequest {
                username: user.username.clone(),
                plan: order.plan.as_str().to_string(),
                starts_at,
                ends_at,
                payment_id: payment_id.clone(),
                order_id: order_id.to_string(),
            })
            .await
            .inspect_err(|e| {
                tracing::error!(order_id, payment_id = %payment_id, "Key issuance failed: {}", e)
            })?;

        let mirror = NewSubscription {
            user_id: user.id,
            plan: order.plan,
            sub_key: issued.key_id.unwrap_or_else(nonce::subscription_key),
            payment_id: payment_id.clone(),
            order_id: order_id.to_string(),
            starts_at,
            ends_at,
        };

        let outcome = self.subscriptions.insert_if_absent(mirror).await.inspect_err(|e| {
            tracing::error!(
                order_id,
                payment_id = %payment_id,
                "Key issued but mirror insert failed; awaiting redelivery or reconciliation: {}",
                e
            )
        })?;

        match outcome {
            InsertOutcome::Inserted(subscription) => {
                tracing::info!(
                    order_id,
                    payment_id = %payment_id,
                    user_id = user.id,
                    plan = %order.plan,
                    "✅ Subscription provisioned"
                );
                Ok(ProvisionOutcome::Provisioned(subscription))
            }
            InsertOutcome::Duplicate => {
                tracing::info!(order_id, "Concurrent delivery already mirrored this order");
                Ok(ProvisionOutcome::AlreadyProvisioned {
                    order_id: order_id.to_string(),
                })
            }
        }
    }
}
