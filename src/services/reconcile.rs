use std::collections::HashSet;

use serde::Serialize;

use crate::crypto::nonce;
use crate::error::{AppError, Result};
use crate::models::plan::Plan;
use crate::models::subscription::{InsertOutcome, NewSubscription};
use crate::repositories::subscription::SubscriptionStore;
use crate::repositories::user::UserDirectory;
use crate::services::authority::{AuthorityApi, AuthoritySubscription};

/// Differences between the authority's keys and the local mirrors of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub username: String,
    pub authority_orders: usize,
    pub local_orders: usize,
    pub missing_locally: Vec<String>,
    pub repaired: usize,
}

/// Finds keys the authority issued that have no local mirror and, when
/// `repair` is set, mirrors them through the idempotent insert.
pub async fn reconcile_user(
    authority: &dyn AuthorityApi,
    subscriptions: &dyn SubscriptionStore,
    users: &dyn UserDirectory,
    username: &str,
    repair: bool,
) -> Result<ReconcileReport> {
    let user = users
        .find_by_username(username)
        .await?
        .ok_or(AppError::NotFound)?;

    let remote = authority.user_subscriptions(username).await?;
    let local: HashSet<String> = subscriptions
        .list_for_user(user.id)
        .await?
        .into_iter()
        .map(|s| s.order_id)
        .collect();

    let missing: Vec<&AuthoritySubscription> = remote
        .iter()
        .filter(|s| matches!(&s.order_id, Some(id) if !local.contains(id)))
        .collect();

    let mut repaired = 0;
    if repair {
        for sub in &missing {
            let Some(mirror) = mirror_for(user.id, sub) else {
                tracing::warn!(order_id = ?sub.order_id, "Authority record incomplete; cannot mirror");
                continue;
            };
            if let InsertOutcome::Inserted(_) = subscriptions.insert_if_absent(mirror).await? {
                repaired += 1;
            }
        }
    }

    let report = ReconcileReport {
        username: username.to_string(),
        authority_orders: remote.iter().filter(|s| s.order_id.is_some()).count(),
        local_orders: local.len(),
        missing_locally: missing.iter().filter_map(|s| s.order_id.clone()).collect(),
        repaired,
    };

    if report.missing_locally.is_empty() {
        tracing::debug!(username, "Mirrors consistent with authority");
    } else {
        tracing::warn!(
            username,
            missing = report.missing_locally.len(),
            repaired,
            "Authority keys without local mirror"
        );
    }

    Ok(report)
}

fn mirror_for(user_id: i64, sub: &AuthoritySubscription) -> Option<NewSubscription> {
    Some(NewSubscription {
        user_id,
        plan: sub.plan.as_deref()?.parse::<Plan>().ok()?,
        sub_key: sub.key_id.clone().unwrap_or_else(nonce::subscription_key),
        payment_id: sub.payment_id.clone().unwrap_or_default(),
        order_id: sub.order_id.clone()?,
        starts_at: sub.starts_at?,
        ends_at: sub.ends_at?,
    })
}
