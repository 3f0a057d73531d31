use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::plan::Plan;

/// Status written for freshly provisioned subscriptions.
pub const STATUS_ACTIVE: &str = "active";

/// Local mirror of a key issued by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: i64,
    pub plan: String,
    pub sub_key: String,
    pub status: String,
    pub payment_id: String,
    pub order_id: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// A subscription about to be mirrored locally.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: i64,
    pub plan: Plan,
    pub sub_key: String,
    pub payment_id: String,
    pub order_id: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl NewSubscription {
    pub fn into_subscription(self, id: Uuid) -> Subscription {
        Subscription {
            id,
            user_id: self.user_id,
            plan: self.plan.as_str().to_string(),
            sub_key: self.sub_key,
            status: STATUS_ACTIVE.to_string(),
            payment_id: self.payment_id,
            order_id: self.order_id,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
        }
    }
}

/// Result of an idempotent mirror insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Subscription),
    /// A row with the same `order_id` already exists.
    Duplicate,
}

/// What the account endpoint exposes for a subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    pub plan: String,
    pub sub_key: String,
    pub status: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl From<Subscription> for SubscriptionView {
    fn from(sub: Subscription) -> Self {
        Self {
            plan: sub.plan,
            sub_key: sub.sub_key,
            status: sub.status,
            starts_at: sub.starts_at,
            ends_at: sub.ends_at,
        }
    }
}
