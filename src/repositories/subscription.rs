use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::subscription::{InsertOutcome, NewSubscription, Subscription},
};

/// Local store of subscription mirrors. `order_id` is a uniqueness key.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Inserts the mirror unless a row with the same `order_id` exists.
    async fn insert_if_absent(&self, new: NewSubscription) -> Result<InsertOutcome>;

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Subscription>>;

    /// All mirrors of a user, latest `ends_at` first.
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Subscription>>;
}

/// A helper function to map a `tokio_postgres::Row` to a `Subscription`.
fn row_to_subscription(row: &Row) -> Result<Subscription> {
    let unreadable = |column: &str| AppError::Internal(format!("user_subscriptions.{} unreadable", column));
    Ok(Subscription {
        id: row.try_get("id").map_err(|_| unreadable("id"))?,
        user_id: row.try_get("user_id").map_err(|_| unreadable("user_id"))?,
        plan: row.try_get("plan").map_err(|_| unreadable("plan"))?,
        sub_key: row.try_get("sub_key").map_err(|_| unreadable("sub_key"))?,
        status: row.try_get("status").map_err(|_| unreadable("status"))?,
        payment_id: row.try_get("payment_id").map_err(|_| unreadable("payment_id"))?,
        order_id: row.try_get("order_id").map_err(|_| unreadable("order_id"))?,
        starts_at: row.try_get("starts_at").map_err(|_| unreadable("starts_at"))?,
        ends_at: row.try_get("ends_at").map_err(|_| unreadable("ends_at"))?,
    })
}

const COLUMNS: &str =
    "id, user_id, plan, sub_key, status, payment_id, order_id, starts_at, ends_at";

/// `SubscriptionStore` backed by the `user_subscriptions` table.
#[derive(Clone)]
pub struct PgSubscriptionStore {
    pool: Pool,
}

impl PgSubscriptionStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn insert_if_absent(&self, new: NewSubscription) -> Result<InsertOutcome> {
        let client = self.pool.get().await?;
        let id = Uuid::new_v4();
        let row = client
            .query_opt(
                &format!(
                    r#"
                    INSERT INTO user_subscriptions
                        (id, user_id, plan, sub_key, status, payment_id, order_id, starts_at, ends_at)
                    VALUES ($1, $2, $3, $4, 'active', $5, $6, $7, $8)
                    ON CONFLICT (order_id) DO NOTHING
                    RETURNING {COLUMNS}
                    "#
                ),
                &[
                    &id,
                    &new.user_id,
                    &new.plan.as_str(),
                    &new.sub_key,
                    &new.payment_id,
                    &new.order_id,
                    &new.starts_at,
                    &new.ends_at,
                ],
            )
            .await?;

        match row {
            Some(row) => Ok(InsertOutcome::Inserted(row_to_subscription(&row)?)),
            None => Ok(InsertOutcome::Duplicate),
        }
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Subscription>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {COLUMNS} FROM user_subscriptions WHERE order_id = $1"),
                &[&order_id],
            )
            .await?;
        row.map(|r| row_to_subscription(&r)).transpose()
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Subscription>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {COLUMNS} FROM user_subscriptions WHERE user_id = $1 ORDER BY ends_at DESC"
                ),
                &[&user_id],
            )
            .await?;
        rows.iter().map(row_to_subscription).collect()
    }
}
