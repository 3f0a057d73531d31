use async_trait::async_trait;
use deadpool_postgres::Pool;

use crate::{error::Result, models::user::UserRef};

/// Read access to the account table owned by the login component.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRef>>;
}

/// `UserDirectory` backed by `login_users`.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: Pool,
}

impl PgUserDirectory {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRef>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, username FROM login_users WHERE username = $1",
                &[&username],
            )
            .await?;

        Ok(match row {
            Some(row) => Some(UserRef {
                id: row.try_get("id")?,
                username: row.try_get("username")?,
            }),
            None => None,
        })
    }
}
