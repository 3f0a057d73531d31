use std::fmt;

use serde::{Deserialize, Serialize};

/// Account role. Capabilities widen from `User` to `Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Support,
    Admin,
}

impl Role {
    fn rank(self) -> u8 {
        match self {
            Role::User => 0,
            Role::Support => 1,
            Role::Admin => 2,
        }
    }

    /// Whether this role may pass a gate that requires `minimum`.
    pub fn satisfies(self, minimum: Role) -> bool {
        self.rank() >= minimum.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Support => "support",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated actor attached to a gated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

/// A row of `login_users` as seen by provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: i64,
    pub username: String,
}
