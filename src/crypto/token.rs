//! Signed principal tokens (HS256).

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{AppError, Result};
use crate::models::user::{Principal, Role};

/// Token lifetime in seconds.
pub const TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    id: i64,
    username: String,
    role: Role,
    iat: i64,
    exp: i64,
}

/// Issues and verifies principal tokens.
#[derive(Clone)]
pub struct TokenService {
    secret: Zeroizing<String>,
}

impl TokenService {
    pub fn new(secret: Zeroizing<String>) -> Self {
        Self { secret }
    }

    /// Issues a token valid for [`TOKEN_TTL_SECS`] from now.
    pub fn issue(&self, principal: &Principal) -> Result<String> {
        self.issue_at(principal, chrono::Utc::now().timestamp())
    }

    /// Issues a token as if it had been created at `issued_at` (unix seconds).
    pub fn issue_at(&self, principal: &Principal, issued_at: i64) -> Result<String> {
        let claims = Claims {
            id: principal.id,
            username: principal.username.clone(),
            role: principal.role,
            iat: issued_at,
            exp: issued_at + TOKEN_TTL_SECS,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Verifies signature and expiry and returns the principal.
    pub fn verify(&self, token: &str) -> Result<Principal> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("Token expired"),
                ErrorKind::InvalidSignature => tracing::debug!("Token signature mismatch"),
                other => tracing::debug!("Token rejected: {:?}", other),
            }
            AppError::InvalidCredential
        })?;

        Ok(Principal {
            id: data.claims.id,
            username: data.claims.username,
            role: data.claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str) -> TokenService {
        TokenService::new(Zeroizing::new(secret.to_string()))
    }

    fn support() -> Principal {
        Principal {
            id: 7,
            username: "helpdesk".into(),
            role: Role::Support,
        }
    }

    #[test]
    fn verifies_its_own_tokens() {
        let tokens = service("0123456789abcdef0123456789abcdef");
        let token = tokens.issue(&support()).unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), support());
    }

    #[test]
    fn rejects_foreign_and_expired_tokens() {
        let tokens = service("0123456789abcdef0123456789abcdef");
        let other = service("fedcba9876543210fedcba9876543210");
        let foreign = other.issue(&support()).unwrap();
        assert!(matches!(tokens.verify(&foreign), Err(AppError::InvalidCredential)));

        let stale = tokens
            .issue_at(&support(), chrono::Utc::now().timestamp() - 2 * TOKEN_TTL_SECS)
            .unwrap();
        assert!(matches!(tokens.verify(&stale), Err(AppError::InvalidCredential)));

        assert!(matches!(tokens.verify("not-a-token"), Err(AppError::InvalidCredential)));
    }
}
