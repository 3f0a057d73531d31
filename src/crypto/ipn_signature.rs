use hmac::{Hmac, Mac};
use sha2::Sha512;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{AppError, Result};

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the provider's signature.
pub const SIGNATURE_HEADER: &str = "x-nowpayments-sig";

/// Verifies payment-provider webhooks (HMAC-SHA512 over the raw body).
#[derive(Clone)]
pub struct IpnVerifier {
    secret: Option<Zeroizing<String>>,
}

impl IpnVerifier {
    /// Creates a verifier. An absent secret only fails at verification time.
    pub fn new(secret: Option<Zeroizing<String>>) -> Self {
        Self { secret }
    }

    /// Whether a shared secret is configured.
    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Checks `signature` against the HMAC of the untouched request body.
    ///
    /// Returns `Ok(false)` for a missing or mismatched signature and an
    /// error only when the secret is not configured.
    pub fn verify(&self, raw_body: &[u8], signature: Option<&str>) -> Result<bool> {
        let secret = self
            .secret
            .as_ref()
            .ok_or_else(|| AppError::Configuration("NOWPAYMENTS_IPN_SECRET not set".to_string()))?;

        let Some(signature) = signature else {
            return Ok(false);
        };

        let expected = sign(secret.as_bytes(), raw_body)?;
        let supplied = signature.trim().to_ascii_lowercase();

        Ok(expected.as_bytes().ct_eq(supplied.as_bytes()).into())
    }
}

/// Lowercase hex HMAC-SHA512 of `body` under `secret`.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String> {
    let mut mac = HmacSha512::new_from_slice(secret)
        .map_err(|e| AppError::Internal(format!("HMAC key rejected: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}
