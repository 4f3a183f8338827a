//! GitHub webhook signature verification

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use crate::error::{Result, ReviewError};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
const EXPECTED_ALGORITHM: &str = "sha256";

/// Verifies `X-Hub-Signature-256` headers against the raw request body.
#[derive(Clone)]
pub struct SignatureValidator {
    secret: Vec<u8>,
}

impl SignatureValidator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into_bytes(),
        }
    }

    /// Checks `signature_header` (expected format: "sha256=<hex digest>") over the
    /// exact bytes received. Must run before the body is parsed.
    pub fn validate(&self, signature_header: Option<&str>, raw_body: &[u8]) -> Result<()> {
        let header = signature_header.ok_or_else(|| {
            ReviewError::Authentication(format!("Missing {SIGNATURE_HEADER} header."))
        })?;

        let digest = match header.split_once('=') {
            Some((EXPECTED_ALGORITHM, digest)) if !digest.is_empty() => digest,
            _ => {
                return Err(ReviewError::Authentication(
                    "Invalid signature format. Expected sha256=<signature>".into(),
                ));
            }
        };

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ReviewError::Authentication(format!("Invalid webhook secret: {e}")))?;
        mac.update(raw_body);

        let expected = hex::encode(mac.finalize().into_bytes());
        if !constant_time_eq(expected.as_bytes(), digest.as_bytes()) {
            warn!("Webhook signature mismatch");
            return Err(ReviewError::Authentication(
                "Invalid signature. content mismatch.".into(),
            ));
        }
        Ok(())
    }
}

/// Compares every byte regardless of where the first difference is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
