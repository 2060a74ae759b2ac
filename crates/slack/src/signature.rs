use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Accept request timestamps at most this far from now, in either direction.
pub const MAX_TIMESTAMP_SKEW_SECS: i64 = 300;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature headers")]
    MissingHeaders,
    #[error("request timestamp is not a number")]
    BadTimestamp,
    #[error("request timestamp outside the accepted window")]
    StaleTimestamp,
    #[error("signature header is not a v0 hex digest")]
    BadFormat,
    #[error("signature mismatch")]
    Mismatch,
}

/// Verifier for Slack's v0 request signatures:
/// `v0=` + hex(HMAC-SHA256(secret, "v0:{timestamp}:{body}")).
pub struct SignatureVerifier {
    signing_secret: SecretString,
}

impl SignatureVerifier {
    pub fn new(signing_secret: SecretString) -> Self {
        Self { signing_secret }
    }

    pub fn verify(
        &self,
        timestamp: &str,
        body: &[u8],
        signature: &str,
        now_unix_secs: i64,
    ) -> Result<(), SignatureError> {
        let ts: i64 = timestamp.parse().map_err(|_| SignatureError::BadTimestamp)?;
        if (now_unix_secs - ts).abs() > MAX_TIMESTAMP_SKEW_SECS {
            return Err(SignatureError::StaleTimestamp);
        }

        let hex_digest = signature.strip_prefix("v0=").ok_or(SignatureError::BadFormat)?;
        let expected = decode_hex(hex_digest).ok_or(SignatureError::BadFormat)?;

        let mut mac = HmacSha256::new_from_slice(self.signing_secret.expose_secret().as_bytes())
            .map_err(|_| SignatureError::BadFormat)?;
        mac.update(b"v0:");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);

        mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
    }
}

fn decode_hex(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 {
        return None;
    }
    (0..input.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(input.get(i..i + 2)?, 16).ok())
        .collect()
}
