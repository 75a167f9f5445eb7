//! Slack request signing.
//!
//! Slack signs every webhook with `v0=hex(HMAC-SHA256(signing_secret, "v0:{timestamp}:{body}"))`
//! and sends the timestamp alongside. Requests older than five minutes are rejected.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

const SIGNATURE_VERSION: &str = "v0";
const MAX_TIMESTAMP_AGE_SECS: u64 = 300;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing slack signature headers")]
    MissingHeaders,
    #[error("malformed slack request timestamp")]
    MalformedTimestamp,
    #[error("slack request timestamp is outside the accepted window")]
    StaleTimestamp,
    #[error("malformed slack signature")]
    MalformedSignature,
    #[error("slack signature mismatch")]
    Mismatch,
}

/// Checks a request against the signing secret. `now` is unix seconds.
pub fn verify_request_signature(
    signing_secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let sent_at = timestamp.trim().parse::<i64>().map_err(|_| SignatureError::MalformedTimestamp)?;
    if now.abs_diff(sent_at) > MAX_TIMESTAMP_AGE_SECS {
        return Err(SignatureError::StaleTimestamp);
    }

    let provided = signature
        .strip_prefix("v0=")
        .and_then(|digest| hex::decode(digest).ok())
        .ok_or(SignatureError::MalformedSignature)?;

    signing_mac(signing_secret, timestamp.trim(), body)?
        .verify_slice(&provided)
        .map_err(|_| SignatureError::Mismatch)
}

/// Produces the `X-Slack-Signature` value for a body.
pub fn sign_request(
    signing_secret: &str,
    timestamp: &str,
    body: &[u8],
) -> Result<String, SignatureError> {
    let mac = signing_mac(signing_secret, timestamp, body)?;
    Ok(format!("{SIGNATURE_VERSION}={}", hex::encode(mac.finalize().into_bytes())))
}

fn signing_mac(
    signing_secret: &str,
    timestamp: &str,
    body: &[u8],
) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .map_err(|_| SignatureError::Mismatch)?;
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Ok(mac)
}
