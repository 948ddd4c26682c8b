//! HMAC-SHA256 webhook signature verification.
//!
//! The MAC is computed over the exact raw request body. Providers encode the
//! digest as hex or base64, optionally prefixed with `sha256=`; comparison
//! happens in constant time via `Mac::verify_slice`.

use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use atlas_core::config::{SignatureEncoding, WebhookSecretConfig};
use atlas_core::{AtlasError, AtlasResult};

type HmacSha256 = Hmac<Sha256>;

/// Verify the signature header against the raw body.
///
/// With no secret configured, the request is accepted with a warning
/// (development mode).
pub fn verify_signature(
    config: &WebhookSecretConfig,
    raw_body: &[u8],
    header: Option<&str>,
) -> AtlasResult<()> {
    let Some(secret) = config.secret.as_deref() else {
        warn!("No webhook secret configured; accepting unsigned request (development mode)");
        return Ok(());
    };
    let Some(header) = header else {
        return Err(AtlasError::Signature);
    };

    let presented = header.strip_prefix("sha256=").unwrap_or(header);
    let expected = match config.encoding {
        SignatureEncoding::Hex => hex::decode(presented).map_err(|_| AtlasError::Signature)?,
        SignatureEncoding::Base64 => base64::engine::general_purpose::STANDARD
            .decode(presented)
            .map_err(|_| AtlasError::Signature)?,
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AtlasError::Signature)?;
    mac.update(raw_body);
    mac.verify_slice(&expected).map_err(|_| AtlasError::Signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_hex(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn config(secret: Option<&str>, encoding: SignatureEncoding) -> WebhookSecretConfig {
        WebhookSecretConfig {
            secret: secret.map(str::to_string),
            encoding,
        }
    }

    #[test]
    fn test_valid_hex_signature() {
        let body = br#"{"event_type":"EMAIL_OPEN"}"#;
        let signature = sign_hex("s3cret", body);
        let cfg = config(Some("s3cret"), SignatureEncoding::Hex);
        assert!(verify_signature(&cfg, body, Some(&signature)).is_ok());
    }

    #[test]
    fn test_sha256_prefix_stripped() {
        let body = b"payload";
        let signature = format!("sha256={}", sign_hex("s3cret", body));
        let cfg = config(Some("s3cret"), SignatureEncoding::Hex);
        assert!(verify_signature(&cfg, body, Some(&signature)).is_ok());
    }

    #[test]
    fn test_base64_encoding() {
        let body = b"payload";
        let mut mac = HmacSha256::new_from_slice(b"s3cret").unwrap();
        mac.update(body);
        let signature =
            base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        let cfg = config(Some("s3cret"), SignatureEncoding::Base64);
        assert!(verify_signature(&cfg, body, Some(&signature)).is_ok());
    }

    #[test]
    fn test_mismatch_rejected() {
        let body = b"payload";
        let signature = sign_hex("s3cret", b"different payload");
        let cfg = config(Some("s3cret"), SignatureEncoding::Hex);
        assert!(matches!(
            verify_signature(&cfg, body, Some(&signature)),
            Err(AtlasError::Signature)
        ));
    }

    #[test]
    fn test_missing_header_rejected_when_secret_set() {
        let cfg = config(Some("s3cret"), SignatureEncoding::Hex);
        assert!(matches!(
            verify_signature(&cfg, b"payload", None),
            Err(AtlasError::Signature)
        ));
    }

    #[test]
    fn test_unconfigured_secret_accepts() {
        let cfg = config(None, SignatureEncoding::Hex);
        assert!(verify_signature(&cfg, b"payload", None).is_ok());
        assert!(verify_signature(&cfg, b"payload", Some("garbage")).is_ok());
    }

    #[test]
    fn test_malformed_encoding_rejected() {
        let cfg = config(Some("s3cret"), SignatureEncoding::Hex);
        assert!(matches!(
            verify_signature(&cfg, b"payload", Some("not-hex!!")),
            Err(AtlasError::Signature)
        ));
    }
}
