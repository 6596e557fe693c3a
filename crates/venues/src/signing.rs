//! HMAC signing primitives shared by the six venue adapters. Each venue
//! picks SHA256 or SHA512 and a placement (header vs query string) per its
//! own spec (spec §4.1).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Returns the lower-case hex HMAC-SHA256 digest of `message` keyed by `secret`.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Returns the base64 HMAC-SHA256 digest of `message` keyed by `secret`.
#[must_use]
pub fn hmac_sha256_base64(secret: &str, message: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Returns the lower-case hex HMAC-SHA512 digest of `message` keyed by `secret`.
#[must_use]
pub fn hmac_sha512_hex(secret: &str, message: &str) -> String {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Current Unix timestamp in milliseconds, as every venue's signing scheme
/// requires.
#[must_use]
pub fn timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after the epoch")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_sha256_hex_is_deterministic() {
        let a = hmac_sha256_hex("secret", "GET/v5/position?symbol=BTCUSDT");
        let b = hmac_sha256_hex("secret", "GET/v5/position?symbol=BTCUSDT");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hmac_sha256_hex_changes_with_key() {
        let a = hmac_sha256_hex("secret-a", "same message");
        let b = hmac_sha256_hex("secret-b", "same message");
        assert_ne!(a, b);
    }

    #[test]
    fn test_hmac_sha512_hex_length() {
        let digest = hmac_sha512_hex("secret", "message");
        assert_eq!(digest.len(), 128);
    }

    #[test]
    fn test_hmac_sha256_base64_roundtrip_decodable() {
        let sig = hmac_sha256_base64("secret", "message");
        assert!(BASE64.decode(&sig).is_ok());
    }

    #[test]
    fn test_timestamp_ms_is_thirteen_digits() {
        let ts = timestamp_ms();
        assert!(ts.to_string().len() >= 13);
    }
}
