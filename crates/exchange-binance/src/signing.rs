//! HMAC-SHA256 request signing for Binance USDT-M Futures.
//!
//! Signed endpoints append `timestamp` and `signature` query parameters,
//! where `signature = HMAC-SHA256(secret, querystring)` and the key is
//! carried in the `X-MBX-APIKEY` header rather than the querystring.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes the hex-encoded HMAC-SHA256 signature of `querystring` under
/// `secret`.
///
/// # Panics
/// Panics if `secret` cannot be used as an HMAC key, which `Hmac::new_from_slice`
/// only returns for key lengths the type rejects — never the case for a
/// variable-length `&[u8]` key as used here.
#[must_use]
pub fn sign_query(secret: &str, querystring: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(querystring.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::sign_query;

    #[test]
    fn signature_is_deterministic_for_same_input() {
        let a = sign_query("secret", "symbol=BTCUSDT&timestamp=1000");
        let b = sign_query("secret", "symbol=BTCUSDT&timestamp=1000");
        assert_eq!(a, b);
    }

    #[test]
    fn signature_changes_with_secret() {
        let a = sign_query("secret-one", "symbol=BTCUSDT&timestamp=1000");
        let b = sign_query("secret-two", "symbol=BTCUSDT&timestamp=1000");
        assert_ne!(a, b);
    }

    #[test]
    fn signature_is_lowercase_hex() {
        let sig = sign_query("secret", "symbol=BTCUSDT");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
