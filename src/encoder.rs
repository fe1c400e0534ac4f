//! URL-safe base64 encoding without padding.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("cannot encode a zero-length input")]
    EmptyInput,
}

/// Encodes `data` as URL-safe base64 with no `=` padding.
///
/// Rejects zero-length input; there is no fixed output buffer to
/// overflow in an owned-`String` implementation, so the "oversized
/// input" rejection from the original's fixed-buffer C implementation
/// has no counterpart here (see DESIGN.md).
pub fn url_encode(data: &[u8]) -> Result<String, EncoderError> {
    if data.is_empty() {
        return Err(EncoderError::EmptyInput);
    }
    Ok(URL_SAFE_NO_PAD.encode(data))
}

/// Builds the 86-character token field: URL-safe base64 of `secret || hmac`.
pub fn encode_token(secret: &[u8; 32], hmac: &[u8; 32]) -> String {
    let mut combined = [0u8; 64];
    combined[..32].copy_from_slice(secret);
    combined[32..].copy_from_slice(hmac);
    debug_assert_eq!(combined.len(), 64, "secret || hmac is always exactly 64 bytes");
    url_encode(&combined).expect("combined buffer is never empty")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_input() {
        assert!(url_encode(&[]).is_err());
    }

    #[test]
    fn output_is_url_safe_alphabet_only() {
        let data = [0xFFu8; 64];
        let encoded = url_encode(&data).unwrap();
        assert!(
            encoded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn token_round_trips_to_secret_concat_hmac() {
        let secret = [0x42u8; 32];
        let hmac = [0x99u8; 32];
        let token = encode_token(&secret, &hmac);
        assert_eq!(token.len(), 86);

        let decoded = URL_SAFE_NO_PAD.decode(&token).unwrap();
        assert_eq!(decoded.len(), 64);
        assert_eq!(&decoded[..32], &secret[..]);
        assert_eq!(&decoded[32..], &hmac[..]);
    }
}
