//! HMAC-SHA256 token signing.
//!
//! One [`Signer`] is created at startup from the process signing key and
//! lives for the process lifetime. The key is zeroed when the signer is
//! dropped.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

pub const ACTIVATION_PREFIX: &[u8] = b"/activate";
pub const RECOVERY_PREFIX: &[u8] = b"/recover";
pub const HMAC_OUTPUT_LEN: usize = 32;
pub const SECRET_LEN: usize = 32;
pub const CODE_LEN: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Activation,
    PasswordRecovery,
    Unknown,
}

impl Action {
    /// Maps a store-reported action string to the action tag used on the
    /// wire: activation -> 1, password_recovery -> 2, anything else -> 0.
    pub fn from_store_value(value: &str) -> Self {
        match value {
            "activation" => Action::Activation,
            "password_recovery" => Action::PasswordRecovery,
            _ => Action::Unknown,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Action::Activation => 1,
            Action::PasswordRecovery => 2,
            Action::Unknown => 0,
        }
    }
}

/// Builds the concrete byte sequence fed to HMAC-SHA256 for a row. Any
/// action other than activation/password_recovery produces an empty
/// input — such rows must be skipped by the caller before reaching the
/// signer.
pub fn signing_input(action: Action, secret: &[u8; SECRET_LEN], code: &str) -> Vec<u8> {
    match action {
        Action::Activation => {
            let mut buf = Vec::with_capacity(ACTIVATION_PREFIX.len() + SECRET_LEN);
            buf.extend_from_slice(ACTIVATION_PREFIX);
            buf.extend_from_slice(secret);
            buf
        }
        Action::PasswordRecovery => {
            let mut buf = Vec::with_capacity(RECOVERY_PREFIX.len() + SECRET_LEN + CODE_LEN);
            buf.extend_from_slice(RECOVERY_PREFIX);
            buf.extend_from_slice(secret);
            buf.extend_from_slice(code.as_bytes());
            buf
        }
        Action::Unknown => Vec::new(),
    }
}

/// The 32-byte process HMAC signing key, per SPEC_FULL §3.
///
/// Zeroized on drop. Deliberately not `Copy` — `[u8; 32]` is, which let a
/// bare-array `Config.secret_key` get implicitly duplicated (e.g. into a
/// `Signer`) with the duplicate never zeroized for the rest of the
/// process's life. Wrapping it forces every place that needs its own copy
/// to say so with an explicit `.clone()`, and that copy zeroizes on its
/// own drop same as the original. `Debug` is hand-written to redact the
/// bytes rather than deriving one that would print them.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningKey([u8; 32]);

impl SigningKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(REDACTED)")
    }
}

/// Holds the process signing key and signs messages under it.
///
/// Re-keys the underlying MAC on every call rather than keeping one
/// long-running context, matching `hmac_sign`'s behavior in
/// `examples/original_source/src/hmac.c` of reinitializing per signature.
pub struct Signer {
    key: SigningKey,
}

impl Signer {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Signs `data` under the process key, returning the 32-byte HMAC tag.
    ///
    /// HMAC accepts keys of any length, so construction cannot fail here;
    /// the `Result` return mirrors the original's fallible `hmac_sign` and
    /// leaves room for a future MAC whose key-setup truly can fail.
    pub fn sign(&self, data: &[u8]) -> [u8; HMAC_OUTPUT_LEN] {
        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .expect("HMAC-SHA256 accepts keys of any length");
        mac.update(data);
        let result = mac.finalize().into_bytes();
        let mut out = [0u8; HMAC_OUTPUT_LEN];
        out.copy_from_slice(&result);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_signing_input_is_prefix_plus_secret() {
        let secret = [0xAAu8; 32];
        let input = signing_input(Action::Activation, &secret, "ignor");
        assert_eq!(input.len(), 41);
        assert_eq!(&input[..9], ACTIVATION_PREFIX);
        assert_eq!(&input[9..], &secret[..]);
    }

    #[test]
    fn recovery_signing_input_is_prefix_plus_secret_plus_code() {
        let secret = [0x55u8; 32];
        let input = signing_input(Action::PasswordRecovery, &secret, "ABCDE");
        assert_eq!(input.len(), 45);
        assert_eq!(&input[..8], RECOVERY_PREFIX);
        assert_eq!(&input[8..40], &secret[..]);
        assert_eq!(&input[40..], b"ABCDE");
    }

    #[test]
    fn unknown_action_signing_input_is_empty() {
        let secret = [0u8; 32];
        assert!(signing_input(Action::Unknown, &secret, "xxxxx").is_empty());
    }

    #[test]
    fn sign_is_deterministic_for_same_key_and_input() {
        let signer = Signer::new(SigningKey::new([0x11u8; 32]));
        let a = signer.sign(b"hello");
        let b = signer.sign(b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn sign_differs_across_keys() {
        let a = Signer::new(SigningKey::new([0x01u8; 32])).sign(b"hello");
        let b = Signer::new(SigningKey::new([0x02u8; 32])).sign(b"hello");
        assert_ne!(a, b);
    }

    #[test]
    fn signing_key_debug_output_never_contains_the_raw_bytes() {
        let key = SigningKey::new([0x7Fu8; 32]);
        let debug = format!("{key:?}");
        assert!(!debug.contains("127")); // 0x7F as decimal, would appear if derived
        assert_eq!(debug, "SigningKey(REDACTED)");
    }

    #[test]
    fn action_tags_match_spec() {
        assert_eq!(Action::from_store_value("activation").tag(), 1);
        assert_eq!(Action::from_store_value("password_recovery").tag(), 2);
        assert_eq!(Action::from_store_value("anything_else").tag(), 0);
    }
}
