//! PKCE material and state token generation (RFC 7636).

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// The only challenge method this client offers.
pub const CHALLENGE_METHOD_S256: &str = "S256";

const VERIFIER_ENTROPY_BYTES: usize = 64;
const STATE_ENTROPY_BYTES: usize = 32;

/// PKCE code challenge and verifier
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: &'static str,
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

impl PkceChallenge {
    /// Generate a new PKCE challenge
    pub fn new() -> Self {
        let code_verifier = random_token(VERIFIER_ENTROPY_BYTES);
        let code_challenge = derive_code_challenge(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: CHALLENGE_METHOD_S256,
        }
    }
}

/// `base64url(sha256(verifier))`, no padding.
pub fn derive_code_challenge(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Fresh anti-CSRF state token, independent of any verifier.
pub fn generate_state_token() -> String {
    random_token(STATE_ENTROPY_BYTES)
}

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn is_url_safe(value: &str) -> bool {
        value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn test_pkce_generation() {
        let pkce1 = PkceChallenge::new();
        let pkce2 = PkceChallenge::new();

        assert_ne!(pkce1.code_verifier, pkce2.code_verifier);
        assert_ne!(pkce1.code_challenge, pkce2.code_challenge);
        assert_eq!(pkce1.code_challenge_method, "S256");
        assert_eq!(
            pkce1.code_challenge,
            derive_code_challenge(&pkce1.code_verifier)
        );
    }

    #[test]
    fn test_verifier_format() {
        let pkce = PkceChallenge::new();

        // 64 bytes -> 86 base64url chars, inside RFC 7636's 43..=128
        assert_eq!(pkce.code_verifier.len(), 86);
        assert!(is_url_safe(&pkce.code_verifier));
        assert!(!pkce.code_verifier.contains('='));
        assert!(is_url_safe(&pkce.code_challenge));
    }

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        assert_eq!(
            derive_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_state_tokens_are_unique() {
        let states: HashSet<String> = (0..10_000).map(|_| generate_state_token()).collect();
        assert_eq!(states.len(), 10_000);

        let state = generate_state_token();
        assert_eq!(state.len(), 43);
        assert!(is_url_safe(&state));
    }
}
