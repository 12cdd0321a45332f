//! Request signature tokens.
//!
//! Pagopar authenticates every call with a token derived from the commerce's
//! private key and a short, endpoint-specific seed string. The token is the
//! lowercase hex SHA-1 digest of `private_token || seed`, with no separator
//! and no salt. Byte-exact reproduction is required by the service.
//!
//! Only the seed is covered. The serialized payload is never part of the
//! digest, so the seed must be chosen from the endpoint, not from the body.

use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

/// Length in characters of every token produced by [`sign`].
pub const TOKEN_LEN: usize = 40;

/// Computes the signature token for `seed`.
///
/// # Examples
///
/// ```
/// use pagopar_client::signer::{TOKEN_LEN, sign};
///
/// let token = sign("CONSULTA", "private-key");
/// assert_eq!(token.len(), TOKEN_LEN);
/// assert_eq!(token, sign("CONSULTA", "private-key"));
/// ```
#[must_use]
pub fn sign(seed: &str, private_token: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(private_token.as_bytes());
    hasher.update(seed.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison of two tokens.
///
/// Used when checking tokens that arrive from the outside, such as payment
/// confirmations.
#[must_use]
pub fn tokens_match(expected: &str, received: &str) -> bool {
    let received = received.trim().as_bytes();
    let same_len = expected.len().ct_eq(&received.len());
    bool::from(same_len & expected.as_bytes().ct_eq(received))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_sign_known_vectors() {
        // SHA-1("abc")
        assert_eq!(sign("c", "ab"), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(sign("abc", ""), "a9993e364706816aba3e25717850c26c9cd0d89d");
        // SHA-1("")
        assert_eq!(sign("", ""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_sign_is_concatenation() {
        assert_eq!(sign("CONSULTA", "secret"), sign("", "secretCONSULTA"));
        assert_ne!(sign("CONSULTA", "secret"), sign("secret", "CONSULTA"));
    }

    #[test]
    fn test_sign_distinct_seeds() {
        let seeds = ["CIUDADES", "CATEGORIAS", "CALCULAR-FLETE", "FORMA-PAGO", "PAGO-RECURRENTE", "100000"];
        let tokens: Vec<String> = seeds.iter().map(|s| sign(s, "k")).collect();
        for (i, a) in tokens.iter().enumerate() {
            for b in &tokens[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_tokens_match() {
        let token = sign("hash", "k");
        assert!(tokens_match(&token, &token));
        assert!(tokens_match(&token, &format!(" {token}\n")));
        assert!(!tokens_match(&token, &sign("hash", "other")));
        assert!(!tokens_match(&token, "short"));
    }

    #[test]
    fn test_tokens_match_rejects_prefix_and_extension() {
        let token = sign("hash", "k");
        assert!(!tokens_match(&token, &token[..TOKEN_LEN - 1]));
        assert!(!tokens_match(&token, &format!("{token}0")));
        assert!(!tokens_match(&token, ""));
        assert!(!tokens_match("", &token));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_sign_deterministic(seed in ".*", key in ".*") {
            prop_assert_eq!(sign(&seed, &key), sign(&seed, &key));
        }

        #[test]
        fn prop_sign_fixed_length_lowercase_hex(seed in ".*", key in ".*") {
            let token = sign(&seed, &key);
            prop_assert_eq!(token.len(), TOKEN_LEN);
            prop_assert!(token.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }

        #[test]
        fn prop_sign_changes_with_seed(seed in "[A-Z-]{1,20}", key in "[a-f0-9]{8,40}") {
            let altered = format!("{seed}X");
            prop_assert_ne!(sign(&seed, &key), sign(&altered, &key));
        }

        #[test]
        fn prop_tokens_match_only_own_token(seed in "[A-Z-]{1,20}", key in "[a-f0-9]{8,40}", other in "[a-f0-9]{8,40}") {
            let token = sign(&seed, &key);
            prop_assert!(tokens_match(&token, &token));
            prop_assert_eq!(tokens_match(&token, &sign(&seed, &other)), key == other);
        }

        #[test]
        fn prop_sign_changes_with_key(seed in "[A-Z-]{1,20}", key in "[a-f0-9]{8,40}") {
            let altered = format!("{key}0");
            prop_assert_ne!(sign(&seed, &key), sign(&seed, &altered));
        }
    }
}
