//! PKCE S256 (RFC 7636).

use base64ct::{Base64UrlUnpadded, Encoding};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const S256: &str = "S256";

/// `BASE64URL(SHA256(verifier))` without padding.
#[must_use]
pub fn s256(verifier: &str) -> String {
    Base64UrlUnpadded::encode_string(&Sha256::digest(verifier.as_bytes()))
}

/// Constant-time check of `verifier` against a stored challenge.
#[must_use]
pub fn verify_s256(verifier: &str, challenge: &str) -> bool {
    s256(verifier).as_bytes().ct_eq(challenge.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc7636_appendix_b() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert_eq!(s256(verifier), challenge);
        assert!(verify_s256(verifier, challenge));
    }

    #[test]
    fn only_the_exact_verifier_matches() {
        let challenge = s256("v");
        assert!(verify_s256("v", &challenge));
        assert!(!verify_s256("w", &challenge));
        assert!(!verify_s256("v ", &challenge));
        assert!(!verify_s256("", &challenge));
        assert!(!verify_s256("v", &challenge[..challenge.len() - 1]));
    }
}
