//! Signed, opaque form tokens.
//!
//! A token is `name-nonce-signature`: the grant name it was issued under, a
//! random hex nonce, and an HMAC-SHA256 signature over both. The nonce and
//! signature segments have fixed widths, so parsing splits from the right and
//! the name segment may itself contain `-` without ambiguity.

use crate::error::CsrfError;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Random bytes behind each nonce (32 hex chars on the wire).
const NONCE_BYTES: usize = 16;

/// Hex width of the nonce segment.
const NONCE_WIDTH: usize = NONCE_BYTES * 2;

/// Hex width of the HMAC-SHA256 signature segment.
const SIGNATURE_WIDTH: usize = 64;

/// A signed token identifying one form grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    name: String,
    nonce: String,
    signature: String,
}

impl SignedToken {
    /// Grant name the token was issued under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for SignedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.name, self.nonce, self.signature)
    }
}

/// Issues and verifies signed tokens against a confidential secret.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl TokenCodec {
    /// Create a codec over the configured signing secret.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Issue a fresh token for `name`.
    #[must_use]
    pub fn issue(&self, name: &str) -> SignedToken {
        let mut bytes = [0u8; NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let nonce = hex::encode(bytes);
        let signature = self.sign(name, &nonce);
        SignedToken {
            name: name.to_owned(),
            nonce,
            signature,
        }
    }

    /// Verify `token` and return the grant name it was issued under.
    ///
    /// # Errors
    ///
    /// [`CsrfError::MalformedToken`] when the string does not split into a
    /// name plus fixed-width hex nonce and signature segments;
    /// [`CsrfError::BadSignature`] when the signature does not verify. The
    /// signature check runs in constant time.
    pub fn verify(&self, token: &str) -> Result<String, CsrfError> {
        let (rest, signature) = token.rsplit_once('-').ok_or(CsrfError::MalformedToken)?;
        let (name, nonce) = rest.rsplit_once('-').ok_or(CsrfError::MalformedToken)?;

        if name.is_empty()
            || nonce.len() != NONCE_WIDTH
            || signature.len() != SIGNATURE_WIDTH
            || !is_lower_hex(nonce)
            || !is_lower_hex(signature)
        {
            return Err(CsrfError::MalformedToken);
        }

        let signature_bytes = hex::decode(signature).map_err(|_| CsrfError::MalformedToken)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(name.as_bytes());
        mac.update(&[0]);
        mac.update(nonce.as_bytes());
        mac.verify_slice(&signature_bytes)
            .map_err(|_| CsrfError::BadSignature)?;

        Ok(name.to_owned())
    }

    /// Sign `name || 0x00 || nonce`. The NUL separator keeps the name/nonce
    /// boundary unambiguous inside the MAC input.
    fn sign(&self, name: &str, nonce: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(name.as_bytes());
        mac.update(&[0]);
        mac.update(nonce.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(b"test-secret-key-for-token-signing".to_vec())
    }

    #[test]
    fn issue_verify_round_trip() {
        let codec = codec();
        let token = codec.issue("csrf_abc123");
        let name = codec.verify(&token.to_string()).unwrap();
        assert_eq!(name, "csrf_abc123");
    }

    #[test]
    fn names_containing_dashes_round_trip() {
        let codec = codec();
        let token = codec.issue("page-with-dashes");
        let name = codec.verify(&token.to_string()).unwrap();
        assert_eq!(name, "page-with-dashes");
    }

    #[test]
    fn issued_tokens_are_unique() {
        let codec = codec();
        let a = codec.issue("page");
        let b = codec.issue("page");
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let codec = codec();
        for token in ["", "nodashes", "one-dash", "page-shortnonce-deadbeef"] {
            assert_eq!(codec.verify(token), Err(CsrfError::MalformedToken));
        }
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let codec = codec();
        let serialized = codec.issue("page").to_string();

        // Flip one hex character inside the signature segment.
        let flip_at = serialized.len() - 1;
        let original = serialized.as_bytes()[flip_at];
        let replacement = if original == b'0' { b'1' } else { b'0' };
        let mut bytes = serialized.into_bytes();
        bytes[flip_at] = replacement;
        let tampered = String::from_utf8(bytes).unwrap();

        assert_eq!(codec.verify(&tampered), Err(CsrfError::BadSignature));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = codec().issue("page").to_string();
        let other = TokenCodec::new(b"a-completely-different-secret".to_vec());
        assert_eq!(other.verify(&token), Err(CsrfError::BadSignature));
    }

    #[test]
    fn swapped_name_is_rejected() {
        // Re-attaching a valid nonce+signature to another name must fail
        // because the name is covered by the MAC.
        let codec = codec();
        let serialized = codec.issue("page_a").to_string();
        let suffix = &serialized["page_a".len()..];
        let forged = format!("page_b{suffix}");
        assert_eq!(codec.verify(&forged), Err(CsrfError::BadSignature));
    }
}
