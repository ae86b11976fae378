//! HMAC-SHA256 signing
//!
//! Keyed signatures for values handed to the client. Each purpose derives its
//! own key from the application secret and a salt, so a signature minted for
//! one purpose never validates for another.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies values with a purpose-specific key
#[derive(Clone)]
pub struct Signer {
    key: Vec<u8>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

impl Signer {
    /// Derive a signer from the application secret and a purpose salt
    pub fn new(secret_key: &str, salt: &str) -> Self {
        let key = hmac_parts(secret_key.as_bytes(), &[b"signer".as_slice(), salt.as_bytes()]);
        Self { key }
    }

    /// MAC over several fields; each field is length-prefixed so that
    /// `("ab", "c")` and `("a", "bc")` produce different tags.
    pub fn mac(&self, parts: &[&[u8]]) -> Vec<u8> {
        hmac_parts(&self.key, parts)
    }

    /// Constant-time check of a MAC produced by [`Signer::mac`]
    pub fn verify(&self, parts: &[&[u8]], tag: &[u8]) -> bool {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.key) else {
            return false;
        };
        update_parts(&mut mac, parts);
        mac.verify_slice(tag).is_ok()
    }
}

fn update_parts(mac: &mut HmacSha256, parts: &[&[u8]]) {
    for part in parts {
        mac.update(&(part.len() as u64).to_be_bytes());
        mac.update(part);
    }
}

fn hmac_parts(key: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
    };
    update_parts(&mut mac, parts);
    mac.finalize().into_bytes().to_vec()
}

/// Random hex string with 244 bits of entropy (two v4 UUIDs)
pub fn generate_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Random URL-safe identifier (one v4 UUID)
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_verifies() {
        let signer = Signer::new("secret", "csrf");
        let tag = signer.mac(&[b"value".as_slice()]);

        assert!(signer.verify(&[b"value".as_slice()], &tag));
        assert!(!signer.verify(&[b"other".as_slice()], &tag));
        assert!(!signer.verify(&[b"value".as_slice()], &tag[..16]));
    }

    #[test]
    fn test_salt_separates_purposes() {
        let session = Signer::new("secret", "session");
        let csrf = Signer::new("secret", "csrf");

        let tag = session.mac(&[b"value".as_slice()]);
        assert!(!csrf.verify(&[b"value".as_slice()], &tag));
    }

    #[test]
    fn test_secret_separates_keys() {
        let a = Signer::new("secret-a", "csrf");
        let b = Signer::new("secret-b", "csrf");
        let tag = a.mac(&[b"value".as_slice()]);
        assert!(!b.verify(&[b"value".as_slice()], &tag));
    }

    #[test]
    fn test_mac_parts_are_length_prefixed() {
        let signer = Signer::new("secret", "csrf");
        let joined_left = [b"ab".as_slice(), b"c".as_slice()];
        let joined_right = [b"a".as_slice(), b"bc".as_slice()];
        assert_ne!(signer.mac(&joined_left), signer.mac(&joined_right));

        let tag = signer.mac(&joined_left);
        assert!(signer.verify(&joined_left, &tag));
        assert!(!signer.verify(&joined_right, &tag));
    }

    #[test]
    fn test_generated_values_are_unique() {
        assert_ne!(generate_secret(), generate_secret());
        assert_eq!(generate_secret().len(), 64);
        assert_eq!(generate_id().len(), 32);
    }
}
