//! Tamper digest over the stored session.
//!
//! The digest is base64 of a canonical JSON record of `tokenLength`, `userId`,
//! `role` and the storage `timestamp`. It is built from non-secret metadata and
//! carries no key, so anyone who can edit local storage can also recompute it.
//! It catches casual edits (a role flipped in a text editor, a token pasted from
//! elsewhere, a half-cleared session) and nothing more. Binding it to a
//! server-issued secret with an HMAC would change the trust model and needs a
//! key exchange the backend does not offer.

use base64ct::{Base64, Encoding};
use serde::Serialize;

use super::profile::Role;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DigestRecord<'a> {
    token_length: usize,
    user_id: &'a str,
    role: &'a str,
    timestamp: i64,
}

/// Inputs bound by the digest. The token itself is reduced to its length so
/// the sensitive material is not stored twice.
#[derive(Clone, Copy, Debug)]
pub struct DigestInput<'a> {
    pub token: &'a str,
    pub user_id: &'a str,
    pub role: Role,
    pub timestamp: i64,
}

#[must_use]
pub fn compute_digest(input: &DigestInput<'_>) -> String {
    let record = DigestRecord {
        token_length: input.token.len(),
        user_id: input.user_id,
        role: input.role.as_str(),
        timestamp: input.timestamp,
    };
    // Serializing a struct of plain fields into a Vec cannot fail.
    let json = serde_json::to_vec(&record).unwrap_or_default();
    Base64::encode_string(&json)
}

/// Recomputes the digest and compares it with the stored one.
#[must_use]
pub fn verify(stored_digest: &str, input: &DigestInput<'_>) -> bool {
    let expected = compute_digest(input);
    constant_time_eq(stored_digest.trim().as_bytes(), expected.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(token: &str) -> DigestInput<'_> {
        DigestInput {
            token,
            user_id: "u-1",
            role: Role::Buyer,
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(compute_digest(&input("a.b.c")), compute_digest(&input("a.b.c")));
    }

    #[test]
    fn digest_decodes_to_canonical_record() -> Result<(), base64ct::Error> {
        let digest = compute_digest(&input("a.b.c"));
        let decoded = Base64::decode_vec(&digest)?;
        assert_eq!(
            String::from_utf8_lossy(&decoded),
            r#"{"tokenLength":5,"userId":"u-1","role":"buyer","timestamp":1700000000000}"#
        );
        Ok(())
    }

    #[test]
    fn verify_is_idempotent() {
        let digest = compute_digest(&input("a.b.c"));
        let first = verify(&digest, &input("a.b.c"));
        let second = verify(&digest, &input("a.b.c"));
        assert!(first);
        assert_eq!(first, second);
    }

    #[test]
    fn detects_each_bound_field() {
        let digest = compute_digest(&input("a.b.c"));
        assert!(!verify(&digest, &input("a.b.cd")));
        assert!(!verify(&digest, &DigestInput { user_id: "u-2", ..input("a.b.c") }));
        assert!(!verify(&digest, &DigestInput { role: Role::Admin, ..input("a.b.c") }));
        assert!(!verify(&digest, &DigestInput { timestamp: 0, ..input("a.b.c") }));
    }

    #[test]
    fn same_length_token_swap_is_not_detected() {
        // Documented limitation: only the token length is bound.
        let digest = compute_digest(&input("a.b.c"));
        assert!(verify(&digest, &input("x.y.z")));
    }
}
