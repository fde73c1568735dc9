//! Client-salt generation.
//!
//! The client salt is the client-controlled half of the 2-of-2 derivation
//! input. It is a pure function of the canonicalized identity claims and the
//! scope, recomputed on demand, and never persisted or generated randomly.

use sha2::{Digest, Sha256};

use crate::{
    error::WalletError,
    identity::OAuthIdentity,
    scope::{DerivationScope, SALT_JOIN_SEPARATOR},
};

/// The 256-bit client salt, hex-encoded for transport and display.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ClientSalt([u8; 32]);

impl ClientSalt {
    /// Returns the raw salt bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding, the transport form of the salt.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for ClientSalt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ClientSalt").field(&self.to_hex()).finish()
    }
}

/// Derives the client salt for an identity and scope.
///
/// Builds the frozen join string (business scopes:
/// `issuer_subject_audience_accountType_businessId_accountIndex`; personal
/// scopes omit the business segment) and returns `SHA256(utf8(joinString))`.
///
/// Pure and deterministic; identical inputs always yield an identical salt.
///
/// # Errors
///
/// Returns [`WalletError::InvalidInput`] if the subject is empty. No other
/// error path exists.
pub fn generate_client_salt(
    identity: &OAuthIdentity,
    scope: &DerivationScope,
) -> Result<ClientSalt, WalletError> {
    if identity.subject.trim().is_empty() {
        return Err(WalletError::invalid_input("subject", "must not be empty"));
    }

    let mut segments = vec![
        identity.canonical_issuer(),
        identity.subject.clone(),
        identity.canonical_audience(),
    ];
    segments.extend(scope.salt_segments());
    let join_string = segments.join(&SALT_JOIN_SEPARATOR.to_string());

    let digest = Sha256::digest(join_string.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    Ok(ClientSalt(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identity::Provider;

    fn identity(issuer: &str) -> OAuthIdentity {
        OAuthIdentity::new(issuer, "1234567890", "web-client-id", Provider::Google)
    }

    #[test]
    fn test_salt_is_deterministic() {
        let scope = DerivationScope::personal(Provider::Google, 0);
        let a = generate_client_salt(&identity("https://accounts.google.com"), &scope).unwrap();
        let b = generate_client_salt(&identity("https://accounts.google.com"), &scope).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 64);
    }

    #[test]
    fn test_trailing_slash_invariance() {
        let scope = DerivationScope::personal(Provider::Google, 0);
        let with_slash =
            generate_client_salt(&identity("https://accounts.google.com/"), &scope).unwrap();
        let without_slash =
            generate_client_salt(&identity("https://accounts.google.com"), &scope).unwrap();
        assert_eq!(with_slash, without_slash);
    }

    #[test]
    fn test_case_invariance() {
        let scope = DerivationScope::personal(Provider::Google, 0);
        let upper =
            generate_client_salt(&identity("HTTPS://ACCOUNTS.GOOGLE.COM"), &scope).unwrap();
        let lower =
            generate_client_salt(&identity("https://accounts.google.com"), &scope).unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_subject_is_case_sensitive() {
        let scope = DerivationScope::personal(Provider::Google, 0);
        let a = OAuthIdentity::new("https://x.example", "Sub", "aud", Provider::Google);
        let b = OAuthIdentity::new("https://x.example", "sub", "aud", Provider::Google);
        assert_ne!(
            generate_client_salt(&a, &scope).unwrap(),
            generate_client_salt(&b, &scope).unwrap()
        );
    }

    #[test]
    fn test_distinct_scopes_produce_distinct_salts() {
        let id = identity("https://accounts.google.com");
        let personal_0 = DerivationScope::personal(Provider::Google, 0);
        let personal_1 = DerivationScope::personal(Provider::Google, 1);
        let business = DerivationScope::business(Provider::Google, 0, "abc").unwrap();

        let s0 = generate_client_salt(&id, &personal_0).unwrap();
        let s1 = generate_client_salt(&id, &personal_1).unwrap();
        let sb = generate_client_salt(&id, &business).unwrap();
        assert_ne!(s0, s1);
        assert_ne!(s0, sb);
        assert_ne!(s1, sb);
    }

    #[test]
    fn test_empty_subject_rejected() {
        let scope = DerivationScope::personal(Provider::Google, 0);
        let id = OAuthIdentity::new("https://x.example", " ", "aud", Provider::Google);
        assert!(matches!(
            generate_client_salt(&id, &scope),
            Err(WalletError::InvalidInput {
                parameter: "subject",
                ..
            })
        ));
    }
}
