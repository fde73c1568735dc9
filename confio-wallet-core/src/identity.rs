//! OAuth identity claims and their canonical form.
//!
//! The derivation pipeline consumes exactly three claims from the OAuth
//! provider's token: issuer, subject, and audience. Issuer and audience are
//! canonicalized so that cosmetic provider differences (trailing slashes,
//! letter case) never change derived output. The subject is provider-defined
//! and is used verbatim.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::WalletError;

/// The OAuth provider a wallet identity originates from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Sign in with Google (`accounts.google.com`).
    Google,
    /// Sign in with Apple (`appleid.apple.com`).
    Apple,
}

/// The identity claims for a single authenticated wallet holder.
///
/// Supplied by the caller on every operation and never persisted by this
/// subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthIdentity {
    /// The `iss` claim, e.g. `https://accounts.google.com`.
    pub issuer: String,
    /// The `sub` claim. Case and format are provider-defined; used verbatim.
    pub subject: String,
    /// The `aud` claim, i.e. the OAuth client id the token was issued to.
    pub audience: String,
    /// The provider that issued the token.
    pub provider: Provider,
}

impl OAuthIdentity {
    /// Creates a new identity from raw token claims.
    pub fn new<I, S, A>(issuer: I, subject: S, audience: A, provider: Provider) -> Self
    where
        I: Into<String>,
        S: Into<String>,
        A: Into<String>,
    {
        Self {
            issuer: issuer.into(),
            subject: subject.into(),
            audience: audience.into(),
            provider,
        }
    }

    /// Validates the claims once at the subsystem boundary.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidInput`] if any claim is empty after
    /// canonicalization. Deeper layers assume validated input and do not
    /// re-check.
    pub fn validate(&self) -> Result<(), WalletError> {
        if canonicalize_claim(&self.issuer).is_empty() {
            return Err(WalletError::invalid_input("issuer", "must not be empty"));
        }
        if self.subject.trim().is_empty() {
            return Err(WalletError::invalid_input("subject", "must not be empty"));
        }
        if canonicalize_claim(&self.audience).is_empty() {
            return Err(WalletError::invalid_input("audience", "must not be empty"));
        }
        Ok(())
    }

    /// The issuer claim in canonical form.
    #[must_use]
    pub fn canonical_issuer(&self) -> String {
        canonicalize_claim(&self.issuer)
    }

    /// The audience claim in canonical form.
    #[must_use]
    pub fn canonical_audience(&self) -> String {
        canonicalize_claim(&self.audience)
    }
}

/// Normalizes an issuer or audience claim: trim whitespace, lowercase, strip
/// trailing slashes.
///
/// This is the only normalization ever applied to claims. Subjects are never
/// passed through here.
#[must_use]
pub fn canonicalize_claim(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .trim_end_matches('/')
        .to_string()
}
