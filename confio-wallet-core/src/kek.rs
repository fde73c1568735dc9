//! Key-Encryption-Key derivation.
//!
//! The KEK protects the locally cached seed and nothing else. It binds the
//! same OAuth claims as the client salt to the *rotating* KEK pepper:
//!
//! ```text
//! x    = SHA256(canonical(issuer) + "|" + subject + "|" + canonical(audience))
//! salt = SHA256("confio/kek-salt/v1|" + kekPepper)
//! info = "confio/kek-info/v1|" + derivationEncoding(scope)
//! kek  = HKDF-SHA256(x, salt, info, 32)
//! ```
//!
//! Because the KEK pepper rotates and the derivation pepper does not, the
//! two must never be interchanged; the type signatures enforce this.

use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    error::WalletError, identity::OAuthIdentity, pepper::KekPepper, scope::DerivationScope,
};

/// Label mixed into the KEK extract salt.
const LABEL_KEK_SALT: &str = "confio/kek-salt/v1|";

/// Label prefixing the KEK info string.
const LABEL_KEK_INFO: &str = "confio/kek-info/v1|";

/// A 256-bit Key-Encryption-Key.
///
/// Used only by the seed vault; zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Kek([u8; 32]);

impl Kek {
    /// Wraps raw KEK bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw KEK bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for Kek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Kek").field(&"[REDACTED]").finish()
    }
}

impl PartialEq for Kek {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Kek {}

/// Derives the KEK for an identity and scope under the given pepper version.
///
/// # Errors
///
/// Returns [`WalletError::InvalidInput`] if the subject is empty; no other
/// error path exists.
pub fn derive_kek(
    identity: &OAuthIdentity,
    kek_pepper: &KekPepper,
    scope: &DerivationScope,
) -> Result<Kek, WalletError> {
    if identity.subject.trim().is_empty() {
        return Err(WalletError::invalid_input("subject", "must not be empty"));
    }

    let claims = format!(
        "{}|{}|{}",
        identity.canonical_issuer(),
        identity.subject,
        identity.canonical_audience()
    );
    let mut ikm = {
        let digest = Sha256::digest(claims.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        bytes
    };

    let extract_salt = {
        let mut hasher = Sha256::new();
        hasher.update(LABEL_KEK_SALT.as_bytes());
        hasher.update(kek_pepper.expose().as_bytes());
        hasher.finalize()
    };

    let info = format!("{LABEL_KEK_INFO}{}", scope.derivation_encoding());

    let hk = Hkdf::<Sha256>::new(Some(extract_salt.as_slice()), &ikm);
    let mut okm = [0u8; 32];
    hk.expand(info.as_bytes(), &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    ikm.zeroize();

    let kek = Kek::from_bytes(okm);
    okm.zeroize();
    Ok(kek)
}
