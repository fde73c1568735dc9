//! The HKDF key-derivation engine.
//!
//! Combines the client salt with the server-issued derivation pepper to
//! produce per-chain, per-scope signing seeds. The construction is frozen by
//! contract:
//!
//! ```text
//! ikm         = SHA256("confio-wallet-root|" + hex(clientSalt))
//! extractSalt = SHA256("confio/extract/v1|" + derivationPepper)
//! root        = HKDF-Extract(extractSalt, ikm)               // per scope
//! info        = chainInfoPrefix + "|" + derivationEncoding   // per chain
//! seed        = HKDF-Expand(root, info, 32)
//! ```
//!
//! The `info` string is the sole mechanism preventing cross-scope and
//! cross-chain key reuse; every byte of it (prefixes, separators, field
//! order) must be reproducible forever.

use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{pepper::DerivationPepper, salt::ClientSalt, scope::DerivationScope};

/// Label mixed into the input keying material.
const LABEL_ROOT_IKM: &str = "confio-wallet-root|";

/// Label mixed into the HKDF extract salt.
const LABEL_EXTRACT_SALT: &str = "confio/extract/v1|";

/// A 32-byte chain-specific signing seed.
///
/// The most sensitive value in the system: never logged, never serialized
/// outside the seed vault, overwritten in memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; 32]);

impl Seed {
    /// Wraps raw seed bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw seed bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Seed").field(&"[REDACTED]").finish()
    }
}

impl PartialEq for Seed {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Seed {}

/// The per-scope root key (the HKDF pseudo-random key).
///
/// Chain-independent: every chain's seed expands from this value under its
/// own `info` prefix. This is what the seed vault caches, so a cache hit can
/// serve any chain without refetching the derivation pepper.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ScopeRootKey([u8; 32]);

impl ScopeRootKey {
    /// Wraps raw root-key bytes (e.g. unwrapped from the vault).
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw root-key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for ScopeRootKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ScopeRootKey").field(&"[REDACTED]").finish()
    }
}

impl PartialEq for ScopeRootKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for ScopeRootKey {}

/// SHA-256 over a domain label followed by a payload.
fn sha256_labeled(label: &str, payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(label.as_bytes());
    hasher.update(payload);
    let digest = hasher.finalize();

    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    bytes
}

/// Derives the per-scope root key from the client salt and the derivation
/// pepper (HKDF-Extract step).
///
/// Total and deterministic; performs no I/O and cannot fail.
#[must_use]
pub fn derive_scope_root(salt: &ClientSalt, pepper: &DerivationPepper) -> ScopeRootKey {
    let mut ikm = sha256_labeled(LABEL_ROOT_IKM, salt.to_hex().as_bytes());
    let extract_salt = sha256_labeled(LABEL_EXTRACT_SALT, pepper.expose().as_bytes());

    let (prk, _) = Hkdf::<Sha256>::extract(Some(extract_salt.as_slice()), &ikm);
    ikm.zeroize();

    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&prk);
    ScopeRootKey(bytes)
}

/// Expands a chain-specific 32-byte seed from the scope root key
/// (HKDF-Expand step).
///
/// # Panics
///
/// This function will not panic; the `expect` covers output lengths HKDF
/// cannot reject (32 bytes is always valid for SHA-256).
#[must_use]
pub fn expand_chain_seed(
    root: &ScopeRootKey,
    scope: &DerivationScope,
    chain_info_prefix: &str,
) -> Seed {
    let hk = Hkdf::<Sha256>::from_prk(root.as_bytes())
        .expect("PRK length is always a valid SHA-256 output");

    let info = format!("{chain_info_prefix}|{}", scope.derivation_encoding());
    let mut okm = [0u8; 32];
    hk.expand(info.as_bytes(), &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");

    let seed = Seed::from_bytes(okm);
    okm.zeroize();
    seed
}

/// Derives a chain-specific seed in one step (extract then expand).
///
/// Byte-identical to caching the root via [`derive_scope_root`] and calling
/// [`expand_chain_seed`] later.
#[must_use]
pub fn derive_seed(
    salt: &ClientSalt,
    pepper: &DerivationPepper,
    scope: &DerivationScope,
    chain_info_prefix: &str,
) -> Seed {
    let root = derive_scope_root(salt, pepper);
    expand_chain_seed(&root, scope, chain_info_prefix)
}
