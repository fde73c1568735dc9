//! The seed vault: authenticated wrapping of the scope root key under the
//! KEK, plus the KEK rotation state machine.
//!
//! Wrapping uses XChaCha20-Poly1305 with a random 24-byte nonce. The AEAD
//! associated data binds the envelope version, algorithm, KEK pepper version,
//! and scope fingerprint, so tampering with the metadata fails authentication
//! exactly like tampering with the ciphertext. Any authentication failure
//! surfaces as the single [`WalletError::CacheInvalid`] outcome, never a
//! partial or garbage seed.

mod blob;

pub use blob::{WrappedSeedBlob, BLOB_ALGORITHM, BLOB_VERSION};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::{
    derivation::ScopeRootKey,
    error::WalletError,
    kek::Kek,
    pepper::{DerivationPepper, KekPepper},
    salt::ClientSalt,
    scope::DerivationScope,
};

/// Size of the XChaCha20-Poly1305 nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// Label for scope fingerprints.
const LABEL_FP_SCOPE: &str = "confio/fp/scope|";

/// Label for salt fingerprints.
const LABEL_FP_SALT: &str = "confio/fp/salt|";

/// Label for derivation pepper fingerprints.
const LABEL_FP_PEPPER: &str = "confio/fp/pepper|";

/// Non-secret diagnostics recorded alongside the wrapped seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedMetadata {
    /// Fingerprint of the scope the seed was derived for.
    pub scope_fingerprint: String,
    /// Fingerprint of the derivation pepper in effect at wrap time.
    pub derivation_pepper_hash: String,
    /// Fingerprint of the client salt in effect at wrap time.
    pub salt_fingerprint: String,
    /// Wrap time in epoch seconds.
    pub created_at: u64,
}

/// Fingerprint of a derivation scope (non-secret).
#[must_use]
pub fn scope_fingerprint(scope: &DerivationScope) -> String {
    labeled_fingerprint(LABEL_FP_SCOPE, scope.derivation_encoding().as_bytes())
}

/// Fingerprint of a client salt (non-secret; the salt itself is not).
#[must_use]
pub fn salt_fingerprint(salt: &ClientSalt) -> String {
    labeled_fingerprint(LABEL_FP_SALT, salt.to_hex().as_bytes())
}

/// One-way hash of the derivation pepper, safe to persist.
#[must_use]
pub fn derivation_pepper_hash(pepper: &DerivationPepper) -> String {
    labeled_fingerprint(LABEL_FP_PEPPER, pepper.expose().as_bytes())
}

fn labeled_fingerprint(label: &str, payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(label.as_bytes());
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// Associated data binding the blob metadata into the AEAD tag.
fn build_associated_data(
    version: u32,
    algorithm: &str,
    kek_pepper_version: u32,
    scope_fp: &str,
) -> Vec<u8> {
    let mut aad = Vec::with_capacity(8 + algorithm.len() + scope_fp.len());
    aad.extend_from_slice(&version.to_le_bytes());
    aad.extend_from_slice(algorithm.as_bytes());
    aad.extend_from_slice(&kek_pepper_version.to_le_bytes());
    aad.extend_from_slice(scope_fp.as_bytes());
    aad
}

/// Wraps the scope root key under the KEK.
///
/// # Errors
///
/// Returns [`WalletError::Serialization`] if sealing fails (does not happen
/// with well-formed inputs).
///
/// # Panics
///
/// This function will not panic; the `expect` covers a key length that is
/// always 32 bytes by construction.
pub fn wrap(
    root: &ScopeRootKey,
    kek: &Kek,
    kek_pepper_version: u32,
    metadata: &SeedMetadata,
) -> Result<WrappedSeedBlob, WalletError> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(kek.as_bytes()).expect("KEK length is always 32");

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let aad = build_associated_data(
        BLOB_VERSION,
        BLOB_ALGORITHM,
        kek_pepper_version,
        &metadata.scope_fingerprint,
    );

    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: root.as_bytes(),
                aad: &aad,
            },
        )
        .map_err(|_| WalletError::serialization("XChaCha20-Poly1305 sealing failed"))?;

    Ok(WrappedSeedBlob {
        version: BLOB_VERSION,
        algorithm: BLOB_ALGORITHM.to_string(),
        nonce: BASE64.encode(nonce),
        ciphertext: BASE64.encode(ciphertext),
        created_at: metadata.created_at,
        kek_pepper_version,
        scope_fingerprint: metadata.scope_fingerprint.clone(),
        derivation_pepper_hash: metadata.derivation_pepper_hash.clone(),
        salt_fingerprint: metadata.salt_fingerprint.clone(),
    })
}

/// Unwraps the scope root key from a blob.
///
/// # Errors
///
/// Any authentication failure (wrong KEK, tampered ciphertext or nonce,
/// tampered metadata) returns [`WalletError::CacheInvalid`]. "Not found" is
/// a precondition checked by the caller against secure storage, never an
/// unwrap error.
///
/// # Panics
///
/// This function will not panic; the `expect` covers a key length that is
/// always 32 bytes by construction.
pub fn unwrap(blob: &WrappedSeedBlob, kek: &Kek) -> Result<ScopeRootKey, WalletError> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(kek.as_bytes()).expect("KEK length is always 32");

    let nonce = blob.nonce_bytes()?;
    let ciphertext = blob.ciphertext_bytes()?;
    let aad = build_associated_data(
        blob.version,
        &blob.algorithm,
        blob.kek_pepper_version,
        &blob.scope_fingerprint,
    );

    let mut plaintext = cipher
        .decrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: &ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| WalletError::CacheInvalid)?;

    if plaintext.len() != 32 {
        plaintext.zeroize();
        return Err(WalletError::CacheInvalid);
    }

    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();

    let root = ScopeRootKey::from_bytes(bytes);
    bytes.zeroize();
    Ok(root)
}

/// Where a cached blob stands relative to the server's current KEK pepper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    /// The blob is wrapped under the current pepper version.
    Current,
    /// The blob is wrapped under a previous version and the grace window is
    /// still open; unwrap with the old pepper, then re-wrap under the new.
    StaleInGrace,
    /// The grace window has elapsed (or never existed); the blob is
    /// unreadable and a full re-derivation is required.
    StaleExpired,
}

impl RotationState {
    /// Evaluates the rotation state machine.
    ///
    /// This is the single place the grace boundary is decided. `now` is in
    /// epoch seconds.
    #[must_use]
    pub const fn evaluate(blob_pepper_version: u32, current: &KekPepper, now: u64) -> Self {
        if blob_pepper_version == current.version() {
            return Self::Current;
        }
        if blob_pepper_version > current.version() {
            // A blob from the future means the server rolled back; the KEK
            // for it can no longer be derived.
            return Self::StaleExpired;
        }
        match current.grace_period_until() {
            Some(grace_until) if now < grace_until => Self::StaleInGrace,
            _ => Self::StaleExpired,
        }
    }
}
