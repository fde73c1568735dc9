//! The persisted wrapped-seed record.
//!
//! The blob is the only entity in this subsystem with disk lifetime. It is a
//! self-describing JSON envelope: `version` and `algorithm` are kept so a
//! future cipher migration can detect and upgrade old blobs on read.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

use super::NONCE_SIZE;

/// Current blob envelope version.
pub const BLOB_VERSION: u32 = 1;

/// The AEAD algorithm identifier recorded in version-1 blobs.
pub const BLOB_ALGORITHM: &str = "xchacha20-poly1305";

/// A wrapped seed with the metadata needed to detect staleness.
///
/// Without the KEK the blob reveals nothing about the seed. The fingerprint
/// fields are non-secret diagnostics used only to detect that a cached blob
/// no longer matches the current derivation inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedSeedBlob {
    /// Envelope format version.
    pub version: u32,
    /// AEAD algorithm identifier.
    pub algorithm: String,
    /// Base64 of the 24-byte AEAD nonce.
    pub nonce: String,
    /// Base64 of the ciphertext including the authentication tag.
    pub ciphertext: String,
    /// Creation time in epoch seconds.
    pub created_at: u64,
    /// The KEK pepper version the seed is wrapped under.
    pub kek_pepper_version: u32,
    /// Fingerprint of the scope the seed was derived for.
    pub scope_fingerprint: String,
    /// Fingerprint of the derivation pepper in effect at wrap time.
    pub derivation_pepper_hash: String,
    /// Fingerprint of the client salt in effect at wrap time.
    pub salt_fingerprint: String,
}

impl WrappedSeedBlob {
    /// Serializes the blob for secure storage.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Serialization`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WalletError> {
        serde_json::to_vec(self)
            .map_err(|err| WalletError::serialization(format!("wrapped seed blob: {err}")))
    }

    /// Parses a blob from secure storage.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Serialization`] for malformed data or for an
    /// envelope version / algorithm this build does not understand.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        let blob: Self = serde_json::from_slice(bytes)
            .map_err(|err| WalletError::serialization(format!("wrapped seed blob: {err}")))?;
        if blob.version != BLOB_VERSION {
            return Err(WalletError::serialization(format!(
                "unsupported blob version {}",
                blob.version
            )));
        }
        if blob.algorithm != BLOB_ALGORITHM {
            return Err(WalletError::serialization(format!(
                "unsupported blob algorithm '{}'",
                blob.algorithm
            )));
        }
        Ok(blob)
    }

    /// Decodes the nonce field.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::CacheInvalid`] if the nonce is not a valid
    /// 24-byte base64 value.
    pub fn nonce_bytes(&self) -> Result<[u8; NONCE_SIZE], WalletError> {
        let decoded = BASE64
            .decode(&self.nonce)
            .map_err(|_| WalletError::CacheInvalid)?;
        decoded.try_into().map_err(|_| WalletError::CacheInvalid)
    }

    /// Decodes the ciphertext field.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::CacheInvalid`] if the ciphertext is not valid
    /// base64.
    pub fn ciphertext_bytes(&self) -> Result<Vec<u8>, WalletError> {
        BASE64
            .decode(&self.ciphertext)
            .map_err(|_| WalletError::CacheInvalid)
    }
}
