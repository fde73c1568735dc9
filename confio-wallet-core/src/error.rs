use thiserror::Error;

use crate::chains::ChainType;

/// Error outputs from the wallet core.
///
/// The taxonomy distinguishes caller bugs (`InvalidInput`, `UnsupportedChain`)
/// from recoverable I/O conditions (`PepperFetchFailed`, `StorageUnavailable`)
/// and from cache conditions that are absorbed internally (`CacheInvalid`).
#[derive(Debug, Error)]
pub enum WalletError {
    /// A claim or parameter is malformed. Never retried; fix the call site.
    #[error("invalid input '{parameter}': {reason}")]
    InvalidInput {
        /// Name of the offending parameter.
        parameter: &'static str,
        /// Description of the issue.
        reason: String,
    },

    /// Fetching a server-issued pepper failed. Retryable.
    #[error("pepper fetch failed: {context}")]
    PepperFetchFailed {
        /// Context describing the fetch that failed.
        context: String,
    },

    /// The cached blob failed authentication or is past its rotation grace.
    ///
    /// Always recoverable by falling back to full re-derivation; the session
    /// absorbs this and it never surfaces to the caller under normal
    /// operation.
    #[error("cached seed is invalid")]
    CacheInvalid,

    /// No adapter is registered for the requested chain. Programming error.
    #[error("no adapter registered for chain '{chain}'")]
    UnsupportedChain {
        /// The chain that was requested.
        chain: ChainType,
    },

    /// The platform secure store denied access.
    ///
    /// Non-fatal for reads (the session falls back to re-derivation); writes
    /// degrade to no-cache operation for the rest of the session.
    #[error("secure storage unavailable: {context}")]
    StorageUnavailable {
        /// Context describing the storage operation.
        context: String,
    },

    /// The freshly derived address disagrees with the address the server
    /// already knows for this scope. Signing must not proceed.
    #[error("derived address '{derived}' does not match expected address '{expected}'")]
    ScopeMismatch {
        /// The address the caller expected for this scope.
        expected: String,
        /// The address that was actually derived.
        derived: String,
    },

    /// A cryptographic derivation produced unusable key material.
    #[error("key derivation failed: {context}")]
    KeyDerivation {
        /// Context describing what was being derived.
        context: String,
    },

    /// Serializing or deserializing a persisted record failed.
    #[error("serialization error: {context}")]
    Serialization {
        /// Context describing the record.
        context: String,
    },
}

impl WalletError {
    /// Creates an invalid input error.
    pub fn invalid_input<R: Into<String>>(parameter: &'static str, reason: R) -> Self {
        Self::InvalidInput {
            parameter,
            reason: reason.into(),
        }
    }

    /// Creates a pepper fetch error.
    pub fn pepper_fetch<C: Into<String>>(context: C) -> Self {
        Self::PepperFetchFailed {
            context: context.into(),
        }
    }

    /// Creates a storage error.
    pub fn storage<C: Into<String>>(context: C) -> Self {
        Self::StorageUnavailable {
            context: context.into(),
        }
    }

    /// Creates a key derivation error.
    pub fn key_derivation<C: Into<String>>(context: C) -> Self {
        Self::KeyDerivation {
            context: context.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization<C: Into<String>>(context: C) -> Self {
        Self::Serialization {
            context: context.into(),
        }
    }

    /// Whether the operation that produced this error may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PepperFetchFailed { .. } | Self::StorageUnavailable { .. }
        )
    }
}
