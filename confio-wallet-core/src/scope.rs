//! Derivation scopes.
//!
//! A scope identifies *which* wallet is being derived for a given identity:
//! personal vs. business, account index, and (for business accounts) the
//! business id. The closed [`AccountScope`] enum makes it impossible to
//! construct a personal scope carrying a business id.
//!
//! A scope has two string encodings, and they are intentionally different:
//!
//! - the **derivation encoding** feeds the HKDF `info` strings and is frozen
//!   byte-for-byte forever;
//! - the **cache key** is the secure-storage lookup key. It deliberately
//!   excludes the subject, so the storage key is stable and guessable while
//!   the stored content stays unreadable without the subject-bound KEK.

use serde::{Deserialize, Serialize};

use crate::{error::WalletError, identity::Provider};

/// Separator for the salt join string.
pub(crate) const SALT_JOIN_SEPARATOR: char = '_';

/// Prefix for secure-storage cache keys.
const CACHE_KEY_PREFIX: &str = "confio.seed";

/// Personal or business account, with the fields valid for each kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "account_type", rename_all = "lowercase")]
pub enum AccountScope {
    /// A personal account at the given index.
    Personal {
        /// Zero-based account index within the identity.
        account_index: u32,
    },
    /// A business account at the given index, bound to a business id.
    Business {
        /// Zero-based account index within the business.
        account_index: u32,
        /// Opaque server-assigned business identifier.
        business_id: String,
    },
}

/// The tuple identifying which wallet is derived for an identity.
///
/// Two scopes are equal iff provider, account type, account index, and
/// business id are all equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivationScope {
    /// The OAuth provider this scope belongs to.
    pub provider: Provider,
    /// The account portion of the scope.
    pub account: AccountScope,
}

impl DerivationScope {
    /// Creates a personal scope.
    #[must_use]
    pub const fn personal(provider: Provider, account_index: u32) -> Self {
        Self {
            provider,
            account: AccountScope::Personal { account_index },
        }
    }

    /// Creates a business scope.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidInput`] if `business_id` is empty.
    pub fn business<B: Into<String>>(
        provider: Provider,
        account_index: u32,
        business_id: B,
    ) -> Result<Self, WalletError> {
        let business_id = business_id.into();
        if business_id.trim().is_empty() {
            return Err(WalletError::invalid_input(
                "business_id",
                "must not be empty for a business scope",
            ));
        }
        Ok(Self {
            provider,
            account: AccountScope::Business {
                account_index,
                business_id,
            },
        })
    }

    /// `"personal"` or `"business"`.
    #[must_use]
    pub const fn account_type(&self) -> &'static str {
        match self.account {
            AccountScope::Personal { .. } => "personal",
            AccountScope::Business { .. } => "business",
        }
    }

    /// The account index within the identity or business.
    #[must_use]
    pub const fn account_index(&self) -> u32 {
        match self.account {
            AccountScope::Personal { account_index }
            | AccountScope::Business { account_index, .. } => account_index,
        }
    }

    /// The business id, present iff this is a business scope.
    #[must_use]
    pub fn business_id(&self) -> Option<&str> {
        match &self.account {
            AccountScope::Personal { .. } => None,
            AccountScope::Business { business_id, .. } => Some(business_id),
        }
    }

    /// The frozen encoding fed into HKDF `info` strings:
    /// `{provider}|{accountType}|{accountIndex}|{businessId-or-empty}`.
    ///
    /// Every byte of this string is contract, not convention. Personal scopes
    /// end with the trailing `|` and an empty segment.
    #[must_use]
    pub fn derivation_encoding(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.provider,
            self.account_type(),
            self.account_index(),
            self.business_id().unwrap_or("")
        )
    }

    /// The secure-storage key for this scope's wrapped seed blob.
    ///
    /// Built from account type, business id, and account index only; the
    /// subject never appears here.
    #[must_use]
    pub fn cache_key(&self) -> String {
        match &self.account {
            AccountScope::Personal { account_index } => {
                format!("{CACHE_KEY_PREFIX}.personal.{account_index}")
            }
            AccountScope::Business {
                account_index,
                business_id,
            } => format!("{CACHE_KEY_PREFIX}.business.{business_id}.{account_index}"),
        }
    }

    /// The ordered segments joined (with `_`) into the client-salt preimage,
    /// appended after issuer, subject, and audience.
    ///
    /// Business scopes contribute `accountType, businessId, accountIndex`;
    /// personal scopes omit the business segment entirely, so no double
    /// separator ever appears.
    #[must_use]
    pub fn salt_segments(&self) -> Vec<String> {
        let mut segments = vec![self.account_type().to_string()];
        if let Some(business_id) = self.business_id() {
            segments.push(business_id.to_string());
        }
        segments.push(self.account_index().to_string());
        segments
    }
}
