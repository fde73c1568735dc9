//! Server-issued peppers and the client boundary for fetching them.
//!
//! Two peppers exist and they are never interchangeable:
//!
//! - the **derivation pepper** seeds the actual signing-key derivation and
//!   never rotates for the lifetime of the product (rotating it silently
//!   orphans every previously derived wallet);
//! - the **KEK pepper** only protects the local seed cache and rotates with a
//!   monotonic version and an optional grace window.
//!
//! The distinct types below make swapping them a compile error.

mod http;

pub use http::HttpPepperClient;

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::WalletError;

/// The non-rotating pepper that seeds signing-key derivation.
///
/// Scoped to the caller's authenticated session and frozen by contract.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivationPepper(String);

impl DerivationPepper {
    /// Wraps a server-issued pepper string.
    pub fn new<P: Into<String>>(pepper: P) -> Self {
        Self(pepper.into())
    }

    /// Exposes the pepper for use as keying material.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for DerivationPepper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DerivationPepper").field(&"[REDACTED]").finish()
    }
}

/// The rotating pepper used only to derive the cache-protecting KEK.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KekPepper {
    value: String,
    #[zeroize(skip)]
    version: u32,
    #[zeroize(skip)]
    is_rotated: bool,
    #[zeroize(skip)]
    grace_period_until: Option<u64>,
}

impl KekPepper {
    /// Wraps a server-issued KEK pepper at the given version.
    pub fn new<P: Into<String>>(pepper: P, version: u32) -> Self {
        Self {
            value: pepper.into(),
            version,
            is_rotated: false,
            grace_period_until: None,
        }
    }

    /// Marks the pepper as superseded by a newer version.
    #[must_use]
    pub const fn rotated(mut self) -> Self {
        self.is_rotated = true;
        self
    }

    /// Sets the grace deadline (epoch seconds) during which the previous
    /// version is still served.
    #[must_use]
    pub const fn with_grace_period(mut self, until: u64) -> Self {
        self.grace_period_until = Some(until);
        self
    }

    /// Exposes the pepper for use as keying material.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// The monotonic pepper version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Whether this pepper version has been superseded.
    #[must_use]
    pub const fn is_rotated(&self) -> bool {
        self.is_rotated
    }

    /// The grace deadline in epoch seconds, if a rotation is in progress.
    #[must_use]
    pub const fn grace_period_until(&self) -> Option<u64> {
        self.grace_period_until
    }
}

impl std::fmt::Debug for KekPepper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KekPepper")
            .field("value", &"[REDACTED]")
            .field("version", &self.version)
            .field("is_rotated", &self.is_rotated)
            .field("grace_period_until", &self.grace_period_until)
            .finish()
    }
}

/// Boundary for fetching server-issued peppers.
///
/// Transport-agnostic; the reference implementation speaks GraphQL, the
/// bundled [`HttpPepperClient`] speaks JSON over HTTPS, and tests use
/// [`StaticPepperClient`]. Implementations never retry internally; the
/// session owns all retry policy.
#[async_trait]
pub trait PepperClient: Send + Sync {
    /// Fetches the derivation pepper for the authenticated account.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::PepperFetchFailed`] on network or auth failure.
    async fn get_derivation_pepper(&self) -> Result<DerivationPepper, WalletError>;

    /// Fetches the KEK pepper.
    ///
    /// With `requested_version = None` the current version is returned.
    /// During a rotation grace window the server also serves the previous
    /// version on request.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::PepperFetchFailed`] on network or auth failure,
    /// or when the requested version is no longer served.
    async fn get_kek_pepper(
        &self,
        requested_version: Option<u32>,
    ) -> Result<KekPepper, WalletError>;
}

/// In-memory pepper source for tests and offline scenarios.
///
/// Keeps a history of KEK pepper versions so rotation grace can be exercised
/// without a server.
pub struct StaticPepperClient {
    inner: RwLock<StaticPeppers>,
}

struct StaticPeppers {
    derivation: Option<DerivationPepper>,
    kek_history: BTreeMap<u32, KekPepper>,
    current_version: u32,
}

impl StaticPepperClient {
    /// Creates a client serving the given peppers.
    #[must_use]
    pub fn new(derivation_pepper: &str, kek_pepper: KekPepper) -> Self {
        let current_version = kek_pepper.version();
        let mut kek_history = BTreeMap::new();
        kek_history.insert(current_version, kek_pepper);
        Self {
            inner: RwLock::new(StaticPeppers {
                derivation: Some(DerivationPepper::new(derivation_pepper)),
                kek_history,
                current_version,
            }),
        }
    }

    /// Installs a new current KEK pepper, keeping prior versions servable.
    ///
    /// # Panics
    ///
    /// Panics if the new version does not increase monotonically.
    pub fn rotate_kek(&self, new_pepper: KekPepper) {
        let mut inner = self.inner.write().expect("pepper lock poisoned");
        assert!(
            new_pepper.version() > inner.current_version,
            "KEK pepper versions are monotonic"
        );
        inner.current_version = new_pepper.version();
        inner.kek_history.insert(new_pepper.version(), new_pepper);
    }

    /// Stops serving the derivation pepper, simulating an offline device.
    pub fn revoke_derivation_pepper(&self) {
        self.inner
            .write()
            .expect("pepper lock poisoned")
            .derivation = None;
    }
}

#[async_trait]
impl PepperClient for StaticPepperClient {
    async fn get_derivation_pepper(&self) -> Result<DerivationPepper, WalletError> {
        self.inner
            .read()
            .expect("pepper lock poisoned")
            .derivation
            .clone()
            .ok_or_else(|| WalletError::pepper_fetch("derivation pepper unavailable"))
    }

    async fn get_kek_pepper(
        &self,
        requested_version: Option<u32>,
    ) -> Result<KekPepper, WalletError> {
        let inner = self.inner.read().expect("pepper lock poisoned");
        let version = requested_version.unwrap_or(inner.current_version);
        let pepper = inner.kek_history.get(&version).cloned().ok_or_else(|| {
            WalletError::pepper_fetch(format!("KEK pepper version {version} is not served"))
        })?;
        if version < inner.current_version {
            Ok(pepper.rotated())
        } else {
            Ok(pepper)
        }
    }
}
