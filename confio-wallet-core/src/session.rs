//! Wallet session orchestration.
//!
//! [`WalletSession`] composes the derivation pipeline: given OAuth claims and
//! a scope it returns a ready-to-sign wallet, preferring the encrypted local
//! cache and falling back to full re-derivation. It owns every piece of I/O
//! policy (retry/backoff for pepper fetches, per-scope request coalescing,
//! epoch-based cancellation) so the cryptographic layers below stay pure.
//!
//! Cache-invalidity is absorbed here and converted into the fresh-derivation
//! path; it never reaches the caller as an error under normal operation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use backon::{ExponentialBuilder, Retryable};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    chains::{ChainAdapterRegistry, ChainType, DerivedWallet},
    derivation::{derive_scope_root, ScopeRootKey},
    error::WalletError,
    identity::OAuthIdentity,
    kek::derive_kek,
    pepper::{DerivationPepper, KekPepper, PepperClient},
    salt::generate_client_salt,
    scope::DerivationScope,
    storage::SecureStorage,
    vault::{self, RotationState, SeedMetadata, WrappedSeedBlob},
};

/// Peppers fetched earlier in this session.
///
/// The KEK pepper memo is what makes routine signing network-free: a cache
/// hit needs at most the KEK pepper and never the derivation pepper.
#[derive(Default)]
struct PepperMemo {
    derivation: Option<DerivationPepper>,
    kek: Option<KekPepper>,
}

/// Orchestrates derivation, caching, and signing for one authenticated user.
pub struct WalletSession {
    registry: Arc<ChainAdapterRegistry>,
    storage: Arc<dyn SecureStorage>,
    peppers: Arc<dyn PepperClient>,
    /// Bumped on logout/account switch; in-flight work compares its captured
    /// value before the final store and discards on mismatch.
    epoch: AtomicU64,
    scope_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    pepper_memo: Mutex<PepperMemo>,
}

impl WalletSession {
    /// Creates a session over the injected collaborators.
    #[must_use]
    pub fn new(
        registry: Arc<ChainAdapterRegistry>,
        storage: Arc<dyn SecureStorage>,
        peppers: Arc<dyn PepperClient>,
    ) -> Self {
        Self {
            registry,
            storage,
            peppers,
            epoch: AtomicU64::new(0),
            scope_locks: Mutex::new(HashMap::new()),
            pepper_memo: Mutex::new(PepperMemo::default()),
        }
    }

    /// Returns a ready-to-sign wallet for the identity, scope, and chain.
    ///
    /// Prefers the encrypted local cache; on miss, corruption, or expired KEK
    /// rotation grace it re-derives from the server-issued peppers and
    /// refreshes the cache. Concurrent callers for the same scope share one
    /// in-flight derivation; different scopes proceed in parallel.
    ///
    /// When `expected_address` is supplied (the address the server already
    /// knows for this scope), a disagreement with the freshly derived address
    /// is a hard [`WalletError::ScopeMismatch`]: the wallet is withheld
    /// rather than risk signing under the wrong key.
    ///
    /// # Errors
    ///
    /// - [`WalletError::InvalidInput`] for malformed claims.
    /// - [`WalletError::PepperFetchFailed`] when re-derivation is required
    ///   and the pepper service stays unreachable after retries.
    /// - [`WalletError::UnsupportedChain`] for an unregistered chain.
    /// - [`WalletError::ScopeMismatch`] as described above.
    pub async fn get_or_create_wallet(
        &self,
        identity: &OAuthIdentity,
        scope: &DerivationScope,
        chain: ChainType,
        expected_address: Option<&str>,
    ) -> Result<DerivedWallet, WalletError> {
        identity.validate()?;

        let cache_key = scope.cache_key();
        let lock = self.scope_lock(&cache_key).await;
        let _guard = lock.lock().await;
        let epoch = self.epoch.load(Ordering::Acquire);

        let root = match self
            .root_from_cache(identity, scope, &cache_key, epoch)
            .await
        {
            Some(root) => root,
            None => {
                self.derive_and_cache_root(identity, scope, &cache_key, epoch)
                    .await?
            }
        };

        let wallet = self.registry.derive_wallet(chain, &root, scope)?;

        if let Some(expected) = expected_address {
            if expected != wallet.address {
                return Err(WalletError::ScopeMismatch {
                    expected: expected.to_string(),
                    derived: wallet.address.clone(),
                });
            }
        }

        Ok(wallet)
    }

    /// Signs `message` with the wallet's chain-appropriate scheme.
    ///
    /// The private scalar never leaves the chain adapter.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::UnsupportedChain`] if the wallet's chain has no
    /// registered adapter, or [`WalletError::KeyDerivation`] if the seed is
    /// unusable on the chain's curve.
    pub fn sign(&self, wallet: &DerivedWallet, message: &[u8]) -> Result<Vec<u8>, WalletError> {
        self.registry.get(wallet.chain_type)?.sign(&wallet.seed, message)
    }

    /// Deletes the persisted blob for a scope (logout / account removal).
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::StorageUnavailable`] if the platform denies
    /// the delete.
    pub async fn remove_wallet(&self, scope: &DerivationScope) -> Result<(), WalletError> {
        self.storage.delete(&scope.cache_key()).await
    }

    /// Tears the session down.
    ///
    /// In-flight derivations complete but discard their results instead of
    /// writing to storage; memoized peppers are dropped.
    pub async fn end_session(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        *self.pepper_memo.lock().await = PepperMemo::default();
    }

    /// Attempts to recover the scope root from the cache.
    ///
    /// Every invalid-cache condition is absorbed into `None`; the caller
    /// falls through to fresh derivation.
    async fn root_from_cache(
        &self,
        identity: &OAuthIdentity,
        scope: &DerivationScope,
        cache_key: &str,
        epoch: u64,
    ) -> Option<ScopeRootKey> {
        let bytes = match self.storage.retrieve(cache_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                warn!("secure storage read failed, falling back to re-derivation: {err}");
                return None;
            }
        };

        let blob = match WrappedSeedBlob::from_bytes(&bytes) {
            Ok(blob) => blob,
            Err(err) => {
                warn!("cached blob is unreadable, re-deriving: {err}");
                return None;
            }
        };

        if blob.scope_fingerprint != vault::scope_fingerprint(scope) {
            warn!("cached blob does not match the requested scope, re-deriving");
            return None;
        }

        // A derivation pepper fetched earlier this session lets us catch a
        // pepper-freeze violation before trusting the cache.
        if let Some(pepper) = self.memoized_derivation_pepper().await {
            if blob.derivation_pepper_hash != vault::derivation_pepper_hash(&pepper) {
                warn!("cached blob predates a derivation pepper change, re-deriving");
                return None;
            }
        }

        let current = match self.current_kek_pepper().await {
            Ok(pepper) => pepper,
            Err(err) => {
                warn!("KEK pepper unavailable, attempting fresh derivation: {err}");
                return None;
            }
        };

        let now = unix_now();
        match RotationState::evaluate(blob.kek_pepper_version, &current, now) {
            RotationState::Current => {
                let kek = derive_kek(identity, &current, scope).ok()?;
                match vault::unwrap(&blob, &kek) {
                    Ok(root) => {
                        debug!("seed cache hit for {cache_key}");
                        Some(root)
                    }
                    Err(_) => {
                        warn!("cached seed failed authentication, re-deriving");
                        None
                    }
                }
            }
            RotationState::StaleInGrace => {
                self.unwrap_and_rewrap_in_grace(identity, scope, cache_key, epoch, &blob, &current)
                    .await
            }
            RotationState::StaleExpired => {
                debug!("KEK rotation grace elapsed for {cache_key}, re-deriving");
                None
            }
        }
    }

    /// Grace-window path: unwrap with the previous pepper version, then
    /// immediately re-wrap under the current one and persist.
    async fn unwrap_and_rewrap_in_grace(
        &self,
        identity: &OAuthIdentity,
        scope: &DerivationScope,
        cache_key: &str,
        epoch: u64,
        blob: &WrappedSeedBlob,
        current: &KekPepper,
    ) -> Option<ScopeRootKey> {
        debug!(
            "KEK pepper rotated (v{} -> v{}), unwrapping within grace window",
            blob.kek_pepper_version,
            current.version()
        );

        let previous = match self
            .with_retry(|| self.peppers.get_kek_pepper(Some(blob.kek_pepper_version)))
            .await
        {
            Ok(pepper) => pepper,
            Err(err) => {
                warn!("previous KEK pepper version unavailable, re-deriving: {err}");
                return None;
            }
        };

        let previous_kek = derive_kek(identity, &previous, scope).ok()?;
        let root = match vault::unwrap(blob, &previous_kek) {
            Ok(root) => root,
            Err(_) => {
                warn!("cached seed failed authentication under previous KEK, re-deriving");
                return None;
            }
        };

        let current_kek = derive_kek(identity, current, scope).ok()?;
        let metadata = SeedMetadata {
            scope_fingerprint: blob.scope_fingerprint.clone(),
            derivation_pepper_hash: blob.derivation_pepper_hash.clone(),
            salt_fingerprint: blob.salt_fingerprint.clone(),
            created_at: unix_now(),
        };
        match vault::wrap(&root, &current_kek, current.version(), &metadata) {
            Ok(rewrapped) => self.store_if_current(epoch, cache_key, &rewrapped).await,
            Err(err) => warn!("re-wrap after rotation failed: {err}"),
        }

        Some(root)
    }

    /// Full derivation: fetch both peppers, derive, wrap, persist.
    async fn derive_and_cache_root(
        &self,
        identity: &OAuthIdentity,
        scope: &DerivationScope,
        cache_key: &str,
        epoch: u64,
    ) -> Result<ScopeRootKey, WalletError> {
        debug!("deriving wallet seed for {cache_key}");

        let derivation_pepper = self.derivation_pepper().await?;
        let kek_pepper = self.current_kek_pepper().await?;

        let salt = generate_client_salt(identity, scope)?;
        let root = derive_scope_root(&salt, &derivation_pepper);

        let kek = derive_kek(identity, &kek_pepper, scope)?;
        let metadata = SeedMetadata {
            scope_fingerprint: vault::scope_fingerprint(scope),
            derivation_pepper_hash: vault::derivation_pepper_hash(&derivation_pepper),
            salt_fingerprint: vault::salt_fingerprint(&salt),
            created_at: unix_now(),
        };
        match vault::wrap(&root, &kek, kek_pepper.version(), &metadata) {
            Ok(blob) => self.store_if_current(epoch, cache_key, &blob).await,
            Err(err) => warn!("seed wrap failed, continuing without cache: {err}"),
        }

        Ok(root)
    }

    /// Persists a blob unless the session epoch moved while the work was in
    /// flight. A failed write degrades to no-cache operation; the wallet
    /// still works for this session.
    async fn store_if_current(&self, epoch: u64, cache_key: &str, blob: &WrappedSeedBlob) {
        if self.epoch.load(Ordering::Acquire) != epoch {
            debug!("session ended mid-derivation, discarding cache write for {cache_key}");
            return;
        }
        match blob.to_bytes() {
            Ok(bytes) => {
                if let Err(err) = self.storage.store(cache_key, &bytes).await {
                    warn!("seed cache write failed, wallet will not survive restart: {err}");
                }
            }
            Err(err) => warn!("seed blob serialization failed: {err}"),
        }
    }

    async fn derivation_pepper(&self) -> Result<DerivationPepper, WalletError> {
        {
            let memo = self.pepper_memo.lock().await;
            if let Some(pepper) = &memo.derivation {
                return Ok(pepper.clone());
            }
        }
        let fetched = self
            .with_retry(|| self.peppers.get_derivation_pepper())
            .await?;
        self.pepper_memo.lock().await.derivation = Some(fetched.clone());
        Ok(fetched)
    }

    async fn memoized_derivation_pepper(&self) -> Option<DerivationPepper> {
        self.pepper_memo.lock().await.derivation.clone()
    }

    async fn current_kek_pepper(&self) -> Result<KekPepper, WalletError> {
        {
            let memo = self.pepper_memo.lock().await;
            if let Some(pepper) = &memo.kek {
                return Ok(pepper.clone());
            }
        }
        let fetched = self
            .with_retry(|| self.peppers.get_kek_pepper(None))
            .await?;
        self.pepper_memo.lock().await.kek = Some(fetched.clone());
        Ok(fetched)
    }

    /// Wraps a pepper fetch in the session's exponential backoff policy.
    /// Lower layers never retry; this is the only retry site.
    async fn with_retry<T, F, Fut>(&self, operation: F) -> Result<T, WalletError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, WalletError>>,
    {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(3);

        operation
            .retry(backoff)
            .when(WalletError::is_retryable)
            .await
    }

    async fn scope_lock(&self, cache_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.scope_locks.lock().await;
        locks
            .entry(cache_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
