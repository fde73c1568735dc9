//! End-to-end tests for wallet acquisition: cache and fresh paths, KEK
//! rotation, offline operation, coalescing, and cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use confio_wallet_core::{
    pepper::StaticPepperClient, ChainAdapterRegistry, ChainType, DerivationPepper,
    DerivationScope, KekPepper, MemorySecureStorage, OAuthIdentity, PepperClient, Provider,
    SecureStorage, WalletError, WalletSession, WrappedSeedBlob,
};

const DERIVATION_PEPPER: &str = "stable-derivation-pepper";

fn identity() -> OAuthIdentity {
    OAuthIdentity::new(
        "https://accounts.google.com",
        "1234567890",
        "web-client-id",
        Provider::Google,
    )
}

fn personal_scope() -> DerivationScope {
    DerivationScope::personal(Provider::Google, 0)
}

fn far_future() -> u64 {
    u64::MAX / 2
}

fn session_with(
    storage: &Arc<MemorySecureStorage>,
    peppers: Arc<dyn PepperClient>,
) -> WalletSession {
    WalletSession::new(
        Arc::new(ChainAdapterRegistry::with_default_adapters()),
        Arc::clone(storage) as Arc<dyn SecureStorage>,
        peppers,
    )
}

#[tokio::test]
async fn fresh_derivation_persists_a_blob_and_offline_cache_agrees() {
    let storage = Arc::new(MemorySecureStorage::new());
    let peppers = Arc::new(StaticPepperClient::new(
        DERIVATION_PEPPER,
        KekPepper::new("kek-v1", 1),
    ));

    // First device: full derivation over the network.
    let online = session_with(&storage, Arc::clone(&peppers) as Arc<dyn PepperClient>);
    let first = online
        .get_or_create_wallet(&identity(), &personal_scope(), ChainType::Algorand, None)
        .await
        .unwrap();
    assert_eq!(storage.len(), 1);

    // Second session: the derivation pepper is unreachable, simulating an
    // offline device. Only the KEK pepper (memoizable) is available, so a
    // cache hit must carry the whole request.
    let offline_peppers = StaticPepperClient::new(DERIVATION_PEPPER, KekPepper::new("kek-v1", 1));
    offline_peppers.revoke_derivation_pepper();
    let offline = session_with(&storage, Arc::new(offline_peppers));

    let second = offline
        .get_or_create_wallet(&identity(), &personal_scope(), ChainType::Algorand, None)
        .await
        .unwrap();

    assert_eq!(first.address, second.address);
    assert_eq!(first.public_key, second.public_key);
}

#[tokio::test]
async fn cache_and_fresh_paths_agree_for_every_chain() {
    let storage = Arc::new(MemorySecureStorage::new());
    let peppers = Arc::new(StaticPepperClient::new(
        DERIVATION_PEPPER,
        KekPepper::new("kek-v1", 1),
    ));

    let fresh = session_with(&storage, Arc::clone(&peppers) as Arc<dyn PepperClient>);
    let cached = session_with(&storage, peppers);

    for chain in [ChainType::Algorand, ChainType::Evm, ChainType::Arc] {
        let a = fresh
            .get_or_create_wallet(&identity(), &personal_scope(), chain, None)
            .await
            .unwrap();
        let b = cached
            .get_or_create_wallet(&identity(), &personal_scope(), chain, None)
            .await
            .unwrap();
        assert_eq!(a.address, b.address, "{chain} addresses disagree");
    }
}

#[tokio::test]
async fn scope_separation_yields_pairwise_distinct_addresses() {
    let storage = Arc::new(MemorySecureStorage::new());
    let peppers = Arc::new(StaticPepperClient::new(
        DERIVATION_PEPPER,
        KekPepper::new("kek-v1", 1),
    ));
    let session = session_with(&storage, peppers);

    let scopes = [
        DerivationScope::personal(Provider::Google, 0),
        DerivationScope::personal(Provider::Google, 1),
        DerivationScope::business(Provider::Google, 0, "abc").unwrap(),
        DerivationScope::business(Provider::Google, 0, "xyz").unwrap(),
    ];

    let mut addresses = Vec::new();
    for scope in &scopes {
        let wallet = session
            .get_or_create_wallet(&identity(), scope, ChainType::Algorand, None)
            .await
            .unwrap();
        addresses.push(wallet.address);
    }

    for i in 0..addresses.len() {
        for j in (i + 1)..addresses.len() {
            assert_ne!(addresses[i], addresses[j], "scopes {i} and {j} collide");
        }
    }
}

#[tokio::test]
async fn chain_separation_yields_unrelated_addresses() {
    let storage = Arc::new(MemorySecureStorage::new());
    let peppers = Arc::new(StaticPepperClient::new(
        DERIVATION_PEPPER,
        KekPepper::new("kek-v1", 1),
    ));
    let session = session_with(&storage, peppers);

    let algorand = session
        .get_or_create_wallet(&identity(), &personal_scope(), ChainType::Algorand, None)
        .await
        .unwrap();
    let evm = session
        .get_or_create_wallet(&identity(), &personal_scope(), ChainType::Evm, None)
        .await
        .unwrap();

    assert_ne!(algorand.address, evm.address);
    assert!(evm.address.starts_with("0x"));
    assert!(!algorand.address.starts_with("0x"));
}

#[tokio::test]
async fn rotation_within_grace_unwraps_and_rewraps_to_current_version() {
    let storage = Arc::new(MemorySecureStorage::new());
    let peppers = Arc::new(StaticPepperClient::new(
        DERIVATION_PEPPER,
        KekPepper::new("kek-v1", 1),
    ));

    let first = session_with(&storage, Arc::clone(&peppers) as Arc<dyn PepperClient>)
        .get_or_create_wallet(&identity(), &personal_scope(), ChainType::Algorand, None)
        .await
        .unwrap();

    // Server rotates the KEK pepper with an open grace window. The old
    // version stays servable on request.
    peppers.rotate_kek(KekPepper::new("kek-v2", 2).with_grace_period(far_future()));

    let session = session_with(&storage, peppers);
    let wallet = session
        .get_or_create_wallet(&identity(), &personal_scope(), ChainType::Algorand, None)
        .await
        .unwrap();
    assert_eq!(wallet.address, first.address);

    // The stored blob transitioned to the current pepper version.
    let bytes = storage
        .retrieve(&personal_scope().cache_key())
        .await
        .unwrap()
        .unwrap();
    let blob = WrappedSeedBlob::from_bytes(&bytes).unwrap();
    assert_eq!(blob.kek_pepper_version, 2);
}

#[tokio::test]
async fn rotation_past_grace_falls_back_to_full_rederivation() {
    let storage = Arc::new(MemorySecureStorage::new());
    let peppers = Arc::new(StaticPepperClient::new(
        DERIVATION_PEPPER,
        KekPepper::new("kek-v1", 1),
    ));

    let first = session_with(&storage, Arc::clone(&peppers) as Arc<dyn PepperClient>)
        .get_or_create_wallet(&identity(), &personal_scope(), ChainType::Algorand, None)
        .await
        .unwrap();

    // Grace deadline already elapsed.
    peppers.rotate_kek(KekPepper::new("kek-v2", 2).with_grace_period(1));

    let session = session_with(&storage, peppers);
    let wallet = session
        .get_or_create_wallet(&identity(), &personal_scope(), ChainType::Algorand, None)
        .await
        .unwrap();

    // The derivation pepper never rotates, so the re-derived wallet is the
    // same wallet.
    assert_eq!(wallet.address, first.address);

    let bytes = storage
        .retrieve(&personal_scope().cache_key())
        .await
        .unwrap()
        .unwrap();
    let blob = WrappedSeedBlob::from_bytes(&bytes).unwrap();
    assert_eq!(blob.kek_pepper_version, 2);
}

#[tokio::test]
async fn expired_grace_while_offline_surfaces_pepper_fetch_failure() {
    let storage = Arc::new(MemorySecureStorage::new());
    let peppers = Arc::new(StaticPepperClient::new(
        DERIVATION_PEPPER,
        KekPepper::new("kek-v1", 1),
    ));

    session_with(&storage, Arc::clone(&peppers) as Arc<dyn PepperClient>)
        .get_or_create_wallet(&identity(), &personal_scope(), ChainType::Algorand, None)
        .await
        .unwrap();

    peppers.rotate_kek(KekPepper::new("kek-v2", 2).with_grace_period(1));
    peppers.revoke_derivation_pepper();

    // The cache is unusable and re-derivation cannot reach the server; the
    // caller sees the retryable fetch failure, never a cache error.
    let err = session_with(&storage, peppers)
        .get_or_create_wallet(&identity(), &personal_scope(), ChainType::Algorand, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::PepperFetchFailed { .. }));
}

#[tokio::test]
async fn tampered_cache_is_absorbed_by_rederivation() {
    let storage = Arc::new(MemorySecureStorage::new());
    let peppers = Arc::new(StaticPepperClient::new(
        DERIVATION_PEPPER,
        KekPepper::new("kek-v1", 1),
    ));

    let session = session_with(&storage, Arc::clone(&peppers) as Arc<dyn PepperClient>);
    let first = session
        .get_or_create_wallet(&identity(), &personal_scope(), ChainType::Algorand, None)
        .await
        .unwrap();

    // Corrupt the stored ciphertext.
    let cache_key = personal_scope().cache_key();
    let bytes = storage.retrieve(&cache_key).await.unwrap().unwrap();
    let mut blob = WrappedSeedBlob::from_bytes(&bytes).unwrap();
    let mut ciphertext = blob.ciphertext_bytes().unwrap();
    ciphertext[0] ^= 0x01;
    blob.ciphertext = {
        use base64::{engine::general_purpose::STANDARD, Engine};
        STANDARD.encode(&ciphertext)
    };
    storage
        .store(&cache_key, &blob.to_bytes().unwrap())
        .await
        .unwrap();

    let recovered = session_with(&storage, peppers)
        .get_or_create_wallet(&identity(), &personal_scope(), ChainType::Algorand, None)
        .await
        .unwrap();
    assert_eq!(recovered.address, first.address);
}

/// Counts fetches so coalescing is observable.
struct CountingPepperClient {
    inner: StaticPepperClient,
    derivation_fetches: AtomicUsize,
    kek_fetches: AtomicUsize,
}

impl CountingPepperClient {
    fn new(inner: StaticPepperClient) -> Self {
        Self {
            inner,
            derivation_fetches: AtomicUsize::new(0),
            kek_fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PepperClient for CountingPepperClient {
    async fn get_derivation_pepper(&self) -> Result<DerivationPepper, WalletError> {
        self.derivation_fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.get_derivation_pepper().await
    }

    async fn get_kek_pepper(
        &self,
        requested_version: Option<u32>,
    ) -> Result<KekPepper, WalletError> {
        self.kek_fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.get_kek_pepper(requested_version).await
    }
}

#[tokio::test]
async fn concurrent_requests_for_one_scope_share_a_single_derivation() {
    let storage = Arc::new(MemorySecureStorage::new());
    let peppers = Arc::new(CountingPepperClient::new(StaticPepperClient::new(
        DERIVATION_PEPPER,
        KekPepper::new("kek-v1", 1),
    )));
    let session = Arc::new(session_with(
        &storage,
        Arc::clone(&peppers) as Arc<dyn PepperClient>,
    ));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let session = Arc::clone(&session);
        handles.push(tokio::spawn(async move {
            session
                .get_or_create_wallet(&identity(), &personal_scope(), ChainType::Algorand, None)
                .await
                .unwrap()
                .address
        }));
    }

    let mut addresses = Vec::new();
    for handle in handles {
        addresses.push(handle.await.unwrap());
    }
    addresses.dedup();
    assert_eq!(addresses.len(), 1);

    // One fetch of each pepper, shared by all callers; one stored blob.
    assert_eq!(peppers.derivation_fetches.load(Ordering::SeqCst), 1);
    assert_eq!(peppers.kek_fetches.load(Ordering::SeqCst), 1);
    assert_eq!(storage.len(), 1);
}

/// Holds pepper fetches until the test releases them, so a session teardown
/// can be interleaved mid-derivation.
struct GatedPepperClient {
    inner: StaticPepperClient,
    gate: tokio::sync::Semaphore,
}

#[async_trait]
impl PepperClient for GatedPepperClient {
    async fn get_derivation_pepper(&self) -> Result<DerivationPepper, WalletError> {
        let _permit = self.gate.acquire().await.expect("gate closed");
        self.inner.get_derivation_pepper().await
    }

    async fn get_kek_pepper(
        &self,
        requested_version: Option<u32>,
    ) -> Result<KekPepper, WalletError> {
        self.inner.get_kek_pepper(requested_version).await
    }
}

#[tokio::test]
async fn teardown_mid_derivation_discards_the_cache_write() {
    let storage = Arc::new(MemorySecureStorage::new());
    let peppers = Arc::new(GatedPepperClient {
        inner: StaticPepperClient::new(DERIVATION_PEPPER, KekPepper::new("kek-v1", 1)),
        gate: tokio::sync::Semaphore::new(0),
    });
    let session = Arc::new(session_with(
        &storage,
        Arc::clone(&peppers) as Arc<dyn PepperClient>,
    ));

    let task = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            session
                .get_or_create_wallet(&identity(), &personal_scope(), ChainType::Algorand, None)
                .await
        })
    };

    // Let the task reach the blocked pepper fetch, then tear the session
    // down before releasing it.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    session.end_session().await;
    peppers.gate.add_permits(2);

    // The in-flight derivation completes and returns a wallet, but nothing
    // may have been persisted for the dead session.
    let wallet = task.await.unwrap().unwrap();
    assert!(!wallet.address.is_empty());
    assert!(storage.is_empty());
}

/// A platform store that always denies access.
struct UnavailableStorage;

#[async_trait]
impl SecureStorage for UnavailableStorage {
    async fn store(&self, _key: &str, _bytes: &[u8]) -> Result<(), WalletError> {
        Err(WalletError::storage("keychain access denied"))
    }

    async fn retrieve(&self, _key: &str) -> Result<Option<Vec<u8>>, WalletError> {
        Err(WalletError::storage("keychain access denied"))
    }

    async fn delete(&self, _key: &str) -> Result<(), WalletError> {
        Err(WalletError::storage("keychain access denied"))
    }
}

#[tokio::test]
async fn unavailable_storage_degrades_to_no_cache_operation() {
    let peppers = Arc::new(StaticPepperClient::new(
        DERIVATION_PEPPER,
        KekPepper::new("kek-v1", 1),
    ));
    let session = WalletSession::new(
        Arc::new(ChainAdapterRegistry::with_default_adapters()),
        Arc::new(UnavailableStorage),
        peppers,
    );

    // Reads and writes both fail, but the wallet still works this session.
    let wallet = session
        .get_or_create_wallet(&identity(), &personal_scope(), ChainType::Algorand, None)
        .await
        .unwrap();
    let signature = session.sign(&wallet, b"payment").unwrap();
    assert_eq!(signature.len(), 64);
}
