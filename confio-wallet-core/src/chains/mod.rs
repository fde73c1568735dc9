//! Per-chain key and address derivation.
//!
//! Each supported chain implements [`ChainAdapter`]: it owns a distinct HKDF
//! `info` prefix (so the same scope root yields cryptographically unrelated
//! keys per chain), turns a 32-byte seed into a chain-native keypair and
//! address, validates chain-native address syntax, and signs with the
//! chain-appropriate scheme.
//!
//! Adapters are registered once at process start in an explicit
//! [`ChainAdapterRegistry`] that is passed by reference. There is no ambient
//! global state, so tests can register mock adapters in isolation.

mod algorand;
mod arc;
mod evm;

pub use algorand::AlgorandAdapter;
pub use arc::ArcAdapter;
pub use evm::EvmAdapter;

use std::collections::BTreeMap;
use std::sync::Arc as SharedArc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
    derivation::{expand_chain_seed, ScopeRootKey, Seed},
    error::WalletError,
    scope::DerivationScope,
};

/// Identifier for a supported chain.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumString,
    Display,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    /// Algorand (Ed25519, base32 checksum addresses).
    Algorand,
    /// EVM-compatible networks (secp256k1, EIP-55 addresses).
    Evm,
    /// The Arc network (EVM address format, separate key domain).
    Arc,
}

/// A chain-native public key and address derived from a seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    /// The chain-native public key encoding.
    pub public_key: Vec<u8>,
    /// The chain-native address string.
    pub address: String,
}

/// A ready-to-sign wallet bound to one chain and one scope.
#[derive(Debug, Clone)]
pub struct DerivedWallet {
    /// The chain this wallet signs for.
    pub chain_type: ChainType,
    /// The chain-native address.
    pub address: String,
    /// The chain-native public key encoding.
    pub public_key: Vec<u8>,
    /// The chain-specific signing seed. Zeroized when the wallet is dropped.
    pub seed: Seed,
}

/// Per-chain logic behind a single seam.
pub trait ChainAdapter: Send + Sync {
    /// The chain this adapter serves.
    fn chain_type(&self) -> ChainType;

    /// The frozen HKDF domain-separation prefix for this chain.
    fn info_prefix(&self) -> &'static str;

    /// Derives the chain-native keypair and address from a 32-byte seed.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::KeyDerivation`] if the seed is not usable as a
    /// private key on this chain's curve.
    fn derive_address(&self, seed: &Seed) -> Result<DerivedAddress, WalletError>;

    /// Validates chain-native address syntax (including checksums).
    fn is_valid_address(&self, address: &str) -> bool;

    /// Signs a message with the key derived from `seed`.
    ///
    /// The private scalar never leaves the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::KeyDerivation`] if the seed is not usable as a
    /// private key on this chain's curve.
    fn sign(&self, seed: &Seed, message: &[u8]) -> Result<Vec<u8>, WalletError>;
}

/// Registry of chain adapters, constructed once and injected.
pub struct ChainAdapterRegistry {
    adapters: BTreeMap<ChainType, SharedArc<dyn ChainAdapter>>,
}

impl ChainAdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            adapters: BTreeMap::new(),
        }
    }

    /// Creates a registry with every built-in adapter registered.
    #[must_use]
    pub fn with_default_adapters() -> Self {
        let mut registry = Self::new();
        registry.register(SharedArc::new(AlgorandAdapter));
        registry.register(SharedArc::new(EvmAdapter));
        registry.register(SharedArc::new(ArcAdapter));
        registry
    }

    /// Registers an adapter. Idempotent by chain type: a second registration
    /// for the same chain is ignored.
    pub fn register(&mut self, adapter: SharedArc<dyn ChainAdapter>) {
        self.adapters.entry(adapter.chain_type()).or_insert(adapter);
    }

    /// Looks up the adapter for a chain.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::UnsupportedChain`] if no adapter is registered.
    pub fn get(&self, chain: ChainType) -> Result<SharedArc<dyn ChainAdapter>, WalletError> {
        self.adapters
            .get(&chain)
            .cloned()
            .ok_or(WalletError::UnsupportedChain { chain })
    }

    /// The chains currently registered, in stable order.
    #[must_use]
    pub fn chain_types(&self) -> Vec<ChainType> {
        self.adapters.keys().copied().collect()
    }

    /// Derives a ready-to-sign wallet for one chain from the scope root.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::UnsupportedChain`] for unregistered chains and
    /// [`WalletError::KeyDerivation`] if the expanded seed is unusable.
    pub fn derive_wallet(
        &self,
        chain: ChainType,
        root: &ScopeRootKey,
        scope: &DerivationScope,
    ) -> Result<DerivedWallet, WalletError> {
        let adapter = self.get(chain)?;
        let seed = expand_chain_seed(root, scope, adapter.info_prefix());
        let derived = adapter.derive_address(&seed)?;
        Ok(DerivedWallet {
            chain_type: chain,
            address: derived.address,
            public_key: derived.public_key,
            seed,
        })
    }

    /// Derives addresses for every registered chain from the scope root.
    ///
    /// A failing adapter never blocks the others; its entry carries the error
    /// so the caller sees the partial result set.
    #[must_use]
    pub fn derive_for_all_chains(
        &self,
        root: &ScopeRootKey,
        scope: &DerivationScope,
    ) -> BTreeMap<ChainType, Result<DerivedAddress, WalletError>> {
        self.adapters
            .iter()
            .map(|(chain, adapter)| {
                let seed = expand_chain_seed(root, scope, adapter.info_prefix());
                (*chain, adapter.derive_address(&seed))
            })
            .collect()
    }
}

impl Default for ChainAdapterRegistry {
    fn default() -> Self {
        Self::with_default_adapters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identity::Provider;

    struct BrokenAdapter;

    impl ChainAdapter for BrokenAdapter {
        fn chain_type(&self) -> ChainType {
            ChainType::Evm
        }

        fn info_prefix(&self) -> &'static str {
            "confio/chain/evm/v1"
        }

        fn derive_address(&self, _seed: &Seed) -> Result<DerivedAddress, WalletError> {
            Err(WalletError::key_derivation("broken adapter"))
        }

        fn is_valid_address(&self, _address: &str) -> bool {
            false
        }

        fn sign(&self, _seed: &Seed, _message: &[u8]) -> Result<Vec<u8>, WalletError> {
            Err(WalletError::key_derivation("broken adapter"))
        }
    }

    #[test]
    fn test_registration_is_idempotent() {
        let mut registry = ChainAdapterRegistry::new();
        registry.register(SharedArc::new(AlgorandAdapter));
        registry.register(SharedArc::new(AlgorandAdapter));
        assert_eq!(registry.chain_types(), vec![ChainType::Algorand]);
    }

    #[test]
    fn test_get_unregistered_chain_fails() {
        let registry = ChainAdapterRegistry::new();
        assert!(matches!(
            registry.get(ChainType::Evm),
            Err(WalletError::UnsupportedChain {
                chain: ChainType::Evm
            })
        ));
    }

    #[test]
    fn test_broken_adapter_never_blocks_other_chains() {
        let mut registry = ChainAdapterRegistry::new();
        registry.register(SharedArc::new(AlgorandAdapter));
        registry.register(SharedArc::new(BrokenAdapter));

        let root = ScopeRootKey::from_bytes([0x42; 32]);
        let scope = DerivationScope::personal(Provider::Google, 0);
        let results = registry.derive_for_all_chains(&root, &scope);

        assert_eq!(results.len(), 2);
        assert!(results[&ChainType::Algorand].is_ok());
        assert!(results[&ChainType::Evm].is_err());
    }

    #[test]
    fn test_chain_type_strings() {
        assert_eq!(ChainType::Algorand.to_string(), "algorand");
        assert_eq!("arc".parse::<ChainType>().unwrap(), ChainType::Arc);
    }
}
