//! Arc network adapter.
//!
//! Arc is EVM-compatible at the address and signature level but keys live in
//! their own derivation domain: the distinct `info` prefix means an Arc key
//! is cryptographically unrelated to the EVM key for the same scope.

use crate::{derivation::Seed, error::WalletError};

use super::{
    evm::{derive_secp256k1_address, is_valid_eip55_address, sign_secp256k1_recoverable},
    ChainAdapter, ChainType, DerivedAddress,
};

/// Arc network adapter.
pub struct ArcAdapter;

impl ChainAdapter for ArcAdapter {
    fn chain_type(&self) -> ChainType {
        ChainType::Arc
    }

    fn info_prefix(&self) -> &'static str {
        "confio/chain/arc/v1"
    }

    fn derive_address(&self, seed: &Seed) -> Result<DerivedAddress, WalletError> {
        derive_secp256k1_address(seed)
    }

    fn is_valid_address(&self, address: &str) -> bool {
        is_valid_eip55_address(address)
    }

    fn sign(&self, seed: &Seed, message: &[u8]) -> Result<Vec<u8>, WalletError> {
        sign_secp256k1_recoverable(seed, message)
    }
}
