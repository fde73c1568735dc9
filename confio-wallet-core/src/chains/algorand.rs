//! Algorand chain adapter.
//!
//! Interprets the 32-byte seed as an Ed25519 seed and encodes the address
//! per the Algorand standard: RFC 4648 base32 (no padding) over the public
//! key followed by the last four bytes of its SHA-512/256 digest.

use data_encoding::BASE32_NOPAD;
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha512_256};

use crate::{
    derivation::Seed,
    error::WalletError,
};

use super::{ChainAdapter, ChainType, DerivedAddress};

/// Length of the checksum appended to the public key.
const CHECKSUM_LEN: usize = 4;

/// Length of the base32 address string.
const ADDRESS_LEN: usize = 58;

/// Algorand Ed25519 adapter.
pub struct AlgorandAdapter;

impl AlgorandAdapter {
    fn signing_key(seed: &Seed) -> SigningKey {
        SigningKey::from_bytes(seed.as_bytes())
    }

    fn checksum(public_key: &[u8]) -> [u8; CHECKSUM_LEN] {
        let digest = Sha512_256::digest(public_key);
        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&digest[digest.len() - CHECKSUM_LEN..]);
        checksum
    }
}

impl ChainAdapter for AlgorandAdapter {
    fn chain_type(&self) -> ChainType {
        ChainType::Algorand
    }

    fn info_prefix(&self) -> &'static str {
        "confio/chain/algorand/v1"
    }

    fn derive_address(&self, seed: &Seed) -> Result<DerivedAddress, WalletError> {
        let signing_key = Self::signing_key(seed);
        let public_key = signing_key.verifying_key().to_bytes();

        let mut payload = Vec::with_capacity(public_key.len() + CHECKSUM_LEN);
        payload.extend_from_slice(&public_key);
        payload.extend_from_slice(&Self::checksum(&public_key));

        Ok(DerivedAddress {
            public_key: public_key.to_vec(),
            address: BASE32_NOPAD.encode(&payload),
        })
    }

    fn is_valid_address(&self, address: &str) -> bool {
        if address.len() != ADDRESS_LEN {
            return false;
        }
        let Ok(decoded) = BASE32_NOPAD.decode(address.as_bytes()) else {
            return false;
        };
        if decoded.len() != 32 + CHECKSUM_LEN {
            return false;
        }
        let (public_key, checksum) = decoded.split_at(32);
        checksum == Self::checksum(public_key)
    }

    fn sign(&self, seed: &Seed, message: &[u8]) -> Result<Vec<u8>, WalletError> {
        let signing_key = Self::signing_key(seed);
        Ok(signing_key.sign(message).to_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ed25519_dalek::{Verifier, VerifyingKey};

    #[test]
    fn test_address_is_deterministic() {
        let seed = Seed::from_bytes([0x42; 32]);
        let a = AlgorandAdapter.derive_address(&seed).unwrap();
        let b = AlgorandAdapter.derive_address(&seed).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.address.len(), ADDRESS_LEN);
        assert_eq!(a.public_key.len(), 32);
    }

    #[test]
    fn test_derived_address_validates() {
        let seed = Seed::from_bytes([0x07; 32]);
        let derived = AlgorandAdapter.derive_address(&seed).unwrap();
        assert!(AlgorandAdapter.is_valid_address(&derived.address));
    }

    #[test]
    fn test_corrupted_address_rejected() {
        let seed = Seed::from_bytes([0x07; 32]);
        let derived = AlgorandAdapter.derive_address(&seed).unwrap();

        // Flip one character; either the decode or the checksum must fail.
        let mut chars: Vec<char> = derived.address.chars().collect();
        chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
        let corrupted: String = chars.into_iter().collect();
        assert!(!AlgorandAdapter.is_valid_address(&corrupted));

        assert!(!AlgorandAdapter.is_valid_address("short"));
        assert!(!AlgorandAdapter.is_valid_address(&"a".repeat(ADDRESS_LEN)));
    }

    #[test]
    fn test_signature_verifies_with_derived_public_key() {
        let seed = Seed::from_bytes([0x11; 32]);
        let derived = AlgorandAdapter.derive_address(&seed).unwrap();
        let signature = AlgorandAdapter.sign(&seed, b"spend 1 algo").unwrap();
        assert_eq!(signature.len(), 64);

        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(&derived.public_key);
        let verifying_key = VerifyingKey::from_bytes(&public_key).unwrap();
        let signature = ed25519_dalek::Signature::from_slice(&signature).unwrap();
        assert!(verifying_key.verify(b"spend 1 algo", &signature).is_ok());
    }
}
