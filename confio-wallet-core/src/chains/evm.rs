//! EVM chain adapter.
//!
//! secp256k1 keys, Keccak-256 addresses with EIP-55 checksum casing, and
//! recoverable ECDSA signatures in the 65-byte `r || s || v` layout.

use alloy_primitives::keccak256;
use k256::ecdsa::SigningKey;

use crate::{derivation::Seed, error::WalletError};

use super::{ChainAdapter, ChainType, DerivedAddress};

/// EVM secp256k1 adapter.
pub struct EvmAdapter;

impl ChainAdapter for EvmAdapter {
    fn chain_type(&self) -> ChainType {
        ChainType::Evm
    }

    fn info_prefix(&self) -> &'static str {
        "confio/chain/evm/v1"
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

/// Derives an EVM-style address from a seed interpreted as a secp256k1
/// private scalar.
///
/// Shared with the Arc adapter, which uses the same curve and address
/// format under its own derivation domain.
pub(crate) fn derive_secp256k1_address(seed: &Seed) -> Result<DerivedAddress, WalletError> {
    let signing_key = signing_key(seed)?;
    let public_key = signing_key.verifying_key().to_encoded_point(false);
    let public_key_bytes = public_key.as_bytes();

    // Address = last 20 bytes of Keccak-256 over the uncompressed point
    // without its 0x04 tag byte.
    let digest = keccak256(&public_key_bytes[1..]);
    let address = to_eip55(&digest[12..]);

    Ok(DerivedAddress {
        public_key: public_key_bytes.to_vec(),
        address,
    })
}

/// Signs `keccak256(message)` with a recoverable ECDSA signature.
pub(crate) fn sign_secp256k1_recoverable(
    seed: &Seed,
    message: &[u8],
) -> Result<Vec<u8>, WalletError> {
    let signing_key = signing_key(seed)?;
    let digest = keccak256(message);
    let (signature, recovery_id) = signing_key
        .sign_prehash_recoverable(digest.as_slice())
        .map_err(|err| WalletError::key_derivation(format!("secp256k1 signing failed: {err}")))?;

    let mut out = Vec::with_capacity(65);
    out.extend_from_slice(&signature.to_bytes());
    out.push(27 + recovery_id.to_byte());
    Ok(out)
}

/// Syntax and checksum validation for `0x`-prefixed addresses.
///
/// All-lowercase and all-uppercase hex are accepted; mixed case must carry a
/// correct EIP-55 checksum.
pub(crate) fn is_valid_eip55_address(address: &str) -> bool {
    let Some(hex_part) = address.strip_prefix("0x") else {
        return false;
    };
    if hex_part.len() != 40 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return false;
    }

    let has_lower = hex_part.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = hex_part.bytes().any(|b| b.is_ascii_uppercase());
    if !(has_lower && has_upper) {
        return true;
    }

    let Ok(bytes) = hex::decode(hex_part) else {
        return false;
    };
    to_eip55(&bytes) == address
}

/// EIP-55 checksum casing over 20 address bytes.
fn to_eip55(address_bytes: &[u8]) -> String {
    let lower = hex::encode(address_bytes);
    let digest = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(2 + lower.len());
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            digest[i / 2] >> 4
        } else {
            digest[i / 2] & 0x0f
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn signing_key(seed: &Seed) -> Result<SigningKey, WalletError> {
    // A SHA-256-derived seed is a valid scalar except with negligible
    // probability; an out-of-range seed is unusable, not retryable.
    SigningKey::from_slice(seed.as_bytes())
        .map_err(|_| WalletError::key_derivation("seed is not a valid secp256k1 scalar"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_deterministic_and_checksummed() {
        let seed = Seed::from_bytes([0x42; 32]);
        let a = EvmAdapter.derive_address(&seed).unwrap();
        let b = EvmAdapter.derive_address(&seed).unwrap();
        assert_eq!(a, b);
        assert!(a.address.starts_with("0x"));
        assert_eq!(a.address.len(), 42);
        assert_eq!(a.public_key.len(), 65);
        assert!(EvmAdapter.is_valid_address(&a.address));
    }

    #[test]
    fn test_eip55_known_vectors() {
        // Vectors from the EIP-55 specification.
        for address in [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
        ] {
            assert!(is_valid_eip55_address(address), "{address} should be valid");
        }
    }

    #[test]
    fn test_wrong_mixed_case_rejected() {
        // First character's case flipped from the valid vector.
        assert!(!is_valid_eip55_address(
            "0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        ));
        // Uniform case is accepted without a checksum.
        assert!(is_valid_eip55_address(
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"
        ));
    }

    #[test]
    fn test_malformed_addresses_rejected() {
        assert!(!is_valid_eip55_address("5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        assert!(!is_valid_eip55_address("0x1234"));
        assert!(!is_valid_eip55_address(&format!("0x{}", "g".repeat(40))));
    }

    #[test]
    fn test_signature_layout() {
        let seed = Seed::from_bytes([0x11; 32]);
        let signature = EvmAdapter.sign(&seed, b"transfer").unwrap();
        assert_eq!(signature.len(), 65);
        assert!(signature[64] == 27 || signature[64] == 28);

        // Same message, same key, same signature (RFC 6979 determinism).
        let again = EvmAdapter.sign(&seed, b"transfer").unwrap();
        assert_eq!(signature, again);
    }
}
