//! Deterministic 2-of-2 wallet key derivation and encrypted seed caching.
//!
//! A mobile wallet derives the same blockchain signing key on any device
//! from an OAuth login plus two server-issued peppers, with neither the
//! server nor the OAuth provider alone able to reconstruct the key. Derived
//! material is cached locally under a rotating Key-Encryption-Key so routine
//! signing needs no network round-trip.
//!
//! Start at [`session::WalletSession`]; the layers below it
//! ([`salt`], [`derivation`], [`kek`], [`vault`], [`chains`]) are pure and
//! individually testable.
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

use strum::EnumString;

/// The deployment environment a session talks to.
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Staging backend.
    Staging,
    /// Production backend.
    Production,
}

impl Environment {
    /// Base URL of the wallet API serving the pepper endpoints.
    #[must_use]
    pub const fn api_base_url(&self) -> &'static str {
        match self {
            Self::Staging => "https://api.stage.confio.app",
            Self::Production => "https://api.confio.app",
        }
    }
}

mod error;
pub use error::*;

pub mod identity;
pub use identity::{OAuthIdentity, Provider};

pub mod scope;
pub use scope::{AccountScope, DerivationScope};

pub mod salt;
pub use salt::{generate_client_salt, ClientSalt};

pub mod derivation;
pub use derivation::{derive_seed, Seed};

pub mod kek;
pub use kek::{derive_kek, Kek};

pub mod chains;
pub use chains::{ChainAdapter, ChainAdapterRegistry, ChainType, DerivedAddress, DerivedWallet};

pub mod vault;
pub use vault::WrappedSeedBlob;

pub mod pepper;
pub use pepper::{DerivationPepper, KekPepper, PepperClient};

pub mod storage;
pub use storage::{MemorySecureStorage, SecureStorage};

pub mod session;
pub use session::WalletSession;
