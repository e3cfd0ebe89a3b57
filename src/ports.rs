//! Capabilities the orchestrator depends on.
//!
//! Production adapters live in `keys`, `config_store` and `remote`; tests
//! substitute in-memory fakes.
use crate::config_store::HostAlias;
use crate::error::BootstrapError;
use crate::paths::KeyPair;
use crate::target::{HostLabel, Target};
use std::path::Path;
use std::time::Duration;

/// Generates and inspects key pairs.
pub trait KeyStore {
    /// Whether the private half exists.
    fn exists(&self, keys: &KeyPair) -> bool;

    fn public_exists(&self, keys: &KeyPair) -> bool;

    /// Create a new passphrase-less Ed25519 pair tagged with `comment`.
    fn generate(&self, keys: &KeyPair, comment: &str) -> Result<(), BootstrapError>;

    /// Rebuild a missing public half from the private key.
    fn derive_public(&self, keys: &KeyPair) -> Result<(), BootstrapError>;

    /// Restrict the key directory and private key to the owner.
    fn harden(&self, keys: &KeyPair) -> Result<Hardening, BootstrapError>;
}

/// What the hardening step actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hardening {
    Applied,
    #[cfg(not(unix))]
    Unsupported,
}

/// The persistent ssh client configuration.
pub trait ConfigStore {
    fn has_block(&self, label: &HostLabel) -> Result<bool, BootstrapError>;

    fn append_block(&self, alias: &HostAlias) -> Result<(), BootstrapError>;
}

/// Copies a public key into the remote authorized-keys store.
pub trait KeyDeployer {
    fn deploy(&self, target: &Target, public_key: &Path) -> Result<(), BootstrapError>;
}

/// Where a test connection goes.
#[derive(Debug, Clone, Copy)]
pub enum Endpoint<'a> {
    /// Through the registered `Host` alias.
    Alias(&'a HostLabel),
    /// Straight to `user@address` with an explicit identity.
    Direct { target: &'a Target, identity: &'a Path },
}

/// Result of a non-interactive connection attempt.
#[derive(Debug, Clone, Default)]
pub struct ConnectionCheck {
    pub reachable: bool,
    pub timed_out: bool,
    pub detail: String,
}

/// Opens non-interactive sessions.
pub trait Connector {
    fn check(
        &self,
        endpoint: Endpoint<'_>,
        timeout: Duration,
    ) -> Result<ConnectionCheck, BootstrapError>;
}
