//! Typed paths into the SSH directory.
//!
//! Centralizing path construction keeps the key store, the config store and
//! the connector agreeing on where things live.
use crate::target::HostLabel;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Convenience wrapper for locating files under the SSH directory.
#[derive(Debug, Clone)]
pub struct SshPaths {
    root: PathBuf,
}

impl SshPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Return the SSH directory; also the key directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the `config` path.
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config")
    }

    /// Return the `<label>` / `<label>.pub` pair for a host label.
    pub fn key_pair(&self, label: &HostLabel) -> KeyPair {
        let private = self.root.join(label.as_str());
        let public = self.root.join(format!("{}.pub", label.as_str()));
        KeyPair { private, public }
    }
}

/// Location of one key pair. Derived from the label, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyPair {
    pub private: PathBuf,
    pub public: PathBuf,
}

impl KeyPair {
    /// Directory holding both halves.
    pub fn dir(&self) -> &Path {
        self.private.parent().unwrap_or_else(|| Path::new("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_pair_is_derived_from_label() {
        let paths = SshPaths::new(PathBuf::from("/home/op/.ssh"));
        let label = HostLabel::sanitize("homelab").unwrap();
        let pair = paths.key_pair(&label);
        assert_eq!(pair.private, PathBuf::from("/home/op/.ssh/homelab"));
        assert_eq!(pair.public, PathBuf::from("/home/op/.ssh/homelab.pub"));
        assert_eq!(pair.dir(), Path::new("/home/op/.ssh"));
        assert_eq!(paths.config_path(), PathBuf::from("/home/op/.ssh/config"));
    }
}
