//! Key pair provisioning and permission hardening.
//!
//! Key material always comes from `ssh-keygen`; this module only decides
//! when to ask for it and fixes up modes afterwards.
use crate::error::BootstrapError;
use crate::exec::ToolCommand;
use crate::paths::KeyPair;
use crate::ports::{Hardening, KeyStore};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

pub const KEY_TYPE: &str = "ed25519";
pub const DIR_MODE: u32 = 0o700;
pub const PRIVATE_KEY_MODE: u32 = 0o600;
pub const PUBLIC_KEY_MODE: u32 = 0o644;

/// Comment embedded in a new key: `<label>-<YYYY-MM-DD>`.
pub fn key_comment(label: &str, date: NaiveDate) -> String {
    format!("{label}-{}", date.format("%Y-%m-%d"))
}

/// Key store backed by the filesystem and `ssh-keygen`.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    keygen: PathBuf,
}

impl FileKeyStore {
    pub fn new(keygen: PathBuf) -> Self {
        Self { keygen }
    }
}

impl KeyStore for FileKeyStore {
    fn exists(&self, keys: &KeyPair) -> bool {
        keys.private.symlink_metadata().is_ok()
    }

    fn public_exists(&self, keys: &KeyPair) -> bool {
        keys.public.symlink_metadata().is_ok()
    }

    fn generate(&self, keys: &KeyPair, comment: &str) -> Result<(), BootstrapError> {
        ensure_key_dir(keys.dir())?;
        let command = ToolCommand::new(&self.keygen)
            .args(["-q", "-t", KEY_TYPE, "-N", "", "-C", comment, "-f"])
            .arg(&keys.private);
        let output = command.output()?;
        command.require_success(output)?;
        Ok(())
    }

    fn derive_public(&self, keys: &KeyPair) -> Result<(), BootstrapError> {
        let command = ToolCommand::new(&self.keygen).args(["-y", "-f"]).arg(&keys.private);
        let output = command.output()?;
        let output = command.require_success(output)?;
        fs::write(&keys.public, output.stdout.as_bytes())
            .map_err(|err| BootstrapError::io(format!("write {}", keys.public.display()), err))
    }

    fn harden(&self, keys: &KeyPair) -> Result<Hardening, BootstrapError> {
        harden_modes(keys)
    }
}

fn ensure_key_dir(dir: &Path) -> Result<(), BootstrapError> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir)
        .map_err(|err| BootstrapError::io(format!("create key directory {}", dir.display()), err))?;
    tracing::info!(dir = %dir.display(), "created key directory");
    Ok(())
}

#[cfg(unix)]
fn harden_modes(keys: &KeyPair) -> Result<Hardening, BootstrapError> {
    set_mode(keys.dir(), DIR_MODE)?;
    set_mode(&keys.private, PRIVATE_KEY_MODE)?;
    if keys.public.exists() {
        set_mode(&keys.public, PUBLIC_KEY_MODE)?;
    }
    Ok(Hardening::Applied)
}

#[cfg(not(unix))]
fn harden_modes(_keys: &KeyPair) -> Result<Hardening, BootstrapError> {
    Ok(Hardening::Unsupported)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), BootstrapError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| {
        BootstrapError::Permission {
            path: path.to_path_buf(),
            mode,
            source,
        }
    })?;
    tracing::debug!(path = %path.display(), mode = %format!("{mode:o}"), "set mode");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_in(dir: &Path, label: &str) -> KeyPair {
        KeyPair {
            private: dir.join(label),
            public: dir.join(format!("{label}.pub")),
        }
    }

    #[test]
    fn comment_embeds_label_and_date() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(key_comment("homelab", date), "homelab-2026-10-18");
    }

    #[test]
    fn exists_tracks_private_and_public_halves_separately() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileKeyStore::new(PathBuf::from("ssh-keygen"));
        let keys = pair_in(temp.path(), "homelab");
        assert!(!store.exists(&keys));

        fs::write(&keys.private, "private").unwrap();
        assert!(store.exists(&keys));
        assert!(!store.public_exists(&keys));

        fs::write(&keys.public, "public").unwrap();
        assert!(store.public_exists(&keys));
    }

    #[cfg(unix)]
    #[test]
    fn harden_strips_group_and_other_from_private_key() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("ssh");
        fs::create_dir(&dir).unwrap();
        let keys = pair_in(&dir, "homelab");
        fs::write(&keys.private, "private").unwrap();
        fs::write(&keys.public, "public").unwrap();
        for path in [&dir, &keys.private, &keys.public] {
            fs::set_permissions(path, fs::Permissions::from_mode(0o777)).unwrap();
        }

        let store = FileKeyStore::new(PathBuf::from("ssh-keygen"));
        assert_eq!(store.harden(&keys).unwrap(), Hardening::Applied);

        let mode = |path: &Path| fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&dir), 0o700);
        assert_eq!(mode(&keys.private), 0o600);
        assert_eq!(mode(&keys.private) & 0o077, 0);
        assert_eq!(mode(&keys.public), 0o644);
        assert_eq!(mode(&keys.public) & 0o044, 0o044);
    }

    #[cfg(unix)]
    #[test]
    fn harden_fails_with_permission_error_for_missing_key() {
        let temp = tempfile::tempdir().unwrap();
        let keys = pair_in(temp.path(), "absent");
        let store = FileKeyStore::new(PathBuf::from("ssh-keygen"));
        let err = store.harden(&keys).unwrap_err();
        assert!(matches!(err, BootstrapError::Permission { mode: 0o600, .. }));
    }

    #[cfg(unix)]
    fn mode_of(path: &Path) -> u32 {
        use std::os::unix::fs::PermissionsExt;

        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    /// Stand-in for ssh-keygen that leaves world-readable files behind.
    #[cfg(unix)]
    fn loose_keygen(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("ssh-keygen");
        fs::write(
            &script,
            "#!/bin/sh\nwhile [ $# -gt 1 ]; do shift; done\n\
             echo private > \"$1\"; echo 'ssh-ed25519 AAAA' > \"$1.pub\"\n\
             chmod 666 \"$1\" \"$1.pub\"\n",
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[test]
    fn generated_keys_are_hardened() {
        let temp = tempfile::tempdir().unwrap();
        let keys = pair_in(&temp.path().join("nested"), "homelab");
        let store = FileKeyStore::new(loose_keygen(temp.path()));
        store.generate(&keys, "homelab-2026-10-18").unwrap();
        assert!(store.exists(&keys));
        assert_eq!(mode_of(&keys.private), 0o666);

        assert_eq!(store.harden(&keys).unwrap(), Hardening::Applied);
        assert_eq!(mode_of(keys.dir()), DIR_MODE);
        assert_eq!(mode_of(&keys.private), PRIVATE_KEY_MODE);
        assert_eq!(mode_of(&keys.public), PUBLIC_KEY_MODE);
    }

    #[cfg(unix)]
    #[test]
    fn generate_with_real_keygen_if_available() {
        let Ok(keygen) = which::which("ssh-keygen") else {
            eprintln!("ssh-keygen not on PATH; generated_keys_are_hardened covers hardening");
            return;
        };
        let temp = tempfile::tempdir().unwrap();
        let keys = pair_in(&temp.path().join("nested"), "homelab");
        let store = FileKeyStore::new(keygen);
        store.generate(&keys, "homelab-2026-10-18").unwrap();
        assert!(store.exists(&keys));
        let public = fs::read_to_string(&keys.public).unwrap();
        assert!(public.starts_with("ssh-ed25519 "), "{public}");
        assert!(public.trim_end().ends_with("homelab-2026-10-18"));

        store.harden(&keys).unwrap();
        assert_eq!(mode_of(keys.dir()), DIR_MODE);
        assert_eq!(mode_of(&keys.private), PRIVATE_KEY_MODE);
        assert_eq!(mode_of(&keys.public), PUBLIC_KEY_MODE);

        fs::remove_file(&keys.public).unwrap();
        store.derive_public(&keys).unwrap();
        assert!(fs::read_to_string(&keys.public)
            .unwrap()
            .starts_with("ssh-ed25519 "));
    }
}
