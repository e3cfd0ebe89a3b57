//! Host alias registration in the ssh client config.
//!
//! The file is only ever appended to. Existing blocks, including ones written
//! by an earlier run and edited by hand since, are detected and left alone.
use crate::error::BootstrapError;
use crate::ports::ConfigStore;
use crate::target::HostLabel;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

/// Mode for a config file this tool creates; ssh rejects group/other-writable configs.
pub const CONFIG_MODE: u32 = 0o600;

/// One `Host` block: the label plus how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAlias {
    pub label: HostLabel,
    pub address: String,
    pub user: String,
    pub identity_file: PathBuf,
}

impl HostAlias {
    /// Render the block, newline-terminated.
    pub fn render(&self) -> String {
        format!(
            "Host {}\n    HostName {}\n    User {}\n    IdentityFile {}\n    IdentitiesOnly yes\n",
            self.label,
            self.address,
            self.user,
            quote_config_value(&self.identity_file.display().to_string()),
        )
    }
}

fn quote_config_value(value: &str) -> String {
    if value.chars().any(char::is_whitespace) {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

/// Whether `line` is a `Host` directive naming `label` among its patterns.
pub fn declares_host(line: &str, label: &str) -> bool {
    let line = line.trim();
    let (keyword, rest) = match line.split_once(|ch: char| ch.is_whitespace() || ch == '=') {
        Some(parts) => parts,
        None => return false,
    };
    if !keyword.eq_ignore_ascii_case("host") {
        return false;
    }
    rest.trim_start_matches(|ch: char| ch.is_whitespace() || ch == '=')
        .split_whitespace()
        .map(|pattern| pattern.trim_matches('"'))
        .any(|pattern| pattern == label)
}

/// Separator to write before a new block so blocks stay one blank line apart.
pub fn block_separator(existing: &str) -> &'static str {
    if existing.is_empty() || existing.ends_with("\n\n") {
        ""
    } else if existing.ends_with('\n') {
        "\n"
    } else {
        "\n\n"
    }
}

/// Config store backed by a file such as `~/.ssh/config`.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_existing(&self) -> Result<String, BootstrapError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(BootstrapError::io(
                format!("read {}", self.path.display()),
                err,
            )),
        }
    }
}

impl ConfigStore for FileConfigStore {
    fn has_block(&self, label: &HostLabel) -> Result<bool, BootstrapError> {
        let existing = self.read_existing()?;
        Ok(existing
            .lines()
            .any(|line| declares_host(line, label.as_str())))
    }

    fn append_block(&self, alias: &HostAlias) -> Result<(), BootstrapError> {
        let existing = self.read_existing()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                BootstrapError::io(format!("create {}", parent.display()), err)
            })?;
        }

        let mut text = String::from(block_separator(&existing));
        text.push_str(&alias.render());

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(CONFIG_MODE);
        }
        let mut file = options
            .open(&self.path)
            .map_err(|err| BootstrapError::io(format!("open {}", self.path.display()), err))?;
        file.write_all(text.as_bytes())
            .map_err(|err| BootstrapError::io(format!("append to {}", self.path.display()), err))?;
        tracing::info!(
            path = %self.path.display(),
            label = %alias.label,
            "appended host block"
        );
        Ok(())
    }
}
