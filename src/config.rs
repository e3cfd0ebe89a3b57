//! Runtime settings: explicit flag, then environment, then default.
use crate::cli::RootArgs;
use anyhow::{anyhow, Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SSH_DIR_ENV: &str = "SSH_BOOTSTRAP_DIR";
pub const CONNECT_TIMEOUT_ENV: &str = "SSH_BOOTSTRAP_CONNECT_TIMEOUT";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct Settings {
    pub ssh_dir: PathBuf,
    /// Set when `ssh_dir` is not `~/.ssh`, so ssh must be pointed at its config.
    pub custom_ssh_dir: bool,
    pub connect_timeout: Duration,
    pub probe_first: bool,
}

impl Settings {
    pub fn resolve(args: &RootArgs) -> Result<Self> {
        let default_dir = default_ssh_dir();
        let ssh_dir = resolve_ssh_dir(
            args.ssh_dir.as_deref(),
            std::env::var_os(SSH_DIR_ENV),
            default_dir.as_deref(),
        )?;
        // The directory ends up in IdentityFile lines that ssh resolves later,
        // from whatever directory it runs in.
        let ssh_dir = if ssh_dir.is_absolute() {
            ssh_dir
        } else {
            std::env::current_dir()
                .context("resolve current directory")?
                .join(ssh_dir)
        };
        let custom_ssh_dir = default_dir.as_deref() != Some(ssh_dir.as_path());
        let connect_timeout = resolve_connect_timeout(
            args.connect_timeout,
            std::env::var(CONNECT_TIMEOUT_ENV).ok(),
        )?;
        Ok(Self {
            ssh_dir,
            custom_ssh_dir,
            connect_timeout,
            probe_first: args.probe_first,
        })
    }
}

fn default_ssh_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ssh"))
}

fn resolve_ssh_dir(
    explicit: Option<&Path>,
    env_value: Option<OsString>,
    default: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(value) = env_value.filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(value));
    }
    default
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("cannot determine home directory; pass --ssh-dir"))
}

fn resolve_connect_timeout(explicit: Option<u64>, env_value: Option<String>) -> Result<Duration> {
    let secs = match (explicit, env_value) {
        (Some(secs), _) => secs,
        (None, Some(raw)) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("parse {CONNECT_TIMEOUT_ENV}={raw:?} as seconds"))?,
        _ => DEFAULT_CONNECT_TIMEOUT_SECS,
    };
    if secs == 0 {
        return Err(anyhow!("connect timeout must be at least 1 second"));
    }
    Ok(Duration::from_secs(secs))
}
