//! Target identity and host-label sanitization.
//!
//! The label doubles as a filename stem and an ssh_config `Host` name, so it
//! is reduced to a conservative character set before either use.
use crate::error::BootstrapError;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

/// Names under the SSH directory that a key must never shadow.
const RESERVED_LABELS: &[&str] = &["config", "known_hosts", "authorized_keys", "environment", "rc"];

fn disallowed_label_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]").expect("static label pattern compiles"))
}

/// A host label restricted to `[A-Za-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HostLabel(String);

impl HostLabel {
    /// Strip every disallowed character from `raw`; an empty result is an error.
    pub fn sanitize(raw: &str) -> Result<Self, BootstrapError> {
        let cleaned = disallowed_label_chars().replace_all(raw, "");
        if cleaned.is_empty() {
            return Err(BootstrapError::Sanitization {
                raw: raw.to_string(),
            });
        }
        Ok(Self(cleaned.into_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who and where to bootstrap. Supplied per invocation and never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Target {
    pub user: String,
    pub address: String,
    pub label: HostLabel,
    /// The label exactly as typed, kept so sanitization can be reported.
    pub raw_label: String,
}

impl Target {
    pub fn new(user: &str, address: &str, raw_label: &str) -> Result<Self, BootstrapError> {
        let user = require_token("user", user)?;
        let address = require_token("address", address)?;
        if raw_label.trim().is_empty() {
            return Err(BootstrapError::Usage("hostname label must not be blank".into()));
        }
        let label = HostLabel::sanitize(raw_label)?;
        if RESERVED_LABELS.contains(&label.as_str()) {
            return Err(BootstrapError::Usage(format!(
                "hostname label `{label}` collides with a file ssh already uses"
            )));
        }
        Ok(Self {
            user,
            address,
            label,
            raw_label: raw_label.to_string(),
        })
    }

    /// `user@address`, as understood by ssh and ssh-copy-id.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }

    pub fn label_was_sanitized(&self) -> bool {
        self.raw_label != self.label.as_str()
    }
}

// User and address land verbatim in the config block, where whitespace would
// split a directive into extra arguments, and in `user@address`, which ssh
// would read as an option if it began with `-`.
fn require_token(name: &str, value: &str) -> Result<String, BootstrapError> {
    if value.trim().is_empty() {
        return Err(BootstrapError::Usage(format!("{name} must not be blank")));
    }
    if value.starts_with('-') {
        return Err(BootstrapError::Usage(format!("{name} {value:?} must not start with `-`")));
    }
    if value.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err(BootstrapError::Usage(format!(
            "{name} {value:?} must not contain whitespace or control characters"
        )));
    }
    Ok(value.to_string())
}
