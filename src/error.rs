//! Error taxonomy for the bootstrap procedure.
//!
//! Every failure the orchestrator can surface maps to exactly one variant, and
//! every variant maps to a process exit code so callers can tell bad input
//! apart from a target that is simply not reachable yet.
use std::path::PathBuf;

/// Exit status for a successful run.
pub const EXIT_OK: u8 = 0;
/// Exit status for runtime failures (tools, permissions, I/O).
pub const EXIT_RUNTIME: u8 = 1;
/// Exit status for bad arguments; matches clap's usage-error status.
pub const EXIT_USAGE: u8 = 2;
/// Exit status when every local step succeeded but the test connection did not.
pub const EXIT_VERIFICATION: u8 = 3;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("host label {raw:?} has no characters left after sanitization (allowed: A-Z a-z 0-9 _ -)")]
    Sanitization { raw: String },

    #[error("required tool `{tool}` not found on PATH")]
    MissingTool {
        tool: &'static str,
        #[source]
        source: which::Error,
    },

    #[error("`{command}` failed with {status}: {detail}")]
    ExternalTool {
        command: String,
        status: String,
        detail: String,
    },

    #[error("test connection to `{alias}` failed: {detail}")]
    Verification {
        alias: String,
        detail: String,
        timed_out: bool,
    },

    #[error("cannot set mode {mode:o} on {}", path.display())]
    Permission {
        path: PathBuf,
        mode: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl BootstrapError {
    /// Wrap an I/O error with a short description of what was being attempted.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) | Self::Sanitization { .. } => EXIT_USAGE,
            Self::Verification { .. } => EXIT_VERIFICATION,
            Self::MissingTool { .. }
            | Self::ExternalTool { .. }
            | Self::Permission { .. }
            | Self::Io { .. } => EXIT_RUNTIME,
        }
    }
}
