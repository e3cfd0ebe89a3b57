//! Remote-access adapters over `ssh-copy-id` and `ssh`.
use crate::error::BootstrapError;
use crate::exec::ToolCommand;
use crate::ports::{ConnectionCheck, Connector, Endpoint, KeyDeployer};
use crate::target::Target;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Extra wall-clock time granted on top of ssh's own ConnectTimeout.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// Marker echoed by the remote side; a successful exit without it is not trusted.
pub const PROBE_MARKER: &str = "ssh-bootstrap-ok";

/// Deploys keys with `ssh-copy-id`, letting it prompt for the password.
#[derive(Debug, Clone)]
pub struct SshCopyIdDeployer {
    program: PathBuf,
}

impl SshCopyIdDeployer {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    fn command(&self, target: &Target, public_key: &Path) -> ToolCommand {
        ToolCommand::new(&self.program)
            .arg("-i")
            .arg(public_key)
            .arg("--")
            .arg(target.destination())
    }
}

impl KeyDeployer for SshCopyIdDeployer {
    fn deploy(&self, target: &Target, public_key: &Path) -> Result<(), BootstrapError> {
        let command = self.command(target, public_key);
        let status = command.interactive()?;
        if status.success() {
            return Ok(());
        }
        Err(BootstrapError::ExternalTool {
            command: command.command_line(),
            status: status.to_string(),
            detail: "see ssh-copy-id output above".to_string(),
        })
    }
}

/// Opens batch-mode sessions with `ssh`; never prompts.
#[derive(Debug, Clone)]
pub struct SshConnector {
    program: PathBuf,
    config_file: Option<PathBuf>,
}

impl SshConnector {
    /// `config_file` is passed with `-F` when the alias lives outside `~/.ssh/config`.
    pub fn new(program: PathBuf, config_file: Option<PathBuf>) -> Self {
        Self {
            program,
            config_file,
        }
    }

    fn command(&self, endpoint: Endpoint<'_>, timeout: Duration) -> ToolCommand {
        let mut command = ToolCommand::new(&self.program);
        if let Some(config_file) = &self.config_file {
            command = command.arg("-F").arg(config_file);
        }
        command = command.args([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", timeout.as_secs().max(1)),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ]);
        command = match endpoint {
            Endpoint::Alias(label) => command.arg("--").arg(label.as_str()),
            Endpoint::Direct { target, identity } => command
                .args(["-o", "IdentitiesOnly=yes", "-i"])
                .arg(identity)
                .arg("--")
                .arg(target.destination()),
        };
        command.args(["echo", PROBE_MARKER])
    }
}

impl Connector for SshConnector {
    fn check(
        &self,
        endpoint: Endpoint<'_>,
        timeout: Duration,
    ) -> Result<ConnectionCheck, BootstrapError> {
        let output = self
            .command(endpoint, timeout)
            .output_with_timeout(timeout + KILL_GRACE)?;
        let reachable = output.success() && output.stdout.contains(PROBE_MARKER);
        let detail = if reachable {
            output.stdout.trim().to_string()
        } else if output.timed_out {
            format!("no answer within {}s", (timeout + KILL_GRACE).as_secs())
        } else {
            format!("{} ({})", output.detail(), output.status_string())
        };
        Ok(ConnectionCheck {
            reachable,
            timed_out: output.timed_out,
            detail,
        })
    }
}
