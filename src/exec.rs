//! Command-execution adapter shared by every external tool.
//!
//! Tools are resolved on PATH once, up front, so a missing binary is reported
//! before anything on disk is touched.
use crate::error::BootstrapError;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to keep collecting output after the child is gone. Descendants
/// that escaped the kill may hold the pipes open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Absolute paths of the external tools the bootstrap delegates to.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub keygen: PathBuf,
    pub copy_id: PathBuf,
    pub ssh: PathBuf,
}

impl Toolchain {
    /// Locate `ssh-keygen`, `ssh-copy-id` and `ssh` on PATH.
    pub fn discover() -> Result<Self, BootstrapError> {
        Ok(Self {
            keygen: locate("ssh-keygen")?,
            copy_id: locate("ssh-copy-id")?,
            ssh: locate("ssh")?,
        })
    }
}

fn locate(tool: &'static str) -> Result<PathBuf, BootstrapError> {
    let path = which::which(tool).map_err(|source| BootstrapError::MissingTool { tool, source })?;
    tracing::debug!(tool, path = %path.display(), "resolved tool");
    Ok(path)
}

/// Captured result of a finished (or killed) child process.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.is_some_and(|status| status.success())
    }

    pub fn status_string(&self) -> String {
        match (&self.status, self.timed_out) {
            (_, true) => "timeout".to_string(),
            (Some(status), false) => status.to_string(),
            (None, false) => "unknown status".to_string(),
        }
    }

    /// Best single-line explanation of a failure: stderr, else stdout.
    pub fn detail(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        "no output".to_string()
    }
}

/// One invocation of an external tool.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: &Path) -> Self {
        Self {
            program: program.to_path_buf(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Shell-quoted rendering for logs and error messages.
    pub fn command_line(&self) -> String {
        let program = self
            .program
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.display().to_string());
        let mut words = vec![program];
        words.extend(self.args.iter().map(|arg| arg.to_string_lossy().to_string()));
        shell_words::join(words)
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }

    /// Run to completion with captured output and no stdin.
    pub fn output(&self) -> Result<ToolOutput, BootstrapError> {
        let start = Instant::now();
        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .map_err(|err| BootstrapError::io(format!("spawn `{}`", self.command_line()), err))?;
        tracing::info!(
            command = %self.command_line(),
            status = %output.status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tool finished"
        );
        Ok(ToolOutput {
            status: Some(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            timed_out: false,
        })
    }

    /// Run with captured output, killing the child and everything it spawned
    /// once `limit` elapses. Returns within `limit` plus a short drain period.
    pub fn output_with_timeout(&self, limit: Duration) -> Result<ToolOutput, BootstrapError> {
        let start = Instant::now();
        let mut command = self.command();
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group, so a timeout also reaches proxies and wrappers.
            command.process_group(0);
        }
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| BootstrapError::io(format!("spawn `{}`", self.command_line()), err))?;

        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());
        let (status, timed_out) = wait_bounded(&mut child, limit)
            .map_err(|err| BootstrapError::io(format!("wait for `{}`", self.command_line()), err))?;

        let drain_deadline = Instant::now() + DRAIN_GRACE;
        let output = ToolOutput {
            status,
            stdout: collect_reader(stdout, drain_deadline),
            stderr: collect_reader(stderr, drain_deadline),
            timed_out,
        };
        tracing::info!(
            command = %self.command_line(),
            status = %output.status_string(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tool finished"
        );
        Ok(output)
    }

    /// Run attached to the terminal so the tool can prompt the operator.
    pub fn interactive(&self) -> Result<ExitStatus, BootstrapError> {
        let start = Instant::now();
        let status = self
            .command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|err| BootstrapError::io(format!("spawn `{}`", self.command_line()), err))?;
        tracing::info!(
            command = %self.command_line(),
            status = %status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tool finished"
        );
        Ok(status)
    }

    /// Turn a non-zero exit into an `ExternalTool` error.
    pub fn require_success(&self, output: ToolOutput) -> Result<ToolOutput, BootstrapError> {
        if output.success() {
            return Ok(output);
        }
        Err(BootstrapError::ExternalTool {
            command: self.command_line(),
            status: output.status_string(),
            detail: output.detail(),
        })
    }
}

type Reader = Option<mpsc::Receiver<String>>;

// Reader threads are detached; a thread still blocked on a pipe some
// descendant holds open finishes on its own once that descendant exits.
fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Reader {
    pipe.map(|mut pipe| {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let mut bytes = Vec::new();
            let _ = pipe.read_to_end(&mut bytes);
            let _ = sender.send(String::from_utf8_lossy(&bytes).to_string());
        });
        receiver
    })
}

fn collect_reader(reader: Reader, deadline: Instant) -> String {
    let Some(receiver) = reader else {
        return String::new();
    };
    let remaining = deadline.saturating_duration_since(Instant::now());
    match receiver.recv_timeout(remaining) {
        Ok(text) => text,
        Err(_) => {
            tracing::warn!("output pipe still open after the child exited; dropping output");
            String::new()
        }
    }
}

fn wait_bounded(child: &mut Child, limit: Duration) -> std::io::Result<(Option<ExitStatus>, bool)> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((Some(status), false));
        }
        if Instant::now() >= deadline {
            tracing::warn!(limit_ms = limit.as_millis() as u64, "killing child after timeout");
            kill_tree(child);
            let status = child.wait()?;
            return Ok((Some(status), true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

// The child may exit between try_wait and kill, so failures are ignored.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    if let Ok(pid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: kill(2) takes no pointers; a negative pid targets the process
        // group the child leads, created by `process_group(0)` at spawn.
        unsafe {
            libc::kill(-pid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}
