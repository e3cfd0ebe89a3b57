//! Shared test infrastructure for integration tests.
//!
//! Each fixture owns a temp directory with a fake `ssh-keygen`, `ssh-copy-id`
//! and `ssh` on PATH, plus an SSH directory the binary is pointed at.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const FAKE_KEYGEN: &str = r#"#!/bin/sh
out=""
comment=""
derive=""
while [ $# -gt 0 ]; do
  case "$1" in
    -f) out="$2"; shift ;;
    -C) comment="$2"; shift ;;
    -y) derive=1 ;;
  esac
  shift
done
if [ -n "$derive" ]; then
  echo "ssh-ed25519 AAAAFAKEDERIVED"
  exit 0
fi
if [ -n "$FAKE_KEYGEN_FAIL" ]; then
  echo "Saving key \"$out\" failed: Permission denied" >&2
  exit 1
fi
echo "FAKE PRIVATE KEY for $comment" > "$out"
echo "ssh-ed25519 AAAAFAKE $comment" > "$out.pub"
echo "$out $comment" >> "$FAKE_LOG_DIR/keygen.log"
"#;

const FAKE_COPY_ID: &str = r#"#!/bin/sh
echo "$*" >> "$FAKE_LOG_DIR/copy-id.log"
exit "${FAKE_COPY_ID_EXIT:-0}"
"#;

const FAKE_SSH: &str = r#"#!/bin/sh
echo "$*" >> "$FAKE_LOG_DIR/ssh.log"
case "${FAKE_SSH_MODE:-ok}" in
  ok)
    echo "ssh-bootstrap-ok"
    exit 0
    ;;
  hang)
    exec sleep 30
    ;;
  linger)
    sleep 20
    exit 0
    ;;
  *)
    echo "ssh: connect to host 192.168.1.20 port 22: Connection refused" >&2
    exit 255
    ;;
esac
"#;

/// Temp workspace with fake tools and an isolated SSH directory.
pub struct Fixture {
    _temp: TempDir,
    root: PathBuf,
    bin_dir: PathBuf,
    envs: Vec<(String, String)>,
}

impl Fixture {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self::with_tools(&["ssh-keygen", "ssh-copy-id", "ssh"])
    }

    /// Install only the named fake tools.
    pub fn with_tools(tools: &[&str]) -> Self {
        let temp = tempfile::tempdir().expect("create temp dir");
        let root = temp.path().to_path_buf();
        let bin_dir = root.join("bin");
        fs::create_dir_all(&bin_dir).expect("create bin dir");
        fs::create_dir_all(root.join("logs")).expect("create log dir");
        for tool in tools {
            let script = match *tool {
                "ssh-keygen" => FAKE_KEYGEN,
                "ssh-copy-id" => FAKE_COPY_ID,
                "ssh" => FAKE_SSH,
                other => panic!("no fake for {other}"),
            };
            write_executable(&bin_dir.join(tool), script);
        }
        Self {
            _temp: temp,
            root,
            bin_dir,
            envs: Vec::new(),
        }
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.envs.push((key.to_string(), value.to_string()));
        self
    }

    /// Working directory the binary runs in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ssh_dir(&self) -> PathBuf {
        self.root.join("ssh")
    }

    pub fn config_text(&self) -> String {
        fs::read_to_string(self.ssh_dir().join("config")).unwrap_or_default()
    }

    /// Lines a fake tool appended to its log.
    pub fn log_lines(&self, tool: &str) -> Vec<String> {
        fs::read_to_string(self.root.join("logs").join(format!("{tool}.log")))
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Run the binary against this fixture's SSH directory.
    pub fn run(&self, args: &[&str]) -> Output {
        let mut full_args = vec![
            "--ssh-dir".to_string(),
            self.ssh_dir().display().to_string(),
        ];
        full_args.extend(args.iter().map(|arg| arg.to_string()));
        self.run_raw(&full_args)
    }

    /// Run the binary with exactly these arguments.
    pub fn run_raw<S: AsRef<std::ffi::OsStr>>(&self, args: &[S]) -> Output {
        let path = match std::env::var_os("PATH") {
            Some(system) => {
                let mut dirs = vec![self.bin_dir.clone()];
                dirs.extend(std::env::split_paths(&system));
                std::env::join_paths(dirs).expect("join PATH")
            }
            None => self.bin_dir.clone().into_os_string(),
        };
        let mut command = Command::new(env!("CARGO_BIN_EXE_ssh-bootstrap"));
        command
            .args(args)
            .current_dir(&self.root)
            .env("PATH", path)
            .env("HOME", &self.root)
            .env("FAKE_LOG_DIR", self.root.join("logs"))
            .env_remove("SSH_BOOTSTRAP_DIR")
            .env_remove("SSH_BOOTSTRAP_CONNECT_TIMEOUT")
            .env_remove("RUST_LOG");
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        command.output().expect("run ssh-bootstrap")
    }

    /// Run with a PATH that holds only the fake tools.
    pub fn run_isolated(&self, args: &[&str]) -> Output {
        let mut full_args = vec![
            "--ssh-dir".to_string(),
            self.ssh_dir().display().to_string(),
        ];
        full_args.extend(args.iter().map(|arg| arg.to_string()));
        Command::new(env!("CARGO_BIN_EXE_ssh-bootstrap"))
            .args(full_args)
            .env("PATH", &self.bin_dir)
            .env("HOME", &self.root)
            .env("FAKE_LOG_DIR", self.root.join("logs"))
            .env_remove("SSH_BOOTSTRAP_DIR")
            .output()
            .expect("run ssh-bootstrap")
    }
}

pub fn mode(path: &Path) -> u32 {
    fs::metadata(path)
        .unwrap_or_else(|err| panic!("stat {}: {err}", path.display()))
        .permissions()
        .mode()
        & 0o777
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn write_executable(path: &Path, script: &str) {
    fs::write(path, script).expect("write fake tool");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod fake tool");
}
