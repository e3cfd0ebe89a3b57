//! CLI argument parsing.
//!
//! Three positional arguments name the target; everything else has a default.
use clap::builder::NonEmptyStringValueParser;
use clap::Parser;
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "ssh-bootstrap",
    version,
    about = "Set up passwordless SSH to one host: key pair, key deployment, config alias, test connection",
    after_help = "Steps (each skipped when already done):\n  1. generate ~/.ssh/<LABEL> (ed25519, no passphrase) unless it exists\n  2. restrict permissions on the key directory and private key\n  3. copy <LABEL>.pub to the remote authorized_keys (prompts for the password)\n  4. append a `Host <LABEL>` block to ~/.ssh/config unless one exists\n  5. test `ssh <LABEL>` without prompting\n\nExamples:\n  ssh-bootstrap pi 192.168.1.20 homelab\n  ssh-bootstrap --probe-first deploy build.example.com ci-runner\n  ssh-bootstrap --ssh-dir /tmp/keys --json root 10.0.0.5 lab\n\nA label that starts with `-` must come after `--`, following any options:\n  ssh-bootstrap --json -- pi 192.168.1.20 -lab"
)]
pub struct RootArgs {
    /// Remote account to log in as
    #[arg(value_name = "USER", value_parser = NonEmptyStringValueParser::new())]
    pub user: String,

    /// IP address or DNS name of the target
    #[arg(value_name = "ADDRESS", value_parser = NonEmptyStringValueParser::new())]
    pub address: String,

    /// Alias for the target; becomes the key file name and the config Host name
    #[arg(value_name = "LABEL", value_parser = NonEmptyStringValueParser::new())]
    pub label: String,

    /// Directory holding keys and the ssh client config [env: SSH_BOOTSTRAP_DIR] [default: ~/.ssh]
    #[arg(long, value_name = "DIR")]
    pub ssh_dir: Option<PathBuf>,

    /// Seconds to wait for the test connection [env: SSH_BOOTSTRAP_CONNECT_TIMEOUT] [default: 5]
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Try the key before deploying it; skip ssh-copy-id if it already works
    #[arg(long)]
    pub probe_first: bool,

    /// Emit a machine-readable JSON report on stdout
    #[arg(long)]
    pub json: bool,

    /// Log each step and external command to stderr
    #[arg(long)]
    pub verbose: bool,
}
