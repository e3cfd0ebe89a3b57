//! ssh-bootstrap: set up passwordless SSH access to a single host.
//!
//! ```bash
//! # Generate ~/.ssh/homelab, install it on pi@192.168.1.20, add `Host homelab`
//! ssh-bootstrap pi 192.168.1.20 homelab
//!
//! # Re-running is safe: existing keys and config blocks are reused
//! ssh-bootstrap pi 192.168.1.20 homelab
//! ```
use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod bootstrap;
mod cli;
mod config;
mod config_store;
mod error;
mod exec;
mod keys;
mod paths;
mod ports;
mod remote;
mod report;
mod target;

use bootstrap::{Options, Orchestrator, Ports};
use cli::RootArgs;
use config::Settings;
use config_store::FileConfigStore;
use error::{BootstrapError, EXIT_OK, EXIT_RUNTIME, EXIT_USAGE};
use exec::Toolchain;
use keys::FileKeyStore;
use paths::SshPaths;
use remote::{SshConnector, SshCopyIdDeployer};
use report::JsonReport;
use target::Target;

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            let code = err
                .downcast_ref::<BootstrapError>()
                .map(BootstrapError::exit_code)
                .unwrap_or(EXIT_RUNTIME);
            if code == EXIT_USAGE {
                eprintln!("\n{}", RootArgs::command().render_usage());
            }
            ExitCode::from(code)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &RootArgs) -> Result<ExitCode> {
    // Validate everything before touching the filesystem.
    let target = Target::new(&args.user, &args.address, &args.label)?;
    if target.label_was_sanitized() {
        tracing::warn!(raw = %target.raw_label, label = %target.label, "sanitized host label");
        eprintln!(
            "note: label {:?} contains disallowed characters; using `{}`",
            target.raw_label, target.label
        );
    }
    let settings = Settings::resolve(args)?;
    let tools = Toolchain::discover()?;

    let paths = SshPaths::new(settings.ssh_dir.clone());
    let key_store = FileKeyStore::new(tools.keygen);
    let config_store = FileConfigStore::new(paths.config_path());
    let deployer = SshCopyIdDeployer::new(tools.copy_id);
    let connector = SshConnector::new(
        tools.ssh,
        settings.custom_ssh_dir.then(|| paths.config_path()),
    );
    let ports = Ports {
        keys: &key_store,
        config: &config_store,
        deployer: &deployer,
        connector: &connector,
    };
    let options = Options {
        connect_timeout: settings.connect_timeout,
        probe_first: settings.probe_first,
        today: chrono::Local::now().date_naive(),
    };
    tracing::info!(
        destination = %target.destination(),
        label = %target.label,
        ssh_dir = %paths.root().display(),
        "starting bootstrap"
    );

    match Orchestrator::new(ports, paths, options).bootstrap(&target) {
        Ok(report) => {
            if args.json {
                println!("{}", JsonReport::success(&report).to_json()?);
            } else {
                print!("{}", report::render_success(&report));
            }
            Ok(ExitCode::from(EXIT_OK))
        }
        Err(failure) => {
            if args.json {
                println!("{}", JsonReport::failure(&failure).to_json()?);
                eprintln!("Error: {failure}");
            } else {
                eprint!("{}", report::render_failure(&failure));
            }
            Ok(ExitCode::from(failure.error.exit_code()))
        }
    }
}
