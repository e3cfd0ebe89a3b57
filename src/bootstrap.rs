//! The bootstrap orchestrator.
//!
//! Five named steps run in a fixed order. Each one checks for its target
//! state first and reports whether it did work or skipped; the first failure
//! stops the run and leaves earlier effects in place so the whole procedure
//! can simply be re-run.
use crate::config_store::HostAlias;
use crate::error::BootstrapError;
use crate::keys::key_comment;
use crate::paths::{KeyPair, SshPaths};
use crate::ports::{ConfigStore, Connector, Endpoint, Hardening, KeyDeployer, KeyStore};
use crate::target::Target;
use chrono::NaiveDate;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    KeyProvisioning,
    PermissionHardening,
    KeyDeployment,
    AliasRegistration,
    Verification,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::KeyProvisioning,
        Step::PermissionHardening,
        Step::KeyDeployment,
        Step::AliasRegistration,
        Step::Verification,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Step::KeyProvisioning => "key provisioning",
            Step::PermissionHardening => "permission hardening",
            Step::KeyDeployment => "key deployment",
            Step::AliasRegistration => "alias registration",
            Step::Verification => "verification",
        }
    }

    /// Likely causes to print when this step fails.
    pub fn diagnostics(self) -> &'static [&'static str] {
        match self {
            Step::KeyProvisioning => &[
                "ssh-keygen could not write to the key directory (check ownership and free space)",
                "a stale file with the same name is in the way",
            ],
            Step::PermissionHardening => &[
                "the key files are owned by another user",
                "the filesystem does not support Unix permissions",
            ],
            Step::KeyDeployment => &[
                "wrong password for the remote account",
                "the server disables password authentication (PasswordAuthentication no)",
                "the host is down or the address is wrong",
                "a firewall blocks port 22",
            ],
            Step::AliasRegistration => &[
                "the ssh config file is not writable by you",
            ],
            Step::Verification => &[
                "the server is down or unreachable from here",
                "the key was rejected (check ~/.ssh and authorized_keys permissions on the remote)",
                "a firewall blocks port 22",
                "the server does not allow public key authentication (PubkeyAuthentication)",
            ],
        }
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepStatus {
    Performed(String),
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: Step,
    #[serde(flatten)]
    pub status: StepStatus,
}

/// Everything a run did, in order. Also the `--json` output.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    pub target: Target,
    pub keys: KeyPair,
    pub steps: Vec<StepRecord>,
    pub success: bool,
}

impl BootstrapReport {
    fn new(target: &Target, keys: &KeyPair) -> Self {
        Self {
            target: target.clone(),
            keys: keys.clone(),
            steps: Vec::with_capacity(Step::ALL.len()),
            success: false,
        }
    }

    pub fn status_of(&self, step: Step) -> Option<&StepStatus> {
        self.steps
            .iter()
            .find(|record| record.step == step)
            .map(|record| &record.status)
    }

    pub fn performed(&self) -> impl Iterator<Item = Step> + '_ {
        self.steps
            .iter()
            .filter(|record| matches!(record.status, StepStatus::Performed(_)))
            .map(|record| record.step)
    }
}

/// A step failed; `report` holds everything recorded up to and including it.
#[derive(Debug)]
pub struct StepFailure {
    pub step: Step,
    pub error: BootstrapError,
    pub report: BootstrapReport,
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.step.title(), self.error)
    }
}

impl std::error::Error for StepFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Injected capabilities.
pub struct Ports<'a> {
    pub keys: &'a dyn KeyStore,
    pub config: &'a dyn ConfigStore,
    pub deployer: &'a dyn KeyDeployer,
    pub connector: &'a dyn Connector,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub connect_timeout: Duration,
    pub probe_first: bool,
    /// Date stamped into new key comments.
    pub today: NaiveDate,
}

pub struct Orchestrator<'a> {
    ports: Ports<'a>,
    paths: SshPaths,
    options: Options,
}

impl<'a> Orchestrator<'a> {
    pub fn new(ports: Ports<'a>, paths: SshPaths, options: Options) -> Self {
        Self {
            ports,
            paths,
            options,
        }
    }

    /// Run every step in order, stopping at the first failure.
    pub fn bootstrap(&self, target: &Target) -> Result<BootstrapReport, StepFailure> {
        let keys = self.paths.key_pair(&target.label);
        let mut report = BootstrapReport::new(target, &keys);

        for step in Step::ALL {
            let span = tracing::info_span!("step", step = step.title(), label = %target.label);
            let _guard = span.enter();
            match self.run_step(step, target, &keys) {
                Ok(status) => {
                    tracing::info!(?status, "step finished");
                    report.steps.push(StepRecord { step, status });
                }
                Err(error) => {
                    tracing::error!(%error, "step failed");
                    report.steps.push(StepRecord {
                        step,
                        status: StepStatus::Failed(error.to_string()),
                    });
                    return Err(StepFailure {
                        step,
                        error,
                        report,
                    });
                }
            }
        }

        report.success = true;
        Ok(report)
    }

    fn run_step(
        &self,
        step: Step,
        target: &Target,
        keys: &KeyPair,
    ) -> Result<StepStatus, BootstrapError> {
        match step {
            Step::KeyProvisioning => self.provision_key(target, keys),
            Step::PermissionHardening => self.harden(keys),
            Step::KeyDeployment => self.deploy(target, keys),
            Step::AliasRegistration => self.register_alias(target, keys),
            Step::Verification => self.verify(target),
        }
    }

    fn provision_key(
        &self,
        target: &Target,
        keys: &KeyPair,
    ) -> Result<StepStatus, BootstrapError> {
        let store = self.ports.keys;
        if store.exists(keys) {
            if store.public_exists(keys) {
                return Ok(StepStatus::Skipped(format!(
                    "reusing existing key {}",
                    keys.private.display()
                )));
            }
            store.derive_public(keys)?;
            return Ok(StepStatus::Performed(format!(
                "restored missing {} from existing private key",
                keys.public.display()
            )));
        }
        let comment = key_comment(target.label.as_str(), self.options.today);
        store.generate(keys, &comment)?;
        Ok(StepStatus::Performed(format!(
            "generated {} ({comment})",
            keys.private.display()
        )))
    }

    fn harden(&self, keys: &KeyPair) -> Result<StepStatus, BootstrapError> {
        match self.ports.keys.harden(keys)? {
            Hardening::Applied => Ok(StepStatus::Performed(
                "key directory 700, private key 600, public key 644".to_string(),
            )),
            #[cfg(not(unix))]
            Hardening::Unsupported => Ok(StepStatus::Skipped(
                "file modes are not supported on this platform".to_string(),
            )),
        }
    }

    fn deploy(&self, target: &Target, keys: &KeyPair) -> Result<StepStatus, BootstrapError> {
        if self.options.probe_first {
            let endpoint = Endpoint::Direct {
                target,
                identity: &keys.private,
            };
            let probe = self
                .ports
                .connector
                .check(endpoint, self.options.connect_timeout)?;
            if probe.reachable {
                return Ok(StepStatus::Skipped(format!(
                    "{} already accepts this key",
                    target.destination()
                )));
            }
            tracing::info!(detail = %probe.detail, "probe failed; deploying key");
        }
        self.ports.deployer.deploy(target, &keys.public)?;
        Ok(StepStatus::Performed(format!(
            "installed {} on {}",
            keys.public.display(),
            target.destination()
        )))
    }

    fn register_alias(
        &self,
        target: &Target,
        keys: &KeyPair,
    ) -> Result<StepStatus, BootstrapError> {
        let config = self.ports.config;
        if config.has_block(&target.label)? {
            return Ok(StepStatus::Skipped(format!(
                "Host {} already present in {}; left untouched",
                target.label,
                self.paths.config_path().display()
            )));
        }
        let alias = HostAlias {
            label: target.label.clone(),
            address: target.address.clone(),
            user: target.user.clone(),
            identity_file: keys.private.clone(),
        };
        config.append_block(&alias)?;
        Ok(StepStatus::Performed(format!(
            "added Host {} to {}",
            target.label,
            self.paths.config_path().display()
        )))
    }

    fn verify(&self, target: &Target) -> Result<StepStatus, BootstrapError> {
        let check = self
            .ports
            .connector
            .check(Endpoint::Alias(&target.label), self.options.connect_timeout)?;
        if !check.reachable {
            return Err(BootstrapError::Verification {
                alias: target.label.to_string(),
                detail: check.detail,
                timed_out: check.timed_out,
            });
        }
        Ok(StepStatus::Performed(format!(
            "ssh {} connected without a password",
            target.label
        )))
    }
}
