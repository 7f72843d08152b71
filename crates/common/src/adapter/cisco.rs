//! Cisco switch adapter
//!
//! Issues an ordered list of terminal commands over a remote shell. The first
//! command that exits non-zero or prints an IOS error marker aborts the whole
//! call; later commands are never sent.

use super::ssh::{CommandOutput, ShellSession, ShellTransport};
use super::DeviceAdapter;
use crate::credentials::Credential;
use crate::descriptor::DeviceDescriptor;
use crate::error::{ConfigError, ConfigErrorKind};
use crate::types::DeviceKind;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// IOS prints these at the start of a line when it refuses a command
const IOS_ERROR_MARKERS: &[&str] = &[
    "% Invalid input",
    "% Incomplete command",
    "% Ambiguous command",
    "% Unknown command",
    "% Unrecognized command",
    "% Error",
    "% Bad",
];

/// Cisco switch adapter driving a [`ShellTransport`]
pub struct CiscoSwitchAdapter {
    transport: Arc<dyn ShellTransport>,
    commands: Vec<String>,
}

impl CiscoSwitchAdapter {
    pub fn new(transport: Arc<dyn ShellTransport>, commands: Vec<String>) -> Self {
        Self {
            transport,
            commands,
        }
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    async fn run_commands(&self, session: &mut dyn ShellSession, target: &str) -> Result<(), ConfigError> {
        for (idx, command) in self.commands.iter().enumerate() {
            let output = session.run(command).await?;
            debug!(
                "{} [{}/{}] '{}' -> exit {}",
                target,
                idx + 1,
                self.commands.len(),
                command,
                output.exit_status
            );

            if let Some(reason) = rejection_reason(&output) {
                warn!("{} rejected '{}': {}", target, command, reason);
                return Err(ConfigError::rejected(target, command.as_str(), reason));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceAdapter for CiscoSwitchAdapter {
    fn kind(&self) -> DeviceKind {
        DeviceKind::CiscoSwitch
    }

    async fn configure(
        &self,
        descriptor: &DeviceDescriptor,
        credential: &Credential,
    ) -> Result<(), ConfigError> {
        let target = descriptor.target.as_str();
        let (username, password) = credential
            .password(&descriptor.credential)
            .map_err(|e| ConfigError::new(target, ConfigErrorKind::Credential(e)))?;

        let mut session = self.transport.open(target, username, password).await?;
        let result = self.run_commands(session.as_mut(), target).await;
        session.close().await;

        if result.is_ok() {
            info!("Applied {} commands to Cisco switch {}", self.commands.len(), target);
        }
        result
    }
}

/// Why a command's output counts as a failure, if it does
pub fn rejection_reason(output: &CommandOutput) -> Option<String> {
    let marker_line = output
        .stdout
        .lines()
        .chain(output.stderr.lines())
        .map(str::trim)
        .find(|line| IOS_ERROR_MARKERS.iter().any(|m| line.starts_with(m)));

    match (output.exit_status, marker_line) {
        (_, Some(line)) => Some(line.to_string()),
        (0, None) => None,
        (status, None) => {
            let detail = output
                .stderr
                .lines()
                .chain(output.stdout.lines())
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("no output");
            Some(format!("exit status {status}: {detail}"))
        }
    }
}
