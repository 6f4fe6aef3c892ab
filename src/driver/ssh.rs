//! A [Device] backend that runs commands over a multiplexed OpenSSH session.
//!
//! Authentication is left entirely to the local `ssh` installation (keys, agent, `ssh_config`).
//! The inventory password is never used.

use super::{Connect, Device};
use crate::inventory::Host;
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use indexmap::IndexMap;
use openssh::{KnownHosts, Session};
use shlex::Shlex;

/// The port used when the inventory doesn't set one.
pub const DEFAULT_PORT: u16 = 22;

/// Production implementation of [Connect] over OpenSSH.
#[derive(Clone, Debug, Default)]
pub struct SshConnector;

#[async_trait]
impl Connect for SshConnector {
    type Device = SshDevice;

    async fn connect(&self, host: &Host) -> anyhow::Result<SshDevice> {
        let destination = destination(host);
        let session = Session::connect_mux(&destination, KnownHosts::Add)
            .await
            .with_context(|| format!("failed to connect to {destination}"))?;
        Ok(SshDevice {
            session: Some(session),
        })
    }
}

/// Returns the `ssh://` destination for `host`.
pub fn destination(host: &Host) -> String {
    let port = host.port().unwrap_or(DEFAULT_PORT);
    match host.username() {
        Some(user) => format!("ssh://{user}@{}:{port}", host.hostname()),
        None => format!("ssh://{}:{port}", host.hostname()),
    }
}

/// Production implementation of [Device] over OpenSSH.
pub struct SshDevice {
    /// `None` once the session has been closed.
    session: Option<Session>,
}

#[async_trait]
impl Device for SshDevice {
    async fn cli(&mut self, commands: &[String]) -> anyhow::Result<IndexMap<String, String>> {
        let mut output = IndexMap::new();
        for command in commands {
            let result = self.send_command(command).await?;
            output.insert(command.clone(), result);
        }
        Ok(output)
    }

    async fn send_command(&mut self, command: &str) -> anyhow::Result<String> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| anyhow!("the session is closed"))?;

        let mut words = Shlex::new(command);
        let program = words
            .next()
            .ok_or_else(|| anyhow!("cannot send a blank command"))?;
        let args: Vec<_> = words.collect();

        let mut remote = session.command(program);
        remote.args(&args);
        let output = remote.output().await?;

        if !output.status.success() {
            let exit_code_message = match output.status.code() {
                Some(i) => format!("exit code {i}"),
                None => "error".to_string(),
            };
            bail!(
                "command exited with {exit_code_message}: {command}\n{}",
                String::from_utf8_lossy(&output.stderr),
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        if let Some(session) = self.session.take() {
            session.close().await?;
        }
        Ok(())
    }
}
