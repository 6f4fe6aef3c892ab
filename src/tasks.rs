//! Sub-tasks that talk to the host's device.
//!
//! Each function records exactly one sub-task on the [Task] it is given and returns a copy of its
//! result. Device errors, including failure to connect, become a failed result rather than an
//! error.

use crate::driver::{Connect, Device};
use crate::task::{HostTask, Outcome, Task, TaskResult};
use async_trait::async_trait;

pub const DEVICE_CLI: &str = "device_cli";
pub const DEVICE_GET: &str = "device_get";
pub const DEVICE_CONFIGURE: &str = "device_configure";
pub const SEND_COMMAND: &str = "send_command";

/// Runs CLI `commands` on the device. The payload maps each command to its output.
pub async fn device_cli<C: Connect>(task: &mut Task<C>, commands: &[&str]) -> TaskResult {
    task.begin(DEVICE_CLI);
    let outcome = cli(task, commands).await;
    task.end(outcome)
}

async fn cli<C: Connect>(task: &mut Task<C>, commands: &[&str]) -> anyhow::Result<Outcome> {
    let commands: Vec<String> = commands.iter().map(|c| c.to_string()).collect();
    let output = task.device().await?.cli(&commands).await?;
    Ok(Outcome::new(serde_json::to_value(output)?))
}

/// Runs the named `getters` on the device. The payload maps each getter to what it returned.
pub async fn device_get<C: Connect>(task: &mut Task<C>, getters: &[&str]) -> TaskResult {
    task.begin(DEVICE_GET);
    let outcome = get(task, getters).await;
    task.end(outcome)
}

async fn get<C: Connect>(task: &mut Task<C>, getters: &[&str]) -> anyhow::Result<Outcome> {
    let getters: Vec<String> = getters.iter().map(|g| g.to_string()).collect();
    let output = task.device().await?.get(&getters).await?;
    Ok(Outcome::new(serde_json::to_value(output)?))
}

/// Loads `configuration` as a candidate, then commits it, or discards it if `dry_run` is set.
///
/// The result is changed when the device reports a non-empty diff, whether or not it was
/// committed.
pub async fn device_configure<C: Connect>(
    task: &mut Task<C>,
    configuration: &str,
    dry_run: bool,
) -> TaskResult {
    task.begin(DEVICE_CONFIGURE);
    let outcome = configure(task, configuration, dry_run).await;
    task.end(outcome)
}

async fn configure<C: Connect>(
    task: &mut Task<C>,
    configuration: &str,
    dry_run: bool,
) -> anyhow::Result<Outcome> {
    let outcome = task
        .device()
        .await?
        .configure(configuration, dry_run)
        .await?;

    if outcome.committed {
        task.log().info("configuration committed");
    } else if !outcome.diff.is_empty() {
        task.log().info("configuration has changes; discarded (dry run)");
    }

    let changed = !outcome.diff.is_empty();
    let diff = outcome.diff.clone();
    Ok(Outcome::new(serde_json::to_value(outcome)?)
        .changed(changed)
        .diff(diff))
}

/// Sends one raw command to the device. The payload is its output.
pub async fn send_command<C: Connect>(task: &mut Task<C>, command: &str) -> TaskResult {
    task.begin(SEND_COMMAND);
    let outcome = send(task, command).await;
    task.end(outcome)
}

async fn send<C: Connect>(task: &mut Task<C>, command: &str) -> anyhow::Result<Outcome> {
    let output = task.device().await?.send_command(command).await?;
    Ok(Outcome::new(output))
}

/// A top-level task that runs [send_command] once and passes its output up.
#[derive(Clone, Debug)]
pub struct SendCommand {
    pub command: String,
}

impl SendCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl<C: Connect> HostTask<C> for SendCommand {
    async fn run(&self, task: &mut Task<C>) -> anyhow::Result<Outcome> {
        let result = send_command(task, &self.command).await;
        Ok(Outcome::new(result.result))
    }
}
