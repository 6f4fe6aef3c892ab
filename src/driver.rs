//! The interface netpilot uses to talk to network devices.
//!
//! A [Connect] value opens a [Device] session for a host. Tasks never open connections
//! themselves; [Task::device] does it on first use and keeps the session for the rest of the
//! host's run.
//!
//! Two backends ship with netpilot, each behind a cargo feature:
//!
//! * [eapi]: JSON-RPC over HTTPS. Supports everything in [Device].
//! * [ssh]: raw commands over OpenSSH. Supports [Device::send_command] and [Device::cli] only.
//!
//! Backends are chosen statically by each binary. There is no runtime registry.
//!
//! [Task::device]: crate::task::Task::device

use crate::inventory::Host;
use anyhow::bail;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

#[cfg(feature = "eapi")]
pub mod eapi;

#[cfg(feature = "openssh")]
pub mod ssh;

/// What [Device::configure] did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConfigureOutcome {
    /// The device's own diff between its running configuration and the candidate. Empty when the
    /// candidate changes nothing.
    pub diff: String,

    /// Whether the candidate was committed. Always `false` for a dry run.
    pub committed: bool,
}

/// An open session with one device.
#[async_trait]
pub trait Device: Send {
    /// Runs read-only commands and returns their raw output, keyed by command.
    async fn cli(&mut self, commands: &[String]) -> anyhow::Result<IndexMap<String, String>>;

    /// Runs structured getters, e.g. `facts`, and returns their output, keyed by getter.
    async fn get(&mut self, getters: &[String]) -> anyhow::Result<IndexMap<String, Value>> {
        let _ = getters;
        bail!("this driver does not support getters");
    }

    /// Loads `configuration` as a candidate and returns the device's diff.
    ///
    /// When `dry_run` is `true`, the candidate is discarded and the device is left untouched.
    /// Otherwise, it is committed.
    async fn configure(
        &mut self,
        configuration: &str,
        dry_run: bool,
    ) -> anyhow::Result<ConfigureOutcome> {
        let _ = (configuration, dry_run);
        bail!("this driver does not support configuration");
    }

    /// Runs a single command and returns its raw output.
    async fn send_command(&mut self, command: &str) -> anyhow::Result<String>;

    /// Closes the session. Called once, when the host's run is over.
    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Opens [Device] sessions. Cloned once per host.
#[async_trait]
pub trait Connect: Clone + Send + Sync + 'static {
    type Device: Device + 'static;

    /// Connect to `host` and, on success, return a session with it.
    async fn connect(&self, host: &Host) -> anyhow::Result<Self::Device>;
}
