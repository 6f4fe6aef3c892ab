//! Test fixtures shared across modules: a fake device network and a ready-made inventory.

use crate::driver::{ConfigureOutcome, Connect, Device};
use crate::inventory::{Host, Inventory};
use crate::logger::{self, Level, Log, LogEntry, LogGuard, Logger};
use anyhow::bail;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

pub const HOSTS: &str = "
veos01:
  hostname: 10.254.169.50
  groups:
    - arista_eapi
veos02:
  hostname: 10.254.169.51
  groups:
    - arista_eapi
";

pub const GROUPS: &str = "
arista_eapi: { platform: eos, port: 443 }
";

pub const DEFAULTS: &str = "
username: admin
password: password
";

/// Two hosts, veos01 and veos02, in the `arista_eapi` group.
pub fn inventory() -> Inventory {
    Inventory::from_yaml(HOSTS, GROUPS, DEFAULTS).unwrap()
}

/// An inventory of `count` hosts named `r0`, `r1`, and so on.
pub fn numbered_inventory(count: usize) -> Inventory {
    let hosts: String = (0..count).map(|i| format!("r{i}: {{}}\n")).collect();
    Inventory::from_yaml(&hosts, "", DEFAULTS).unwrap()
}

/// A [Logger] that keeps entries in memory. Clones share storage, so tests can look inside after
/// the writer thread has taken ownership.
#[derive(Clone, Default)]
pub struct MemoryLogger {
    pub entries: Arc<Mutex<Vec<LogEntry>>>,
    pub flushed: Arc<Mutex<bool>>,
}

impl Logger for MemoryLogger {
    fn log(&mut self, entry: &LogEntry) -> io::Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        *self.flushed.lock().unwrap() = true;
        Ok(())
    }
}

/// Starts a logger that records everything at debug level and above.
pub fn memory_log() -> (Log, LogGuard<MemoryLogger>, MemoryLogger) {
    let logger = MemoryLogger::default();
    let (log, guard) = logger::init(logger.clone(), Level::Debug);
    (log, guard, logger)
}

/// A record of one [Device] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Cli(Vec<String>),
    Get(Vec<String>),
    Configure { configuration: String, dry_run: bool },
    SendCommand(String),
    Close,
}

/// Everything the fake network knows, shared between a [FakeNetwork] and its clones.
#[derive(Debug, Default)]
pub struct NetworkState {
    /// Hosts that refuse connections.
    pub unreachable: HashSet<String>,

    /// Hosts that accept connections but fail every command.
    pub failing: HashSet<String>,

    /// Device calls, per host, in order.
    pub calls: HashMap<String, Vec<Call>>,

    /// Number of successful connections, per host.
    pub connections: HashMap<String, usize>,

    /// Committed configuration lines, per host.
    pub running_config: HashMap<String, Vec<String>>,

    /// How many hosts are connected right now, and the most there ever were at once.
    pub active: usize,
    pub peak_active: usize,
}

/// A [Connect] implementation that simulates a network of devices in memory.
#[derive(Clone, Debug, Default)]
pub struct FakeNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap()
    }

    pub fn set_unreachable(&self, host: impl Into<String>) {
        self.state().unreachable.insert(host.into());
    }

    pub fn fail_commands(&self, host: impl Into<String>) {
        self.state().failing.insert(host.into());
    }

    pub fn calls(&self, host: &str) -> Vec<Call> {
        self.state().calls.get(host).cloned().unwrap_or_default()
    }

    pub fn running_config(&self, host: &str) -> Vec<String> {
        self.state()
            .running_config
            .get(host)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Connect for FakeNetwork {
    type Device = FakeDevice;

    async fn connect(&self, host: &Host) -> anyhow::Result<FakeDevice> {
        let mut state = self.state();
        if state.unreachable.contains(&host.name) {
            bail!("{}: connection refused", host.hostname());
        }
        *state.connections.entry(host.name.clone()).or_default() += 1;
        state.active += 1;
        state.peak_active = state.peak_active.max(state.active);
        Ok(FakeDevice {
            host: host.name.clone(),
            network: self.clone(),
        })
    }
}

/// A session with one fake device.
#[derive(Debug)]
pub struct FakeDevice {
    host: String,
    network: FakeNetwork,
}

impl FakeDevice {
    // Records a call and fails it if the host is set to fail.
    fn record(&self, call: Call) -> anyhow::Result<()> {
        let mut state = self.network.state();
        state.calls.entry(self.host.clone()).or_default().push(call);
        if state.failing.contains(&self.host) {
            bail!("{}: command failed", self.host);
        }
        Ok(())
    }
}

#[async_trait]
impl Device for FakeDevice {
    async fn cli(&mut self, commands: &[String]) -> anyhow::Result<IndexMap<String, String>> {
        self.record(Call::Cli(commands.to_vec()))?;
        Ok(commands
            .iter()
            .map(|c| (c.clone(), format!("{}# {c}", self.host)))
            .collect())
    }

    async fn get(&mut self, getters: &[String]) -> anyhow::Result<IndexMap<String, Value>> {
        self.record(Call::Get(getters.to_vec()))?;
        let mut output = IndexMap::new();
        for getter in getters {
            match getter.as_str() {
                "facts" => output.insert(
                    getter.clone(),
                    json!({"hostname": self.host, "vendor": "Fake"}),
                ),
                other => bail!("unsupported getter: {other}"),
            };
        }
        Ok(output)
    }

    async fn configure(
        &mut self,
        configuration: &str,
        dry_run: bool,
    ) -> anyhow::Result<ConfigureOutcome> {
        self.record(Call::Configure {
            configuration: configuration.to_string(),
            dry_run,
        })?;

        let mut state = self.network.state();
        let running = state.running_config.entry(self.host.clone()).or_default();
        let new_lines: Vec<String> = configuration
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !running.iter().any(|r| r == line))
            .map(str::to_string)
            .collect();
        let diff = new_lines
            .iter()
            .map(|line| format!("+{line}\n"))
            .collect::<String>();

        if !dry_run {
            running.extend(new_lines);
        }
        Ok(ConfigureOutcome {
            diff,
            committed: !dry_run,
        })
    }

    async fn send_command(&mut self, command: &str) -> anyhow::Result<String> {
        self.record(Call::SendCommand(command.to_string()))?;
        Ok(format!("{}# {command}", self.host))
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        let mut state = self.network.state();
        state.calls.entry(self.host.clone()).or_default().push(Call::Close);
        state.active = state.active.saturating_sub(1);
        Ok(())
    }
}
