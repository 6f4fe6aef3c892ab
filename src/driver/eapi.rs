//! A [Device] backend that speaks JSON-RPC (`runCmds`) to a device's command API over HTTPS.
//!
//! Every call is a single, stateless HTTP request, so [EapiConnector::connect] never touches the
//! network. An unreachable device shows up as an error from the first command instead.
//!
//! Configuration goes through a named configuration session: the candidate is loaded into the
//! session, the device is asked for the session's diff, and the session is then either aborted
//! (dry run) or committed.

use super::{ConfigureOutcome, Connect, Device};
use crate::config::EapiConfig;
use crate::inventory::Host;
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};

/// The port used when the inventory doesn't set one.
pub const DEFAULT_PORT: u16 = 443;

/// The getter [EapiDevice::get] understands.
pub const FACTS: &str = "facts";

/// The output format requested from the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Text,
}

/// Production implementation of [Connect] for the command API.
#[derive(Clone, Debug)]
pub struct EapiConnector {
    client: reqwest::Client,
}

impl EapiConnector {
    pub fn new(config: &EapiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(config.timeout())
            .build()
            .context("failed to build the eAPI HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Connect for EapiConnector {
    type Device = EapiDevice;

    async fn connect(&self, host: &Host) -> anyhow::Result<EapiDevice> {
        let username = host
            .username()
            .ok_or_else(|| anyhow!("no username set for {}", host.name))?;
        Ok(EapiDevice {
            client: self.client.clone(),
            url: endpoint(host),
            username: username.to_string(),
            password: host.password().map(str::to_string),
            next_id: 1,
        })
    }
}

/// Returns the command API URL for `host`.
pub fn endpoint(host: &Host) -> String {
    format!(
        "https://{}:{}/command-api",
        host.hostname(),
        host.port().unwrap_or(DEFAULT_PORT),
    )
}

/// Production implementation of [Device] for the command API.
pub struct EapiDevice {
    client: reqwest::Client,
    url: String,
    username: String,
    password: Option<String>,

    /// The JSON-RPC id of the next request.
    next_id: u64,
}

impl EapiDevice {
    /// Sends one `runCmds` request and returns one result per command.
    async fn run_cmds(&mut self, commands: &[String], format: Format) -> anyhow::Result<Vec<Value>> {
        let id = self.next_id;
        self.next_id += 1;

        let response: Value = self
            .client
            .post(&self.url)
            .basic_auth(&self.username, self.password.as_ref())
            .json(&request_body(id, commands, format))
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.url))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("{} returned a response that was not JSON", self.url))?;

        let results = parse_response(response)?;
        if results.len() != commands.len() {
            bail!(
                "sent {} commands but received {} results",
                commands.len(),
                results.len(),
            );
        }
        Ok(results)
    }

    async fn facts(&mut self) -> anyhow::Result<Value> {
        let commands = ["show version".to_string(), "show hostname".to_string()];
        let results = self.run_cmds(&commands, Format::Json).await?;
        match results.as_slice() {
            [version, hostname] => Ok(facts(version, hostname)),
            _ => bail!("unexpected response to {commands:?}"),
        }
    }
}

#[async_trait]
impl Device for EapiDevice {
    async fn cli(&mut self, commands: &[String]) -> anyhow::Result<IndexMap<String, String>> {
        let results = self.run_cmds(commands, Format::Text).await?;
        Ok(commands
            .iter()
            .zip(results)
            .map(|(command, result)| (command.clone(), text_output(&result)))
            .collect())
    }

    async fn get(&mut self, getters: &[String]) -> anyhow::Result<IndexMap<String, Value>> {
        let mut output = IndexMap::new();
        for getter in getters {
            let value = match getter.as_str() {
                FACTS => self.facts().await?,
                other => bail!("unsupported getter: {other}"),
            };
            output.insert(getter.clone(), value);
        }
        Ok(output)
    }

    async fn configure(
        &mut self,
        configuration: &str,
        dry_run: bool,
    ) -> anyhow::Result<ConfigureOutcome> {
        let session = session_name();
        let commands = SessionCommands::new(&session, configuration, dry_run);

        let diff = match self.load_and_diff(&commands).await {
            Ok(diff) => diff,
            Err(err) => {
                // Don't leave a half-loaded session behind.
                let aborted = self.run_cmds(&commands.abort, Format::Text).await;
                return Err(after_abort(err, &session, aborted));
            }
        };

        let finish = if dry_run { "abort" } else { "commit" };
        self.run_cmds(&commands.finish, Format::Text)
            .await
            .with_context(|| format!("failed to {finish} configuration session {session}"))?;

        Ok(ConfigureOutcome {
            diff,
            committed: !dry_run,
        })
    }

    async fn send_command(&mut self, command: &str) -> anyhow::Result<String> {
        let results = self
            .run_cmds(&[command.to_string()], Format::Text)
            .await?;
        Ok(results.first().map(text_output).unwrap_or_default())
    }
}

impl EapiDevice {
    async fn load_and_diff(&mut self, commands: &SessionCommands) -> anyhow::Result<String> {
        self.run_cmds(&commands.load, Format::Text)
            .await
            .context("failed to load the candidate configuration")?;
        let diff = self
            .run_cmds(&commands.diff, Format::Text)
            .await
            .context("failed to read the configuration diff")?;
        // The first result belongs to `enable`.
        Ok(diff.last().map(text_output).unwrap_or_default())
    }
}

/// The requests that drive one configuration session. Each starts with `enable`, since every
/// `runCmds` request begins in unprivileged exec mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionCommands {
    /// Enters the session and loads the candidate.
    pub load: Vec<String>,

    /// Asks for the session's diff against the running configuration.
    pub diff: Vec<String>,

    /// Commits the session, or aborts it on a dry run.
    pub finish: Vec<String>,

    /// Discards the session after a failed load.
    pub abort: Vec<String>,
}

impl SessionCommands {
    pub fn new(session: &str, configuration: &str, dry_run: bool) -> Self {
        let enable = "enable".to_string();
        let enter = format!("configure session {session}");

        let mut load = vec![enable.clone(), enter.clone()];
        load.extend(config_lines(configuration));
        load.push("end".to_string());

        let abort = vec![enable.clone(), enter.clone(), "abort".to_string()];
        let finish = if dry_run {
            abort.clone()
        } else {
            vec![enable.clone(), enter, "commit".to_string()]
        };

        Self {
            load,
            diff: vec![enable, format!("show session-config named {session} diffs")],
            finish,
            abort,
        }
    }
}

/// Adds a failed session abort to the error that made it necessary.
fn after_abort<T>(err: anyhow::Error, session: &str, aborted: anyhow::Result<T>) -> anyhow::Error {
    match aborted {
        Ok(_) => err,
        Err(abort_err) => {
            err.context(format!("and aborting session {session} also failed: {abort_err:#}"))
        }
    }
}

/// Builds a `runCmds` JSON-RPC request.
pub fn request_body(id: u64, commands: &[String], format: Format) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "runCmds",
        "params": {
            "version": 1,
            "cmds": commands,
            "format": format,
        },
        "id": id.to_string(),
    })
}

/// Extracts the per-command results from a JSON-RPC response, or turns its error object into an
/// error.
pub fn parse_response(mut response: Value) -> anyhow::Result<Vec<Value>> {
    if let Some(error) = response.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");

        // The last entry in `data` belongs to the command that failed.
        let details = error
            .get("data")
            .and_then(Value::as_array)
            .and_then(|data| data.last())
            .and_then(|last| last.get("errors"))
            .and_then(Value::as_array)
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .filter(|details| !details.is_empty());

        match details {
            Some(details) => bail!("device returned error {code}: {message} ({details})"),
            None => bail!("device returned error {code}: {message}"),
        }
    }

    match response.get_mut("result").map(Value::take) {
        Some(Value::Array(results)) => Ok(results),
        _ => bail!("response has neither a result nor an error"),
    }
}

/// The raw text of a text-format result.
fn text_output(result: &Value) -> String {
    result
        .get("output")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Builds the facts payload from `show version` and `show hostname` JSON output.
pub fn facts(version: &Value, hostname: &Value) -> Value {
    json!({
        "hostname": hostname.get("hostname"),
        "fqdn": hostname.get("fqdn"),
        "vendor": "Arista",
        "model": version.get("modelName"),
        "serial_number": version.get("serialNumber"),
        "os_version": version.get("version"),
        "uptime": version.get("uptime"),
    })
}

/// The lines of a configuration template worth sending: trimmed, without blanks or `!` comments.
pub fn config_lines(configuration: &str) -> impl Iterator<Item = String> + '_ {
    configuration
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('!'))
        .map(str::to_string)
}

/// A session name unique enough for one run against one device.
fn session_name() -> String {
    format!("netpilot_{}", chrono::Utc::now().format("%Y%m%d%H%M%S%3f"))
}
