//! The task model: a [Task] is the context a unit of work runs in for one host, and every unit of
//! work produces exactly one [TaskResult].
//!
//! # Composition
//!
//! A top-level task (anything implementing [HostTask]) runs sub-tasks by bracketing each one with
//! [Task::begin] and [Task::end]:
//!
//! ```ignore
//! task.begin("example_task");
//! let outcome = example_task(task, "arg_1", "arg_2");
//! task.end(outcome);
//! ```
//!
//! Sub-tasks may themselves run sub-tasks the same way. [Task::end] attaches the finished result to
//! whatever task is running around it, so the results form a tree that mirrors the calls.
//!
//! # Failure
//!
//! A [TaskResult] is failed when its own body returned an error or when any of its sub-tasks
//! failed. Failures never stop the sequence: the next sub-task runs regardless, and it is up to
//! the caller to inspect earlier results if it cares.

use crate::driver::{Connect, Device};
use crate::inventory::Host;
use crate::logger::{Level, Log};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// What a task body returns on success. [Task::end] turns it into a [TaskResult].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outcome {
    /// Free-form payload.
    pub result: Value,

    /// Whether the task changed anything on the device.
    pub changed: bool,

    /// A description of the change, if any.
    pub diff: String,

    pub severity: Level,
}

impl Outcome {
    pub fn new(result: impl Into<Value>) -> Self {
        Self {
            result: result.into(),
            ..Default::default()
        }
    }

    pub fn changed(mut self, changed: bool) -> Self {
        self.changed = changed;
        self
    }

    pub fn diff(mut self, diff: impl Into<String>) -> Self {
        self.diff = diff.into();
        self
    }
}

/// The record of one task invocation on one host.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskResult {
    /// The host the task ran on. Sub-tasks always share their parent's host.
    pub host: String,
    pub name: String,

    /// Free-form payload. [Value::Null] when the task body failed.
    pub result: Value,
    pub changed: bool,
    pub diff: String,
    pub failed: bool,

    /// Why the task failed, if it did.
    pub exception: Option<String>,
    pub severity: Level,

    /// Sub-tasks, in the order they ran.
    pub subtasks: Vec<TaskResult>,
}

impl TaskResult {
    /// The names of the values a [TaskResult] carries.
    pub const FIELDS: &'static [&'static str] = &[
        "host",
        "name",
        "result",
        "changed",
        "diff",
        "failed",
        "exception",
        "severity",
        "subtasks",
    ];

    /// Builds a result from a task body's outcome and the sub-tasks it ran.
    pub fn new(
        host: impl Into<String>,
        name: impl Into<String>,
        outcome: anyhow::Result<Outcome>,
        subtasks: Vec<TaskResult>,
    ) -> Self {
        let mut result = match outcome {
            Ok(outcome) => TaskResult {
                host: host.into(),
                name: name.into(),
                result: outcome.result,
                changed: outcome.changed,
                diff: outcome.diff,
                failed: false,
                exception: None,
                severity: outcome.severity,
                subtasks,
            },
            Err(err) => TaskResult {
                host: host.into(),
                name: name.into(),
                result: Value::Null,
                changed: false,
                diff: String::new(),
                failed: true,
                exception: Some(format!("{err:#}")),
                severity: Level::Error,
                subtasks,
            },
        };

        let failed_subtasks: Vec<_> = result
            .subtasks
            .iter()
            .filter(|r| r.failed)
            .map(|r| format!("'{}'", r.name))
            .collect();
        if !result.failed && !failed_subtasks.is_empty() {
            result.failed = true;
            result.severity = Level::Error;
            result.exception = Some(format!("subtask failed: {}", failed_subtasks.join(", ")));
        }
        result
    }

    /// Returns `true` if this task or any task below it changed something.
    pub fn any_changed(&self) -> bool {
        self.changed || self.subtasks.iter().any(TaskResult::any_changed)
    }

    /// Depth-first search for a task by name, starting with `self`.
    pub fn find(&self, name: &str) -> Option<&TaskResult> {
        if self.name == name {
            return Some(self);
        }
        self.subtasks.iter().find_map(|r| r.find(name))
    }

    /// The names of the immediate sub-tasks, in order.
    pub fn subtask_names(&self) -> Vec<&str> {
        self.subtasks.iter().map(|r| r.name.as_str()).collect()
    }
}

/// The results of one run: each host's top-level [TaskResult], in inventory order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AggregatedResult {
    /// The name of the top-level task.
    pub name: String,
    results: IndexMap<String, TaskResult>,
}

impl AggregatedResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            results: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, result: TaskResult) {
        self.results.insert(result.host.clone(), result);
    }

    pub fn get(&self, host: &str) -> Option<&TaskResult> {
        self.results.get(host)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TaskResult)> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Returns `true` if any host's task failed.
    pub fn failed(&self) -> bool {
        self.results.values().any(|r| r.failed)
    }

    /// The hosts whose task failed, in inventory order.
    pub fn failed_hosts(&self) -> Vec<&str> {
        self.results
            .values()
            .filter(|r| r.failed)
            .map(|r| r.host.as_str())
            .collect()
    }
}

/// A top-level task that the runner invokes once per host.
#[async_trait]
pub trait HostTask<C: Connect>: Send + Sync + 'static {
    /// Runs on one host. Sub-tasks recorded through `task` become the sub-tasks of the returned
    /// result.
    async fn run(&self, task: &mut Task<C>) -> anyhow::Result<Outcome>;
}

/// A task in progress, with the sub-tasks it has run so far.
#[derive(Debug)]
struct Frame {
    name: String,
    subtasks: Vec<TaskResult>,
}

/// The context a task runs in on one host.
///
/// Holds the host, a logging handle tagged with the host's name, and the host's device session,
/// which is opened on first use and closed by the runner when the host is done.
pub struct Task<C: Connect> {
    host: Arc<Host>,
    connector: C,
    device: Option<C::Device>,
    log: Log,

    /// The top-level task followed by any sub-tasks currently running, innermost last. Never
    /// empty.
    frames: Vec<Frame>,
}

impl<C: Connect> Task<C> {
    /// The operations a task body can use.
    pub const OPERATIONS: &'static [&'static str] =
        &["host", "name", "log", "device", "begin", "end"];

    pub fn new(name: impl Into<String>, host: Arc<Host>, connector: C, log: Log) -> Self {
        Self {
            host,
            connector,
            device: None,
            log,
            frames: vec![Frame {
                name: name.into(),
                subtasks: Vec::new(),
            }],
        }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// The name of the innermost running task.
    pub fn name(&self) -> &str {
        self.frames
            .last()
            .map(|frame| frame.name.as_str())
            .unwrap_or_default()
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    /// Returns the host's device session, connecting first if needed.
    ///
    /// A failed connection is not remembered; the next call tries again.
    pub async fn device(&mut self) -> anyhow::Result<&mut C::Device> {
        if self.device.is_none() {
            self.log.debug(format!("connecting to {}", self.host.hostname()));
            let device = self
                .connector
                .connect(&self.host)
                .await
                .with_context(|| format!("failed to open a connection to {}", self.host.name))?;
            self.device = Some(device);
        }
        self.device
            .as_mut()
            .ok_or_else(|| anyhow!("no connection to {}", self.host.name))
    }

    /// Starts a sub-task named `name`. Must be paired with [Self::end].
    pub fn begin(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.log.debug(format!("starting task {name}"));
        self.frames.push(Frame {
            name,
            subtasks: Vec::new(),
        });
    }

    /// Finishes the sub-task started by the matching [Self::begin], attaches its result to the
    /// enclosing task, and returns a copy of it.
    ///
    /// # Panics
    ///
    /// Panics if there is no matching [Self::begin]. This is a bug in the calling task.
    pub fn end(&mut self, outcome: anyhow::Result<Outcome>) -> TaskResult {
        assert!(
            self.frames.len() > 1,
            "Task::end called on {} without a matching Task::begin",
            self.host.name,
        );
        let Some(frame) = self.frames.pop() else {
            unreachable!("frames is never empty");
        };

        let result = TaskResult::new(&self.host.name, frame.name, outcome, frame.subtasks);
        if let Some(exception) = &result.exception {
            self.log
                .error(format!("task '{}' failed: {exception}", result.name));
        }

        if let Some(parent) = self.frames.last_mut() {
            parent.subtasks.push(result.clone());
        }
        result
    }

    /// Closes the device session, if one was opened, and builds the top-level result.
    pub(crate) async fn finish(mut self, outcome: anyhow::Result<Outcome>) -> TaskResult {
        if let Some(mut device) = self.device.take() {
            if let Err(err) = device.close().await {
                self.log.warning(format!("failed to close connection: {err:#}"));
            }
        }

        // Tolerate bodies that returned early between begin and end: fold any open frames into
        // their parents so nothing they recorded is lost.
        while self.frames.len() > 1 {
            self.end(Err(anyhow!("task did not finish")));
        }

        let frame = self.frames.remove(0);
        let result = TaskResult::new(&self.host.name, frame.name, outcome, frame.subtasks);
        if let Some(exception) = &result.exception {
            self.log
                .error(format!("task '{}' failed: {exception}", result.name));
        }
        result
    }
}
