//! A guided tour of what a task can do, run as a single top-level task on every host.
//!
//! [MainTask] runs seven sub-tasks in order, each recorded under its own name:
//!
//! 1. [LOG_SOMETHING] writes to the log.
//! 2. [EXAMPLE_TASK] echoes its arguments.
//! 3. [EXAMINE_TASK] describes the task context and the host it runs on.
//! 4. [EXAMINE_RESULT] describes the result of step 3.
//! 5. [EXAMPLE_COMMAND] runs two CLI commands.
//! 6. [EXAMPLE_GETTERS] fetches structured facts.
//! 7. [EXAMPLE_CONFIGURE] pushes a configuration, or only diffs it on a dry run.
//!
//! A failed step never stops the steps after it. The top-level result is failed when any step
//! failed.

use crate::driver::Connect;
use crate::inventory::Host;
use crate::tasks::{device_cli, device_configure, device_get};
use crate::task::{HostTask, Outcome, Task, TaskResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::any::type_name;

/// The name the binary gives the top-level task.
pub const TASK_NAME: &str = "Task example and explanation function.";

/// The configuration [EXAMPLE_CONFIGURE] pushes by default.
pub const TEMPLATE: &str = "\ninterface loopback 0\ndescription netpilot\n";

pub const LOG_SOMETHING: &str = "Logging example.";
pub const EXAMPLE_TASK: &str = "example_task";
pub const EXAMINE_TASK: &str = "examine task";
pub const EXAMINE_RESULT: &str = "examine result";
pub const EXAMPLE_COMMAND: &str = "example command using the device CLI";
pub const EXAMPLE_GETTERS: &str = "example using device getters";
pub const EXAMPLE_CONFIGURE: &str = "example configuration using the device API";

/// The sub-tasks [MainTask] runs, in order.
pub const STEPS: &[&str] = &[
    LOG_SOMETHING,
    EXAMPLE_TASK,
    EXAMINE_TASK,
    EXAMINE_RESULT,
    EXAMPLE_COMMAND,
    EXAMPLE_GETTERS,
    EXAMPLE_CONFIGURE,
];

/// The commands [EXAMPLE_COMMAND] runs.
pub const COMMANDS: &[&str] = &["show version", "show hostname"];

/// The getters [EXAMPLE_GETTERS] runs.
pub const GETTERS: &[&str] = &["facts"];

/// The payload of a successful [MainTask].
pub const FINISHED: &str = "Example task finished!";

/// The top-level walkthrough task.
#[derive(Clone, Debug)]
pub struct MainTask {
    pub example_arg_1: String,
    pub example_arg_2: String,
    pub template: String,

    /// Diff the configuration without committing it.
    pub dry_run: bool,
}

impl MainTask {
    pub fn new(
        example_arg_1: impl Into<String>,
        example_arg_2: impl Into<String>,
        template: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            example_arg_1: example_arg_1.into(),
            example_arg_2: example_arg_2.into(),
            template: template.into(),
            dry_run,
        }
    }
}

impl Default for MainTask {
    fn default() -> Self {
        Self::new("arg_1", "arg_2", TEMPLATE, true)
    }
}

#[async_trait]
impl<C: Connect> HostTask<C> for MainTask {
    async fn run(&self, task: &mut Task<C>) -> anyhow::Result<Outcome> {
        task.begin(LOG_SOMETHING);
        let outcome = log_something(task);
        task.end(outcome);

        task.begin(EXAMPLE_TASK);
        let outcome = example_task(task, &self.example_arg_1, &self.example_arg_2);
        task.end(outcome);

        task.begin(EXAMINE_TASK);
        let outcome = examine_task(task);
        let examined = task.end(outcome);

        task.begin(EXAMINE_RESULT);
        let outcome = examine_result(&examined);
        task.end(outcome);

        task.begin(EXAMPLE_COMMAND);
        let nested = device_cli(task, COMMANDS).await;
        task.end(Ok(Outcome::new(nested.result)));

        task.begin(EXAMPLE_GETTERS);
        let nested = device_get(task, GETTERS).await;
        task.end(Ok(Outcome::new(nested.result)));

        task.begin(EXAMPLE_CONFIGURE);
        let nested = device_configure(task, &self.template, self.dry_run).await;
        task.end(Ok(Outcome::new(nested.result)
            .changed(nested.changed)
            .diff(nested.diff)));

        Ok(Outcome::new(FINISHED))
    }
}

/// Writes an info and a warning entry to the log.
pub fn log_something<C: Connect>(task: &Task<C>) -> anyhow::Result<Outcome> {
    let host = &task.host().name;
    task.log().info(format!("{host} says hi!"));
    task.log()
        .warning(format!("Warning '{host}' is running task '{}'", task.name()));
    Ok(Outcome::new(format!(
        "Task {} made some log updates",
        task.name()
    )))
}

/// Echoes both arguments back.
pub fn example_task<C: Connect>(
    _task: &Task<C>,
    example_arg_1: &str,
    example_arg_2: &str,
) -> anyhow::Result<Outcome> {
    Ok(Outcome::new(format!(
        "Got the following:\nexample_arg_1: {example_arg_1}\nexample_arg_2: {example_arg_2}"
    )))
}

/// Describes the running task and its host.
pub fn examine_task<C: Connect>(task: &Task<C>) -> anyhow::Result<Outcome> {
    let host = task.host();
    Ok(Outcome::new(json!({
        "task name": task.name(),
        "host dict": host.to_dict(),
        "groups content": host.groups.first().map_or(Value::Null, |g| g.to_dict()),
        "default content": host.defaults.to_dict(),
        "task type": type_name::<Task<C>>(),
        "task fields": Task::<C>::OPERATIONS,
        "host fields": Host::FIELDS,
    })))
}

/// Describes a finished result.
pub fn examine_result(result: &TaskResult) -> anyhow::Result<Outcome> {
    Ok(Outcome::new(json!({
        "result": serde_json::to_value(result)?,
        "result fields": TaskResult::FIELDS,
        "result type": type_name::<TaskResult>(),
    })))
}

#[cfg(test)]
mod test;
