//! Runs the walkthrough task on every host in the inventory over the device command API and prints
//! the results.

use anyhow::Context;
use netpilot::config::Config;
use netpilot::driver::eapi::EapiConnector;
use netpilot::inventory::Inventory;
use netpilot::logger::{self, FileLogger, Log};
use netpilot::walkthrough::{MainTask, TASK_NAME, TEMPLATE};
use netpilot::{print_result, Runner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    let logger = FileLogger::new(&config.logging.directory).with_context(|| {
        format!(
            "failed to open the log in {}",
            config.logging.directory.display()
        )
    })?;
    let (log, guard) = logger::init(logger, config.logging.level);

    let outcome = run(&config, log).await;
    guard.finish()?;
    outcome
}

// Takes ownership of the last Log so that the writer thread can finish once this returns.
async fn run(config: &Config, log: Log) -> anyhow::Result<()> {
    let inventory = Inventory::load(&config.inventory.options)?;
    log.info(format!("loaded {} host(s)", inventory.len()));

    let connector = EapiConnector::new(&config.eapi)?;
    let runner = Runner::new(&config.runner.options, log);
    let task = MainTask::new("arg_1", "arg_2", TEMPLATE, true);
    let result = runner.run(TASK_NAME, &inventory, connector, task).await;

    print_result(&result)?;
    Ok(())
}
