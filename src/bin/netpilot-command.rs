//! Sends `show version` to every host in the inventory over SSH and prints the results.

use anyhow::Context;
use netpilot::config::Config;
use netpilot::driver::ssh::SshConnector;
use netpilot::inventory::Inventory;
use netpilot::logger::{self, FileLogger, Log};
use netpilot::tasks::SendCommand;
use netpilot::{print_result, Runner};

const COMMAND: &str = "show version";

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

async fn run(config: &Config, log: Log) -> anyhow::Result<()> {
    let inventory = Inventory::load(&config.inventory.options)?;
    log.info(format!("loaded {} host(s)", inventory.len()));

    let runner = Runner::new(&config.runner.options, log);
    let result = runner
        .run(COMMAND, &inventory, SshConnector, SendCommand::new(COMMAND))
        .await;

    print_result(&result)?;
    Ok(())
}
