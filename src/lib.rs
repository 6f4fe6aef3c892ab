//! Run tasks against an inventory of network devices, many hosts at a time.
//!
//! # Program flow
//!
//! Below is a high-level overview of a netpilot run. You can find details of each step in the
//! relevant modules' documentation.
//!
//! 1. A binary such as `netpilot` loads the [config::Config] and starts the [logger].
//!
//! 2. It loads an [inventory::Inventory] of hosts, groups, and defaults from YAML.
//!
//! 3. A [runner::Runner] runs one top-level [task::HostTask] per host, a bounded number at a time.
//!    The task runs sub-tasks through its [task::Task] context, some of which talk to the host's
//!    device through a [driver::Connect] backend.
//!
//! 4. Every host's [task::TaskResult] tree is collected into a [task::AggregatedResult], which
//!    [report::print_result] prints to stdout.
//!
//! Hosts fail independently. A run as a whole only fails if it cannot start: bad configuration,
//! an unreadable inventory, or a log file that cannot be opened.

pub mod config;
pub mod driver;
pub mod inventory;
pub mod logger;
pub mod report;
pub mod runner;
pub mod task;
pub mod tasks;
pub mod walkthrough;

#[cfg(test)]
mod fixtures;

#[doc(inline)]
pub use report::print_result;
#[doc(inline)]
pub use runner::Runner;
