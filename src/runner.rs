//! Runs a [HostTask] against every host in an [Inventory].
//!
//! Each host gets its own Tokio task. A semaphore caps how many hosts are worked on at once, so
//! `num_workers` bounds open device sessions as well as running tasks. Hosts never wait on each
//! other beyond that: a host that fails, or whose task panics, only fails its own result.

use crate::config::RunnerOptions;
use crate::driver::Connect;
use crate::inventory::{Host, Inventory};
use crate::logger::Log;
use crate::task::{AggregatedResult, HostTask, Task, TaskResult};
use anyhow::anyhow;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Runs tasks on many hosts at once.
#[derive(Clone, Debug)]
pub struct Runner {
    num_workers: usize,
    log: Log,
}

impl Runner {
    pub fn new(options: &RunnerOptions, log: Log) -> Self {
        Self {
            num_workers: options.num_workers.max(1),
            log,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Runs `task` once on every host in `inventory` and collects the results, in inventory
    /// order.
    ///
    /// Never fails as a whole. Problems on a host, including a panic in `task`, are recorded as
    /// that host's failed result.
    pub async fn run<C, T>(
        &self,
        name: &str,
        inventory: &Inventory,
        connector: C,
        task: T,
    ) -> AggregatedResult
    where
        C: Connect,
        T: HostTask<C>,
    {
        self.log.info(format!(
            "running task '{name}' on {} host(s) with {} worker(s)",
            inventory.len(),
            self.num_workers,
        ));

        let task = Arc::new(task);
        let semaphore = Arc::new(Semaphore::new(self.num_workers));

        let mut handles = Vec::new();
        for host in inventory.hosts() {
            let host = Arc::clone(host);
            let host_name = host.name.clone();
            let name = name.to_string();
            let connector = connector.clone();
            let task = Arc::clone(&task);
            let semaphore = Arc::clone(&semaphore);
            let log = self.log.for_host(&host.name);

            let handle = tokio::spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                run_host(name, host, connector, task, log).await
            });
            handles.push((host_name, handle));
        }

        let mut results = AggregatedResult::new(name);
        for (host, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => {
                    self.log.error(format!("task '{name}' on {host} panicked"));
                    TaskResult::new(&host, name, Err(anyhow!("task panicked: {err}")), vec![])
                }
            };
            results.insert(result);
        }

        let failed = results.failed_hosts();
        if failed.is_empty() {
            self.log.info(format!("task '{name}' succeeded on every host"));
        } else {
            self.log
                .warning(format!("task '{name}' failed on: {}", failed.join(", ")));
        }
        results
    }
}

async fn run_host<C, T>(
    name: String,
    host: Arc<Host>,
    connector: C,
    task: Arc<T>,
    log: Log,
) -> TaskResult
where
    C: Connect,
    T: HostTask<C>,
{
    log.debug(format!("starting task '{name}'"));
    let mut context = Task::new(name, host, connector, log);
    let outcome = task.run(&mut context).await;
    context.finish(outcome).await
}
