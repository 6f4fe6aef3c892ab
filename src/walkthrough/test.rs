use super::*;
use crate::config::RunnerOptions;
use crate::fixtures::*;
use crate::logger::{Level, Log};
use crate::runner::Runner;
use crate::task::AggregatedResult;
use crate::tasks::{DEVICE_CLI, DEVICE_CONFIGURE, DEVICE_GET};

fn task(network: &FakeNetwork, log: Log) -> Task<FakeNetwork> {
    let host = inventory().host("veos01").unwrap().clone();
    let log = log.for_host(&host.name);
    Task::new(TASK_NAME, host, network.clone(), log)
}

async fn run(network: &FakeNetwork, main_task: MainTask) -> AggregatedResult {
    let (log, _guard, _) = memory_log();
    Runner::new(&RunnerOptions::default(), log)
        .run(TASK_NAME, &inventory(), network.clone(), main_task)
        .await
}

mod log_something {
    use super::*;

    #[tokio::test]
    async fn logs_info_and_warning() {
        let (log, guard, logger) = memory_log();
        let mut task = task(&FakeNetwork::new(), log);
        task.begin(LOG_SOMETHING);
        let outcome = log_something(&task).unwrap();
        task.end(Ok(outcome.clone()));
        drop(task);
        guard.finish().unwrap();

        assert_eq!(
            serde_json::json!("Task Logging example. made some log updates"),
            outcome.result,
        );

        let entries = logger.entries.lock().unwrap();
        let logged: Vec<_> = entries
            .iter()
            .filter(|e| e.level >= Level::Info)
            .map(|e| (e.level, e.host.as_deref(), e.message.as_str()))
            .collect();
        assert_eq!(
            vec![
                (Level::Info, Some("veos01"), "veos01 says hi!"),
                (
                    Level::Warning,
                    Some("veos01"),
                    "Warning 'veos01' is running task 'Logging example.'",
                ),
            ],
            logged,
        );
    }
}

mod example_task {
    use super::*;

    #[tokio::test]
    async fn echoes_arguments() {
        let (log, _guard, _) = memory_log();
        let task = task(&FakeNetwork::new(), log);
        let outcome = example_task(&task, "arg_1", "arg_2").unwrap();
        assert_eq!(
            serde_json::json!("Got the following:\nexample_arg_1: arg_1\nexample_arg_2: arg_2"),
            outcome.result,
        );
        assert!(!outcome.changed);
    }
}

mod examine_task {
    use super::*;

    #[tokio::test]
    async fn describes_task_and_host() {
        let (log, _guard, _) = memory_log();
        let mut task = task(&FakeNetwork::new(), log);
        task.begin(EXAMINE_TASK);
        let outcome = examine_task(&task).unwrap();
        let result = outcome.result;

        assert_eq!("examine task", result["task name"]);
        assert_eq!("10.254.169.50", result["host dict"]["hostname"]);
        assert_eq!("eos", result["host dict"]["platform"]);
        assert_eq!(443, result["host dict"]["port"]);
        assert_eq!("arista_eapi", result["groups content"]["name"]);
        assert_eq!("admin", result["default content"]["username"]);
        assert!(result["task type"].as_str().unwrap().contains("Task"));
        assert_eq!(serde_json::json!(Task::<FakeNetwork>::OPERATIONS), result["task fields"]);
        assert_eq!(serde_json::json!(Host::FIELDS), result["host fields"]);
    }

    #[tokio::test]
    async fn masks_passwords() {
        let (log, _guard, _) = memory_log();
        let task = task(&FakeNetwork::new(), log);
        let text = examine_task(&task).unwrap().result.to_string();
        assert!(!text.contains("\"password\":\"password\""));
        assert!(text.contains("********"));
    }

    #[tokio::test]
    async fn null_groups_without_groups() {
        let (log, _guard, _) = memory_log();
        let host = numbered_inventory(1).host("r0").unwrap().clone();
        let task = Task::new(TASK_NAME, host, FakeNetwork::new(), log);
        let outcome = examine_task(&task).unwrap();
        assert_eq!(Value::Null, outcome.result["groups content"]);
    }
}

mod examine_result {
    use super::*;

    #[test]
    fn describes_result() {
        let examined = TaskResult::new("veos01", EXAMINE_TASK, Ok(Outcome::new("x")), vec![]);
        let outcome = examine_result(&examined).unwrap();

        assert_eq!("examine task", outcome.result["result"]["name"]);
        assert_eq!("x", outcome.result["result"]["result"]);
        assert_eq!(serde_json::json!(TaskResult::FIELDS), outcome.result["result fields"]);
        assert!(outcome.result["result type"]
            .as_str()
            .unwrap()
            .ends_with("TaskResult"));
    }
}

mod main_task {
    use super::*;

    #[tokio::test]
    async fn one_result_per_host() {
        let results = run(&FakeNetwork::new(), MainTask::default()).await;
        assert_eq!(TASK_NAME, results.name);
        assert_eq!(2, results.len());
        for (_, result) in results.iter() {
            assert!(!result.failed, "{result:#?}");
            assert_eq!(serde_json::json!(FINISHED), result.result);
        }
    }

    #[tokio::test]
    async fn runs_steps_in_order() {
        let results = run(&FakeNetwork::new(), MainTask::default()).await;
        for (_, result) in results.iter() {
            assert_eq!(STEPS.to_vec(), result.subtask_names());
        }
    }

    #[tokio::test]
    async fn nests_driver_subtasks() {
        let results = run(&FakeNetwork::new(), MainTask::default()).await;
        let result = results.get("veos02").unwrap();

        let command = result.find(EXAMPLE_COMMAND).unwrap();
        assert_eq!(vec![DEVICE_CLI], command.subtask_names());
        assert_eq!("veos02# show hostname", command.result["show hostname"]);

        let getters = result.find(EXAMPLE_GETTERS).unwrap();
        assert_eq!(vec![DEVICE_GET], getters.subtask_names());
        assert_eq!("veos02", getters.result["facts"]["hostname"]);

        let configure = result.find(EXAMPLE_CONFIGURE).unwrap();
        assert_eq!(vec![DEVICE_CONFIGURE], configure.subtask_names());
    }

    #[tokio::test]
    async fn echo_contains_arguments() {
        let main_task = MainTask::new("first", "second", TEMPLATE, true);
        let results = run(&FakeNetwork::new(), main_task).await;
        let echo = results.get("veos01").unwrap().find(EXAMPLE_TASK).unwrap();
        let text = echo.result.as_str().unwrap();
        assert!(text.contains("first"));
        assert!(text.contains("second"));
    }

    #[tokio::test]
    async fn dry_run_does_not_commit() {
        let network = FakeNetwork::new();
        let results = run(&network, MainTask::default()).await;

        for host in ["veos01", "veos02"] {
            assert!(network.running_config(host).is_empty());
            let configure = results.get(host).unwrap().find(EXAMPLE_CONFIGURE).unwrap();
            assert!(configure.changed);
            assert_eq!("+interface loopback 0\n+description netpilot\n", configure.diff);
        }
        assert!(network
            .calls("veos01")
            .iter()
            .any(|c| matches!(c, Call::Configure { dry_run: true, .. })));
    }

    #[tokio::test]
    async fn commits_without_dry_run() {
        let network = FakeNetwork::new();
        run(&network, MainTask::new("arg_1", "arg_2", TEMPLATE, false)).await;
        assert_eq!(
            vec!["interface loopback 0", "description netpilot"],
            network.running_config("veos01"),
        );
    }

    #[tokio::test]
    async fn reuses_one_connection_per_host() {
        let network = FakeNetwork::new();
        run(&network, MainTask::default()).await;
        assert_eq!(Some(&1), network.state().connections.get("veos01"));
        assert_eq!(Some(&Call::Close), network.calls("veos01").last());
    }

    #[tokio::test]
    async fn unreachable_host_fails_only_device_steps() {
        let network = FakeNetwork::new();
        network.set_unreachable("veos01");
        let results = run(&network, MainTask::default()).await;

        let veos01 = results.get("veos01").unwrap();
        assert!(veos01.failed);
        assert_eq!(STEPS.to_vec(), veos01.subtask_names());
        let failed: Vec<_> = veos01
            .subtasks
            .iter()
            .filter(|r| r.failed)
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(
            vec![EXAMPLE_COMMAND, EXAMPLE_GETTERS, EXAMPLE_CONFIGURE],
            failed,
        );
        assert!(veos01
            .find(DEVICE_CLI)
            .unwrap()
            .exception
            .as_deref()
            .unwrap()
            .contains("connection refused"));

        let veos02 = results.get("veos02").unwrap();
        assert!(!veos02.failed);
        assert_eq!(vec!["veos01"], results.failed_hosts());
    }

    #[tokio::test]
    async fn failing_commands_do_not_stop_later_steps() {
        let network = FakeNetwork::new();
        network.fail_commands("veos02");
        let results = run(&network, MainTask::default()).await;

        let veos02 = results.get("veos02").unwrap();
        assert_eq!(STEPS.to_vec(), veos02.subtask_names());
        let calls = network.calls("veos02");
        assert_eq!(4, calls.len(), "{calls:?}");
        assert_eq!(Call::Close, calls[3]);
        assert!(!results.get("veos01").unwrap().failed);
    }
}
