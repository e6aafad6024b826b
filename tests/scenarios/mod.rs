use std::sync::Arc;

use kvs_harness::control_client;
use kvs_harness::BinariesConfig;
use kvs_harness::CommandEndpoint;
use kvs_harness::ControlConfig;
use kvs_harness::ConvergenceMode;
use kvs_harness::Phase;
use kvs_harness::ProcessManager;
use kvs_harness::ScenarioKind;
use kvs_harness::ScenarioRunner;
use kvs_harness::WorkloadConfig;
use kvs_harness::MAX_REPLICAS;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_test::traced_test;

use crate::common::fast_convergence;
use crate::common::fast_process;
use crate::common::free_topology;
use crate::common::SimLauncher;

async fn run_builtin(
    kind: ScenarioKind,
    mode: ConvergenceMode,
    endpoint: CommandEndpoint,
) {
    let launcher = SimLauncher::new();
    let manager = ProcessManager::new(Arc::new(launcher.clone()), fast_process());
    let control = ControlConfig {
        endpoint,
        request_timeout_ms: 500,
        ..Default::default()
    };
    let client = control_client(&control, &BinariesConfig::default());
    let mut runner = ScenarioRunner::new(manager, client, endpoint, fast_convergence(mode), 3);

    let base = free_topology(MAX_REPLICAS).await;
    let workload = WorkloadConfig {
        keys: 10,
        ..Default::default()
    };
    let scenario = kind.build(&base, &workload, &mut StdRng::seed_from_u64(3)).unwrap();

    let report = runner.run(&scenario).await;

    assert!(report.passed(), "{kind} in {mode:?} mode failed: {:?}", report.abort);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.phases.first(), Some(&Phase::Setup));
    assert_eq!(report.phases.last(), Some(&Phase::Teardown));
    assert_eq!(launcher.running(), 0);
}

#[tokio::test]
#[traced_test]
async fn test_failure_detection_poll() {
    run_builtin(ScenarioKind::FailureDetection, ConvergenceMode::Poll, CommandEndpoint::Control).await;
}

#[tokio::test]
async fn test_failure_detection_fixed() {
    run_builtin(ScenarioKind::FailureDetection, ConvergenceMode::Fixed, CommandEndpoint::Control).await;
}

#[tokio::test]
#[traced_test]
async fn test_leader_election_poll() {
    run_builtin(ScenarioKind::LeaderElection, ConvergenceMode::Poll, CommandEndpoint::Control).await;
}

#[tokio::test]
async fn test_leader_election_fixed() {
    run_builtin(ScenarioKind::LeaderElection, ConvergenceMode::Fixed, CommandEndpoint::Control).await;
}

#[tokio::test]
async fn test_replication_poll() {
    run_builtin(ScenarioKind::Replication, ConvergenceMode::Poll, CommandEndpoint::Control).await;
}

#[tokio::test]
async fn test_replication_fixed() {
    run_builtin(ScenarioKind::Replication, ConvergenceMode::Fixed, CommandEndpoint::Control).await;
}

#[tokio::test]
async fn test_commands_through_client_endpoint() {
    run_builtin(ScenarioKind::Replication, ConvergenceMode::Poll, CommandEndpoint::Client).await;
}

#[tokio::test]
async fn test_occupied_port_fails_setup_cleanly() {
    let launcher = SimLauncher::new();
    let manager = ProcessManager::new(Arc::new(launcher.clone()), fast_process());
    let client = control_client(&ControlConfig::default(), &BinariesConfig::default());
    let mut runner =
        ScenarioRunner::new(manager, client, CommandEndpoint::Control, fast_convergence(ConvergenceMode::Poll), 3);

    let base = free_topology(MAX_REPLICAS).await;
    // Something else already serves the second replica's control port
    let _squatter = tokio::net::TcpListener::bind(base.replicas[1].control).await.unwrap();
    let scenario = ScenarioKind::FailureDetection
        .build(&base, &WorkloadConfig::default(), &mut StdRng::seed_from_u64(3))
        .unwrap();

    let report = runner.run(&scenario).await;

    let abort = report.abort.as_ref().unwrap();
    assert_eq!(abort.phase, Some(Phase::Setup));
    assert!(abort.error.contains("already in use"));
    assert_eq!(report.teardown.terminated, 2);
    assert_eq!(launcher.running(), 0);
}
