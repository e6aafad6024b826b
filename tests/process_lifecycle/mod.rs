#![cfg(unix)]

use std::net::SocketAddr;
use std::sync::Arc;

use kvs_harness::BinariesConfig;
use kvs_harness::CommandLauncher;
use kvs_harness::LaunchSpec;
use kvs_harness::NodeAddrs;
use kvs_harness::ProcessConfig;
use kvs_harness::ProcessManager;
use kvs_harness::ProgramSpec;
use kvs_harness::Role;
use kvs_harness::SpawnError;
use kvs_harness::TerminateOutcome;

use crate::common::fast_process;
use crate::common::get_available_ports;

fn launcher(leader: ProgramSpec) -> Arc<CommandLauncher> {
    Arc::new(CommandLauncher::new(&BinariesConfig {
        leader,
        ..Default::default()
    }))
}

async fn free_addrs() -> NodeAddrs {
    let ports = get_available_ports(2).await;
    NodeAddrs::new(
        SocketAddr::from(([127, 0, 0, 1], ports[0])),
        SocketAddr::from(([127, 0, 0, 1], ports[1])),
    )
}

#[tokio::test]
async fn test_spawn_and_terminate_real_process() {
    let manager = ProcessManager::new(
        launcher(ProgramSpec::new("sh", &["-c", "exec sleep 30", "{client}", "{control}"])),
        ProcessConfig {
            wait_ready: false,
            ..fast_process()
        },
    );

    let mut handle = manager.spawn(&LaunchSpec::leader(free_addrs().await)).await.unwrap();
    assert!(handle.pid().is_some());

    assert_eq!(manager.terminate(&mut handle).await, TerminateOutcome::Killed);
    assert_eq!(manager.terminate(&mut handle).await, TerminateOutcome::AlreadyReleased);
}

#[tokio::test]
async fn test_missing_program_is_launch_error() {
    let manager = ProcessManager::new(
        launcher(ProgramSpec::new("/nonexistent/leader", &["{client}", "{control}"])),
        fast_process(),
    );

    let result = manager.spawn(&LaunchSpec::leader(free_addrs().await)).await;

    match result {
        Err(SpawnError::Launch { role, program, .. }) => {
            assert_eq!(role, Role::Leader);
            assert_eq!(program, "/nonexistent/leader");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_process_exiting_during_startup() {
    let manager = ProcessManager::new(launcher(ProgramSpec::new("sh", &["-c", "exit 3"])), fast_process());

    let result = manager.spawn(&LaunchSpec::leader(free_addrs().await)).await;

    match result {
        Err(SpawnError::ExitedEarly { status, .. }) => assert!(status.contains('3')),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_address_in_use_detected_before_launch() {
    let addrs = free_addrs().await;
    let _squatter = tokio::net::TcpListener::bind(addrs.client).await.unwrap();
    let manager = ProcessManager::new(launcher(ProgramSpec::new("sh", &["-c", "exec sleep 30"])), fast_process());

    let result = manager.spawn(&LaunchSpec::leader(addrs)).await;

    assert!(matches!(result, Err(SpawnError::AddressInUse { addr }) if addr == addrs.client));
}

#[tokio::test]
async fn test_node_output_written_to_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = Arc::new(CommandLauncher::new(&BinariesConfig {
        leader: ProgramSpec::new("sh", &["-c", "echo started on $0; exec sleep 30", "{control}"]),
        output_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    }));
    let manager = ProcessManager::new(
        launcher,
        ProcessConfig {
            wait_ready: false,
            ..fast_process()
        },
    );
    let addrs = free_addrs().await;

    let mut handle = manager.spawn(&LaunchSpec::leader(addrs)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    manager.terminate(&mut handle).await;

    let log = std::fs::read_to_string(dir.path().join(format!("leader-{}.log", addrs.control.port()))).unwrap();
    assert!(log.contains(&format!("started on {}", addrs.control)));
}
