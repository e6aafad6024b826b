use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::ValueEnum;
use kvs_harness::control_client;
use kvs_harness::suite_exit_code;
use kvs_harness::CommandLauncher;
use kvs_harness::EXIT_FAILURE;
use kvs_harness::HarnessConfig;
use kvs_harness::ProcessManager;
use kvs_harness::Reporter;
use kvs_harness::Result;
use kvs_harness::ScenarioKind;
use kvs_harness::ScenarioReport;
use kvs_harness::ScenarioRunner;
use kvs_harness::MAX_REPLICAS;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Selection {
    FailureDetection,
    LeaderElection,
    Replication,
    All,
}

impl Selection {
    fn kinds(self) -> Vec<ScenarioKind> {
        match self {
            Selection::FailureDetection => vec![ScenarioKind::FailureDetection],
            Selection::LeaderElection => vec![ScenarioKind::LeaderElection],
            Selection::Replication => vec![ScenarioKind::Replication],
            Selection::All => ScenarioKind::all().to_vec(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scenario to run
    #[arg(value_enum, default_value_t = Selection::All)]
    scenario: Selection,

    /// Extra configuration file merged over CONFIG_PATH and defaults
    #[arg(short, long)]
    config: Option<String>,

    /// Seed for key order and kill target selection
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_config(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };

    // Initializing Logs
    let _guard = match init_observability(settings.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Cannot open log file: {e}");
            return ExitCode::from(1);
        }
    };

    // Dropping the run on interrupt drops every process handle, which kills
    // the spawned nodes.
    let code = tokio::select! {
        result = run(cli, settings) => match result {
            Ok(reports) => suite_exit_code(&reports),
            Err(e) => {
                error!("harness failed: {}", e);
                println!("Test failed: {e}");
                EXIT_FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected, tearing down.");
            println!("Test failed: interrupted");
            EXIT_FAILURE
        },
    };
    ExitCode::from(code as u8)
}

fn load_config(cli: &Cli) -> Result<HarnessConfig> {
    let mut settings = HarnessConfig::new()?;
    if let Some(path) = &cli.config {
        settings = settings.with_override_config(path)?;
    }
    settings.validate()
}

async fn run(
    cli: Cli,
    settings: HarnessConfig,
) -> Result<Vec<ScenarioReport>> {
    let seed = cli.seed.or(settings.workload.seed).unwrap_or_else(rand::random);
    info!("harness seed: {}", seed);

    let launcher = CommandLauncher::new(&settings.binaries);
    let manager = ProcessManager::new(Arc::new(launcher), settings.process.clone());
    let client = control_client(&settings.control, &settings.binaries);
    let mut runner = ScenarioRunner::new(
        manager,
        client,
        settings.control.endpoint,
        settings.convergence.clone(),
        seed,
    );

    let base = settings.topology.topology(MAX_REPLICAS)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut reporter = Reporter::stdout();
    let mut reports = Vec::new();
    for kind in cli.scenario.kinds() {
        let scenario = kind.build(&base, &settings.workload, &mut rng)?;
        let report = runner.run(&scenario).await;
        reporter.print(&report)?;
        reports.push(report);
    }
    Ok(reports)
}

/// Logs go to stderr, or to `<log_dir>/harness.log` when configured.
/// `RUST_LOG` overrides the default `info` level.
fn init_observability(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(dir) = log_dir else {
        let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(filter());
        tracing_subscriber::registry().with(layer).init();
        return Ok(None);
    };

    std::fs::create_dir_all(dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, "harness.log"));
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(filter());
    tracing_subscriber::registry().with(layer).init();
    Ok(Some(guard))
}
