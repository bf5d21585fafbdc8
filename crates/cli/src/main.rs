//! Testwright CLI - suite runner entry point
//!
//! Loads declarative YAML suites, runs them against a backend through a
//! WebDriver remote end, writes the JSON report, and exits non-zero if any
//! case failed.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use testwright_engine::dom::GatePolicy;
use testwright_engine::retry::RetryPolicy;
use testwright_engine::runner::{Runner, RunnerConfig};
use testwright_engine::suite::TestSuite;
use testwright_engine::webdriver::WebDriverFactory;

#[derive(Parser, Debug)]
#[command(name = "testwright")]
#[command(author, version, about = "Declarative E2E test orchestration")]
struct Args {
    /// Path to the suites directory
    #[arg(short, long, default_value = "suites")]
    suites: PathBuf,

    /// Run only the suite with this name
    #[arg(long)]
    name: Option<String>,

    /// Run only suites carrying this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Base URL of the system under test
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "TESTWRIGHT_BACKEND_URL")]
    backend_url: String,

    /// WebDriver remote end (chromedriver, geckodriver, grid)
    #[arg(long, default_value = "http://127.0.0.1:4444", env = "TESTWRIGHT_WEBDRIVER_URL")]
    webdriver_url: String,

    /// Concurrent cases per suite
    #[arg(long, default_value = "1")]
    parallel: usize,

    /// Actionability gate budget in milliseconds
    #[arg(long, default_value = "4000")]
    gate_timeout_ms: u64,

    /// Default assertion budget in milliseconds
    #[arg(long, default_value = "5000")]
    assert_timeout_ms: u64,

    /// Output directory for the JSON report
    #[arg(short, long, default_value = "test-results")]
    output: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match run(args).await {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(2);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<bool> {
    let mut suites = TestSuite::load_all(&args.suites)?;

    if let Some(name) = &args.name {
        suites.retain(|suite| &suite.name == name);
    }
    if let Some(tag) = &args.tag {
        suites.retain(|suite| suite.has_tag(tag));
    }
    if suites.is_empty() {
        anyhow::bail!(
            "no suites matched under {} (name: {:?}, tag: {:?})",
            args.suites.display(),
            args.name,
            args.tag
        );
    }

    let total_cases: usize = suites.iter().map(|suite| suite.cases.len()).sum();
    info!(suites = suites.len(), cases = total_cases, "loaded suites");
    if args.parallel > 1 {
        warn!(parallel = args.parallel, "cases run concurrently; each gets an isolated session");
    }

    let config = RunnerConfig {
        backend_url: args.backend_url,
        parallelism: args.parallel.max(1),
        gate: GatePolicy {
            timeout: Duration::from_millis(args.gate_timeout_ms),
            ..GatePolicy::default()
        },
        retry: RetryPolicy {
            timeout: Duration::from_millis(args.assert_timeout_ms),
            ..RetryPolicy::default()
        },
        output_dir: args.output,
    };

    let runner = Runner::new(config, Arc::new(WebDriverFactory::new(args.webdriver_url)));
    let report = runner.run_suites(&suites).await;
    runner.write_report(&report)?;

    Ok(report.success())
}
