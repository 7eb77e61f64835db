//! Region pool allocation scenarios
//!
//! ```text
//! region-bench --mode pool --scenario threads --threads 8 --strategy reentrant
//! RUST_LOG=nebula_region=trace region-bench --scenario reset --outer 10
//! ```

mod scenario;

use std::time::Instant;

use anyhow::{Context, Result, ensure};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use crate::scenario::{Outcome, Workload};

/// Compare region pools with the system heap
#[derive(Debug, Parser)]
#[command(name = "region-bench", version, about)]
struct Cli {
    /// Where allocations come from
    #[arg(long, value_enum, default_value_t = Mode::Pool)]
    mode: Mode,

    /// Allocation pattern to run
    #[arg(long, value_enum, default_value_t = ScenarioKind::Reset)]
    scenario: ScenarioKind,

    /// Exclusion strategy of the pool
    #[arg(long, value_enum, default_value_t = Strategy::Spin)]
    strategy: Strategy,

    /// Worker threads (threads scenario only)
    #[arg(long, default_value_t = 4, env = "REGION_BENCH_THREADS")]
    threads: usize,

    /// Outer loop iterations
    #[arg(long, default_value_t = 1000)]
    outer: usize,

    /// Allocations per outer iteration
    #[arg(long, default_value_t = 1000)]
    inner: usize,

    /// Bytes per allocation
    #[arg(long, default_value_t = 64)]
    size: usize,

    /// Block size of the pool (defaults to one page)
    #[arg(long)]
    block_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Pool,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioKind {
    /// One thread, one pool, reset after every outer iteration
    Reset,
    /// One thread, a fresh 4 KiB pool per outer iteration
    CreateDestroy,
    /// Worker threads sharing one pool, each resetting it when done
    Threads,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    Spin,
    Reentrant,
    Parking,
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    ensure!(cli.threads > 0, "--threads must be at least 1");
    ensure!(cli.size > 0, "--size must be at least 1");

    let workload = Workload {
        mode: cli.mode,
        threads: if cli.scenario == ScenarioKind::Threads {
            cli.threads
        } else {
            1
        },
        outer: cli.outer,
        inner: cli.inner,
        size: cli.size,
        block_size: cli.block_size,
    };

    info!(
        mode = ?cli.mode,
        scenario = ?cli.scenario,
        strategy = ?cli.strategy,
        threads = workload.threads,
        outer = workload.outer,
        inner = workload.inner,
        size = workload.size,
        "starting run"
    );

    let started = Instant::now();
    let outcome = run(&cli, &workload).context("scenario aborted")?;
    let elapsed = started.elapsed();

    report(&workload, &outcome, elapsed);
    Ok(())
}

fn run(cli: &Cli, workload: &Workload) -> Result<Outcome> {
    use nebula_region::{ParkingLock, ReentrancyGuard, SpinLock};

    let outcome = match (cli.scenario, cli.strategy) {
        (ScenarioKind::Reset, Strategy::Spin) => scenario::reset_loop::<SpinLock>(workload)?,
        (ScenarioKind::Reset, Strategy::Reentrant) => {
            scenario::reset_loop::<ReentrancyGuard>(workload)?
        }
        (ScenarioKind::Reset, Strategy::Parking) => {
            scenario::reset_loop::<ParkingLock>(workload)?
        }
        (ScenarioKind::CreateDestroy, Strategy::Spin) => {
            scenario::create_destroy::<SpinLock>(workload)?
        }
        (ScenarioKind::CreateDestroy, Strategy::Reentrant) => {
            scenario::create_destroy::<ReentrancyGuard>(workload)?
        }
        (ScenarioKind::CreateDestroy, Strategy::Parking) => {
            scenario::create_destroy::<ParkingLock>(workload)?
        }
        (ScenarioKind::Threads, Strategy::Spin) => scenario::shared_pool::<SpinLock>(workload)?,
        (ScenarioKind::Threads, Strategy::Reentrant) => {
            scenario::shared_pool::<ReentrancyGuard>(workload)?
        }
        (ScenarioKind::Threads, Strategy::Parking) => {
            scenario::shared_pool::<ParkingLock>(workload)?
        }
    };

    Ok(outcome)
}

fn report(workload: &Workload, outcome: &Outcome, elapsed: std::time::Duration) {
    let attempted = workload.attempted();
    let per_alloc_ns = if attempted == 0 {
        0.0
    } else {
        elapsed.as_nanos() as f64 / attempted as f64
    };

    println!("elapsed:     {elapsed:?}");
    println!("allocations: {attempted}");
    println!("failures:    {}", outcome.failures);
    println!("per alloc:   {per_alloc_ns:.1} ns");
    if let Some(stats) = &outcome.stats {
        print!("{stats}");
    }
}
