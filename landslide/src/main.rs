//! Dispatch controller binary
//!
//! Builds configuration from the environment, runs the iterative-deepening
//! dispatch loop to termination, and translates the outcome into a process
//! exit code: 0 when exploration completed with no bug found, 1 when a bug
//! was found or every job died before coming alive.

use anyhow::{Context, Result};
use landslide::config::Config;
use landslide::dispatcher::Dispatcher;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,landslide=debug")))
        .init();

    info!("starting landslide dispatch controller");
    info!(version = env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    let dispatcher = Dispatcher::new(config);
    let outcome = dispatcher.run();

    info!(
        rounds = outcome.rounds,
        jobs_run = outcome.jobs_run,
        dead_jobs = outcome.dead_jobs,
        bug_found = outcome.bug_found.is_some(),
        "dispatch run finished"
    );

    if let Some(summary) = &outcome.bug_found {
        eprintln!("bug found: {summary}");
        std::process::exit(1);
    }

    if outcome.dead_jobs > 0 && outcome.jobs_run == outcome.dead_jobs {
        return Err(anyhow::anyhow!("every job died before coming alive")).context("dispatch run produced no usable results");
    }

    Ok(())
}
