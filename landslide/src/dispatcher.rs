//! Job dispatcher: decides which PP-sets are worth exploring and runs jobs
//!
//! Loops over rounds of iterative deepening: synthesize candidate sets from
//! the registry's current priority-mask frontier, skip any already fully
//! explored, launch the rest as jobs bounded by the configured degree of
//! parallelism, and fold their results back into the registry before the
//! next round's (strictly richer) snapshot.

use crate::config::Config;
use crate::job::{Job, JobContext, JobOutcome, RunningJob};
use crate::ppset::PpSet;
use crate::registry::Registry;
use std::collections::VecDeque;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Summary of a completed dispatch run.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub rounds: u64,
    pub jobs_run: u64,
    pub bug_found: Option<String>,
    pub dead_jobs: u64,
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    ctx: JobContext,
}

impl Dispatcher {
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(Registry::new());
        let ctx = JobContext {
            registry: Arc::clone(&registry),
            build_mutex: Arc::new(Mutex::new(())),
            next_job_id: Arc::new(AtomicU64::new(0)),
            config: Arc::new(config),
        };
        Self { registry, ctx }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Run the iterative-deepening loop to termination: a bug is found, or
    /// every candidate mask at the current frontier has nothing left to
    /// explore.
    pub fn run(&self) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        'rounds: loop {
            outcome.rounds += 1;
            let mut any_live = false;
            let mut running: VecDeque<RunningJob> = VecDeque::new();

            for &mask in &self.ctx.config.initial_priority_masks {
                let candidate = PpSet::create(mask, &self.registry);
                if candidate.filter_unexplored(&self.registry).is_none() {
                    continue;
                }
                any_live = true;

                if running.len() >= self.ctx.config.max_parallel_jobs.max(1) {
                    if let Some(job) = running.pop_front() {
                        if self.reap(job, &mut outcome) {
                            break 'rounds;
                        }
                    }
                }

                let job = Job::new(&self.ctx, candidate);
                info!(job_id = job.id(), generation = job.generation(), "starting job");
                running.push_back(job.start(self.ctx.clone()));
            }

            while let Some(job) = running.pop_front() {
                if self.reap(job, &mut outcome) {
                    break 'rounds;
                }
            }

            if !any_live {
                info!(rounds = outcome.rounds, "no unexplored PPs remain at the current frontier");
                break;
            }
        }

        self.registry.try_report_unexplored_data_races();
        outcome
    }

    /// Wait for a job, fold its outcome into the running summary. Returns
    /// true if the dispatcher should stop (a bug was found).
    fn reap(&self, job: RunningJob, outcome: &mut DispatchOutcome) -> bool {
        let job_id = job.id();
        outcome.jobs_run += 1;
        match job.wait() {
            Ok(JobOutcome::Completed { elapsed_branches }) => {
                info!(job_id, elapsed_branches, "job completed");
                false
            }
            Ok(JobOutcome::BugFound { summary, .. }) => {
                warn!(job_id, %summary, "bug found");
                outcome.bug_found = Some(summary);
                true
            }
            Ok(JobOutcome::Dead) => {
                warn!(job_id, "job never came alive");
                outcome.dead_jobs += 1;
                false
            }
            Err(e) => {
                warn!(job_id, error = %e, "job failed");
                outcome.dead_jobs += 1;
                false
            }
        }
    }
}
