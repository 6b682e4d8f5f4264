//! One exploration run
//!
//! A job owns a PP-set configuration, a child worker process, four scoped
//! scratch files, a message session, and a completion latch. The C source
//! expresses completion via a detached thread and a done-flag/condvar pair;
//! per the Design Notes, this rewrite owns the worker task explicitly as a
//! joinable thread and expresses completion as awaiting its result, but the
//! `wait`/`finish` contract -- caller blocks until done, then reclaims
//! resources -- is unchanged.

mod messaging;
mod scratch;

pub use messaging::{ParentMessage, WorkerMessage};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ppset::PpSet;
use crate::registry::Registry;
use messaging::Session;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use scratch::ScratchFile;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of a completed job, as folded back by the messaging session.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// The worker ran its exploration to completion.
    Completed { elapsed_branches: u64 },
    /// The worker reported a bug before completing; the core forwards it
    /// upward and the worker is left to finish its own crash dump. Still
    /// carries the elapsed-branches count from `Completion` so the PP-set
    /// that was run is marked explored like any other completed run.
    BugFound { summary: String, elapsed_branches: u64 },
    /// The worker never came alive within the handshake timeout.
    Dead,
}

/// Shared context every job needs: the registry, the process-wide build
/// mutex, the next-job-id counter, and static configuration. Cloned cheaply
/// (everything behind an `Arc`) so the dispatcher can hand one to each job.
#[derive(Clone)]
pub struct JobContext {
    pub registry: Arc<Registry>,
    pub build_mutex: Arc<Mutex<()>>,
    pub next_job_id: Arc<AtomicU64>,
    pub config: Arc<Config>,
}

/// A job that has not yet been started.
pub struct Job {
    id: u64,
    config: PpSet,
    generation: u32,
}

/// A job whose worker thread has been spawned; reap it with [`RunningJob::wait`].
pub struct RunningJob {
    id: u64,
    handle: JoinHandle<Result<JobOutcome>>,
}

impl Job {
    /// Allocate a job: assign a fresh id by atomic fetch-and-add and compute
    /// its generation from the config set's current registry snapshot.
    pub fn new(ctx: &JobContext, config: PpSet) -> Self {
        let id = ctx.next_job_id.fetch_add(1, Ordering::SeqCst);
        let generation = config.generation(&ctx.registry);
        Self { id, config, generation }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Spawn a joinable worker thread whose single responsibility is to run
    /// the job body; never blocks the caller.
    pub fn start(self, ctx: JobContext) -> RunningJob {
        let id = self.id;
        let handle = std::thread::spawn(move || run_job_body(id, self.config, self.generation, ctx));
        RunningJob { id, handle }
    }
}

impl RunningJob {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the job's thread reports completion.
    pub fn wait(self) -> Result<JobOutcome> {
        self.handle
            .join()
            .unwrap_or_else(|_| panic!("job {} worker thread panicked", self.id))
    }

    /// Wait, then release the config set and the job record (ordinary Rust
    /// ownership does this on drop; `finish` exists to preserve the
    /// `wait`-then-release contract by name).
    pub fn finish(self) -> Result<JobOutcome> {
        self.wait()
    }
}

fn run_job_body(id: u64, config: PpSet, generation: u32, ctx: JobContext) -> Result<JobOutcome> {
    let span = tracing::info_span!("job", job_id = id, generation);
    let _enter = span.enter();

    // 1. Setup: scratch files, config contents, messaging session.
    let (config_scratch, mut config_handle) = ScratchFile::config(&ctx.config.worker_working_dir, id)?;
    let (results_scratch, _results_handle) = ScratchFile::results(&ctx.config.worker_working_dir, id)?;
    let (stdout_scratch, stdout_handle) = ScratchFile::log(&ctx.config.log_dir, id, "stdout")?;
    let (stderr_scratch, stderr_handle) = ScratchFile::log(&ctx.config.log_dir, id, "stderr")?;

    for pp in config.iter(&ctx.registry) {
        writeln!(config_handle, "{}", pp.directive)?;
    }
    config_handle.flush()?;

    let mut session = Session::init(&ctx.config.scratch_dir, id, config_scratch.path())?;

    // 2. Exclusive build phase: hold the build mutex across spawn until the
    // handshake completes.
    let build_guard = ctx.build_mutex.lock().unwrap();
    info!("spawning worker for job {id}");
    let mut child = Command::new(&ctx.config.worker_binary)
        .arg(config_scratch.relative_name())
        .arg(results_scratch.relative_name())
        .current_dir(&ctx.config.worker_working_dir)
        .env("LANDSLIDE_SESSION_SOCK", session.socket_path())
        .stdout(Stdio::from(stdout_handle))
        .stderr(Stdio::from(stderr_handle))
        .spawn()
        .map_err(Error::from)?;

    // 3. Wait-for-alive: only then release the build mutex. Workers share a
    // build area; concurrent builds corrupt it, concurrent explorations don't.
    let handshake = session.wait_for_child(ctx.config.handshake_timeout);
    drop(build_guard);

    let alive = match handshake {
        Ok(alive) => alive,
        Err(e) => {
            warn!(job_id = id, error = %e, "handshake failed, reaping worker");
            let pid = Pid::from_raw(child.id() as i32);
            let _ = signal::kill(pid, Signal::SIGKILL);
            let _ = child.wait();
            session.finish();
            return Err(e);
        }
    };

    let outcome = if !alive {
        warn!(job_id = id, "worker did not come alive within the handshake timeout");
        let pid = Pid::from_raw(child.id() as i32);
        let _ = signal::kill(pid, Signal::SIGKILL);
        let _ = child.wait();
        JobOutcome::Dead
    } else {
        debug!(job_id = id, session_state = ?session.state(), "worker alive, entering exploration");
        // 4. Exploration phase.
        let outcome = session.talk_to_child(generation, &ctx.registry)?;

        // 5. Reaping: wait for the worker, assert normal exit.
        let status = child.wait().map_err(Error::from)?;
        if !status.success() {
            return Err(Error::WorkerCrash { job_id: id, status: status.code() });
        }

        let elapsed_branches = match &outcome {
            JobOutcome::Completed { elapsed_branches } => *elapsed_branches,
            JobOutcome::BugFound { elapsed_branches, .. } => *elapsed_branches,
            JobOutcome::Dead => unreachable!("talk_to_child only returns Completed or BugFound"),
        };
        ctx.registry.mark_explored(&config, elapsed_branches);

        outcome
    };

    session.finish();

    drop(config_scratch);
    drop(results_scratch);
    drop(stdout_scratch);
    drop(stderr_scratch);

    // 6. Completion: the thread's return value is the done-flag/broadcast
    // the caller's `wait`/`finish` observes.
    Ok(outcome)
}
