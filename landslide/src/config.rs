//! Controller configuration

use crate::registry::{PRIORITY_ALL, PRIORITY_DATA_RACE_MASK, PRIORITY_MUTEX_LOCK, PRIORITY_MUTEX_UNLOCK};
use std::path::PathBuf;
use std::time::Duration;

/// Dispatch controller configuration, populated from environment variables
/// with documented defaults (mirroring the teacher's `DaemonConfig::from_env`
/// pattern). There is deliberately no CLI flag parser here: command-line
/// parsing is an external concern per the specification.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the exploration worker binary.
    pub worker_binary: PathBuf,

    /// Working directory the worker is exec'd in; config/results files are
    /// rebased here so the worker can open them by simple relative name.
    pub worker_working_dir: PathBuf,

    /// Wall-clock bound on the handshake ("should take ~6 seconds" in the
    /// source; exposed here as a runtime knob per the Open Questions).
    pub handshake_timeout: Duration,

    /// Degree of parallelism: how many jobs may be running (post-build) at once.
    pub max_parallel_jobs: usize,

    /// Directory scratch files (config/results/log) are created under.
    pub scratch_dir: PathBuf,

    /// Directory worker stdout/stderr logs are retained in.
    pub log_dir: PathBuf,

    /// Ordered priority-mask frontier the dispatcher widens through.
    pub initial_priority_masks: Vec<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_binary: PathBuf::from("./landslide-worker"),
            worker_working_dir: PathBuf::from("."),
            handshake_timeout: Duration::from_secs(6),
            max_parallel_jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            scratch_dir: std::env::temp_dir(),
            log_dir: PathBuf::from("."),
            initial_priority_masks: vec![
                PRIORITY_MUTEX_LOCK | PRIORITY_MUTEX_UNLOCK,
                PRIORITY_MUTEX_LOCK | PRIORITY_MUTEX_UNLOCK | PRIORITY_DATA_RACE_MASK,
                PRIORITY_ALL,
            ],
        }
    }
}

impl Config {
    /// Build a configuration from environment variables, falling back to
    /// [`Config::default`] for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("LANDSLIDE_WORKER_BIN") {
            config.worker_binary = PathBuf::from(path);
        }

        if let Ok(dir) = std::env::var("LANDSLIDE_WORKER_DIR") {
            config.worker_working_dir = PathBuf::from(dir);
        }

        if let Ok(secs) = std::env::var("LANDSLIDE_HANDSHAKE_TIMEOUT_SECS") {
            if let Ok(val) = secs.parse() {
                config.handshake_timeout = Duration::from_secs(val);
            }
        }

        if let Ok(n) = std::env::var("LANDSLIDE_MAX_PARALLEL_JOBS") {
            if let Ok(val) = n.parse() {
                config.max_parallel_jobs = val;
            }
        }

        if let Ok(dir) = std::env::var("LANDSLIDE_SCRATCH_DIR") {
            config.scratch_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("LANDSLIDE_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        config
    }
}
