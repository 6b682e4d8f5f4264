//! Error kinds for the dispatch controller
//!
//! Registry consistency violations (id mismatches, zero priority, built-in
//! initialization mismatches) are not represented here: they are implementation
//! bugs, not recoverable conditions, and surface as panics/debug assertions at
//! the point of detection instead of threading through `Result`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("job {job_id}: protocol violation: {message}")]
    Protocol { job_id: u64, message: String },

    #[error("job {job_id}: worker exited abnormally (status: {status:?})")]
    WorkerCrash { job_id: u64, status: Option<i32> },

    #[error("resource exhaustion: {0}")]
    ResourceExhausted(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
