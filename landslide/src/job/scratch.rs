//! Scoped scratch files
//!
//! Config/results files are exclusively owned by the job that created them
//! and deleted once the worker releases them; log files are retained on
//! disk. Both are expressed as one RAII wrapper so every exit path --
//! including an aborted job -- releases the file, the way the teacher wraps
//! process/file handles in owning structs.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::Builder;

pub struct ScratchFile {
    path: PathBuf,
    retain: bool,
}

impl ScratchFile {
    /// Create a uniquely-named file under `dir` with the given `prefix`
    /// (e.g. `config-3.landslide.`), matching the `XXXXXX`-suffixed
    /// templates of the external interface.
    fn create(dir: &Path, prefix: &str, retain: bool) -> io::Result<(Self, File)> {
        let named = Builder::new().prefix(prefix).rand_bytes(6).tempfile_in(dir)?;
        let (file, path) = named.keep().map_err(|e| e.error)?;
        Ok((Self { path, retain }, file))
    }

    pub fn config(dir: &Path, job_id: u64) -> io::Result<(Self, File)> {
        Self::create(dir, &format!("config-{job_id}.landslide."), false)
    }

    pub fn results(dir: &Path, job_id: u64) -> io::Result<(Self, File)> {
        Self::create(dir, &format!("results-{job_id}.landslide."), false)
    }

    pub fn log(dir: &Path, job_id: u64, stream: &str) -> io::Result<(Self, File)> {
        Self::create(dir, &format!("landslide-{job_id}-{stream}.log."), true)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name only, for passing to a worker whose working directory is
    /// already rebased to this file's directory.
    pub fn relative_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .expect("scratch file name must be valid UTF-8")
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.retain {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
