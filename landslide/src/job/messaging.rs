//! Messaging session: the per-job protocol state machine
//!
//! Realizes the handshake/exploration/drain protocol of the specification
//! over a per-job Unix domain socket carrying newline-delimited JSON. The
//! transport is an implementation choice (see DESIGN.md); the state machine
//! and message set are what the specification actually constrains.

use super::JobOutcome;
use crate::error::{Error, Result};
use crate::registry::Registry;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Messages the worker may send during `Exploring`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerMessage {
    Hello { job_id: u64 },
    DiscoveredPp { directive: String, short: String, long: String, priority: u32 },
    SuspectedDataRace { directive: String, short: String, long: String, priority: u32 },
    Progress { elapsed_branches: u64, estimate_secs: Option<u64> },
    BugFound { summary: String },
    Completion { elapsed_branches: u64 },
}

/// Messages the parent may send back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParentMessage {
    PpInterned { directive: String, is_new: bool },
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Handshaking,
    Alive,
    Exploring,
    Draining,
    Closed,
    Dead,
}

/// Per-job bidirectional framed channel to the worker.
pub struct Session {
    job_id: u64,
    sock_path: PathBuf,
    listener: Option<UnixListener>,
    stream: Option<UnixStream>,
    state: SessionState,
}

impl Session {
    /// Prepare transport; `config_file` is recorded only for diagnostics --
    /// the handshake itself rides the socket, not the config file.
    pub fn init(scratch_dir: &Path, job_id: u64, config_file: &Path) -> Result<Self> {
        debug!(job_id, config_file = %config_file.display(), "initializing messaging session");
        let sock_path = scratch_dir.join(format!("landslide-{job_id}.sock"));
        let _ = std::fs::remove_file(&sock_path);
        let listener = UnixListener::bind(&sock_path)?;
        Ok(Self {
            job_id,
            sock_path,
            listener: Some(listener),
            stream: None,
            state: SessionState::Handshaking,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.sock_path
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    /// Block until the worker sends `Hello(job_id)` matching this session, or
    /// until `timeout` elapses. Transitions `Handshaking -> Alive` on success,
    /// `Handshaking -> Dead` on timeout.
    pub fn wait_for_child(&mut self, timeout: Duration) -> Result<bool> {
        let listener = self
            .listener
            .take()
            .expect("wait_for_child must run exactly once per session");

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                let _ = tx.send(stream);
            }
        });

        let stream = match rx.recv_timeout(timeout) {
            Ok(stream) => stream,
            Err(_) => {
                self.state = SessionState::Dead;
                return Ok(false);
            }
        };

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let msg: WorkerMessage = serde_json::from_str(line.trim()).map_err(|e| Error::Protocol {
            job_id: self.job_id,
            message: format!("malformed handshake: {e}"),
        })?;

        match msg {
            WorkerMessage::Hello { job_id } if job_id == self.job_id => {
                self.stream = Some(stream);
                self.state = SessionState::Alive;
                Ok(true)
            }
            other => Err(Error::Protocol {
                job_id: self.job_id,
                message: format!("expected Hello({}), got {other:?}", self.job_id),
            }),
        }
    }

    /// Run the exploration dialogue until the worker signals `Completion`.
    /// Transitions `Alive -> Exploring -> Draining`.
    pub fn talk_to_child(&mut self, generation: u32, registry: &Registry) -> Result<JobOutcome> {
        self.state = SessionState::Exploring;
        let stream = self.stream.as_ref().expect("session must be alive").try_clone()?;
        let mut reader = BufReader::new(stream);

        let mut bug: Option<String> = None;
        loop {
            let mut line = String::new();
            let bytes_read = reader.read_line(&mut line)?;
            if bytes_read == 0 {
                return Err(Error::Protocol {
                    job_id: self.job_id,
                    message: "worker closed the session before signaling completion".to_string(),
                });
            }

            let msg: WorkerMessage = serde_json::from_str(line.trim()).map_err(|e| Error::Protocol {
                job_id: self.job_id,
                message: format!("malformed message: {e}"),
            })?;

            match msg {
                WorkerMessage::Hello { .. } => {
                    return Err(Error::Protocol {
                        job_id: self.job_id,
                        message: "received Hello after handshake completed".to_string(),
                    });
                }
                WorkerMessage::DiscoveredPp { directive, short, long, priority } => {
                    let (_, is_new) = registry.get_or_intern(&directive, &short, &long, priority, generation);
                    self.send(&ParentMessage::PpInterned { directive, is_new })?;
                }
                WorkerMessage::SuspectedDataRace { directive, short, long, priority } => {
                    let (_, is_new) = registry.get_or_intern(&directive, &short, &long, priority, generation);
                    self.send(&ParentMessage::PpInterned { directive, is_new })?;
                }
                WorkerMessage::Progress { elapsed_branches, estimate_secs } => {
                    debug!(job_id = self.job_id, elapsed_branches, ?estimate_secs, "progress heartbeat");
                }
                WorkerMessage::BugFound { summary } => {
                    bug = Some(summary);
                }
                WorkerMessage::Completion { elapsed_branches } => {
                    self.state = SessionState::Draining;
                    return Ok(match bug {
                        Some(summary) => JobOutcome::BugFound { summary, elapsed_branches },
                        None => JobOutcome::Completed { elapsed_branches },
                    });
                }
            }
        }
    }

    /// Ask the worker to abort; it is required to respond with `Completion`
    /// before `Drain` is permitted. Not invoked by the default dispatch loop.
    pub fn request_abort(&self) -> Result<()> {
        self.send(&ParentMessage::Abort)
    }

    fn send(&self, msg: &ParentMessage) -> Result<()> {
        let mut stream = self.stream.as_ref().expect("session must be alive").try_clone()?;
        let mut line = serde_json::to_string(msg).expect("ParentMessage always serializes");
        line.push('\n');
        stream.write_all(line.as_bytes())?;
        stream.flush()?;
        Ok(())
    }

    /// Tear down transport. Final transition to `Closed`.
    pub fn finish(mut self) {
        self.stream = None;
        self.listener = None;
        let _ = std::fs::remove_file(&self.sock_path);
        self.state = SessionState::Closed;
    }
}
