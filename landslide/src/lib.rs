//! Iterative-deepening dispatch controller for a stateless model checker
//!
//! Owns the process-wide PP registry, dispatches exploration workers as
//! jobs bounded by a configurable degree of parallelism, and speaks the
//! bidirectional messaging protocol that feeds newly discovered preemption
//! points back into the registry between rounds.

pub mod arbiter;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod ppset;
pub mod registry;
