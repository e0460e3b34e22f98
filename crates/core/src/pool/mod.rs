//! Worker pool that turns one captcha kind into a stream of solutions.
//!
//! A `Solver` owns a session: a rate gate, a cancellation signal and the
//! task counters shared by all of its workers. Each worker repeatedly
//! submits a task, polls it to completion and publishes the outcome on a
//! bounded channel.
//!
//! Two modes are supported:
//! - `Fixed`: deliver exactly `total` solutions, then stop and close the channels
//! - `Persistent`: keep solving until cancelled, channels close on `close()`

mod config;
mod lifecycle;
mod session;
mod solver;
mod types;
mod worker;

pub use config::PoolConfig;
pub use solver::{Solver, SolverBuilder};
pub use types::{PoolError, SolveMode, SolverOutput, SolverStats, Stage, TaskError};
