//! Captcha task definitions.
//!
//! A `TaskKind` describes what to solve and is validated once, when it is
//! built. A `Task` tracks one submission of that kind through the remote
//! service until it reaches a terminal state.

mod state;
mod types;

pub use state::{Task, TaskState};
pub use types::{InvalidTask, TaskId, TaskKind, V3Score};
