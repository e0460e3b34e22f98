//! Per-submission task state machine.

use std::fmt;

use tokio::time::Instant;

use super::TaskId;

/// Lifecycle state of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Submission in flight, no remote id yet.
    Created,
    /// Accepted by the service, waiting for a solution.
    Pending,
    Solved,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Solved | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Created => "created",
            TaskState::Pending => "pending",
            TaskState::Solved => "solved",
            TaskState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One submission, owned by the worker driving it.
#[derive(Debug)]
pub struct Task {
    id: Option<TaskId>,
    state: TaskState,
    polls: u32,
    created_at: Instant,
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

impl Task {
    pub fn new() -> Self {
        Self {
            id: None,
            state: TaskState::Created,
            polls: 0,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> Option<&TaskId> {
        self.id.as_ref()
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Number of poll requests made so far.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// `Created -> Pending` once the service hands out an id.
    pub fn accept(&mut self, id: TaskId) -> bool {
        if self.state != TaskState::Created {
            return false;
        }
        self.id = Some(id);
        self.state = TaskState::Pending;
        true
    }

    /// Count a poll. Never changes the state.
    pub fn record_poll(&mut self) {
        self.polls = self.polls.saturating_add(1);
    }

    /// `Pending -> Solved`.
    pub fn resolve(&mut self) -> bool {
        if self.state != TaskState::Pending {
            return false;
        }
        self.state = TaskState::Solved;
        true
    }

    /// Any non-terminal state -> `Failed`.
    pub fn fail(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = TaskState::Failed;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_is_created() {
        let task = Task::new();
        assert_eq!(task.state(), TaskState::Created);
        assert!(task.id().is_none());
        assert_eq!(task.polls(), 0);
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut task = Task::new();
        assert!(task.accept(TaskId::new("42")));
        assert_eq!(task.state(), TaskState::Pending);
        assert_eq!(task.id().unwrap().as_str(), "42");

        task.record_poll();
        task.record_poll();
        assert_eq!(task.state(), TaskState::Pending);
        assert_eq!(task.polls(), 2);

        assert!(task.resolve());
        assert_eq!(task.state(), TaskState::Solved);
    }

    #[test]
    fn test_cannot_resolve_before_accept() {
        let mut task = Task::new();
        assert!(!task.resolve());
        assert_eq!(task.state(), TaskState::Created);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut task = Task::new();
        task.accept(TaskId::new("1"));
        assert!(task.fail());
        assert!(!task.resolve());
        assert!(!task.fail());
        assert!(!task.accept(TaskId::new("2")));
        assert_eq!(task.state(), TaskState::Failed);
        assert_eq!(task.id().unwrap().as_str(), "1");
    }

    #[test]
    fn test_submit_failure_fails_from_created() {
        let mut task = Task::new();
        assert!(task.fail());
        assert_eq!(task.state().to_string(), "failed");
    }
}
