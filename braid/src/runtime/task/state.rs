use std::fmt;

/// Lifecycle state of a task.
///
/// Transitions are monotonic along
/// `Created → Ready → Running → {Suspended → Ready, Done | Cancelled | Failed}`;
/// nothing leaves a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// The task exists but has not been queued yet.
    Created,

    /// The task sits in the ready queue.
    Ready,

    /// The task's future is being polled on the control thread.
    Running,

    /// The task is parked on a wait-key.
    Suspended,

    /// The future returned a value.
    Done,

    /// A cancellation request was delivered at a suspension point.
    Cancelled,

    /// The future panicked.
    Failed,
}

impl TaskState {
    /// Returns `true` for `Done`, `Cancelled` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Done | TaskState::Cancelled | TaskState::Failed
        )
    }

    /// Returns `true` if moving from `self` to `next` is legal.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;

        matches!(
            (self, next),
            (Created, Ready)
                | (Ready, Running)
                | (Running, Suspended)
                | (Running, Done)
                | (Running, Cancelled)
                | (Running, Failed)
                | (Suspended, Ready)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Created => "created",
            TaskState::Ready => "ready",
            TaskState::Running => "running",
            TaskState::Suspended => "suspended",
            TaskState::Done => "done",
            TaskState::Cancelled => "cancelled",
            TaskState::Failed => "failed",
        };

        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::TaskState::*;

    #[test]
    fn happy_path_is_legal() {
        assert!(Created.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Running));
        assert!(Running.can_transition_to(Suspended));
        assert!(Suspended.can_transition_to(Ready));
        assert!(Running.can_transition_to(Done));
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [Done, Cancelled, Failed] {
            assert!(terminal.is_terminal());
            for next in [Created, Ready, Running, Suspended, Done, Cancelled, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn no_shortcuts() {
        assert!(!Ready.can_transition_to(Cancelled));
        assert!(!Suspended.can_transition_to(Running));
        assert!(!Created.can_transition_to(Running));
    }
}
