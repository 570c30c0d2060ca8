use crate::types::{ExecutorId, RunId, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An entry in a run's event log
///
/// Events are observational only: no executor ever consumes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub id: String,
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl WorkflowEvent {
    pub fn new(run_id: RunId, kind: EventKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            run_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Human-readable payload of the event
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    /// Executor the event is about, if any
    pub fn executor_id(&self) -> Option<&ExecutorId> {
        match &self.kind {
            EventKind::RunStarted { start_executor } => Some(start_executor),
            EventKind::ExecutorInvoked { executor_id, .. }
            | EventKind::ExecutorCompleted { executor_id, .. }
            | EventKind::ExecutorFailed { executor_id, .. }
            | EventKind::MessageUndelivered { executor_id, .. }
            | EventKind::Custom { executor_id, .. }
            | EventKind::OutputYielded { executor_id, .. } => Some(executor_id),
            EventKind::RunIdle { .. } | EventKind::RunCancelled { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, EventKind::ExecutorFailed { .. })
    }
}

/// Types of events recorded during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // Run lifecycle
    RunStarted {
        start_executor: ExecutorId,
    },
    RunIdle {
        status: RunStatus,
    },
    RunCancelled {
        pending_deliveries: usize,
    },

    // Executor lifecycle
    ExecutorInvoked {
        executor_id: ExecutorId,
        message_type: String,
    },
    ExecutorCompleted {
        executor_id: ExecutorId,
        messages_sent: usize,
        duration_ms: u64,
    },
    ExecutorFailed {
        executor_id: ExecutorId,
        error: String,
    },
    MessageUndelivered {
        executor_id: ExecutorId,
        message_type: String,
    },

    // Emitted by handlers
    Custom {
        executor_id: ExecutorId,
        message: String,
    },
    OutputYielded {
        executor_id: ExecutorId,
        output_type: String,
    },
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::RunStarted { start_executor } => {
                write!(f, "run started at {}", start_executor)
            }
            EventKind::RunIdle { status } => write!(f, "run idle ({})", status),
            EventKind::RunCancelled { pending_deliveries } => {
                write!(f, "run cancelled with {} pending deliveries", pending_deliveries)
            }
            EventKind::ExecutorInvoked {
                executor_id,
                message_type,
            } => write!(f, "{} invoked with {}", executor_id, message_type),
            EventKind::ExecutorCompleted {
                executor_id,
                messages_sent,
                duration_ms,
            } => write!(
                f,
                "{} completed in {}ms, {} message(s) sent",
                executor_id, duration_ms, messages_sent
            ),
            EventKind::ExecutorFailed { executor_id, error } => {
                write!(f, "{} failed: {}", executor_id, error)
            }
            EventKind::MessageUndelivered {
                executor_id,
                message_type,
            } => write!(
                f,
                "{} sent {} but has no successor to receive it",
                executor_id, message_type
            ),
            EventKind::Custom { message, .. } => f.write_str(message),
            EventKind::OutputYielded {
                executor_id,
                output_type,
            } => write!(f, "{} yielded {}", executor_id, output_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_event_message_is_verbatim() {
        let event = WorkflowEvent::new(
            RunId::new(),
            EventKind::Custom {
                executor_id: ExecutorId::new("fetch"),
                message: "Found 3 resource groups".to_string(),
            },
        );

        assert_eq!(event.message(), "Found 3 resource groups");
        assert_eq!(event.executor_id().unwrap().as_str(), "fetch");
        assert!(!event.is_error());
    }

    #[test]
    fn test_failed_event_serializes_with_tag() {
        let event = WorkflowEvent::new(
            RunId::new(),
            EventKind::ExecutorFailed {
                executor_id: ExecutorId::new("boom"),
                error: "no route".to_string(),
            },
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"]["type"], "executor_failed");
        assert_eq!(value["kind"]["executor_id"], "boom");
        assert!(event.is_error());
        assert_eq!(event.message(), "boom failed: no route");
    }
}
