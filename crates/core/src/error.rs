use crate::types::ExecutorId;
use thiserror::Error;

/// Errors raised while building or driving a workflow
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    // Build-time topology errors
    #[error("workflow has no start executor")]
    MissingStartExecutor,

    #[error("start executor set more than once ({first} then {second})")]
    StartExecutorAlreadySet {
        first: ExecutorId,
        second: ExecutorId,
    },

    #[error("two different executors share the id {0}")]
    DuplicateExecutorId(ExecutorId),

    #[error("executor {0} has no registered handler")]
    NoHandlers(ExecutorId),

    #[error("executor {executor} registers more than one handler for {type_name}")]
    DuplicateHandler {
        executor: ExecutorId,
        type_name: &'static str,
    },

    #[error("edge {source_id} -> {target} references unknown executor {missing}")]
    DanglingEdge {
        source_id: ExecutorId,
        target: ExecutorId,
        missing: ExecutorId,
    },

    #[error("edge {source_id} -> {target}: target accepts none of [{sent}]")]
    IncompatibleEdge {
        source_id: ExecutorId,
        target: ExecutorId,
        sent: String,
    },

    #[error("workflow contains circular dependencies")]
    CycleDetected,

    // Run-time contract errors
    #[error("executor {executor} has no handler for {type_name}")]
    UnhandledMessageType {
        executor: ExecutorId,
        type_name: &'static str,
    },

    #[error("executor {executor} does not declare {type_name} as a message type it sends")]
    UndeclaredMessageType {
        executor: ExecutorId,
        type_name: &'static str,
    },

    #[error("{target} is not a successor of {executor}")]
    NotASuccessor {
        executor: ExecutorId,
        target: ExecutorId,
    },
}

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;
