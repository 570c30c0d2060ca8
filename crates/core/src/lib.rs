// Core engine for cloudhelper: typed executors, workflows and runs

pub mod error;
pub mod events;
pub mod input;
pub mod types;
pub mod workflow;

pub use error::{WorkflowError, WorkflowResult};
pub use events::{EventKind, WorkflowEvent};
pub use input::{parse_with_fallback, InputValue};
pub use types::*;
pub use workflow::{
    AgentReply, CancelHandle, DispatchMode, Executor, Handler, Message, RunOptions, RunResult,
    Topology, Workflow, WorkflowAgent, WorkflowBuilder, WorkflowContext, WorkflowOutput,
};
