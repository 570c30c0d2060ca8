// Typed dataflow engine: executors connected by edges, driven to quiescence

pub mod agent;
pub mod context;
pub mod dag;
pub mod engine;
pub mod executor;
pub mod message;

pub use agent::{AgentReply, WorkflowAgent};
pub use context::WorkflowContext;
pub use dag::{Topology, Workflow, WorkflowBuilder};
pub use engine::{CancelHandle, DispatchMode, RunOptions, RunResult};
pub use executor::{Executor, Handler, HandlerFuture};
pub use message::{Message, TypeTag, WorkflowOutput};
