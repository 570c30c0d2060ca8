use super::message::{Message, TypeTag, WorkflowOutput};
use crate::error::WorkflowError;
use crate::events::{EventKind, WorkflowEvent};
use crate::types::{ExecutorId, RunId};
use std::any::Any;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Event log and output sequence of one run
///
/// This is the only state shared between concurrently running handlers, so
/// every append goes through the mutex in [`RunShared`].
pub(crate) struct RunLedger {
    pub(crate) events: Vec<WorkflowEvent>,
    pub(crate) outputs: Vec<WorkflowOutput>,
    observer: Option<mpsc::UnboundedSender<WorkflowEvent>>,
}

impl RunLedger {
    pub(crate) fn record(&mut self, run_id: RunId, kind: EventKind) {
        let event = WorkflowEvent::new(run_id, kind);
        if let Some(observer) = &self.observer {
            // A dropped receiver only means nobody is watching any more
            let _ = observer.send(event.clone());
        }
        self.events.push(event);
    }

    /// Take the accumulated events and outputs and close the observer stream
    pub(crate) fn finish(&mut self) -> (Vec<WorkflowEvent>, Vec<WorkflowOutput>) {
        self.observer = None;
        (
            std::mem::take(&mut self.events),
            std::mem::take(&mut self.outputs),
        )
    }
}

pub(crate) struct RunShared {
    pub(crate) run_id: RunId,
    pub(crate) ledger: Mutex<RunLedger>,
}

impl RunShared {
    pub(crate) fn new(
        run_id: RunId,
        observer: Option<mpsc::UnboundedSender<WorkflowEvent>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            run_id,
            ledger: Mutex::new(RunLedger {
                events: Vec::new(),
                outputs: Vec::new(),
                observer,
            }),
        })
    }

    pub(crate) async fn record(&self, kind: EventKind) {
        self.ledger.lock().await.record(self.run_id, kind);
    }
}

/// Per-invocation handle given to an executor's handler
///
/// Messages sent through the context are held in an outbox and delivered by
/// the engine only after the handler returns `Ok`. Events and outputs are
/// appended to the run immediately.
#[derive(Clone)]
pub struct WorkflowContext {
    executor_id: ExecutorId,
    successors: Arc<[ExecutorId]>,
    sends: Option<Arc<[TypeTag]>>,
    shared: Arc<RunShared>,
    outbox: Arc<Mutex<Vec<Message>>>,
}

impl WorkflowContext {
    pub(crate) fn new(
        executor_id: ExecutorId,
        successors: Arc<[ExecutorId]>,
        sends: Option<Arc<[TypeTag]>>,
        shared: Arc<RunShared>,
    ) -> Self {
        Self {
            executor_id,
            successors,
            sends,
            shared,
            outbox: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn executor_id(&self) -> &ExecutorId {
        &self.executor_id
    }

    pub fn run_id(&self) -> RunId {
        self.shared.run_id
    }

    /// Direct successors of the current executor, in edge order
    pub fn successors(&self) -> &[ExecutorId] {
        &self.successors
    }

    /// Send `value` to every direct successor
    pub async fn send_message<T>(&self, value: T) -> Result<(), WorkflowError>
    where
        T: Any + Send + Sync + Clone,
    {
        self.enqueue(Message::new(value), None).await
    }

    /// Send `value` to one direct successor
    pub async fn send_message_to<T>(
        &self,
        value: T,
        target: impl Into<ExecutorId>,
    ) -> Result<(), WorkflowError>
    where
        T: Any + Send + Sync + Clone,
    {
        let target = target.into();
        if !self.successors.contains(&target) {
            return Err(WorkflowError::NotASuccessor {
                executor: self.executor_id.clone(),
                target,
            });
        }
        self.enqueue(Message::new(value), Some(target)).await
    }

    /// Append a custom record to the run's event log
    pub async fn add_event(&self, message: impl Into<String>) {
        self.shared
            .record(EventKind::Custom {
                executor_id: self.executor_id.clone(),
                message: message.into(),
            })
            .await;
    }

    /// Append `value` to the run's outputs
    pub async fn yield_output<T>(&self, value: T)
    where
        T: Any + Send + Sync,
    {
        let output = WorkflowOutput::new(self.executor_id.clone(), value);
        let output_type = output.tag().name().to_string();

        let mut ledger = self.shared.ledger.lock().await;
        ledger.outputs.push(output);
        ledger.record(
            self.shared.run_id,
            EventKind::OutputYielded {
                executor_id: self.executor_id.clone(),
                output_type,
            },
        );
    }

    pub(crate) async fn take_outbox(&self) -> Vec<Message> {
        std::mem::take(&mut *self.outbox.lock().await)
    }

    async fn enqueue(
        &self,
        message: Message,
        target: Option<ExecutorId>,
    ) -> Result<(), WorkflowError> {
        if let Some(sends) = &self.sends {
            if !sends.contains(&message.tag()) {
                return Err(WorkflowError::UndeclaredMessageType {
                    executor: self.executor_id.clone(),
                    type_name: message.type_name(),
                });
            }
        }

        let message = message
            .with_source(self.executor_id.clone())
            .with_target(target);
        self.outbox.lock().await.push(message);
        Ok(())
    }
}
