use super::context::{RunShared, WorkflowContext};
use super::dag::Workflow;
use super::message::{Message, WorkflowOutput};
use crate::events::{EventKind, WorkflowEvent};
use crate::types::{ExecutorId, RunId, RunStatus};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

/// How ready invocations are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// One invocation at a time, strictly in queue order
    #[default]
    Sequential,
    /// Up to `max_in_flight` invocations at once
    Concurrent { max_in_flight: usize },
}

impl DispatchMode {
    fn max_in_flight(self) -> usize {
        match self {
            DispatchMode::Sequential => 1,
            DispatchMode::Concurrent { max_in_flight } => max_in_flight.max(1),
        }
    }
}

/// Run-scoped cancellation flag
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-run options
#[derive(Debug, Default)]
pub struct RunOptions {
    pub dispatch: DispatchMode,
    pub cancel: Option<CancelHandle>,
    /// Receives a copy of every event as it is recorded
    pub observer: Option<mpsc::UnboundedSender<WorkflowEvent>>,
}

impl RunOptions {
    pub fn concurrent(max_in_flight: usize) -> Self {
        Self {
            dispatch: DispatchMode::Concurrent { max_in_flight },
            ..Default::default()
        }
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        self.observer = Some(observer);
        self
    }
}

/// Everything a finished run produced
#[derive(Debug)]
pub struct RunResult {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    status: RunStatus,
    outputs: Vec<WorkflowOutput>,
    events: Vec<WorkflowEvent>,
    invocations: usize,
}

impl RunResult {
    /// Yielded values, in the order they were yielded
    pub fn get_outputs(&self) -> &[WorkflowOutput] {
        &self.outputs
    }

    /// Yielded values of type `T`, skipping outputs of other types
    pub fn outputs_of<T: Any>(&self) -> Vec<&T> {
        self.outputs
            .iter()
            .filter_map(|o| o.downcast_ref::<T>())
            .collect()
    }

    pub fn into_outputs(self) -> Vec<WorkflowOutput> {
        self.outputs
    }

    pub fn get_final_state(&self) -> RunStatus {
        self.status
    }

    pub fn events(&self) -> &[WorkflowEvent] {
        &self.events
    }

    /// Executor failure events
    pub fn errors(&self) -> Vec<&WorkflowEvent> {
        self.events.iter().filter(|e| e.is_error()).collect()
    }

    /// Ids of executors that failed at least once, first failure first
    pub fn failed_executors(&self) -> Vec<ExecutorId> {
        let mut failed: Vec<ExecutorId> = Vec::new();
        for id in self.errors().into_iter().filter_map(|e| e.executor_id()) {
            if !failed.contains(id) {
                failed.push(id.clone());
            }
        }
        failed
    }

    /// Number of handler invocations started during the run
    pub fn invocations(&self) -> usize {
        self.invocations
    }
}

struct Completed {
    executor_id: ExecutorId,
    ctx: WorkflowContext,
    elapsed_ms: u64,
    result: Result<(), String>,
}

impl Workflow {
    /// Run to quiescence with default options
    pub async fn run<T>(&self, input: T) -> RunResult
    where
        T: Any + Send + Sync + Clone,
    {
        self.run_with(Message::new(input), RunOptions::default())
            .await
    }

    /// Run in the background, streaming events as they are recorded
    pub fn run_stream(
        &self,
        message: Message,
        options: RunOptions,
    ) -> (mpsc::UnboundedReceiver<WorkflowEvent>, JoinHandle<RunResult>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let workflow = self.clone();
        let handle =
            tokio::spawn(async move { workflow.run_with(message, options.with_observer(tx)).await });
        (rx, handle)
    }

    /// Deliver `message` to the start executor and process the work queue
    /// until no executor has pending work
    pub async fn run_with(&self, message: Message, options: RunOptions) -> RunResult {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let shared = RunShared::new(run_id, options.observer);
        let cancel = options.cancel.unwrap_or_default();
        let mut cancel_rx = cancel.subscribe();
        let max_in_flight = options.dispatch.max_in_flight();

        tracing::info!(
            "Starting workflow run: run_id={}, workflow={}",
            run_id,
            self.name().unwrap_or("unnamed")
        );
        shared
            .record(EventKind::RunStarted {
                start_executor: self.start_executor().clone(),
            })
            .await;

        let mut queue: VecDeque<(ExecutorId, Message)> = VecDeque::new();
        queue.push_back((self.start_executor().clone(), message));
        let mut in_flight: JoinSet<Completed> = JoinSet::new();
        let mut watching_cancel = true;
        let mut invocations = 0;
        let mut any_failed = false;
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            while in_flight.len() < max_in_flight {
                let Some((executor_id, message)) = queue.pop_front() else {
                    break;
                };
                invocations += 1;
                if !self
                    .start_invocation(&mut in_flight, &shared, executor_id, message)
                    .await
                {
                    any_failed = true;
                }
            }

            if in_flight.is_empty() {
                if queue.is_empty() {
                    break;
                }
                continue;
            }

            tokio::select! {
                changed = cancel_rx.changed(), if watching_cancel => {
                    if changed.is_err() {
                        watching_cancel = false;
                    }
                }
                joined = in_flight.join_next() => match joined {
                    Some(Ok(done)) => {
                        if !self.finish_invocation(done, &shared, &mut queue).await {
                            any_failed = true;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!("Invocation task aborted: run_id={}, error={}", run_id, e);
                        any_failed = true;
                    }
                    None => {}
                },
            }
        }

        let pending_deliveries = queue.len() + in_flight.len();
        in_flight.shutdown().await;

        let (status, events, outputs) = {
            let mut ledger = shared.ledger.lock().await;
            let status = if cancelled {
                ledger.record(run_id, EventKind::RunCancelled { pending_deliveries });
                RunStatus::Cancelled
            } else {
                let status = if !ledger.outputs.is_empty() {
                    RunStatus::Completed
                } else if any_failed {
                    RunStatus::Failed
                } else {
                    RunStatus::IdleWithNoOutput
                };
                ledger.record(run_id, EventKind::RunIdle { status });
                status
            };
            let (events, outputs) = ledger.finish();
            (status, events, outputs)
        };

        match status {
            RunStatus::Cancelled => tracing::warn!(
                "Workflow run cancelled: run_id={}, pending_deliveries={}",
                run_id,
                pending_deliveries
            ),
            _ => tracing::info!(
                "Workflow run finished: run_id={}, status={}, outputs={}, invocations={}",
                run_id,
                status,
                outputs.len(),
                invocations
            ),
        }

        RunResult {
            run_id,
            started_at,
            completed_at: Utc::now(),
            status,
            outputs,
            events,
            invocations,
        }
    }

    /// Spawn one handler invocation; `false` if it failed before starting
    async fn start_invocation(
        &self,
        in_flight: &mut JoinSet<Completed>,
        shared: &Arc<RunShared>,
        executor_id: ExecutorId,
        message: Message,
    ) -> bool {
        shared
            .record(EventKind::ExecutorInvoked {
                executor_id: executor_id.clone(),
                message_type: message.type_name().to_string(),
            })
            .await;

        let Some(executor) = self.executor(&executor_id) else {
            // Targets come from validated edges, so this only guards misuse
            self.record_failure(shared, &executor_id, "executor is not part of this workflow")
                .await;
            return false;
        };

        tracing::debug!(
            "Dispatching {} to {}: run_id={}",
            message.type_name(),
            executor_id,
            shared.run_id
        );

        let ctx = WorkflowContext::new(
            executor_id.clone(),
            self.successors(&executor_id),
            executor.sent_types().map(Arc::from),
            shared.clone(),
        );

        let future = match executor.dispatch(message, ctx.clone()) {
            Ok(future) => future,
            Err(e) => {
                self.record_failure(shared, &executor_id, &e.to_string()).await;
                return false;
            }
        };

        in_flight.spawn(async move {
            let started = Instant::now();
            let result = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(format!("{:#}", e)),
                Err(panic) => Err(panic_message(panic.as_ref())),
            };
            Completed {
                executor_id,
                ctx,
                elapsed_ms: started.elapsed().as_millis() as u64,
                result,
            }
        });

        true
    }

    /// Route a finished invocation's outbox; `false` if the handler failed
    async fn finish_invocation(
        &self,
        done: Completed,
        shared: &Arc<RunShared>,
        queue: &mut VecDeque<(ExecutorId, Message)>,
    ) -> bool {
        let outbox = done.ctx.take_outbox().await;

        if let Err(error) = done.result {
            if !outbox.is_empty() {
                tracing::debug!(
                    "Discarding {} message(s) from failed executor {}",
                    outbox.len(),
                    done.executor_id
                );
            }
            self.record_failure(shared, &done.executor_id, &error).await;
            return false;
        }

        shared
            .record(EventKind::ExecutorCompleted {
                executor_id: done.executor_id.clone(),
                messages_sent: outbox.len(),
                duration_ms: done.elapsed_ms,
            })
            .await;

        for message in outbox {
            if let Some(target) = message.target() {
                queue.push_back((target.clone(), message));
                continue;
            }

            let successors = self.successors(&done.executor_id);
            if successors.is_empty() {
                shared
                    .record(EventKind::MessageUndelivered {
                        executor_id: done.executor_id.clone(),
                        message_type: message.type_name().to_string(),
                    })
                    .await;
                continue;
            }
            for successor in successors.iter() {
                queue.push_back((successor.clone(), message.clone()));
            }
        }

        true
    }

    async fn record_failure(&self, shared: &RunShared, executor_id: &ExecutorId, error: &str) {
        tracing::warn!(
            "Executor {} failed: run_id={}, error={}",
            executor_id,
            shared.run_id,
            error
        );
        shared
            .record(EventKind::ExecutorFailed {
                executor_id: executor_id.clone(),
                error: error.to_string(),
            })
            .await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("handler panicked: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::dag::WorkflowBuilder;
    use crate::workflow::executor::Executor;
    use crate::workflow::context::WorkflowContext;
    use std::time::Duration;
    use tokio::sync::Barrier;

    fn uppercase() -> Executor {
        Executor::from_fn("upper_case", |text: String, ctx: WorkflowContext| async move {
            ctx.send_message(text.to_uppercase()).await?;
            anyhow::Ok(())
        })
        .sends::<String>()
    }

    fn reverse() -> Executor {
        Executor::from_fn("reverse_text", |text: String, ctx: WorkflowContext| async move {
            ctx.yield_output(text.chars().rev().collect::<String>()).await;
            anyhow::Ok(())
        })
    }

    fn yielder(id: &str, value: &'static str) -> Executor {
        Executor::from_fn(id, move |_: String, ctx: WorkflowContext| async move {
            ctx.yield_output(value.to_string()).await;
            anyhow::Ok(())
        })
    }

    fn broadcaster(id: &str) -> Executor {
        Executor::from_fn(id, |text: String, ctx: WorkflowContext| async move {
            ctx.send_message(text).await?;
            anyhow::Ok(())
        })
    }

    #[tokio::test]
    async fn test_uppercase_then_reverse() {
        let upper = uppercase();
        let rev = reverse();
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&upper)
            .add_edge(&upper, &rev)
            .build()
            .unwrap();

        let result = workflow.run("hello world".to_string()).await;

        assert_eq!(result.get_final_state(), RunStatus::Completed);
        assert_eq!(result.outputs_of::<String>(), vec!["DLROW OLLEH"]);
        assert_eq!(result.get_outputs().len(), 1);
        assert_eq!(result.get_outputs()[0].source().as_str(), "reverse_text");
        assert_eq!(result.invocations(), 2);
    }

    /// One object handling two input types, remembering which handler ran
    #[derive(Default)]
    struct Tally {
        seen: std::sync::Mutex<Vec<&'static str>>,
    }

    #[async_trait::async_trait]
    impl crate::workflow::executor::Handler<String> for Tally {
        async fn handle(&self, input: String, ctx: WorkflowContext) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push("text");
            ctx.yield_output(format!("text:{}", input)).await;
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl crate::workflow::executor::Handler<u32> for Tally {
        async fn handle(&self, input: u32, ctx: WorkflowContext) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push("count");
            ctx.yield_output(format!("count:{}", input)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_object_executor_dispatches_by_message_type() {
        let split = Executor::from_fn("split", |text: String, ctx: WorkflowContext| async move {
            let length = text.chars().count() as u32;
            ctx.send_message(text).await?;
            ctx.send_message(length).await?;
            anyhow::Ok(())
        })
        .sends::<String>()
        .sends::<u32>();

        let tally = Arc::new(Tally::default());
        let counter = Executor::new("tally")
            .with_handler::<String, _>(tally.clone())
            .with_handler::<u32, _>(tally.clone());

        let workflow = WorkflowBuilder::new()
            .set_start_executor(&split)
            .add_edge(&split, &counter)
            .build()
            .unwrap();

        let result = workflow.run("hello".to_string()).await;

        assert_eq!(result.get_final_state(), RunStatus::Completed);
        assert_eq!(result.invocations(), 3);
        assert_eq!(result.outputs_of::<String>(), vec!["text:hello", "count:5"]);
        assert_eq!(*tally.seen.lock().unwrap(), vec!["text", "count"]);
        assert!(result.errors().is_empty());
    }

    #[tokio::test]
    async fn test_single_object_handler_as_start() {
        struct Shout;

        #[async_trait::async_trait]
        impl crate::workflow::executor::Handler<String> for Shout {
            async fn handle(&self, input: String, ctx: WorkflowContext) -> anyhow::Result<()> {
                ctx.yield_output(input.to_uppercase()).await;
                Ok(())
            }
        }

        let shout = Executor::from_handler::<String, _>("shout", Shout);
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&shout)
            .build()
            .unwrap();

        let result = workflow.run("hi".to_string()).await;

        assert_eq!(result.outputs_of::<String>(), vec!["HI"]);
    }

    #[tokio::test]
    async fn test_chain_outputs_only_from_yielding_executor() {
        let a = broadcaster("a");
        let b = yielder("b", "from b");
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&a)
            .add_edge(&a, &b)
            .build()
            .unwrap();

        let result = workflow.run("go".to_string()).await;

        assert_eq!(result.outputs_of::<String>(), vec!["from b"]);
    }

    #[tokio::test]
    async fn test_fan_out_partial_failure_is_isolated() {
        let start = broadcaster("start");
        let healthy = yielder("healthy", "ok");
        let broken = Executor::from_fn("broken", |_: String, _ctx: WorkflowContext| async move {
            Err::<(), _>(anyhow::anyhow!("subscription not found"))
        });

        let workflow = WorkflowBuilder::new()
            .set_start_executor(&start)
            .add_edge(&start, &broken)
            .add_edge(&start, &healthy)
            .build()
            .unwrap();

        let result = workflow.run("go".to_string()).await;

        assert_eq!(result.get_final_state(), RunStatus::Completed);
        assert_eq!(result.outputs_of::<String>(), vec!["ok"]);
        assert_eq!(result.failed_executors(), vec![ExecutorId::new("broken")]);
        let errors = result.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message().contains("subscription not found"));
    }

    #[tokio::test]
    async fn test_lone_executor_goes_idle() {
        let lone = broadcaster("lone");
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&lone)
            .build()
            .unwrap();

        let result = workflow.run("ping".to_string()).await;

        assert_eq!(result.get_final_state(), RunStatus::IdleWithNoOutput);
        assert_eq!(result.invocations(), 1);
        assert!(result.get_outputs().is_empty());
        assert!(result
            .events()
            .iter()
            .any(|e| matches!(e.kind, EventKind::MessageUndelivered { .. })));
    }

    #[tokio::test]
    async fn test_lone_executor_keeps_direct_outputs() {
        let lone = yielder("lone", "done");
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&lone)
            .build()
            .unwrap();

        let result = workflow.run("ping".to_string()).await;

        assert_eq!(result.get_final_state(), RunStatus::Completed);
        assert_eq!(result.invocations(), 1);
        assert_eq!(result.outputs_of::<String>(), vec!["done"]);
    }

    #[tokio::test]
    async fn test_only_failure_means_failed() {
        let broken = Executor::from_fn("broken", |_: String, _ctx: WorkflowContext| async move {
            Err::<(), _>(anyhow::anyhow!("throttled"))
        });
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&broken)
            .build()
            .unwrap();

        let result = workflow.run("x".to_string()).await;

        assert_eq!(result.get_final_state(), RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_failed_executor_outbox_is_discarded() {
        let flaky = Executor::from_fn("flaky", |text: String, ctx: WorkflowContext| async move {
            ctx.send_message(text).await?;
            Err::<(), _>(anyhow::anyhow!("failed after sending"))
        });
        let next = yielder("next", "should not appear");
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&flaky)
            .add_edge(&flaky, &next)
            .build()
            .unwrap();

        let result = workflow.run("x".to_string()).await;

        assert_eq!(result.invocations(), 1);
        assert!(result.get_outputs().is_empty());
        assert_eq!(result.get_final_state(), RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_unhandled_message_type_fails_target_only() {
        let numbers = Executor::from_fn("numbers", |_: String, ctx: WorkflowContext| async move {
            ctx.send_message(7u32).await?;
            ctx.yield_output("numbers done".to_string()).await;
            anyhow::Ok(())
        });
        let text_only = yielder("text_only", "unreachable");
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&numbers)
            .add_edge(&numbers, &text_only)
            .build()
            .unwrap();

        let result = workflow.run("x".to_string()).await;

        assert_eq!(result.outputs_of::<String>(), vec!["numbers done"]);
        assert_eq!(result.failed_executors(), vec![ExecutorId::new("text_only")]);
        assert!(result.errors()[0].message().contains("no handler for u32"));
    }

    #[tokio::test]
    async fn test_panicking_handler_is_caught() {
        let start = broadcaster("start");
        let panicky = Executor::from_fn("panicky", |_: String, _ctx: WorkflowContext| async move {
            if true {
                panic!("index out of range");
            }
            anyhow::Ok(())
        });
        let healthy = yielder("healthy", "still here");
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&start)
            .add_edge(&start, &panicky)
            .add_edge(&start, &healthy)
            .build()
            .unwrap();

        let result = workflow.run("x".to_string()).await;

        assert_eq!(result.outputs_of::<String>(), vec!["still here"]);
        assert!(result.errors()[0].message().contains("handler panicked: index out of range"));
    }

    #[tokio::test]
    async fn test_deep_chain_terminates() {
        let depth = 200;
        let step = |i: usize| {
            Executor::from_fn(format!("step_{}", i), |n: u32, ctx: WorkflowContext| async move {
                if ctx.successors().is_empty() {
                    ctx.yield_output(n).await;
                } else {
                    ctx.send_message(n + 1).await?;
                }
                anyhow::Ok(())
            })
        };
        let steps: Vec<Executor> = (0..depth).map(step).collect();

        let mut builder = WorkflowBuilder::new().set_start_executor(&steps[0]);
        for pair in steps.windows(2) {
            builder = builder.add_edge(&pair[0], &pair[1]);
        }
        let workflow = builder.build().unwrap();

        let result = workflow.run(0u32).await;

        assert_eq!(result.outputs_of::<u32>(), vec![&(depth as u32 - 1)]);
        assert_eq!(result.invocations(), depth);
    }

    #[tokio::test]
    async fn test_binary_tree_terminates() {
        // Heap layout: node i has children 2i+1 and 2i+2
        let nodes: Vec<Executor> = (0..63).map(|i| broadcaster(&format!("n{}", i))).collect();
        let leaves: Vec<Executor> = (63..127)
            .map(|i| yielder(&format!("n{}", i), "leaf"))
            .collect();
        let all: Vec<&Executor> = nodes.iter().chain(leaves.iter()).collect();

        let mut builder = WorkflowBuilder::new().set_start_executor(all[0]);
        for i in 0..63 {
            builder = builder
                .add_edge(all[i], all[2 * i + 1])
                .add_edge(all[i], all[2 * i + 2]);
        }
        let workflow = builder.build().unwrap();

        let result = workflow.run("root".to_string()).await;

        assert_eq!(result.get_outputs().len(), 64);
        assert_eq!(result.invocations(), 127);
    }

    #[tokio::test]
    async fn test_fan_out_order_is_fifo_when_sequential() {
        let start = broadcaster("start");
        let first = yielder("first", "1");
        let second = yielder("second", "2");
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&start)
            .add_edge(&start, &first)
            .add_edge(&start, &second)
            .build()
            .unwrap();

        let result = workflow.run("x".to_string()).await;

        assert_eq!(result.outputs_of::<String>(), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_targeted_send_reaches_one_successor() {
        let router = Executor::from_fn("router", |text: String, ctx: WorkflowContext| async move {
            ctx.send_message_to(text, "right").await?;
            anyhow::Ok(())
        });
        let left = yielder("left", "left");
        let right = yielder("right", "right");
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&router)
            .add_edge(&router, &left)
            .add_edge(&router, &right)
            .build()
            .unwrap();

        let result = workflow.run("x".to_string()).await;

        assert_eq!(result.outputs_of::<String>(), vec!["right"]);
    }

    #[tokio::test]
    async fn test_concurrent_mode_runs_branches_together() {
        let barrier = Arc::new(Barrier::new(2));
        let waiter = |id: &str| {
            let barrier = barrier.clone();
            Executor::from_fn(id, move |text: String, ctx: WorkflowContext| {
                let barrier = barrier.clone();
                async move {
                    // Only passes if the sibling is in flight at the same time
                    barrier.wait().await;
                    ctx.yield_output(text).await;
                    anyhow::Ok(())
                }
            })
        };
        let start = broadcaster("start");
        let left = waiter("left");
        let right = waiter("right");
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&start)
            .add_edge(&start, &left)
            .add_edge(&start, &right)
            .build()
            .unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            workflow.run_with(Message::new("x".to_string()), RunOptions::concurrent(4)),
        )
        .await
        .unwrap();

        assert_eq!(result.get_outputs().len(), 2);
        assert_eq!(result.get_final_state(), RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_between_steps() {
        let cancel = CancelHandle::new();
        let handle = cancel.clone();
        let start = Executor::from_fn("start", move |text: String, ctx: WorkflowContext| {
            let handle = handle.clone();
            async move {
                ctx.send_message(text).await?;
                handle.cancel();
                anyhow::Ok(())
            }
        });
        let next = yielder("next", "never");
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&start)
            .add_edge(&start, &next)
            .build()
            .unwrap();

        let result = workflow
            .run_with(
                Message::new("x".to_string()),
                RunOptions::default().with_cancel(cancel),
            )
            .await;

        assert_eq!(result.get_final_state(), RunStatus::Cancelled);
        assert_eq!(result.invocations(), 1);
        assert!(result.events().iter().any(|e| matches!(
            e.kind,
            EventKind::RunCancelled {
                pending_deliveries: 1
            }
        )));
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_handler() {
        let stuck = Executor::from_fn("stuck", |_: String, _ctx: WorkflowContext| async move {
            std::future::pending::<()>().await;
            anyhow::Ok(())
        });
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&stuck)
            .build()
            .unwrap();

        let cancel = CancelHandle::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            workflow.run_with(
                Message::new("x".to_string()),
                RunOptions::default().with_cancel(cancel),
            ),
        )
        .await
        .unwrap();

        assert_eq!(result.get_final_state(), RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_run_stream_delivers_events() {
        let upper = uppercase();
        let rev = reverse();
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&upper)
            .add_edge(&upper, &rev)
            .build()
            .unwrap();

        let (mut events, handle) =
            workflow.run_stream(Message::new("abc".to_string()), RunOptions::default());

        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(event);
        }
        let result = handle.await.unwrap();

        assert_eq!(seen.len(), result.events().len());
        assert!(matches!(seen[0].kind, EventKind::RunStarted { .. }));
        assert!(matches!(
            seen.last().unwrap().kind,
            EventKind::RunIdle {
                status: RunStatus::Completed
            }
        ));
    }

    #[tokio::test]
    async fn test_custom_events_are_logged_in_order() {
        let chatty = Executor::from_fn("chatty", |_: String, ctx: WorkflowContext| async move {
            ctx.add_event("first").await;
            ctx.add_event("second").await;
            anyhow::Ok(())
        });
        let workflow = WorkflowBuilder::new()
            .set_start_executor(&chatty)
            .build()
            .unwrap();

        let result = workflow.run("x".to_string()).await;

        let custom: Vec<String> = result
            .events()
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Custom { .. }))
            .map(|e| e.message())
            .collect();
        assert_eq!(custom, vec!["first", "second"]);
    }
}
