use super::context::WorkflowContext;
use super::message::{Message, TypeTag};
use crate::error::WorkflowError;
use crate::types::ExecutorId;
use futures::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

/// Future returned by a type-erased handler
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

type ErasedHandler = Arc<dyn Fn(Message, WorkflowContext) -> HandlerFuture + Send + Sync>;

/// Object-style handler for one input type
///
/// A single type may implement `Handler<I>` for several `I`; each
/// implementation is registered on the executor separately and the engine
/// picks one by the runtime type of the incoming message.
#[async_trait::async_trait]
pub trait Handler<I: Send + 'static>: Send + Sync + 'static {
    async fn handle(&self, input: I, ctx: WorkflowContext) -> anyhow::Result<()>;
}

struct HandlerEntry {
    input: TypeTag,
    call: ErasedHandler,
}

struct ExecutorInner {
    id: ExecutorId,
    handlers: Vec<HandlerEntry>,
    sends: Option<Vec<TypeTag>>,
}

/// A named unit of computation in a workflow graph
///
/// Cloning an `Executor` is cheap and yields a handle to the same executor;
/// builders use that identity to tell a re-registration apart from an id
/// collision.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

impl Executor {
    /// Create an executor with no handlers yet
    pub fn new(id: impl Into<ExecutorId>) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                id: id.into(),
                handlers: Vec::new(),
                sends: None,
            }),
        }
    }

    /// Executor backed by a single async function
    pub fn from_fn<I, F, Fut>(id: impl Into<ExecutorId>, f: F) -> Self
    where
        I: Any + Send + 'static,
        F: Fn(I, WorkflowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(id).with_fn(f)
    }

    /// Executor backed by a [`Handler`] object
    pub fn from_handler<I, H>(id: impl Into<ExecutorId>, handler: H) -> Self
    where
        I: Any + Send + 'static,
        H: Handler<I>,
    {
        Self::new(id).with_handler::<I, H>(Arc::new(handler))
    }

    /// Add a function handler for input type `I`
    pub fn with_fn<I, F, Fut>(self, f: F) -> Self
    where
        I: Any + Send + 'static,
        F: Fn(I, WorkflowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let f = Arc::new(f);
        let call: ErasedHandler = Arc::new(
            move |message: Message, ctx: WorkflowContext| -> HandlerFuture {
                let f = f.clone();
                Box::pin(async move {
                    let input = expect_input::<I>(message, &ctx)?;
                    (*f)(input, ctx).await
                })
            },
        );
        self.push_handler(TypeTag::of::<I>(), call)
    }

    /// Add an object handler for input type `I`
    pub fn with_handler<I, H>(self, handler: Arc<H>) -> Self
    where
        I: Any + Send + 'static,
        H: Handler<I>,
    {
        let call: ErasedHandler = Arc::new(
            move |message: Message, ctx: WorkflowContext| -> HandlerFuture {
                let handler = handler.clone();
                Box::pin(async move {
                    let input = expect_input::<I>(message, &ctx)?;
                    Handler::<I>::handle(handler.as_ref(), input, ctx).await
                })
            },
        );
        self.push_handler(TypeTag::of::<I>(), call)
    }

    /// Declare `T` as a message type this executor sends
    ///
    /// Once any type is declared, `send_message` rejects undeclared types and
    /// the builder checks that every successor accepts one of them.
    pub fn sends<T: Any>(self) -> Self {
        let mut inner = self.into_inner();
        inner
            .sends
            .get_or_insert_with(Vec::new)
            .push(TypeTag::of::<T>());
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn id(&self) -> &ExecutorId {
        &self.inner.id
    }

    /// Input types this executor has handlers for, in registration order
    pub fn input_types(&self) -> Vec<TypeTag> {
        self.inner.handlers.iter().map(|h| h.input).collect()
    }

    /// Declared outgoing message types, `None` if undeclared
    pub fn sent_types(&self) -> Option<&[TypeTag]> {
        self.inner.sends.as_deref()
    }

    pub fn accepts(&self, tag: &TypeTag) -> bool {
        self.inner.handlers.iter().any(|h| &h.input == tag)
    }

    /// Whether two handles point at the same executor
    pub fn same_as(&self, other: &Executor) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Structural checks run by the workflow builder
    pub(crate) fn validate(&self) -> Result<(), WorkflowError> {
        if self.inner.handlers.is_empty() {
            return Err(WorkflowError::NoHandlers(self.id().clone()));
        }
        for (i, entry) in self.inner.handlers.iter().enumerate() {
            if self.inner.handlers[..i].iter().any(|h| h.input == entry.input) {
                return Err(WorkflowError::DuplicateHandler {
                    executor: self.id().clone(),
                    type_name: entry.input.name(),
                });
            }
        }
        Ok(())
    }

    /// Select the handler for the message's type and start it
    pub(crate) fn dispatch(
        &self,
        message: Message,
        ctx: WorkflowContext,
    ) -> Result<HandlerFuture, WorkflowError> {
        let tag = message.tag();
        let entry = self
            .inner
            .handlers
            .iter()
            .find(|h| h.input == tag)
            .ok_or_else(|| WorkflowError::UnhandledMessageType {
                executor: self.id().clone(),
                type_name: tag.name(),
            })?;
        Ok((entry.call)(message, ctx))
    }

    fn push_handler(self, input: TypeTag, call: ErasedHandler) -> Self {
        let mut inner = self.into_inner();
        inner.handlers.push(HandlerEntry { input, call });
        Self {
            inner: Arc::new(inner),
        }
    }

    fn into_inner(self) -> ExecutorInner {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner,
            // Shared handle: copy the table so other holders are unaffected
            Err(shared) => ExecutorInner {
                id: shared.id.clone(),
                handlers: shared
                    .handlers
                    .iter()
                    .map(|h| HandlerEntry {
                        input: h.input,
                        call: h.call.clone(),
                    })
                    .collect(),
                sends: shared.sends.clone(),
            },
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("id", &self.inner.id)
            .field(
                "inputs",
                &self
                    .inner
                    .handlers
                    .iter()
                    .map(|h| h.input.name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn expect_input<I: Any>(message: Message, ctx: &WorkflowContext) -> anyhow::Result<I> {
    message.downcast::<I>().map_err(|message| {
        WorkflowError::UnhandledMessageType {
            executor: ctx.executor_id().clone(),
            type_name: message.type_name(),
        }
        .into()
    })
}
