use crate::types::ExecutorId;
use std::any::{Any, TypeId};

type Payload = Box<dyn Any + Send + Sync>;

/// Runtime identity of a message or output type
#[derive(Debug, Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl std::hash::Hash for TypeTag {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// A typed payload travelling along an edge
///
/// The payload is type-erased but cloneable, so a message sent to several
/// successors is delivered as an independent copy on every edge.
pub struct Message {
    payload: Payload,
    tag: TypeTag,
    clone_payload: fn(&Payload) -> Payload,
    source: Option<ExecutorId>,
    target: Option<ExecutorId>,
}

fn clone_as<T: Any + Send + Sync + Clone>(payload: &Payload) -> Payload {
    match payload.downcast_ref::<T>() {
        Some(value) => Box::new(value.clone()),
        None => unreachable!("message payload does not match its type tag"),
    }
}

impl Message {
    pub fn new<T: Any + Send + Sync + Clone>(value: T) -> Self {
        Self {
            payload: Box::new(value),
            tag: TypeTag::of::<T>(),
            clone_payload: clone_as::<T>,
            source: None,
            target: None,
        }
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn type_name(&self) -> &'static str {
        self.tag.name()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.tag.type_id() == TypeId::of::<T>()
    }

    /// Executor that sent this message, `None` for the start message
    pub fn source(&self) -> Option<&ExecutorId> {
        self.source.as_ref()
    }

    /// Explicit delivery target, `None` means every direct successor
    pub fn target(&self) -> Option<&ExecutorId> {
        self.target.as_ref()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Take the payload out, or get the message back if `T` is the wrong type
    pub fn downcast<T: Any>(self) -> Result<T, Message> {
        if !self.is::<T>() {
            return Err(self);
        }
        let Message {
            payload,
            tag,
            clone_payload,
            source,
            target,
        } = self;
        match payload.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(payload) => Err(Message {
                payload,
                tag,
                clone_payload,
                source,
                target,
            }),
        }
    }

    pub(crate) fn with_source(mut self, source: ExecutorId) -> Self {
        self.source = Some(source);
        self
    }

    pub(crate) fn with_target(mut self, target: Option<ExecutorId>) -> Self {
        self.target = target;
        self
    }
}

impl Clone for Message {
    fn clone(&self) -> Self {
        Self {
            payload: (self.clone_payload)(&self.payload),
            tag: self.tag,
            clone_payload: self.clone_payload,
            source: self.source.clone(),
            target: self.target.clone(),
        }
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("type", &self.tag.name())
            .field("source", &self.source)
            .field("target", &self.target)
            .finish()
    }
}

/// A value yielded as workflow-level output
pub struct WorkflowOutput {
    source: ExecutorId,
    tag: TypeTag,
    value: Payload,
}

impl WorkflowOutput {
    pub(crate) fn new<T: Any + Send + Sync>(source: ExecutorId, value: T) -> Self {
        Self {
            source,
            tag: TypeTag::of::<T>(),
            value: Box::new(value),
        }
    }

    /// Executor that yielded the value
    pub fn source(&self) -> &ExecutorId {
        &self.source
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn is<T: Any>(&self) -> bool {
        self.tag.type_id() == TypeId::of::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn into_inner<T: Any>(self) -> Result<T, WorkflowOutput> {
        let WorkflowOutput { source, tag, value } = self;
        match value.downcast::<T>() {
            Ok(v) => Ok(*v),
            Err(value) => Err(WorkflowOutput { source, tag, value }),
        }
    }
}

impl std::fmt::Debug for WorkflowOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOutput")
            .field("source", &self.source)
            .field("type", &self.tag.name())
            .finish()
    }
}
