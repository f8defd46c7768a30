use crate::error::BridgeError;
use hostlink_types::{CallbackId, Value};
use std::fmt;
use std::sync::Arc;

/// Destination of callback deliveries, implemented by the dispatcher.
pub trait CallbackSink: Send + Sync {
    fn deliver(&self, id: CallbackId, args: Vec<Value>) -> Result<(), BridgeError>;
}

/// A script function handed to a native method.
///
/// `invoke` consumes the callback, so each one reaches the script at most
/// once. Dropping it without invoking is allowed.
pub struct Callback {
    id: CallbackId,
    sink: Arc<dyn CallbackSink>,
}

impl Callback {
    pub(crate) fn new(id: CallbackId, sink: Arc<dyn CallbackSink>) -> Self {
        Self { id, sink }
    }

    pub fn id(&self) -> CallbackId {
        self.id
    }

    /// Post the callback to the script context. Returns once it is queued.
    pub fn invoke(self, args: Vec<Value>) -> Result<(), BridgeError> {
        self.sink.deliver(self.id, args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback").field(&self.id).finish()
    }
}
