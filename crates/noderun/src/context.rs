//! # Node Context
//!
//! The capability a node receives when its first parameter is a context:
//! access to the instance's persisted state and an out-of-band debug channel.
//!
//! A context lives for one `exec`. It takes the instance's state on the way
//! in; whatever state it holds when the node returns is written back.

use std::any::Any;

use pinwire::OutgoingMessage;
use tokio::sync::mpsc;

/// Per-exec view of an active instance.
pub struct Context {
    node: Option<u64>,
    state: Option<Box<dyn Any + Send>>,
    debug_tx: mpsc::UnboundedSender<OutgoingMessage>,
}

impl Context {
    /// Creates a context for instance `node` holding `state`.
    ///
    /// Debug lines are pushed to `debug_tx` as ready-to-send frames.
    pub fn new(
        node: Option<u64>,
        state: Option<Box<dyn Any + Send>>,
        debug_tx: mpsc::UnboundedSender<OutgoingMessage>,
    ) -> Self {
        Self { node, state, debug_tx }
    }

    /// The instance id this context is bound to.
    pub fn node(&self) -> Option<u64> {
        self.node
    }

    pub fn has_state(&self) -> bool {
        self.state.is_some()
    }

    /// Borrows the state if it is present and of type `T`.
    pub fn state<T: Any>(&self) -> Option<&T> {
        self.state.as_deref()?.downcast_ref::<T>()
    }

    pub fn state_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.state.as_deref_mut()?.downcast_mut::<T>()
    }

    /// Replaces the state wholesale.
    pub fn set_state<T: Any + Send>(&mut self, value: T) {
        self.state = Some(Box::new(value));
    }

    pub fn take_state(&mut self) -> Option<Box<dyn Any + Send>> {
        self.state.take()
    }

    pub fn clear_state(&mut self) {
        self.state = None;
    }

    /// Returns the state as `T`, initializing it with `init` when absent.
    ///
    /// Fails when the state holds a value of another type; the state is left as is.
    pub fn get_or_insert_with<T, F>(&mut self, init: F) -> anyhow::Result<&mut T>
    where
        T: Any + Send,
        F: FnOnce() -> T,
    {
        let state = self
            .state
            .get_or_insert_with(|| -> Box<dyn Any + Send> { Box::new(init()) });
        state
            .downcast_mut::<T>()
            .ok_or_else(|| anyhow::anyhow!("node state is not a {}", std::any::type_name::<T>()))
    }

    /// Sends a debug line to the engine, ahead of this exec's reply.
    pub fn debug_log(&self, message: impl Into<String>) {
        let frame = OutgoingMessage::debug(self.node, message);
        if self.debug_tx.send(frame).is_err() {
            tracing::warn!(node = ?self.node, "debug message dropped: connection handler is gone");
        }
    }

    pub(crate) fn into_state(self) -> Option<Box<dyn Any + Send>> {
        self.state
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("node", &self.node)
            .field("has_state", &self.state.is_some())
            .finish()
    }
}
