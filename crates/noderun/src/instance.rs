//! # Active Node Instance
//!
//! One live binding of a node type to a slot in the engine's graph. Owned by
//! the connection that initialized it and dropped with it.

use std::any::Any;
use std::sync::Arc;

use crate::node::NodeDescriptor;

pub struct ActiveNode {
    descriptor: Arc<NodeDescriptor>,
    /// Engine-side identifier from the `init` command, kept for diagnostics.
    node_id: String,
    state: Option<Box<dyn Any + Send>>,
}

impl ActiveNode {
    /// A freshly initialized instance has no state.
    pub fn new(descriptor: Arc<NodeDescriptor>, node_id: impl Into<String>) -> Self {
        Self {
            descriptor,
            node_id: node_id.into(),
            state: None,
        }
    }

    pub fn descriptor(&self) -> &Arc<NodeDescriptor> {
        &self.descriptor
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn has_state(&self) -> bool {
        self.state.is_some()
    }

    pub(crate) fn take_state(&mut self) -> Option<Box<dyn Any + Send>> {
        self.state.take()
    }

    /// Replaces the state wholesale.
    pub(crate) fn store_state(&mut self, state: Option<Box<dyn Any + Send>>) {
        self.state = state;
    }
}

impl std::fmt::Debug for ActiveNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveNode")
            .field("node_type", &self.descriptor.name())
            .field("node_id", &self.node_id)
            .field("has_state", &self.state.is_some())
            .finish()
    }
}
