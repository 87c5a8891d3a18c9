//! # Node Callables
//!
//! What a registered node runs, and what it is handed when it runs.
//!
//! Synchronous nodes are plain functions over [`Call`]; asynchronous nodes
//! implement [`AsyncNode`]. Both return the node's outputs as JSON: a single
//! value for single-output nodes, an array for tuple-output nodes.

use std::sync::Arc;

use anyhow::Context as _;
use anyhow::anyhow;
use async_trait::async_trait;
use pinwire::NodeSpec;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::Context;
use crate::types::Ty;

/// Signature of a synchronous node.
pub type SyncFn = dyn Fn(&mut Call) -> anyhow::Result<Value> + Send + Sync;

/// A node whose body awaits.
///
/// The connection's loop awaits the returned future; no other message on the
/// same connection is handled until it completes.
#[async_trait]
pub trait AsyncNode: Send + Sync + 'static {
    async fn call(&self, call: &mut Call) -> anyhow::Result<Value>;
}

#[derive(Clone)]
pub enum Callable {
    Sync(Arc<SyncFn>),
    Async(Arc<dyn AsyncNode>),
}

impl Callable {
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => write!(f, "Callable::Sync"),
            Self::Async(_) => write!(f, "Callable::Async"),
        }
    }
}

/// Arguments of one invocation: decoded positional inputs and, for nodes
/// declaring one, the context.
#[derive(Debug)]
pub struct Call {
    inputs: Vec<Value>,
    context: Option<Context>,
}

impl Call {
    pub fn new(inputs: Vec<Value>, context: Option<Context>) -> Self {
        Self { inputs, context }
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn inputs(&self) -> &[Value] {
        &self.inputs
    }

    /// Raw JSON of the input at `index`.
    pub fn input(&self, index: usize) -> anyhow::Result<&Value> {
        self.inputs
            .get(index)
            .ok_or_else(|| anyhow!("input {} out of range ({} inputs)", index, self.inputs.len()))
    }

    /// Deserializes the input at `index` into `T`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> anyhow::Result<T> {
        let value = self.input(index)?.clone();
        serde_json::from_value(value).with_context(|| format!("input {} has the wrong shape", index))
    }

    /// The context, if the node declared one.
    pub fn context(&mut self) -> anyhow::Result<&mut Context> {
        self.context
            .as_mut()
            .ok_or_else(|| anyhow!("node does not take a context"))
    }

    pub(crate) fn take_context(&mut self) -> Option<Context> {
        self.context.take()
    }
}

/// Registry entry for one node type. Immutable once built.
#[derive(Debug)]
pub struct NodeDescriptor {
    pub(crate) callable: Callable,
    pub(crate) spec: NodeSpec,
    pub(crate) first_arg_is_context: bool,
    pub(crate) tuple_output: bool,
    pub(crate) input_types: Vec<Ty>,
    pub(crate) output_types: Vec<Ty>,
}

impl NodeDescriptor {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &NodeSpec {
        &self.spec
    }

    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    pub fn first_arg_is_context(&self) -> bool {
        self.first_arg_is_context
    }

    pub fn tuple_output(&self) -> bool {
        self.tuple_output
    }

    /// Declared types of the data inputs, excluding the context.
    pub fn input_types(&self) -> &[Ty] {
        &self.input_types
    }

    pub fn output_types(&self) -> &[Ty] {
        &self.output_types
    }
}
