//! # Connection Session
//!
//! Serves one engine connection: decodes each frame, dispatches it against the
//! registry and this connection's active instances, and sends the reply.
//!
//! ## Invariants
//! - Frames are handled one at a time, in arrival order. Two `exec`s on one
//!   connection never overlap.
//! - A failing frame yields an `error` reply; the loop keeps going.
//! - Debug messages emitted during an `exec` are sent before its `exec_ok`.
//! - Instances belong to the session and are dropped with it.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use pinwire::Command;
use pinwire::Discovery;
use pinwire::DiscoveryOptions;
use pinwire::ExecCommand;
use pinwire::ExecReply;
use pinwire::IncomingMessage;
use pinwire::InitCommand;
use pinwire::NodeSpec;
use pinwire::OutgoingMessage;
use pinwire::Reply;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::context::Context;
use crate::instance::ActiveNode;
use crate::node::Call;
use crate::node::Callable;
use crate::node::NodeDescriptor;
use crate::registry::Registry;
use crate::transport;
use crate::transport::Transport;
use crate::types;

/// Failures of a single command. Each one becomes the text of an `error` reply.
#[derive(Debug)]
pub enum Error {
    Decode(pinwire::Error),
    UnsupportedCommand,
    NotFound(String),
    CardinalityMismatch { pins: &'static str, expected: usize, got: usize },
    /// `exec` addressed an instance id that was never initialized.
    UnknownInstance(u64),
    InputCount { expected: usize, got: usize },
    Input { index: usize, source: types::Error },
    Output(String),
    Node(anyhow::Error),
    Panicked(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "{}", e),
            Self::UnsupportedCommand => write!(f, "unsupported command"),
            Self::NotFound(name) => write!(f, "node {} not found", name),
            Self::CardinalityMismatch { pins, expected, got } => {
                write!(f, "expected {} {}, got {}", expected, pins, got)
            }
            Self::UnknownInstance(id) => write!(f, "node {} is not initialized", id),
            Self::InputCount { expected, got } => write!(f, "expected {} inputs, got {}", expected, got),
            Self::Input { index, source } => write!(f, "input {}: {}", index, source),
            Self::Output(msg) => write!(f, "bad node output: {}", msg),
            Self::Node(e) => write!(f, "{:#}", e),
            Self::Panicked(msg) => write!(f, "node panicked: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<pinwire::Error> for Error {
    fn from(e: pinwire::Error) -> Self {
        match e {
            pinwire::Error::UnsupportedCommand(_) => Self::UnsupportedCommand,
            e => Self::Decode(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Per-connection protocol state.
pub struct Session {
    registry: Arc<Registry>,
    options: DiscoveryOptions,
    instances: HashMap<u64, ActiveNode>,
}

impl Session {
    pub fn new(registry: Arc<Registry>, options: DiscoveryOptions) -> Self {
        Self {
            registry,
            options,
            instances: HashMap::new(),
        }
    }

    pub fn instance(&self, id: u64) -> Option<&ActiveNode> {
        self.instances.get(&id)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Serves frames from `transport` until the peer closes the stream.
    ///
    /// Returns an error only when the transport itself fails.
    pub async fn run(mut self, transport: &dyn Transport) -> transport::Result<()> {
        let (debug_tx, mut debug_rx) = mpsc::unbounded_channel();

        while let Some(payload) = transport.recv().await? {
            tracing::debug!("<-- {}", String::from_utf8_lossy(&payload));

            let reply = {
                let handling = self.handle(&payload, &debug_tx);
                tokio::pin!(handling);
                loop {
                    tokio::select! {
                        biased;
                        reply = &mut handling => break reply,
                        Some(frame) = debug_rx.recv() => send_frame(transport, &frame).await?,
                    }
                }
            };

            while let Ok(frame) = debug_rx.try_recv() {
                send_frame(transport, &frame).await?;
            }
            send_frame(transport, &reply).await?;
        }

        tracing::debug!(instances = self.instances.len(), "peer closed; dropping instances");
        Ok(())
    }

    /// Handles one frame and returns its reply.
    ///
    /// Debug messages produced meanwhile are pushed to `debug_tx`.
    pub async fn handle(
        &mut self,
        payload: &[u8],
        debug_tx: &mpsc::UnboundedSender<OutgoingMessage>,
    ) -> OutgoingMessage {
        let message = match IncomingMessage::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                let (id, node) = pinwire::decode_header(payload).unwrap_or((0, None));
                let error = Error::from(e);
                tracing::warn!(id, ?node, %error, "rejected frame");
                return OutgoingMessage::error(id, node, error.to_string());
            }
        };

        let (id, node) = (message.id, message.node);
        let tag = message.command.tag();
        match self.dispatch(message, debug_tx).await {
            Ok(reply) => OutgoingMessage::new(id, node, reply),
            Err(error) => {
                tracing::warn!(id, ?node, command = tag, %error, "command failed");
                OutgoingMessage::error(id, node, error.to_string())
            }
        }
    }

    async fn dispatch(
        &mut self,
        message: IncomingMessage,
        debug_tx: &mpsc::UnboundedSender<OutgoingMessage>,
    ) -> Result<Reply> {
        match message.command {
            Command::Discovery => Ok(self.discovery()),
            Command::Init(init) => self.init(message.node, init),
            Command::Exec(exec) => self.exec(message.node, exec, debug_tx).await,
        }
    }

    fn discovery(&self) -> Reply {
        Reply::DiscoveryOk(Discovery {
            options: self.options,
            types: self.registry.type_specs(),
            nodes: self.registry.specs(),
        })
    }

    fn init(&mut self, node: Option<u64>, init: InitCommand) -> Result<Reply> {
        let descriptor = self
            .registry
            .lookup(&init.node_type)
            .map_err(|_| Error::NotFound(init.node_type.clone()))?;

        check_cardinality(descriptor.spec(), &init)?;

        let instance_id = node.unwrap_or(0);
        tracing::debug!(instance_id, node_type = %init.node_type, node_id = %init.node_id, "initialized instance");
        self.instances
            .insert(instance_id, ActiveNode::new(descriptor, init.node_id));
        Ok(Reply::InitOk)
    }

    async fn exec(
        &mut self,
        node: Option<u64>,
        exec: ExecCommand,
        debug_tx: &mpsc::UnboundedSender<OutgoingMessage>,
    ) -> Result<Reply> {
        let instance_id = node.unwrap_or(0);
        let instance = self
            .instances
            .get_mut(&instance_id)
            .ok_or(Error::UnknownInstance(instance_id))?;
        let descriptor = Arc::clone(instance.descriptor());

        let expected = descriptor.input_types().len();
        if exec.inputs.len() != expected {
            return Err(Error::InputCount { expected, got: exec.inputs.len() });
        }

        let types = self.registry.types();
        let inputs = descriptor
            .input_types()
            .iter()
            .zip(exec.inputs)
            .enumerate()
            .map(|(index, (ty, value))| {
                types.decode(ty, value).map_err(|source| Error::Input { index, source })
            })
            .collect::<Result<Vec<_>>>()?;

        let context = descriptor
            .first_arg_is_context()
            .then(|| Context::new(node, instance.take_state(), debug_tx.clone()));

        tracing::debug!(
            instance_id,
            node = descriptor.name(),
            is_async = descriptor.callable().is_async(),
            "executing"
        );
        let mut call = Call::new(inputs, context);
        let result = invoke(descriptor.callable(), &mut call).await;

        // The context owns the only copy of the state; persist it whatever the outcome.
        if let Some(context) = call.take_context() {
            instance.store_state(context.into_state());
        }

        let outputs = normalize_outputs(&descriptor, result?)?;
        Ok(Reply::ExecOk(ExecReply {
            exec_id: exec.exec_id,
            outputs,
        }))
    }
}

fn check_cardinality(spec: &NodeSpec, init: &InitCommand) -> Result<()> {
    let inputs = spec.input_counts();
    let outputs = spec.output_counts();
    let checks = [
        ("flow inputs", inputs.flow, init.exec_inputs.len()),
        ("flow outputs", outputs.flow, init.exec_outputs.len()),
        ("data inputs", inputs.data, init.data_inputs.len()),
        ("data outputs", outputs.data, init.data_outputs.len()),
    ];

    for (pins, expected, got) in checks {
        if expected != got {
            return Err(Error::CardinalityMismatch { pins, expected, got });
        }
    }
    Ok(())
}

async fn invoke(callable: &Callable, call: &mut Call) -> Result<Value> {
    let outcome = match callable {
        Callable::Sync(f) => std::panic::catch_unwind(AssertUnwindSafe(|| f(call))),
        Callable::Async(node) => AssertUnwindSafe(node.call(call)).catch_unwind().await,
    };

    match outcome {
        Ok(result) => result.map_err(Error::Node),
        Err(panic) => Err(Error::Panicked(panic_message(&*panic))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Turns a node's return value into the reply's output list.
///
/// Tuple nodes must return an array of the declared length; other nodes
/// have their value wrapped. Nodes without data outputs reply with an empty
/// list rather than `[null]`, whatever they returned.
fn normalize_outputs(descriptor: &NodeDescriptor, value: Value) -> Result<Vec<Value>> {
    let expected = descriptor.output_types().len();

    if descriptor.tuple_output() {
        return match value {
            Value::Array(items) if items.len() == expected => Ok(items),
            Value::Array(items) => Err(Error::Output(format!(
                "expected {} outputs, got {}",
                expected,
                items.len()
            ))),
            other => Err(Error::Output(format!(
                "expected a sequence of {} outputs, got {}",
                expected, other
            ))),
        };
    }

    if expected == 0 {
        Ok(Vec::new())
    } else {
        Ok(vec![value])
    }
}

async fn send_frame(transport: &dyn Transport, frame: &OutgoingMessage) -> transport::Result<()> {
    let bytes = match frame.encode() {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(id = frame.id, error = %e, "dropping unencodable frame");
            return Ok(());
        }
    };
    tracing::debug!("--> {}", String::from_utf8_lossy(&bytes));
    transport.send(&bytes).await
}
