//! # Protocol Frames
//!
//! Defines the inbound (engine → host) and outbound (host → engine) messages.
//!
//! ## Invariants
//! - **One command per frame**: the variant is a top-level key next to `id` and
//!   `node`. A frame with zero or several variants never decodes into a message.
//! - **Panic Safety**: All decoding paths return `Result`, never panicking on unknown data.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de;
use serde::ser::SerializeMap;
use serde_json::Map;
use serde_json::Value;

use crate::error::Error;
use crate::error::Result;
use crate::types::NodeSpec;
use crate::types::TypeSpec;

/// Payload of the field-less variants (`discovery`, `init_ok`), encoded as `{}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Empty {}

/// A control-flow socket of a graph node instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSocket {
    pub label: String,
    pub exec_id: u64,
}

/// A data socket of a graph node instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSocket {
    pub label: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Binds an instance id to a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitCommand {
    pub node_id: String,
    pub node_type: String,
    #[serde(default)]
    pub exec_inputs: Vec<FlowSocket>,
    #[serde(default)]
    pub exec_outputs: Vec<FlowSocket>,
    #[serde(default)]
    pub data_inputs: Vec<DataSocket>,
    #[serde(default)]
    pub data_outputs: Vec<DataSocket>,
}

/// Runs a bound instance once with positional inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecCommand {
    pub exec_id: u64,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub inputs: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecReply {
    pub exec_id: u64,
    pub outputs: Vec<Value>,
}

/// Timeouts the host advertises. The engine enforces them, the host does not.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryOptions {
    pub init_timeout: f64,
    pub exec_timeout: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    pub options: DiscoveryOptions,
    #[serde(default)]
    pub types: Vec<TypeSpec>,
    pub nodes: Vec<NodeSpec>,
}

// ============================================================================
//  INBOUND
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Discovery,
    Init(InitCommand),
    Exec(ExecCommand),
}

impl Command {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Init(_) => "init",
            Self::Exec(_) => "exec",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub id: u64,
    /// Instance id the command addresses; absent means instance 0.
    pub node: Option<u64>,
    pub command: Command,
}

impl IncomingMessage {
    pub fn new(id: u64, node: Option<u64>, command: Command) -> Self {
        Self { id, node, command }
    }

    /// Decodes a frame, separating malformed JSON from command cardinality errors.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let raw: RawIncoming = serde_json::from_slice(bytes)?;
        Self::try_from(raw)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Deserialize)]
struct RawIncoming {
    id: u64,
    #[serde(default)]
    node: Option<u64>,
    #[serde(default)]
    discovery: Option<Empty>,
    #[serde(default)]
    init: Option<InitCommand>,
    #[serde(default)]
    exec: Option<ExecCommand>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TryFrom<RawIncoming> for IncomingMessage {
    type Error = Error;

    fn try_from(raw: RawIncoming) -> Result<Self> {
        let command = match (raw.discovery, raw.init, raw.exec) {
            (Some(_), None, None) => Command::Discovery,
            (None, Some(init), None) => Command::Init(init),
            (None, None, Some(exec)) => Command::Exec(exec),
            (None, None, None) if raw.extra.is_empty() => return Err(Error::MissingCommand),
            (None, None, None) => {
                return Err(Error::UnsupportedCommand(raw.extra.keys().cloned().collect()));
            }
            (discovery, init, exec) => {
                let present = [
                    discovery.map(|_| "discovery"),
                    init.map(|_| "init"),
                    exec.map(|_| "exec"),
                ];
                return Err(Error::AmbiguousCommand(present.into_iter().flatten().collect()));
            }
        };

        Ok(Self { id: raw.id, node: raw.node, command })
    }
}

impl Serialize for IncomingMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        if let Some(node) = self.node {
            map.serialize_entry("node", &node)?;
        }
        match &self.command {
            Command::Discovery => map.serialize_entry("discovery", &Empty {})?,
            Command::Init(init) => map.serialize_entry("init", init)?,
            Command::Exec(exec) => map.serialize_entry("exec", exec)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for IncomingMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawIncoming::deserialize(deserializer)?;
        Self::try_from(raw).map_err(de::Error::custom)
    }
}

// ============================================================================
//  OUTBOUND
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    DiscoveryOk(Discovery),
    InitOk,
    ExecOk(ExecReply),
    Error(String),
    /// Out-of-band log line emitted by a running node.
    DebugMessage(String),
}

impl Reply {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::DiscoveryOk(_) => "discovery_ok",
            Self::InitOk => "init_ok",
            Self::ExecOk(_) => "exec_ok",
            Self::Error(_) => "error",
            Self::DebugMessage(_) => "debug_message",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub id: u64,
    pub node: Option<u64>,
    pub reply: Reply,
}

impl OutgoingMessage {
    pub fn new(id: u64, node: Option<u64>, reply: Reply) -> Self {
        Self { id, node, reply }
    }

    pub fn error(id: u64, node: Option<u64>, message: impl Into<String>) -> Self {
        Self::new(id, node, Reply::Error(message.into()))
    }

    /// Debug messages are not correlated with a request and always carry id 0.
    pub fn debug(node: Option<u64>, message: impl Into<String>) -> Self {
        Self::new(0, node, Reply::DebugMessage(message.into()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let raw: RawOutgoing = serde_json::from_slice(bytes)?;
        Self::try_from(raw)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Deserialize)]
struct RawOutgoing {
    id: u64,
    #[serde(default)]
    node: Option<u64>,
    #[serde(default)]
    discovery_ok: Option<Discovery>,
    #[serde(default)]
    init_ok: Option<Empty>,
    #[serde(default)]
    exec_ok: Option<ExecReply>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    debug_message: Option<String>,
}

impl TryFrom<RawOutgoing> for OutgoingMessage {
    type Error = Error;

    fn try_from(raw: RawOutgoing) -> Result<Self> {
        let present = [
            raw.discovery_ok.as_ref().map(|_| "discovery_ok"),
            raw.init_ok.as_ref().map(|_| "init_ok"),
            raw.exec_ok.as_ref().map(|_| "exec_ok"),
            raw.error.as_ref().map(|_| "error"),
            raw.debug_message.as_ref().map(|_| "debug_message"),
        ];
        let present: Vec<&'static str> = present.into_iter().flatten().collect();
        if present.len() > 1 {
            return Err(Error::AmbiguousCommand(present));
        }

        let reply = if let Some(discovery) = raw.discovery_ok {
            Reply::DiscoveryOk(discovery)
        } else if raw.init_ok.is_some() {
            Reply::InitOk
        } else if let Some(exec) = raw.exec_ok {
            Reply::ExecOk(exec)
        } else if let Some(message) = raw.error {
            Reply::Error(message)
        } else if let Some(message) = raw.debug_message {
            Reply::DebugMessage(message)
        } else {
            return Err(Error::MissingCommand);
        };

        Ok(Self { id: raw.id, node: raw.node, reply })
    }
}

impl Serialize for OutgoingMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        if let Some(node) = self.node {
            map.serialize_entry("node", &node)?;
        }
        let tag = self.reply.tag();
        match &self.reply {
            Reply::DiscoveryOk(discovery) => map.serialize_entry(tag, discovery)?,
            Reply::InitOk => map.serialize_entry(tag, &Empty {})?,
            Reply::ExecOk(exec) => map.serialize_entry(tag, exec)?,
            Reply::Error(message) | Reply::DebugMessage(message) => map.serialize_entry(tag, message)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OutgoingMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawOutgoing::deserialize(deserializer)?;
        Self::try_from(raw).map_err(de::Error::custom)
    }
}

/// Extracts `(id, node)` from a frame whose body failed to decode.
///
/// Used to address an error reply to the request that caused it.
pub fn decode_header(bytes: &[u8]) -> Option<(u64, Option<u64>)> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    let id = value.get("id")?.as_u64()?;
    let node = value.get("node").and_then(Value::as_u64);
    Some((id, node))
}
