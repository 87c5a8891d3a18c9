//! # Pinwire
//!
//! Message shapes for the node host protocol: the graph engine discovers the
//! node catalog, binds instances with `init`, and runs them with `exec`.
//!
//! ## Format
//!
//! One JSON object per frame. Every frame carries an integer `id`, an optional
//! instance `node`, and exactly one command (or reply) key:
//!
//! ```text
//! {"id": 1, "discovery": {}}
//! {"id": 2, "node": 7, "init": {"node_id": "n7", "node_type": "math/add", ...}}
//! {"id": 3, "node": 7, "exec": {"exec_id": 1, "time": 0, "inputs": [2, 3]}}
//! {"id": 3, "node": 7, "exec_ok": {"exec_id": 1, "outputs": [5]}}
//! ```

pub mod error;
pub mod frame;
pub mod types;

pub use error::Error;
pub use error::Result;
pub use frame::Command;
pub use frame::DataSocket;
pub use frame::Discovery;
pub use frame::DiscoveryOptions;
pub use frame::Empty;
pub use frame::ExecCommand;
pub use frame::ExecReply;
pub use frame::FlowSocket;
pub use frame::IncomingMessage;
pub use frame::InitCommand;
pub use frame::OutgoingMessage;
pub use frame::Reply;
pub use frame::decode_header;
pub use types::NodeSpec;
pub use types::PinContainer;
pub use types::PinCount;
pub use types::PinCounts;
pub use types::PinSpec;
pub use types::TypeSpec;
pub use types::WireType;

#[cfg(test)]
mod tests;
