//! # Noderun
//!
//! Hosts typed Rust callables as nodes of a remote graph engine.
//!
//! A host fills a [`Registry`] with nodes built through [`NodeBuilder`], then
//! serves it. The engine connects, asks for the catalog (`discovery`), binds
//! node instances to graph slots (`init`) and runs them (`exec`).
//!
//! ```text
//! Registry (shared, read-only)
//!    │
//!    ├── Session (connection 1) ── ActiveNode #7, ActiveNode #8
//!    └── Session (connection 2) ── ActiveNode #7
//! ```
//!
//! Instance ids are scoped to their connection.

pub mod builder;
pub mod config;
pub mod context;
pub mod instance;
pub mod mock_transport;
pub mod node;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;
pub mod types;
pub mod value;
pub mod ws;

pub use builder::NodeBuilder;
pub use builder::Param;
pub use config::ServerConfig;
pub use context::Context;
pub use instance::ActiveNode;
pub use node::AsyncNode;
pub use node::Call;
pub use node::Callable;
pub use node::NodeDescriptor;
pub use registry::Registry;
pub use server::Server;
pub use session::Session;
pub use transport::Transport;
pub use types::HostValue;
pub use types::Ty;
pub use types::TypeTable;
