//! # Node Registry
//!
//! Catalog of every node type a host offers, keyed by qualified name.
//!
//! The host program fills the registry before serving, then shares it as
//! `Arc<Registry>`; connections only read from it. Registration order is kept
//! so discovery lists nodes the way they were registered.

use std::collections::HashMap;
use std::sync::Arc;

use pinwire::NodeSpec;
use pinwire::TypeSpec;

use crate::builder;
use crate::builder::NodeBuilder;
use crate::node::NodeDescriptor;
use crate::types::TypeTable;

#[derive(Debug)]
pub enum Error {
    Build(builder::Error),
    /// A node with this qualified name already exists; the first one is kept.
    DuplicateName(String),
    NotFound(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Build(e) => write!(f, "{}", e),
            Self::DuplicateName(name) => write!(f, "Node {} is already registered", name),
            Self::NotFound(name) => write!(f, "Node {} not found", name),
        }
    }
}

impl std::error::Error for Error {}

impl From<builder::Error> for Error {
    fn from(e: builder::Error) -> Self {
        Self::Build(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Default)]
pub struct Registry {
    namespace: Option<String>,
    types: TypeTable,
    nodes: Vec<Arc<NodeDescriptor>>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Creates an empty registry with the built-in type table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry whose node names are prefixed with `namespace/`.
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Custom types must be added before the nodes that use them.
    pub fn types_mut(&mut self) -> &mut TypeTable {
        &mut self.types
    }

    /// Adds a built descriptor under its qualified name.
    pub fn register(&mut self, descriptor: NodeDescriptor) -> Result<Arc<NodeDescriptor>> {
        let name = descriptor.name().to_string();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateName(name));
        }

        tracing::debug!(
            node = %name,
            inputs = descriptor.spec().inputs.len(),
            outputs = descriptor.spec().outputs.len(),
            "registered node"
        );

        let descriptor = Arc::new(descriptor);
        self.index.insert(name, self.nodes.len());
        self.nodes.push(Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Builds a node against this registry's types and namespace, then registers it.
    pub fn register_node(&mut self, builder: NodeBuilder) -> Result<Arc<NodeDescriptor>> {
        let descriptor = builder.build(&self.types, self.namespace.as_deref())?;
        self.register(descriptor)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<NodeDescriptor>> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.nodes[i]))
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Specs of every registered node, in registration order.
    pub fn specs(&self) -> Vec<NodeSpec> {
        self.nodes.iter().map(|node| node.spec().clone()).collect()
    }

    pub fn type_specs(&self) -> Vec<TypeSpec> {
        self.types.type_specs()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
