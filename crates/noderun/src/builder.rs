//! # Node Builder
//!
//! Derives a node's advertised spec from an explicit signature: an ordered
//! list of `(name, type, default)` parameters and an optional return type.
//! The callable itself is never invoked here.
//!
//! ## Rules
//! - Every node gets one leading flow input and one leading flow output.
//! - A context parameter is allowed only in first position and produces no pin.
//! - Every other parameter needs a type, resolved through the type table.
//! - A tuple return yields pins `out1..outN`; any other return yields `out`.

use std::sync::Arc;

use pinwire::NodeSpec;
use pinwire::PinSpec;
use serde_json::Value;

use crate::node::AsyncNode;
use crate::node::Call;
use crate::node::Callable;
use crate::node::NodeDescriptor;
use crate::types;
use crate::types::HostValue;
use crate::types::Ty;
use crate::types::TypeTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No name was supplied and none could be derived from the callable.
    Naming(String),
    MissingAnnotation { node: String, param: String },
    /// A context parameter somewhere other than first.
    Ordering { node: String, param: String, position: usize },
    UnsupportedType { node: String, source: types::Error },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Naming(type_name) => {
                write!(f, "Cannot derive a node name from `{}`; supply one with `name()`", type_name)
            }
            Self::MissingAnnotation { node, param } => {
                write!(f, "Parameter `{}` of `{}` needs a type", param, node)
            }
            Self::Ordering { node, param, position } => write!(
                f,
                "Context parameter `{}` of `{}` must be first, found at position {}",
                param, node, position
            ),
            Self::UnsupportedType { node, source } => write!(f, "Node `{}`: {}", node, source),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::UnsupportedType { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// One declared parameter. `ty: None` models a parameter without a type.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Option<Ty>,
    pub default: Option<Value>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
            default: None,
        }
    }

    pub fn typed(name: impl Into<String>, ty: Ty) -> Self {
        Self {
            name: name.into(),
            ty: Some(ty),
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Fluent builder for a node descriptor.
pub struct NodeBuilder {
    callable: Callable,
    type_name: &'static str,
    name: Option<String>,
    label: Option<String>,
    description: Option<String>,
    params: Vec<Param>,
    returns: Option<Ty>,
}

impl NodeBuilder {
    /// Wraps a synchronous function. Its default name is the function's own name.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&mut Call) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::with_callable(Callable::Sync(Arc::new(f)), std::any::type_name::<F>())
    }

    /// Wraps an asynchronous node. Its default name is the implementing type's name.
    pub fn asynchronous<N: AsyncNode>(node: N) -> Self {
        Self::with_callable(Callable::Async(Arc::new(node)), std::any::type_name::<N>())
    }

    fn with_callable(callable: Callable, type_name: &'static str) -> Self {
        Self {
            callable,
            type_name,
            name: None,
            label: None,
            description: None,
            params: Vec::new(),
            returns: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Declares the context parameter.
    pub fn context(self) -> Self {
        self.param(Param::typed("ctx", Ty::Context))
    }

    pub fn input<T: HostValue>(self, name: impl Into<String>) -> Self {
        self.param(Param::typed(name, T::host_type()))
    }

    pub fn input_with_default<T: HostValue>(self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.param(Param::typed(name, T::host_type()).with_default(default))
    }

    pub fn output<T: HostValue>(self) -> Self {
        self.returns(T::host_type())
    }

    pub fn returns(mut self, ty: Ty) -> Self {
        self.returns = Some(ty);
        self
    }

    /// Resolves the signature against `types` and composes the descriptor.
    ///
    /// The name is qualified as `namespace/name` when a namespace is given.
    pub fn build(self, types: &TypeTable, namespace: Option<&str>) -> Result<NodeDescriptor> {
        let node_name = match self.name.or_else(|| name_from_type(self.type_name)) {
            Some(name) if !name.is_empty() => name,
            _ => return Err(Error::Naming(self.type_name.to_string())),
        };

        let qualified = match namespace {
            Some(ns) if !ns.is_empty() => format!("{}/{}", ns, node_name),
            _ => node_name.clone(),
        };

        let unsupported = |source: types::Error| Error::UnsupportedType {
            node: qualified.clone(),
            source,
        };

        let mut inputs = vec![PinSpec::flow()];
        let mut outputs = vec![PinSpec::flow()];
        let mut input_types = Vec::new();
        let mut output_types = Vec::new();
        let mut first_arg_is_context = false;
        let mut tuple_output = false;

        for (position, param) in self.params.into_iter().enumerate() {
            if param.ty == Some(Ty::Context) {
                if position != 0 {
                    return Err(Error::Ordering {
                        node: qualified,
                        param: param.name,
                        position,
                    });
                }
                first_arg_is_context = true;
                continue;
            }

            let Some(ty) = param.ty else {
                return Err(Error::MissingAnnotation {
                    node: qualified,
                    param: param.name,
                });
            };

            let (wire_name, container) = types.resolve(&ty).map_err(unsupported)?;
            inputs.push(PinSpec::data(param.name, wire_name, container).with_default(param.default));
            input_types.push(ty);
        }

        match self.returns {
            None => {}
            Some(Ty::Tuple(elements)) => {
                tuple_output = true;
                for (i, ty) in elements.into_iter().enumerate() {
                    let (wire_name, container) = types.resolve(&ty).map_err(unsupported)?;
                    outputs.push(PinSpec::data(format!("out{}", i + 1), wire_name, container));
                    output_types.push(ty);
                }
            }
            Some(ty) => {
                let (wire_name, container) = types.resolve(&ty).map_err(unsupported)?;
                outputs.push(PinSpec::data("out", wire_name, container));
                output_types.push(ty);
            }
        }

        let spec = NodeSpec {
            label: self.label.unwrap_or_else(|| label_from_name(&node_name)),
            name: qualified,
            description: self.description,
            inputs,
            outputs,
        };

        Ok(NodeDescriptor {
            callable: self.callable,
            spec,
            first_arg_is_context,
            tuple_output,
            input_types,
            output_types,
        })
    }
}

/// Last path segment of a type name, without generic arguments.
///
/// Only plain paths qualify. Closures, function pointers and trait objects
/// have no usable name, nor do smart pointers wrapping them.
fn name_from_type(type_name: &str) -> Option<String> {
    const WRAPPERS: &[&str] = &["Box", "Arc", "Rc"];

    if type_name.contains("{{closure}}") {
        return None;
    }
    let base = type_name.split('<').next().unwrap_or(type_name);
    if type_name.starts_with("for<") || base.contains("fn(") || base.contains("dyn ") {
        return None;
    }
    let segment = base.rsplit("::").next().unwrap_or(base);
    let is_ident = segment
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && segment.chars().all(|c| c.is_alphanumeric() || c == '_');
    if !is_ident || WRAPPERS.contains(&segment) {
        return None;
    }
    Some(segment.to_string())
}

/// `geometry/add_vectors` → `Add Vectors`.
pub fn label_from_name(name: &str) -> String {
    let last = name.rsplit('/').next().unwrap_or(name);
    let mut label = String::with_capacity(last.len());
    let mut after_letter = false;
    for c in last.chars() {
        let c = if c == '_' { ' ' } else { c };
        if c.is_alphabetic() {
            if after_letter {
                label.extend(c.to_lowercase());
            } else {
                label.extend(c.to_uppercase());
            }
            after_letter = true;
        } else {
            label.push(c);
            after_letter = false;
        }
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_from_name() {
        assert_eq!(label_from_name("node_with_state"), "Node With State");
        assert_eq!(label_from_name("ns/sub/add_vectors"), "Add Vectors");
        assert_eq!(label_from_name("HTTP_get"), "Http Get");
        assert_eq!(label_from_name("add2x"), "Add2X");
    }

    #[test]
    fn test_name_from_type() {
        assert_eq!(name_from_type("my_crate::nodes::add"), Some("add".to_string()));
        assert_eq!(name_from_type("my_crate::Counter<alloc::string::String>"), Some("Counter".to_string()));
        assert_eq!(name_from_type("my_crate::main::{{closure}}"), None);
        assert_eq!(
            name_from_type("for<'a> fn(&'a mut noderun::node::Call) -> core::result::Result<serde_json::value::Value, anyhow::Error>"),
            None
        );
        assert_eq!(
            name_from_type("alloc::boxed::Box<dyn for<'a> core::ops::function::Fn(&'a mut noderun::node::Call) + Send + Sync>"),
            None
        );
        assert_eq!(name_from_type("alloc::sync::Arc<my_crate::Counter>"), None);
        assert_eq!(name_from_type("dyn my_crate::Node"), None);
        assert_eq!(name_from_type("unsafe fn(&mut noderun::node::Call)"), None);
        assert_eq!(name_from_type("forge::nodes::add"), Some("add".to_string()));
    }
}
