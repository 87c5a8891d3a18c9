//! # Type Mapping Table
//!
//! Maps host value types to the names the graph engine knows them by.
//!
//! Host types are described symbolically with [`Ty`]; Rust types name their
//! own descriptor through [`HostValue`]. The table resolves a descriptor to a
//! `(wire name, container)` pair and normalizes inbound JSON for it.
//!
//! ## Invariants
//! - A list maps to its element's wire name with `PinContainer::Array`.
//! - Lists of lists are rejected.
//! - The table is filled before registration starts and never changes while
//!   connections are served.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use pinwire::PinContainer;
use pinwire::TypeSpec;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::Context;
use crate::value::Bivec2;
use crate::value::Bivec3;
use crate::value::Rotor2;
use crate::value::Rotor3;
use crate::value::Text;
use crate::value::Vec2;
use crate::value::Vec3;
use crate::value::Vec4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No table entry for this host type.
    UnsupportedType(String),
    /// A list whose element type is itself a list.
    NestedList(String),
    /// A host name was registered twice.
    DuplicateType(String),
    /// Inbound JSON did not fit the declared type.
    Decode { ty: String, reason: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedType(ty) => write!(f, "Unsupported type: {}", ty),
            Self::NestedList(ty) => write!(f, "Nested lists are not supported: {}", ty),
            Self::DuplicateType(ty) => write!(f, "Type already registered: {}", ty),
            Self::Decode { ty, reason } => write!(f, "Cannot decode {}: {}", ty, reason),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Symbolic description of a host parameter or return type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    /// A table entry, looked up by host name.
    Named(Cow<'static, str>),
    List(Box<Ty>),
    /// Multiple return values; only meaningful as a return type.
    Tuple(Vec<Ty>),
    /// The context capability; only meaningful as the first parameter.
    Context,
}

impl Ty {
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Named(name.into())
    }

    pub fn list(inner: Ty) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn tuple(elements: impl IntoIterator<Item = Ty>) -> Self {
        Self::Tuple(elements.into_iter().collect())
    }

    pub fn of<T: HostValue>() -> Self {
        T::host_type()
    }
}

impl std::fmt::Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{}", name),
            Self::List(inner) => write!(f, "Vec<{}>", inner),
            Self::Tuple(elements) => {
                write!(f, "(")?;
                for (i, ty) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", ty)?;
                }
                write!(f, ")")
            }
            Self::Context => write!(f, "Context"),
        }
    }
}

/// A Rust type that can appear in a node signature.
pub trait HostValue {
    fn host_type() -> Ty;
}

macro_rules! host_value {
    ($($t:ty => $name:literal),* $(,)?) => {
        $(
            impl HostValue for $t {
                fn host_type() -> Ty {
                    Ty::Named(Cow::Borrowed($name))
                }
            }
        )*
    };
}

host_value! {
    bool => "bool",
    f32 => "f32",
    f64 => "f64",
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    i128 => "i128",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
    u128 => "u128",
    String => "String",
    Text => "Text",
    Vec2 => "Vec2",
    Vec3 => "Vec3",
    Vec4 => "Vec4",
    Bivec2 => "Bivec2",
    Bivec3 => "Bivec3",
    Rotor2 => "Rotor2",
    Rotor3 => "Rotor3",
}

impl<T: HostValue> HostValue for Vec<T> {
    fn host_type() -> Ty {
        Ty::list(T::host_type())
    }
}

impl HostValue for Context {
    fn host_type() -> Ty {
        Ty::Context
    }
}

macro_rules! host_tuple {
    ($($name:ident),+) => {
        impl<$($name: HostValue),+> HostValue for ($($name,)+) {
            fn host_type() -> Ty {
                Ty::Tuple(vec![$($name::host_type()),+])
            }
        }
    };
}

host_tuple!(A, B);
host_tuple!(A, B, C);
host_tuple!(A, B, C, D);

type Parser = Arc<dyn Fn(Value) -> serde_json::Result<Value> + Send + Sync>;

#[derive(Clone)]
enum TypeKind {
    Primitive,
    Structured { spec: TypeSpec, parse: Parser },
}

#[derive(Clone)]
struct TypeEntry {
    wire_name: String,
    kind: TypeKind,
}

/// Host type name → wire type name, plus parsers for structured types.
#[derive(Clone)]
pub struct TypeTable {
    entries: HashMap<String, TypeEntry>,
    structured: Vec<String>,
}

impl TypeTable {
    /// Creates a table holding the built-in primitives and geometric types.
    pub fn new() -> Self {
        let mut table = Self {
            entries: HashMap::new(),
            structured: Vec::new(),
        };

        let primitives = [
            ("bool", "boolean"),
            ("f32", "f32"),
            ("f64", "f64"),
            ("i8", "i8"),
            ("i16", "i16"),
            ("i32", "i32"),
            ("i64", "i64"),
            ("i128", "i128"),
            ("u8", "u8"),
            ("u16", "u16"),
            ("u32", "u32"),
            ("u64", "u64"),
            ("u128", "u128"),
            ("String", "string"),
            ("Text", "text"),
        ];
        for (host, wire) in primitives {
            table.insert_primitive(host, wire);
        }

        table.insert_builtin::<Vec2>("Vec2", "vec2", &["x", "y"]);
        table.insert_builtin::<Vec3>("Vec3", "vec3", &["x", "y", "z"]);
        table.insert_builtin::<Vec4>("Vec4", "vec4", &["x", "y", "z", "w"]);
        table.insert_builtin::<Bivec2>("Bivec2", "bivec2", &["xy"]);
        table.insert_builtin::<Bivec3>("Bivec3", "bivec3", &["yz", "zx", "xy"]);
        table.insert_builtin::<Rotor2>("Rotor2", "rotor2", &["s", "xy"]);
        table.insert_builtin::<Rotor3>("Rotor3", "rotor3", &["s", "yz", "zx", "xy"]);

        table
    }

    fn insert_primitive(&mut self, host: &str, wire: &str) {
        let entry = TypeEntry {
            wire_name: wire.to_string(),
            kind: TypeKind::Primitive,
        };
        self.entries.insert(host.to_string(), entry);
    }

    fn insert_builtin<T>(&mut self, host: &str, wire: &str, fields: &[&str])
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        let spec = TypeSpec {
            name: wire.to_string(),
            description: None,
            fields: fields.iter().map(|f| (f.to_string(), "f64".to_string())).collect(),
        };
        self.insert_structured::<T>(host.to_string(), spec);
    }

    fn insert_structured<T>(&mut self, host: String, spec: TypeSpec)
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        let parse: Parser = Arc::new(|value: Value| -> serde_json::Result<Value> {
            let parsed: T = serde_json::from_value(value)?;
            serde_json::to_value(parsed)
        });
        let entry = TypeEntry {
            wire_name: spec.name.clone(),
            kind: TypeKind::Structured { spec, parse },
        };
        self.structured.push(host.clone());
        self.entries.insert(host, entry);
    }

    /// Registers an alias for a primitive wire type, e.g. `usize` → `u64`.
    pub fn register_primitive(&mut self, host: impl Into<String>, wire: impl Into<String>) -> Result<()> {
        let host = host.into();
        if self.entries.contains_key(&host) {
            return Err(Error::DuplicateType(host));
        }
        let wire = wire.into();
        self.insert_primitive(&host, &wire);
        Ok(())
    }

    /// Registers a structured type. Inbound values are parsed through `T`.
    pub fn register_struct<T>(&mut self, host: impl Into<String>, spec: TypeSpec) -> Result<()>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        let host = host.into();
        if self.entries.contains_key(&host) {
            return Err(Error::DuplicateType(host));
        }
        self.insert_structured::<T>(host, spec);
        Ok(())
    }

    fn entry(&self, host: &str) -> Result<&TypeEntry> {
        self.entries
            .get(host)
            .ok_or_else(|| Error::UnsupportedType(host.to_string()))
    }

    pub fn contains(&self, host: &str) -> bool {
        self.entries.contains_key(host)
    }

    /// Resolves a parameter or return element to its wire name and container.
    pub fn resolve(&self, ty: &Ty) -> Result<(String, PinContainer)> {
        match ty {
            Ty::Named(name) => Ok((self.entry(name)?.wire_name.clone(), PinContainer::Single)),
            Ty::List(inner) => match inner.as_ref() {
                Ty::Named(name) => Ok((self.entry(name)?.wire_name.clone(), PinContainer::Array)),
                Ty::List(_) => Err(Error::NestedList(ty.to_string())),
                _ => Err(Error::UnsupportedType(ty.to_string())),
            },
            Ty::Tuple(_) | Ty::Context => Err(Error::UnsupportedType(ty.to_string())),
        }
    }

    /// Normalizes an inbound value for a declared input type.
    ///
    /// Lists decode element-wise, structured types go through their parser,
    /// primitives pass through untouched.
    pub fn decode(&self, ty: &Ty, value: Value) -> Result<Value> {
        match ty {
            Ty::List(inner) => {
                let Value::Array(items) = value else {
                    return Err(Error::Decode {
                        ty: ty.to_string(),
                        reason: format!("expected an array, got {}", value),
                    });
                };
                items
                    .into_iter()
                    .map(|item| self.decode(inner, item))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array)
            }
            Ty::Named(name) => match &self.entry(name)?.kind {
                TypeKind::Primitive => Ok(value),
                TypeKind::Structured { parse, .. } => parse(value).map_err(|e| Error::Decode {
                    ty: ty.to_string(),
                    reason: e.to_string(),
                }),
            },
            Ty::Tuple(_) | Ty::Context => Err(Error::UnsupportedType(ty.to_string())),
        }
    }

    /// Structured types in registration order, for discovery.
    pub fn type_specs(&self) -> Vec<TypeSpec> {
        self.structured
            .iter()
            .filter_map(|host| match &self.entries.get(host)?.kind {
                TypeKind::Structured { spec, .. } => Some(spec.clone()),
                TypeKind::Primitive => None,
            })
            .collect()
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut hosts: Vec<&String> = self.entries.keys().collect();
        hosts.sort();
        f.debug_struct("TypeTable").field("types", &hosts).finish()
    }
}
