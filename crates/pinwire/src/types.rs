//! # Pin and Node Shapes
//!
//! The catalog half of the protocol: how a node advertises its pins, and how
//! the pin types are spelled on the wire.
//!
//! ## WireType encoding
//!
//! - `Flow`, `Any`, `AnyOrFlow` are bare strings: `"flow"`, `"any"`, `"any_or_flow"`.
//! - `Data(name)` is `{"data": name}`.
//! - `Wildcard(idx)` is `{"wildcard": idx}`. A bare `"wildcard"` decodes as index 0.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de;
use serde::ser::SerializeMap;
use serde_json::Value;

/// The type carried by a pin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WireType {
    /// Control-flow edge, carries no value.
    Flow,
    /// Typed data edge; the name comes from the type mapping table.
    Data(String),
    /// Generic slot unified with every other wildcard of the same index.
    Wildcard(u32),
    Any,
    AnyOrFlow,
}

impl WireType {
    pub fn data(name: impl Into<String>) -> Self {
        Self::Data(name.into())
    }

    pub fn is_flow(&self) -> bool {
        matches!(self, Self::Flow)
    }
}

impl Serialize for WireType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Flow => serializer.serialize_str("flow"),
            Self::Any => serializer.serialize_str("any"),
            Self::AnyOrFlow => serializer.serialize_str("any_or_flow"),
            Self::Data(name) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("data", name)?;
                map.end()
            }
            Self::Wildcard(idx) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("wildcard", idx)?;
                map.end()
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DataRepr {
    data: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WildcardRepr {
    wildcard: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireTypeRepr {
    Tag(String),
    Data(DataRepr),
    Wildcard(WildcardRepr),
}

impl<'de> Deserialize<'de> for WireType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let repr = WireTypeRepr::deserialize(deserializer).map_err(|_| {
            de::Error::custom("pin type must be a string, {\"data\": str} or {\"wildcard\": int}")
        })?;

        match repr {
            WireTypeRepr::Tag(tag) => match tag.as_str() {
                "flow" => Ok(Self::Flow),
                "any" => Ok(Self::Any),
                "any_or_flow" => Ok(Self::AnyOrFlow),
                "wildcard" => Ok(Self::Wildcard(0)),
                other => Err(de::Error::unknown_variant(
                    other,
                    &["flow", "any", "any_or_flow", "wildcard"],
                )),
            },
            WireTypeRepr::Data(d) => Ok(Self::Data(d.data)),
            WireTypeRepr::Wildcard(w) => Ok(Self::Wildcard(w.wildcard)),
        }
    }
}

/// Data cardinality of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinContainer {
    Single,
    Option,
    Array,
    Any,
}

/// How many instances of a pin a node may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinCount {
    One,
    ZeroOrMore,
}

/// One named input or output slot of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinSpec {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub ty: WireType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<PinContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<PinCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_const: Option<bool>,
}

impl PinSpec {
    /// An unlabeled control-flow pin.
    pub fn flow() -> Self {
        Self::new("", WireType::Flow)
    }

    /// A data pin of the given wire type name and container shape.
    pub fn data(label: impl Into<String>, type_name: impl Into<String>, container: PinContainer) -> Self {
        let mut pin = Self::new(label, WireType::data(type_name));
        pin.container = Some(container);
        pin
    }

    pub fn new(label: impl Into<String>, ty: WireType) -> Self {
        Self {
            label: label.into(),
            description: None,
            ty,
            container: None,
            count: None,
            default_count: None,
            default: None,
            is_const: None,
        }
    }

    pub fn with_default(mut self, default: Option<Value>) -> Self {
        self.default = default;
        self
    }

    pub fn is_flow(&self) -> bool {
        self.ty.is_flow()
    }
}

/// The advertised description of one node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Qualified name, unique within a registry.
    #[serde(rename = "type")]
    pub name: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub inputs: Vec<PinSpec>,
    #[serde(default)]
    pub outputs: Vec<PinSpec>,
}

/// Pin counts of one side of a node, split by flow and data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinCounts {
    pub flow: usize,
    pub data: usize,
}

impl PinCounts {
    pub fn of(pins: &[PinSpec]) -> Self {
        let flow = pins.iter().filter(|p| p.is_flow()).count();
        Self { flow, data: pins.len() - flow }
    }
}

impl NodeSpec {
    pub fn input_counts(&self) -> PinCounts {
        PinCounts::of(&self.inputs)
    }

    pub fn output_counts(&self) -> PinCounts {
        PinCounts::of(&self.outputs)
    }
}

/// Field layout of a structured data type, advertised during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSpec {
    #[serde(rename = "type")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `(field name, wire type name)` pairs in declaration order.
    pub fields: Vec<(String, String)>,
}
