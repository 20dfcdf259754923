use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            #[inline(always)]
            pub fn index(&self) -> usize { self.0 as usize }
            pub fn new(idx: usize) -> Self { Self(idx as u32) }
        }
    };
}

/// Identity of one `FactorGraph` instance. Clones and deserialized copies keep
/// the identity of the graph they were made from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphId(pub u32);

static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(1);

impl GraphId {
    pub fn fresh() -> Self { Self(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed)) }
}

impl Default for GraphId {
    fn default() -> Self { Self::fresh() }
}

/// Handles that are part of a graph's public identity carry the graph they
/// were issued by, so membership can be checked across instances.
macro_rules! owned_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name {
            pub graph: GraphId,
            pub slot: u32,
        }

        impl $name {
            #[inline(always)]
            pub fn index(&self) -> usize { self.slot as usize }
            pub fn new(graph: GraphId, idx: usize) -> Self { Self { graph, slot: idx as u32 } }
        }
    };
}

owned_id!(
    /// Handle of a node inside its owning `FactorGraph`.
    NodeId
);
owned_id!(VariableId);
arena_id!(
    /// Handle of a single port. Interfaces live in their own arena so partner
    /// links are plain handles and never ownership cycles.
    InterfaceId
);
arena_id!(EdgeId);
arena_id!(SubgraphId);

/// Kind name used for constant-valued producer nodes.
pub const CONSTANT_KIND: &str = "Constant";

/// A literal carried by a constant node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Scalar(f64),
    /// Shared reference to a vector so folded literals are cheap to clone.
    Series(Arc<Vec<f64>>),
}

impl Value {
    pub fn len(&self) -> usize {
        match self { Value::Scalar(_) => 1, Value::Series(v) => v.len() }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn to_vec(&self) -> Vec<f64> {
        match self { Value::Scalar(s) => vec![*s], Value::Series(s) => s.to_vec() }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Scalar(v) }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        if v.len() == 1 { Value::Scalar(v[0]) } else { Value::Series(Arc::new(v)) }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(v) => write!(f, "{:.3}", v),
            Value::Series(v) if v.len() == 1 => write!(f, "[{:.3}]", v[0]),
            Value::Series(v) => write!(f, "[len={}]", v.len()),
        }
    }
}

/// The message and distribution families understood by rule dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Family {
    PointMass,
    Gaussian,
    Gamma,
    Wishart,
    Bernoulli,
    Beta,
    Categorical,
    Dirichlet,
}

/// A computed message held by an interface.
///
/// The scheduler only ever asks whether one is present; the family is used by
/// the program compiler to type pre-seeded inbounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub family: Family,
    pub params: Value,
}

impl Message {
    pub fn new(family: Family, params: impl Into<Value>) -> Self {
        Self { family, params: params.into() }
    }
}

/// One port of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub node: NodeId,
    pub role: String,
    pub edge: Option<EdgeId>,
    pub partner: Option<InterfaceId>,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub kind: String,
    /// Ports in declared order. The order is significant: rule signatures
    /// and assembled arguments follow it.
    pub interfaces: SmallVec<[InterfaceId; 4]>,
    /// Literal value when this node is a constant producer.
    pub constant: Option<Value>,
    /// Optional auxiliary parameters (e.g. a declared inverse function).
    pub params: Vec<(String, Value)>,
}

impl Node {
    pub fn is_constant(&self) -> bool { self.constant.is_some() }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// A channel between two partner interfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub name: String,
    pub a: InterfaceId,
    pub b: InterfaceId,
    pub variable: Option<VariableId>,
}

impl Edge {
    /// Returns the side opposite to `iface`, if `iface` is one of this edge's sides.
    pub fn other(&self, iface: InterfaceId) -> Option<InterfaceId> {
        if self.a == iface {
            Some(self.b)
        } else if self.b == iface {
            Some(self.a)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub edges: Vec<EdgeId>,
}
