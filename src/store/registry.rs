use super::error::GraphError;
use super::types::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use tracing::trace;

/// Owns every node, interface, edge and variable of one model.
///
/// All cross references are arena handles, so the cyclic
/// node ↔ interface ↔ edge ↔ partner structure never forms ownership cycles.
/// Each graph carries its own identifier counters; there is no process-wide
/// default graph, callers thread the handle explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactorGraph {
    id: GraphId,

    // Arenas
    pub nodes: Vec<Node>,
    pub interfaces: Vec<Interface>,
    pub edges: Vec<Edge>,
    pub variables: Vec<Variable>,

    // Per-kind identifier counters and declared role lists
    counters: HashMap<String, u32>,
    kind_roles: HashMap<String, Vec<String>>,

    // Ephemeral lookup state (Not serialized, rebuilt on load)
    #[serde(skip)]
    node_names: HashMap<String, NodeId>,
    #[serde(skip)]
    variable_names: HashMap<String, VariableId>,
}

impl FactorGraph {
    pub fn new() -> Self { Self::default() }
    pub fn id(&self) -> GraphId { self.id }
    pub fn node_count(&self) -> usize { self.nodes.len() }
    pub fn interface_count(&self) -> usize { self.interfaces.len() }
    pub fn edge_count(&self) -> usize { self.edges.len() }

    /// Rebuilds the name indices after deserialization.
    pub fn rebuild_name_cache(&mut self) {
        self.node_names = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), NodeId::new(self.id, i)))
            .collect();
        self.variable_names = self
            .variables
            .iter()
            .enumerate()
            .map(|(i, v)| (v.name.clone(), VariableId::new(self.id, i)))
            .collect();
    }

    /// Generates a fresh identifier: lowercased kind name, `_`, and a running
    /// counter scoped to that kind. Names already taken by explicit
    /// registration are skipped.
    pub fn generate_id(&mut self, kind: &str) -> String {
        let prefix = kind.to_lowercase();
        loop {
            let counter = self.counters.entry(kind.to_string()).or_insert(0);
            *counter += 1;
            let candidate = format!("{}_{}", prefix, counter);
            if !self.node_names.contains_key(&candidate) && !self.variable_names.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    // --- Registration ---

    pub fn add_node(&mut self, kind: &str, roles: &[&str]) -> Result<NodeId, GraphError> {
        let name = self.generate_id(kind);
        self.push_node(name, kind, roles, None)
    }

    pub fn add_named_node(&mut self, name: &str, kind: &str, roles: &[&str]) -> Result<NodeId, GraphError> {
        self.push_node(name.to_string(), kind, roles, None)
    }

    pub fn add_constant(&mut self, value: impl Into<Value>) -> Result<NodeId, GraphError> {
        let name = self.generate_id(CONSTANT_KIND);
        self.push_node(name, CONSTANT_KIND, &["out"], Some(value.into()))
    }

    pub fn add_named_constant(&mut self, name: &str, value: impl Into<Value>) -> Result<NodeId, GraphError> {
        self.push_node(name.to_string(), CONSTANT_KIND, &["out"], Some(value.into()))
    }

    fn push_node(
        &mut self,
        name: String,
        kind: &str,
        roles: &[&str],
        constant: Option<Value>,
    ) -> Result<NodeId, GraphError> {
        if self.node_names.contains_key(&name) {
            return Err(GraphError::DuplicateIdentifier { name });
        }
        match self.kind_roles.get(kind) {
            Some(expected) if expected.len() != roles.len() => {
                return Err(GraphError::ArityMismatch {
                    kind: kind.to_string(),
                    expected: expected.len(),
                    actual: roles.len(),
                });
            }
            Some(expected) if expected.iter().zip(roles).any(|(e, r)| e != r) => {
                return Err(GraphError::RoleMismatch {
                    kind: kind.to_string(),
                    expected: expected.clone(),
                    actual: roles.iter().map(|r| r.to_string()).collect(),
                });
            }
            Some(_) => {}
            None => {
                self.kind_roles.insert(kind.to_string(), roles.iter().map(|r| r.to_string()).collect());
            }
        }

        let id = NodeId::new(self.id, self.nodes.len());

        // 1. Interfaces, in declared order
        let mut interfaces = SmallVec::with_capacity(roles.len());
        for role in roles {
            let iface = InterfaceId::new(self.interfaces.len());
            self.interfaces.push(Interface {
                node: id,
                role: role.to_string(),
                edge: None,
                partner: None,
                message: None,
            });
            interfaces.push(iface);
        }

        // 2. Node record + name index
        self.node_names.insert(name.clone(), id);
        trace!(node = %name, kind, arity = roles.len(), "registered node");
        self.nodes.push(Node { name, kind: kind.to_string(), interfaces, constant, params: Vec::new() });

        Ok(id)
    }

    pub fn add_variable(&mut self) -> VariableId {
        let name = self.generate_id("Variable");
        let id = VariableId::new(self.id, self.variables.len());
        self.variable_names.insert(name.clone(), id);
        self.variables.push(Variable { name, edges: Vec::new() });
        id
    }

    pub fn add_named_variable(&mut self, name: &str) -> Result<VariableId, GraphError> {
        if self.variable_names.contains_key(name) {
            return Err(GraphError::DuplicateIdentifier { name: name.to_string() });
        }
        let id = VariableId::new(self.id, self.variables.len());
        self.variable_names.insert(name.to_string(), id);
        self.variables.push(Variable { name: name.to_string(), edges: Vec::new() });
        Ok(id)
    }

    /// Connects two dangling interfaces with a new edge, optionally labelled
    /// by a variable.
    pub fn connect(
        &mut self,
        a: InterfaceId,
        b: InterfaceId,
        variable: Option<VariableId>,
    ) -> Result<EdgeId, GraphError> {
        for &side in &[a, b] {
            let iface = self.interfaces.get(side.index()).ok_or(GraphError::UnknownInterface(side))?;
            if iface.partner.is_some() {
                return Err(GraphError::AlreadyConnected { interface: side, label: self.label(side) });
            }
        }
        if a == b {
            return Err(GraphError::SelfConnection { interface: a, label: self.label(a) });
        }
        if let Some(var) = variable.filter(|&v| !self.contains_variable(v)) {
            return Err(GraphError::UnknownVariable(var));
        }

        let id = EdgeId::new(self.edges.len());
        let name = self.generate_id("Edge");
        self.edges.push(Edge { name, a, b, variable });

        self.interfaces[a.index()].edge = Some(id);
        self.interfaces[a.index()].partner = Some(b);
        self.interfaces[b.index()].edge = Some(id);
        self.interfaces[b.index()].partner = Some(a);

        if let Some(var) = variable {
            self.variables[var.index()].edges.push(id);
        }
        Ok(id)
    }

    /// Convenience: connects `(node_a, role_a)` to `(node_b, role_b)`.
    pub fn connect_roles(
        &mut self,
        node_a: NodeId,
        role_a: &str,
        node_b: NodeId,
        role_b: &str,
    ) -> Result<EdgeId, GraphError> {
        let a = self.interface_by_role(node_a, role_a)?;
        let b = self.interface_by_role(node_b, role_b)?;
        self.connect(a, b, None)
    }

    pub fn set_param(&mut self, node: NodeId, key: &str, value: impl Into<Value>) -> Result<(), GraphError> {
        if !self.contains_node(node) {
            return Err(GraphError::UnknownNode(node));
        }
        let node = &mut self.nodes[node.index()];
        let value = value.into();
        match node.params.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => node.params.push((key.to_string(), value)),
        }
        Ok(())
    }

    // --- Message slots ---

    pub fn set_message(&mut self, iface: InterfaceId, message: Message) -> Result<(), GraphError> {
        let slot = self.interfaces.get_mut(iface.index()).ok_or(GraphError::UnknownInterface(iface))?;
        slot.message = Some(message);
        Ok(())
    }

    pub fn clear_message(&mut self, iface: InterfaceId) -> Result<Option<Message>, GraphError> {
        let slot = self.interfaces.get_mut(iface.index()).ok_or(GraphError::UnknownInterface(iface))?;
        Ok(slot.message.take())
    }

    #[inline(always)]
    pub fn has_message(&self, iface: InterfaceId) -> bool {
        self.interfaces[iface.index()].message.is_some()
    }

    // --- Membership ---

    /// Whether `id` was issued by this graph (or a clone of it).
    pub fn contains_node(&self, id: NodeId) -> bool { id.graph == self.id && id.index() < self.nodes.len() }
    pub fn contains_variable(&self, id: VariableId) -> bool {
        id.graph == self.id && id.index() < self.variables.len()
    }
    pub fn contains_interface(&self, id: InterfaceId) -> bool { id.index() < self.interfaces.len() }
    pub fn contains_edge(&self, id: EdgeId) -> bool { id.index() < self.edges.len() }

    // --- Accessors ---

    pub fn node(&self, id: NodeId) -> &Node { &self.nodes[id.index()] }
    pub fn interface(&self, id: InterfaceId) -> &Interface { &self.interfaces[id.index()] }
    pub fn edge(&self, id: EdgeId) -> &Edge { &self.edges[id.index()] }
    pub fn variable(&self, id: VariableId) -> &Variable { &self.variables[id.index()] }

    pub fn node_of(&self, iface: InterfaceId) -> &Node { self.node(self.interface(iface).node) }
    pub fn partner(&self, iface: InterfaceId) -> Option<InterfaceId> { self.interface(iface).partner }

    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        (0..self.edges.len()).map(EdgeId::new)
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> { self.node_names.get(name).copied() }
    pub fn variable_by_name(&self, name: &str) -> Option<VariableId> { self.variable_names.get(name).copied() }

    pub fn interface_by_role(&self, node: NodeId, role: &str) -> Result<InterfaceId, GraphError> {
        if !self.contains_node(node) {
            return Err(GraphError::UnknownNode(node));
        }
        let n = &self.nodes[node.index()];
        n.interfaces
            .iter()
            .copied()
            .find(|&i| self.interfaces[i.index()].role == role)
            .ok_or_else(|| GraphError::UnknownRole { node: n.name.clone(), role: role.to_string() })
    }

    /// The literal of the node owning `iface`, when that node is a constant producer.
    pub fn constant_value(&self, iface: InterfaceId) -> Option<&Value> {
        self.node_of(iface).constant.as_ref()
    }

    /// A `node.role` label for diagnostics.
    pub fn label(&self, iface: InterfaceId) -> String {
        match self.interfaces.get(iface.index()) {
            Some(i) => format!("{}.{}", self.nodes[i.node.index()].name, i.role),
            None => format!("<unknown interface {}>", iface.0),
        }
    }
}
