//! Builds the concrete argument list for one schedule entry.
use super::error::AssemblyError;
use super::rules::{Pattern, Rule};
use crate::store::{EdgeId, FactorGraph, InterfaceId, Subgraph, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One argument passed to a rule, in the node's declared interface order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    /// The port being computed, or a port the rule ignores.
    Absent,
    /// A constant producer's value, inlined.
    Literal(Value),
    /// The outbound computed by an earlier entry of the same program.
    Entry(usize),
    /// A message already present on the partner interface before execution.
    Stored(InterfaceId),
    /// The marginal of an edge that belongs to another subgraph.
    Marginal(EdgeId),
    /// An auxiliary node parameter requested by the rule's fallback policy.
    Param(String, Value),
}

/// Assembles the arguments computing the outbound of `entry` with `rule`.
///
/// `interface_to_entry` maps every interface scheduled so far to its entry
/// index.
pub fn assemble_arguments(
    graph: &FactorGraph,
    entry: InterfaceId,
    rule: &Rule,
    interface_to_entry: &HashMap<InterfaceId, usize>,
) -> Result<Vec<Argument>, AssemblyError> {
    assemble_scoped(graph, entry, rule, interface_to_entry, None)
}

/// Same as [`assemble_arguments`], but ports on edges outside `scope` are
/// passed as the marginal of their edge.
pub(crate) fn assemble_scoped(
    graph: &FactorGraph,
    entry: InterfaceId,
    rule: &Rule,
    interface_to_entry: &HashMap<InterfaceId, usize>,
    scope: Option<&Subgraph>,
) -> Result<Vec<Argument>, AssemblyError> {
    let node_id = graph.interface(entry).node;
    let node = graph.node(node_id);

    if rule.inbounds.len() + 1 != node.interfaces.len() {
        return Err(AssemblyError::ArityMismatch {
            rule: rule.name.clone(),
            node: node.name.clone(),
            expected: rule.inbounds.len(),
            actual: node.interfaces.len().saturating_sub(1),
        });
    }

    // Fallback: either the auxiliary parameter, or a mandatory inbound.
    let mut param = None;
    let mut required = None;
    if let Some(policy) = &rule.fallback {
        match node.param(&policy.param) {
            Some(value) => param = Some(Argument::Param(policy.param.clone(), value.clone())),
            None => {
                let iface = graph.interface_by_role(node_id, &policy.required_role).map_err(|_| {
                    AssemblyError::UnknownRole {
                        rule: rule.name.clone(),
                        node: node.name.clone(),
                        role: policy.required_role.clone(),
                    }
                })?;
                required = Some(iface);
            }
        }
    }

    let mut patterns = rule.inbounds.iter();
    let mut args = Vec::with_capacity(node.interfaces.len() + 1);
    for &iface in &node.interfaces {
        let is_required = required == Some(iface);
        if iface == entry {
            if is_required {
                args.push(inbound(graph, rule, iface, interface_to_entry, scope, true)?);
            } else {
                args.push(Argument::Absent);
            }
            continue;
        }
        // Arity was checked above, so there is a pattern for every other port.
        if patterns.next() == Some(&Pattern::Absent) && !is_required {
            args.push(Argument::Absent);
            continue;
        }
        args.push(inbound(graph, rule, iface, interface_to_entry, scope, is_required)?);
    }

    if let Some(p) = param {
        args.push(p);
    }
    Ok(args)
}

/// The argument carrying the inbound message arriving at `iface`.
fn inbound(
    graph: &FactorGraph,
    rule: &Rule,
    iface: InterfaceId,
    interface_to_entry: &HashMap<InterfaceId, usize>,
    scope: Option<&Subgraph>,
    required: bool,
) -> Result<Argument, AssemblyError> {
    let missing = |at: InterfaceId| {
        if required {
            AssemblyError::UnavailableApproximationPoint {
                rule: rule.name.clone(),
                interface: at,
                label: graph.label(at),
            }
        } else {
            AssemblyError::MissingInboundReference { interface: at, label: graph.label(at) }
        }
    };

    let Some(partner) = graph.partner(iface) else {
        return Err(missing(iface));
    };

    if let Some(value) = graph.constant_value(partner) {
        return Ok(Argument::Literal(value.clone()));
    }
    if let (Some(sg), Some(edge)) = (scope, graph.interface(iface).edge) {
        if !sg.contains_edge(edge) {
            return Ok(Argument::Marginal(edge));
        }
    }
    if let Some(&idx) = interface_to_entry.get(&partner) {
        return Ok(Argument::Entry(idx));
    }
    if graph.has_message(partner) {
        return Ok(Argument::Stored(partner));
    }
    Err(missing(partner))
}
