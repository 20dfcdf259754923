//! Loop diagnostics over the interface dependency graph.
//!
//! The scheduler only reports the first interface it finds on a loop. These
//! helpers list every loop that still lacks an initial message and propose
//! where to prime them.
use crate::store::{FactorGraph, InterfaceId};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashSet;

/// Builds the dependency graph between interfaces: an edge `p -> x` means the
/// outbound of `x` needs the outbound of `p` (the partner of another port on
/// `x`'s node). Interfaces in `primed` are treated as holding a message.
pub fn dependency_graph(graph: &FactorGraph, primed: &HashSet<InterfaceId>) -> DiGraph<InterfaceId, ()> {
    let mut deps = DiGraph::with_capacity(graph.interface_count(), graph.interface_count());
    let handles: Vec<NodeIndex> = (0..graph.interface_count())
        .map(|i| deps.add_node(InterfaceId::new(i)))
        .collect();

    for (i, iface) in graph.interfaces.iter().enumerate() {
        let x = InterfaceId::new(i);
        for &other in &graph.node(iface.node).interfaces {
            if other == x {
                continue;
            }
            if let Some(p) = graph.partner(other) {
                if !graph.has_message(p) && !primed.contains(&p) {
                    deps.add_edge(handles[p.index()], handles[x.index()], ());
                }
            }
        }
    }
    deps
}

/// Every loop without a message to break it, as the sorted set of interfaces
/// on it. Loops are ordered by their smallest interface.
pub fn unbroken_loops(graph: &FactorGraph) -> Vec<Vec<InterfaceId>> {
    loops_with(graph, &HashSet::new())
}

fn loops_with(graph: &FactorGraph, primed: &HashSet<InterfaceId>) -> Vec<Vec<InterfaceId>> {
    let deps = dependency_graph(graph, primed);
    let mut loops: Vec<Vec<InterfaceId>> = tarjan_scc(&deps)
        .into_iter()
        .filter(|scc| scc.len() > 1 || deps.contains_edge(scc[0], scc[0]))
        .map(|scc| {
            let mut members: Vec<InterfaceId> = scc.into_iter().map(|n| deps[n]).collect();
            members.sort();
            members
        })
        .collect();
    loops.sort();
    loops
}

/// Interfaces that, once primed with an initial message, leave the graph
/// without unbroken loops.
///
/// Greedy: primes the smallest interface of the first remaining loop and
/// re-checks, so nested loops sharing a component are all handled.
pub fn suggest_loop_breakers(graph: &FactorGraph) -> Vec<InterfaceId> {
    let mut primed = HashSet::new();
    let mut breakers = Vec::new();
    while let Some(first) = loops_with(graph, &primed).first().map(|l| l[0]) {
        primed.insert(first);
        breakers.push(first);
    }
    breakers
}
