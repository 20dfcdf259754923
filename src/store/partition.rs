//! Partitioning of a graph's edges into subgraphs, plus the auxiliary
//! consumers (time-wraps and write-buffers) that the subgraph schedules must
//! also satisfy.
use super::error::PartitionError;
use super::registry::FactorGraph;
use super::types::{EdgeId, InterfaceId, NodeId, SubgraphId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A disjoint region of edges with its own derived internal schedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub id: SubgraphId,
    pub internal_edges: BTreeSet<EdgeId>,
    /// Edges outside this region that touch one of its nodes.
    pub external_edges: BTreeSet<EdgeId>,
    pub internal_schedule: Vec<InterfaceId>,
}

impl Subgraph {
    #[inline]
    pub fn contains_edge(&self, edge: EdgeId) -> bool { self.internal_edges.contains(&edge) }

    /// Whether `iface` lives in this region. A dangling interface belongs to
    /// the region of any edge its node touches.
    pub fn owns_interface(&self, graph: &FactorGraph, iface: InterfaceId) -> bool {
        match graph.interface(iface).edge {
            Some(edge) => self.contains_edge(edge),
            None => self.touches_node(graph, graph.interface(iface).node),
        }
    }

    pub fn touches_node(&self, graph: &FactorGraph, node: NodeId) -> bool {
        graph
            .node(node)
            .interfaces
            .iter()
            .any(|&i| graph.interface(i).edge.map_or(false, |e| self.contains_edge(e)))
    }

    /// Nodes with at least one interface on an internal edge, in first-seen
    /// edge order.
    pub fn nodes(&self, graph: &FactorGraph) -> Vec<NodeId> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for &edge in &self.internal_edges {
            let e = graph.edge(edge);
            for side in [e.a, e.b] {
                let node = graph.interface(side).node;
                if seen.insert(node) {
                    out.push(node);
                }
            }
        }
        out
    }

    /// Nodes of this region that also touch an external edge.
    pub fn boundary_nodes(&self, graph: &FactorGraph) -> Vec<NodeId> {
        self.nodes(graph)
            .into_iter()
            .filter(|&n| {
                graph
                    .node(n)
                    .interfaces
                    .iter()
                    .any(|&i| graph.interface(i).edge.map_or(false, |e| self.external_edges.contains(&e)))
            })
            .collect()
    }
}

/// "This step's forward output feeds the next step's backward input."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWrap {
    pub from: InterfaceId,
    pub to: InterfaceId,
}

/// An output tap: either the outbound message of one interface, or the
/// marginal of an edge (which needs both directions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteBuffer {
    Interface(InterfaceId),
    Edge(EdgeId),
}

impl WriteBuffer {
    /// Interfaces whose outbound messages must be computed for this tap.
    pub fn required_interfaces(&self, graph: &FactorGraph) -> Vec<InterfaceId> {
        match *self {
            WriteBuffer::Interface(i) => vec![i],
            WriteBuffer::Edge(e) => {
                let edge = graph.edge(e);
                vec![edge.a, edge.b]
            }
        }
    }

    pub fn edge(&self, graph: &FactorGraph) -> Option<EdgeId> {
        match *self {
            WriteBuffer::Interface(i) => graph.interface(i).edge,
            WriteBuffer::Edge(e) => Some(e),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitioningScheme {
    pub subgraphs: Vec<Subgraph>,
    pub time_wraps: Vec<TimeWrap>,
    pub write_buffers: Vec<WriteBuffer>,
    edge_to_subgraph: HashMap<EdgeId, SubgraphId>,
}

impl PartitioningScheme {
    /// Builds a partition from explicit edge groups. Every edge of `graph` must
    /// appear in exactly one group.
    pub fn new(graph: &FactorGraph, groups: Vec<Vec<EdgeId>>) -> Result<Self, PartitionError> {
        let mut edge_to_subgraph = HashMap::with_capacity(graph.edge_count());
        let mut subgraphs = Vec::with_capacity(groups.len());

        for (i, group) in groups.into_iter().enumerate() {
            let id = SubgraphId::new(i);
            let mut internal_edges = BTreeSet::new();
            for edge in group {
                if !graph.contains_edge(edge) {
                    return Err(PartitionError::UnknownEdge(edge));
                }
                if edge_to_subgraph.insert(edge, id).is_some() {
                    return Err(PartitionError::OverlappingSubgraphs {
                        edge,
                        edge_name: graph.edge(edge).name.clone(),
                    });
                }
                internal_edges.insert(edge);
            }
            subgraphs.push(Subgraph { id, internal_edges, ..Default::default() });
        }

        if let Some(edge) = graph.edge_ids().find(|e| !edge_to_subgraph.contains_key(e)) {
            return Err(PartitionError::UncoveredEdge { edge, edge_name: graph.edge(edge).name.clone() });
        }

        for sg in &mut subgraphs {
            let mut external = BTreeSet::new();
            for node in sg.nodes(graph) {
                for &iface in &graph.node(node).interfaces {
                    if let Some(edge) = graph.interface(iface).edge {
                        if !sg.internal_edges.contains(&edge) {
                            external.insert(edge);
                        }
                    }
                }
            }
            sg.external_edges = external;
        }

        Ok(Self { subgraphs, time_wraps: Vec::new(), write_buffers: Vec::new(), edge_to_subgraph })
    }

    /// The trivial partition: one subgraph holding every edge.
    pub fn single(graph: &FactorGraph) -> Self {
        // Covers every edge exactly once, so validation cannot fail.
        Self::new(graph, vec![graph.edge_ids().collect()]).unwrap_or_default()
    }

    pub fn add_time_wrap(
        &mut self,
        graph: &FactorGraph,
        from: InterfaceId,
        to: InterfaceId,
    ) -> Result<(), PartitionError> {
        for i in [from, to] {
            if !graph.contains_interface(i) {
                return Err(PartitionError::UnknownInterface(i));
            }
        }
        self.time_wraps.push(TimeWrap { from, to });
        Ok(())
    }

    pub fn add_write_buffer(&mut self, graph: &FactorGraph, target: WriteBuffer) -> Result<(), PartitionError> {
        match target {
            WriteBuffer::Interface(i) if !graph.contains_interface(i) => {
                return Err(PartitionError::UnknownInterface(i))
            }
            WriteBuffer::Edge(e) if !graph.contains_edge(e) => return Err(PartitionError::UnknownEdge(e)),
            _ => {}
        }
        self.write_buffers.push(target);
        Ok(())
    }

    pub fn subgraph(&self, id: SubgraphId) -> Option<&Subgraph> { self.subgraphs.get(id.index()) }

    pub fn subgraph_of_edge(&self, edge: EdgeId) -> Option<SubgraphId> { self.edge_to_subgraph.get(&edge).copied() }

    /// Region of an interface; dangling interfaces resolve through their node's edges.
    pub fn subgraph_of_interface(&self, graph: &FactorGraph, iface: InterfaceId) -> Option<SubgraphId> {
        if let Some(edge) = graph.interface(iface).edge {
            return self.subgraph_of_edge(edge);
        }
        graph
            .node_of(iface)
            .interfaces
            .iter()
            .filter_map(|&i| graph.interface(i).edge)
            .find_map(|e| self.subgraph_of_edge(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> (FactorGraph, Vec<EdgeId>) {
        let mut g = FactorGraph::new();
        let a = g.add_named_node("a", "Source", &["out"]).unwrap();
        let b = g.add_named_node("b", "Link", &["in1", "out"]).unwrap();
        let c = g.add_named_node("c", "Link", &["in1", "out"]).unwrap();
        let d = g.add_named_node("d", "Sink", &["in1"]).unwrap();
        let e1 = g.connect_roles(a, "out", b, "in1").unwrap();
        let e2 = g.connect_roles(b, "out", c, "in1").unwrap();
        let e3 = g.connect_roles(c, "out", d, "in1").unwrap();
        (g, vec![e1, e2, e3])
    }

    #[test]
    fn test_partition_derives_external_edges() {
        let (g, e) = chain();
        let p = PartitioningScheme::new(&g, vec![vec![e[0]], vec![e[1], e[2]]]).unwrap();

        assert_eq!(p.subgraphs[0].external_edges, BTreeSet::from([e[1]]));
        assert_eq!(p.subgraphs[1].external_edges, BTreeSet::from([e[0]]));
        assert_eq!(p.subgraph_of_edge(e[2]), Some(SubgraphId(1)));

        let b = g.node_by_name("b").unwrap();
        assert_eq!(p.subgraphs[0].boundary_nodes(&g), vec![b]);
    }

    #[test]
    fn test_partition_rejects_overlap_and_gaps() {
        let (g, e) = chain();
        let overlap = PartitioningScheme::new(&g, vec![vec![e[0], e[1]], vec![e[1], e[2]]]);
        assert!(matches!(overlap, Err(PartitionError::OverlappingSubgraphs { .. })));

        let gap = PartitioningScheme::new(&g, vec![vec![e[0]], vec![e[2]]]);
        assert!(matches!(gap, Err(PartitionError::UncoveredEdge { edge, .. }) if edge == e[1]));
    }

    #[test]
    fn test_single_partition_covers_everything() {
        let (g, e) = chain();
        let p = PartitioningScheme::single(&g);
        assert_eq!(p.subgraphs.len(), 1);
        assert!(e.iter().all(|&x| p.subgraphs[0].contains_edge(x)));
        assert!(p.subgraphs[0].external_edges.is_empty());
    }
}
