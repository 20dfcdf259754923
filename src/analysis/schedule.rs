use super::error::ScheduleError;
use crate::store::{FactorGraph, InterfaceId, Subgraph};
use std::collections::HashSet;
use tracing::{debug, instrument, trace};

/// An ordered list of interfaces whose outbound messages must be computed.
pub type Schedule = Vec<InterfaceId>;

struct Frame {
    iface: InterfaceId,
    /// Next position in the owning node's interface list to inspect.
    cursor: usize,
}

/// Depth-first dependency resolution with a cycle guard.
///
/// Produces a post-order list: an interface is appended only after the
/// partners of every other interface on its node are either already in the
/// result or already hold a message. The recursion is unrolled into an
/// explicit frame stack so deep chains cannot overflow the call stack; cycle
/// detection is still a membership test against the active stack.
///
/// One resolver may serve several targets in sequence, sharing its result
/// (this is how partial orders and subgraph schedules are accumulated).
pub(crate) struct Resolver<'a> {
    graph: &'a FactorGraph,
    scope: Option<&'a Subgraph>,
    stack: Vec<Frame>,
    on_stack: HashSet<InterfaceId>,
    result: Schedule,
    in_result: HashSet<InterfaceId>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(graph: &'a FactorGraph, scope: Option<&'a Subgraph>) -> Self {
        Self {
            graph,
            scope,
            stack: Vec::new(),
            on_stack: HashSet::new(),
            result: Vec::new(),
            in_result: HashSet::new(),
        }
    }

    /// Ports on edges of other subgraphs are not followed. A dangling port
    /// is always followed, so it is reported as disconnected.
    #[inline]
    fn in_scope(&self, iface: InterfaceId) -> bool {
        match (self.scope, self.graph.interface(iface).edge) {
            (Some(sg), Some(edge)) => sg.contains_edge(edge),
            _ => true,
        }
    }

    fn enter(&mut self, iface: InterfaceId) -> Result<(), ScheduleError> {
        if !self.on_stack.insert(iface) {
            return Err(ScheduleError::UnbrokenLoop { interface: iface, label: self.graph.label(iface) });
        }
        self.stack.push(Frame { iface, cursor: 0 });
        Ok(())
    }

    pub(crate) fn resolve(&mut self, target: InterfaceId) -> Result<(), ScheduleError> {
        if !self.graph.contains_interface(target) {
            return Err(ScheduleError::UnknownInterface(target));
        }
        if self.in_result.contains(&target) {
            return Ok(());
        }
        self.enter(target)?;

        let graph = self.graph;
        while let Some(frame) = self.stack.last_mut() {
            let iface = frame.iface;
            let node = graph.node_of(iface);

            match node.interfaces.get(frame.cursor).copied() {
                Some(other) => {
                    frame.cursor += 1;
                    if other == iface || !self.in_scope(other) {
                        continue;
                    }
                    let partner = graph.partner(other).ok_or_else(|| ScheduleError::DisconnectedInterface {
                        interface: other,
                        label: graph.label(other),
                    })?;
                    if graph.has_message(partner) || self.in_result.contains(&partner) {
                        continue;
                    }
                    self.enter(partner)?;
                }
                None => {
                    self.stack.pop();
                    self.on_stack.remove(&iface);
                    if self.in_result.insert(iface) {
                        trace!(interface = %graph.label(iface), position = self.result.len(), "scheduled");
                        self.result.push(iface);
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> Schedule { self.result }
}

/// Generates the schedule that computes the outbound message of `target`.
///
/// With a `scope`, interfaces whose edge is not internal to that subgraph are
/// not followed.
#[instrument(skip_all, fields(target = %graph.label(target)))]
pub fn schedule(
    graph: &FactorGraph,
    target: InterfaceId,
    scope: Option<&Subgraph>,
) -> Result<Schedule, ScheduleError> {
    let mut resolver = Resolver::new(graph, scope);
    resolver.resolve(target)?;
    let order = resolver.finish();
    debug!(entries = order.len(), "generated schedule");
    Ok(order)
}

/// Completes a caller-supplied partial order inside one subgraph.
///
/// Entries keep their relative order; the unmet dependencies of each are
/// inserted right before it.
#[instrument(skip_all, fields(subgraph = scope.id.0, requested = entries.len()))]
pub fn complete_partial_schedule(
    graph: &FactorGraph,
    entries: &[InterfaceId],
    scope: &Subgraph,
) -> Result<Schedule, ScheduleError> {
    for &entry in entries {
        if !graph.contains_interface(entry) {
            return Err(ScheduleError::UnknownInterface(entry));
        }
        if !scope.owns_interface(graph, entry) {
            return Err(ScheduleError::CrossSubgraphPartialSchedule {
                interface: entry,
                label: graph.label(entry),
                expected: scope.id,
            });
        }
    }

    let mut resolver = Resolver::new(graph, Some(scope));
    for &entry in entries {
        resolver.resolve(entry)?;
    }
    let order = resolver.finish();
    debug!(entries = order.len(), "completed partial schedule");
    Ok(order)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::{EdgeId, Family, Message, NodeId, PartitioningScheme};

    pub(crate) fn out(g: &FactorGraph, node: &str, role: &str) -> InterfaceId {
        g.interface_by_role(g.node_by_name(node).unwrap(), role).unwrap()
    }

    /// Every entry's other ports either hold an inbound message or their
    /// partner appears earlier in the order (or lies outside `scope`).
    pub(crate) fn assert_valid_order(g: &FactorGraph, order: &[InterfaceId], scope: Option<&Subgraph>) {
        let pos = |id: InterfaceId| order.iter().position(|&x| x == id);
        for (i, &entry) in order.iter().enumerate() {
            for &other in &g.node_of(entry).interfaces {
                if other == entry {
                    continue;
                }
                if let Some(sg) = scope {
                    if !g.interface(other).edge.map_or(true, |e| sg.contains_edge(e)) {
                        continue;
                    }
                }
                let partner = g.partner(other).unwrap();
                if g.has_message(partner) {
                    continue;
                }
                let j = pos(partner).unwrap_or_else(|| panic!("{} missing", g.label(partner)));
                assert!(j < i, "{} must precede {}", g.label(partner), g.label(entry));
            }
        }
    }

    /// a(out) -e1- b(in1, out) -e2- c(in1, out)
    fn chain() -> (FactorGraph, NodeId, NodeId, NodeId) {
        let mut g = FactorGraph::new();
        let a = g.add_named_node("a", "Source", &["out"]).unwrap();
        let b = g.add_named_node("b", "Link", &["in1", "out"]).unwrap();
        let c = g.add_named_node("c", "Link", &["in1", "out"]).unwrap();
        g.connect_roles(a, "out", b, "in1").unwrap();
        g.connect_roles(b, "out", c, "in1").unwrap();
        (g, a, b, c)
    }

    /// x -> y -> z -> x, every node with (in, out).
    fn triangle() -> FactorGraph {
        let mut g = FactorGraph::new();
        let x = g.add_named_node("x", "Link", &["in1", "out"]).unwrap();
        let y = g.add_named_node("y", "Link", &["in1", "out"]).unwrap();
        let z = g.add_named_node("z", "Link", &["in1", "out"]).unwrap();
        g.connect_roles(x, "out", y, "in1").unwrap();
        g.connect_roles(y, "out", z, "in1").unwrap();
        g.connect_roles(z, "out", x, "in1").unwrap();
        g
    }

    /// Two Gaussian priors feeding an addition whose output is observed.
    ///
    /// m1, v1 -> g1 -> add.in1 ; m2, v2 -> g2 -> add.in2 ; add.out -> obs
    fn tree() -> FactorGraph {
        let mut g = FactorGraph::new();
        for i in 1..=2 {
            let m = g.add_named_constant(&format!("m{}", i), 0.0).unwrap();
            let v = g.add_named_constant(&format!("v{}", i), 1.0).unwrap();
            let gauss = g.add_named_node(&format!("g{}", i), "Gaussian", &["out", "m", "v"]).unwrap();
            g.connect_roles(m, "out", gauss, "m").unwrap();
            g.connect_roles(v, "out", gauss, "v").unwrap();
        }
        let add = g.add_named_node("add", "Addition", &["out", "in1", "in2"]).unwrap();
        let obs = g.add_named_node("obs", "Terminal", &["in1"]).unwrap();
        let g1 = g.node_by_name("g1").unwrap();
        let g2 = g.node_by_name("g2").unwrap();
        g.connect_roles(g1, "out", add, "in1").unwrap();
        g.connect_roles(g2, "out", add, "in2").unwrap();
        g.connect_roles(add, "out", obs, "in1").unwrap();
        g
    }

    #[test]
    fn test_chain_end_to_end() {
        let (g, a, b, c) = chain();
        let target = g.interface_by_role(c, "out").unwrap();
        let order = schedule(&g, target, None).unwrap();

        let expected = vec![
            g.interface_by_role(a, "out").unwrap(),
            g.interface_by_role(b, "out").unwrap(),
            target,
        ];
        assert_eq!(order, expected);
    }

    #[test]
    fn test_tree_order_is_valid_and_deterministic() {
        let g = tree();
        let target = out(&g, "add", "in1"); // backward message towards g1

        let first = schedule(&g, target, None).unwrap();
        assert_valid_order(&g, &first, None);
        assert_eq!(first.last(), Some(&target));
        // obs.in1 has no other ports, it is a leaf of the dependency tree
        assert!(first.contains(&out(&g, "obs", "in1")));
        assert!(first.contains(&out(&g, "g2", "out")));
        assert!(!first.contains(&out(&g, "g1", "out")));

        let second = schedule(&g, target, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unbroken_loop_detected_and_priming_breaks_it() {
        let mut g = triangle();
        for node in ["x", "y", "z"] {
            let err = schedule(&g, out(&g, node, "out"), None).unwrap_err();
            assert!(matches!(err, ScheduleError::UnbrokenLoop { .. }), "{:?}", err);
        }

        let err = schedule(&g, out(&g, "z", "out"), None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unbroken loop at interface 'z.out': prime an initial message on it before scheduling"
        );

        g.set_message(out(&g, "z", "out"), Message::new(Family::Gaussian, vec![0.0, 1.0])).unwrap();
        let order = schedule(&g, out(&g, "z", "out"), None).unwrap();
        assert_eq!(order, vec![out(&g, "x", "out"), out(&g, "y", "out"), out(&g, "z", "out")]);
    }

    #[test]
    fn test_present_messages_are_not_rescheduled() {
        let (mut g, _, b, c) = chain();
        let b_out = g.interface_by_role(b, "out").unwrap();
        g.set_message(b_out, Message::new(Family::Gaussian, vec![0.0, 1.0])).unwrap();

        let target = g.interface_by_role(c, "out").unwrap();
        assert_eq!(schedule(&g, target, None).unwrap(), vec![target]);
    }

    #[test]
    fn test_disconnected_interface_reported() {
        let mut g = FactorGraph::new();
        let n = g.add_named_node("lonely", "Link", &["in1", "out"]).unwrap();
        let err = schedule(&g, g.interface_by_role(n, "out").unwrap(), None).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::DisconnectedInterface {
                interface: g.interface_by_role(n, "in1").unwrap(),
                label: "lonely.in1".into()
            }
        );
    }

    #[test]
    fn test_disconnected_interface_reported_inside_scope() {
        // a -e1- b(in1, in2, out) -e2- c ; b.in2 dangling
        let mut g = FactorGraph::new();
        let a = g.add_named_node("a", "Source", &["out"]).unwrap();
        let b = g.add_named_node("b", "Merge", &["in1", "in2", "out"]).unwrap();
        let c = g.add_named_node("c", "Sink", &["in1"]).unwrap();
        g.connect_roles(a, "out", b, "in1").unwrap();
        g.connect_roles(b, "out", c, "in1").unwrap();
        let p = PartitioningScheme::single(&g);

        let target = g.interface_by_role(b, "out").unwrap();
        let expected = ScheduleError::DisconnectedInterface {
            interface: g.interface_by_role(b, "in2").unwrap(),
            label: "b.in2".into(),
        };
        assert_eq!(schedule(&g, target, None).unwrap_err(), expected);
        assert_eq!(schedule(&g, target, Some(&p.subgraphs[0])).unwrap_err(), expected);
        assert_eq!(complete_partial_schedule(&g, &[target], &p.subgraphs[0]).unwrap_err(), expected);
    }

    #[test]
    fn test_partial_order_preserved_and_deduplicated() {
        let g = tree();
        let p = PartitioningScheme::single(&g);
        let sg = &p.subgraphs[0];

        // g2.out does not depend on g1.out; requested first, it stays first.
        let b = out(&g, "g2", "out");
        let a = out(&g, "g1", "out");
        let add_out = out(&g, "add", "out");
        let order = complete_partial_schedule(&g, &[b, a, add_out], sg).unwrap();

        let pos = |id| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(b) < pos(a));
        assert!(pos(a) < pos(add_out));
        // add.out needs both g1.out and g2.out; each appears exactly once.
        assert_eq!(order.iter().filter(|&&x| x == a).count(), 1);
        assert_eq!(order.iter().filter(|&&x| x == b).count(), 1);
        assert_valid_order(&g, &order, Some(sg));
    }

    #[test]
    fn test_partial_order_must_stay_in_one_subgraph() {
        let (g, a, b, _) = chain();
        let p = PartitioningScheme::new(&g, vec![vec![EdgeId(0)], vec![EdgeId(1)]]).unwrap();
        let a_out = g.interface_by_role(a, "out").unwrap();
        let b_out = g.interface_by_role(b, "out").unwrap();

        let err = complete_partial_schedule(&g, &[a_out, b_out], &p.subgraphs[0]).unwrap_err();
        assert!(matches!(err, ScheduleError::CrossSubgraphPartialSchedule { interface, .. } if interface == b_out));
    }

    #[test]
    fn test_scope_restriction_never_leaves_subgraph() {
        // a -e1- b -e2- c -e3- d ; S1 = {e1}, S2 = {e2, e3}
        let mut g = FactorGraph::new();
        let a = g.add_named_node("a", "Source", &["out"]).unwrap();
        let b = g.add_named_node("b", "Link", &["in1", "out"]).unwrap();
        let c = g.add_named_node("c", "Link", &["in1", "out"]).unwrap();
        let d = g.add_named_node("d", "Sink", &["in1"]).unwrap();
        let e1 = g.connect_roles(a, "out", b, "in1").unwrap();
        let e2 = g.connect_roles(b, "out", c, "in1").unwrap();
        let e3 = g.connect_roles(c, "out", d, "in1").unwrap();
        let p = PartitioningScheme::new(&g, vec![vec![e1], vec![e2, e3]]).unwrap();

        let target = g.interface_by_role(b, "in1").unwrap();
        let scoped = schedule(&g, target, Some(&p.subgraphs[0])).unwrap();
        assert_eq!(scoped, vec![target]);
        for iface in &scoped {
            let edge = g.interface(*iface).edge;
            assert!(edge != Some(e2) && edge != Some(e3));
        }

        let unscoped = schedule(&g, target, None).unwrap();
        assert_eq!(unscoped.len(), 3);
        assert_valid_order(&g, &unscoped, None);
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let mut g = FactorGraph::new();
        let mut prev = g.add_node("Source", &["out"]).unwrap();
        for _ in 0..50_000 {
            let n = g.add_node("Link", &["in1", "out"]).unwrap();
            g.connect_roles(prev, "out", n, "in1").unwrap();
            prev = n;
        }
        let order = schedule(&g, g.interface_by_role(prev, "out").unwrap(), None).unwrap();
        assert_eq!(order.len(), 50_001);
    }
}
