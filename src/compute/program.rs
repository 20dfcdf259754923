use super::assembler::{assemble_scoped, Argument};
use super::error::CompileError;
use super::rules::{InboundType, RuleCatalog, RuleId};
use crate::analysis::{schedule_all, Schedule};
use crate::config::SchedulerConfig;
use crate::store::{
    Family, FactorGraph, InterfaceId, PartitioningScheme, Subgraph, SubgraphId, TimeWrap, WriteBuffer,
};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use tracing::{debug, instrument, trace};

/// One compiled step: which rule computes the outbound of `interface`, and
/// with which arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub interface: InterfaceId,
    pub rule: RuleId,
    /// Family of the produced message, used to type downstream inbounds.
    pub outbound: Family,
    pub arguments: Vec<Argument>,
}

/// A schedule with every entry bound to a rule and its arguments.
///
/// Entry `i` may only reference entries `< i`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub subgraph: Option<SubgraphId>,
    pub entries: Vec<ScheduleEntry>,
    pub interface_to_entry: HashMap<InterfaceId, usize>,
}

impl Program {
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn entry_for(&self, iface: InterfaceId) -> Option<&ScheduleEntry> {
        self.interface_to_entry.get(&iface).map(|&i| &self.entries[i])
    }
}

/// Where a time-wrap reads its value: the entry producing its `from` side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrapBinding {
    pub wrap: TimeWrap,
    pub source: Option<(SubgraphId, usize)>,
}

/// The entries producing the messages a write-buffer exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferBinding {
    pub buffer: WriteBuffer,
    pub sources: Vec<(SubgraphId, usize)>,
}

/// Compiled programs for a whole partitioning scheme, in subgraph order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferencePlan {
    pub programs: Vec<Program>,
    pub time_wraps: Vec<WrapBinding>,
    pub write_buffers: Vec<BufferBinding>,
}

impl InferencePlan {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    fn locate(&self, iface: InterfaceId) -> Option<(SubgraphId, usize)> {
        self.programs.iter().enumerate().find_map(|(s, p)| {
            p.interface_to_entry.get(&iface).map(|&i| (SubgraphId::new(s), i))
        })
    }
}

/// Binds schedules to rules: walks a schedule in order, infers the observed
/// inbound types of each step from earlier steps, dispatches and assembles.
///
/// Constant producers never become entries; their literals are inlined.
pub struct Compiler<'a> {
    graph: &'a FactorGraph,
    catalog: &'a RuleCatalog,
}

impl<'a> Compiler<'a> {
    pub fn new(graph: &'a FactorGraph, catalog: &'a RuleCatalog) -> Self {
        Self { graph, catalog }
    }

    /// Compiles a schedule over the whole graph.
    #[instrument(skip_all, fields(entries = schedule.len()))]
    pub fn compile(&self, schedule: &[InterfaceId]) -> Result<Program, CompileError> {
        self.compile_scoped(schedule, None, &HashMap::new())
    }

    /// Compiles one subgraph's schedule. Ports on external edges are typed by
    /// `external` (families already known from other subgraphs) and passed as
    /// edge marginals.
    fn compile_scoped(
        &self,
        schedule: &[InterfaceId],
        scope: Option<&Subgraph>,
        external: &HashMap<InterfaceId, Family>,
    ) -> Result<Program, CompileError> {
        let mut program = Program {
            subgraph: scope.map(|s| s.id),
            entries: Vec::with_capacity(schedule.len()),
            interface_to_entry: HashMap::with_capacity(schedule.len()),
        };

        for &iface in schedule {
            let node = self.graph.node_of(iface);
            if node.is_constant() {
                // Folded into the arguments of its consumers.
                trace!(interface = %self.graph.label(iface), "folded constant");
                continue;
            }
            let signature = self.observed_signature(iface, &program, scope, external);
            let role = &self.graph.interface(iface).role;

            let rule_id = self.catalog.resolve(&node.kind, role, &signature).map_err(|source| {
                CompileError::Dispatch { label: self.graph.label(iface), source }
            })?;
            let rule = self.catalog.rule(rule_id);
            let arguments = assemble_scoped(self.graph, iface, rule, &program.interface_to_entry, scope)?;

            program.interface_to_entry.insert(iface, program.entries.len());
            program.entries.push(ScheduleEntry { interface: iface, rule: rule_id, outbound: rule.produces, arguments });
        }

        debug!(entries = program.len(), "compiled program");
        Ok(program)
    }

    /// The inbound type arriving on every port of `iface`'s node but `iface`.
    fn observed_signature(
        &self,
        iface: InterfaceId,
        program: &Program,
        scope: Option<&Subgraph>,
        external: &HashMap<InterfaceId, Family>,
    ) -> SmallVec<[InboundType; 4]> {
        let graph = self.graph;
        graph
            .node_of(iface)
            .interfaces
            .iter()
            .copied()
            .filter(|&other| other != iface)
            .map(|other| {
                let Some(partner) = graph.partner(other) else { return InboundType::Absent };
                if graph.constant_value(partner).is_some() {
                    return InboundType::Constant;
                }
                let outside = match (scope, graph.interface(other).edge) {
                    (Some(sg), Some(edge)) => !sg.contains_edge(edge),
                    _ => false,
                };
                if outside {
                    return external
                        .get(&partner)
                        .or_else(|| external.get(&other))
                        .map(|&f| InboundType::Message(f))
                        .or_else(|| preset_family(graph, partner).or_else(|| preset_family(graph, other)))
                        .unwrap_or(InboundType::Absent);
                }
                if let Some(entry) = program.entry_for(partner) {
                    return InboundType::Message(entry.outbound);
                }
                preset_family(graph, partner).unwrap_or(InboundType::Absent)
            })
            .collect()
    }

    /// Compiles the internal schedule of every subgraph (as stored on the
    /// partition) and binds time-wraps and write-buffers to their producers.
    #[instrument(skip_all, fields(subgraphs = partition.subgraphs.len()))]
    pub fn compile_partition(&self, partition: &PartitioningScheme) -> Result<InferencePlan, CompileError> {
        let mut plan = InferencePlan::default();
        let mut known: HashMap<InterfaceId, Family> = HashMap::new();

        for sg in &partition.subgraphs {
            let program = self.compile_scoped(&sg.internal_schedule, Some(sg), &known)?;
            for entry in &program.entries {
                known.insert(entry.interface, entry.outbound);
            }
            plan.programs.push(program);
        }

        plan.time_wraps = partition
            .time_wraps
            .iter()
            .map(|&wrap| WrapBinding { wrap, source: plan.locate(wrap.from) })
            .collect();
        plan.write_buffers = partition
            .write_buffers
            .iter()
            .map(|&buffer| BufferBinding {
                buffer,
                sources: buffer
                    .required_interfaces(self.graph)
                    .into_iter()
                    .filter_map(|i| plan.locate(i))
                    .collect(),
            })
            .collect();

        Ok(plan)
    }
}

fn preset_family(graph: &FactorGraph, iface: InterfaceId) -> Option<InboundType> {
    graph.interface(iface).message.as_ref().map(|m| InboundType::Message(m.family))
}

/// Compiles the schedule computing the outbound of `target`.
pub fn compile_target(
    graph: &FactorGraph,
    catalog: &RuleCatalog,
    target: InterfaceId,
) -> Result<Program, CompileError> {
    let order: Schedule = crate::analysis::schedule(graph, target, None)?;
    Compiler::new(graph, catalog).compile(&order)
}

/// Schedules every subgraph of `partition`, then compiles the result.
pub fn build_plan(
    graph: &FactorGraph,
    catalog: &RuleCatalog,
    partition: &mut PartitioningScheme,
    config: &SchedulerConfig,
) -> Result<InferencePlan, CompileError> {
    schedule_all(graph, partition, config)?;
    Compiler::new(graph, catalog).compile_partition(partition)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::compute::error::{AssemblyError, DispatchError};
    use crate::compute::rules::{Pattern, Rule};
    use crate::store::{Message, Value};
    use Family::*;
    use Pattern::{AnyMessage, Constant, Family as F};

    /// A small sum-product catalog for Gaussian chains.
    pub(crate) fn catalog() -> RuleCatalog {
        RuleCatalog::builder()
            .with(Rule::new("SPGaussianOutNPP", "Gaussian", "out", [Constant, Constant], Gaussian))
            .unwrap()
            .with(Rule::new("SPGaussianOutNGP", "Gaussian", "out", [F(Gaussian), Constant], Gaussian))
            .unwrap()
            .with(Rule::new("SPGaussianMGNP", "Gaussian", "m", [F(Gaussian), Constant], Gaussian))
            .unwrap()
            .with(Rule::new("SPAdditionOutNGG", "Addition", "out", [F(Gaussian), F(Gaussian)], Gaussian))
            .unwrap()
            .with(Rule::new("SPAdditionIn1GNG", "Addition", "in1", [AnyMessage, F(Gaussian)], Gaussian))
            .unwrap()
            .with(Rule::new("SPTerminal", "Terminal", "in1", std::iter::empty(), PointMass))
            .unwrap()
            .build()
            .unwrap()
    }

    /// m, v -> g1(out, m, v) ; g1.out -> add.in1 ; m, v -> g2 ; g2.out -> add.in2 ; add.out -> obs
    pub(crate) fn model() -> FactorGraph {
        let mut g = FactorGraph::new();
        let add = g.add_named_node("add", "Addition", &["out", "in1", "in2"]).unwrap();
        for (i, role) in [(1, "in1"), (2, "in2")] {
            let gauss = g.add_named_node(&format!("g{}", i), "Gaussian", &["out", "m", "v"]).unwrap();
            let m = g.add_named_constant(&format!("m{}", i), 0.0).unwrap();
            let v = g.add_named_constant(&format!("v{}", i), 1.0).unwrap();
            g.connect_roles(m, "out", gauss, "m").unwrap();
            g.connect_roles(v, "out", gauss, "v").unwrap();
            g.connect_roles(gauss, "out", add, role).unwrap();
        }
        let obs = g.add_named_node("obs", "Terminal", &["in1"]).unwrap();
        g.connect_roles(add, "out", obs, "in1").unwrap();
        g
    }

    fn iface(g: &FactorGraph, node: &str, role: &str) -> InterfaceId {
        g.interface_by_role(g.node_by_name(node).unwrap(), role).unwrap()
    }

    #[test]
    fn test_forward_pass_compiles_with_folded_constants() {
        let g = model();
        let cat = catalog();
        let program = compile_target(&g, &cat, iface(&g, "add", "out")).unwrap();

        let names: Vec<&str> = program.entries.iter().map(|e| cat.rule(e.rule).name.as_str()).collect();
        assert_eq!(names, vec!["SPGaussianOutNPP", "SPGaussianOutNPP", "SPAdditionOutNGG"]);

        let first = &program.entries[0];
        assert_eq!(
            first.arguments,
            vec![Argument::Absent, Argument::Literal(Value::Scalar(0.0)), Argument::Literal(Value::Scalar(1.0))]
        );
        let last = program.entries.last().unwrap();
        assert_eq!(last.arguments, vec![Argument::Absent, Argument::Entry(0), Argument::Entry(1)]);
    }

    #[test]
    fn test_backward_message_types_flow_from_earlier_entries() {
        let mut g = model();
        g.set_message(iface(&g, "obs", "in1"), Message::new(Gaussian, vec![3.0, 0.1])).unwrap();
        let cat = catalog();
        let program = compile_target(&g, &cat, iface(&g, "g1", "m")).unwrap();

        // add.in1 sees the observation (preset) and g2.out (scheduled Gaussian)
        let target = program.entry_for(iface(&g, "add", "in1")).unwrap();
        assert_eq!(cat.rule(target.rule).name, "SPAdditionIn1GNG");
        assert!(target.arguments.contains(&Argument::Stored(iface(&g, "obs", "in1"))));

        let last = program.entries.last().unwrap();
        assert_eq!(cat.rule(last.rule).name, "SPGaussianMGNP");
    }

    #[test]
    fn test_unmatched_signature_reports_location() {
        let g = model();
        let cat = catalog();
        // obs.in1 and g1.out compile; nothing computes an Addition's in2
        let err = compile_target(&g, &cat, iface(&g, "add", "in2")).unwrap_err();
        match err {
            CompileError::Dispatch { label, source: DispatchError::NoApplicableRule { kind, role, signature } } => {
                assert_eq!(label, "add.in2");
                assert_eq!((kind.as_str(), role.as_str()), ("Addition", "in2"));
                assert_eq!(signature, "(PointMass, Gaussian)");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_fallback_error_surfaces_through_compile() {
        let mut g = FactorGraph::new();
        let f = g.add_named_node("f", "Nonlinear", &["out", "in1"]).unwrap();
        let src = g.add_named_node("src", "Source", &["out"]).unwrap();
        let sink = g.add_named_node("sink", "Terminal", &["in1"]).unwrap();
        g.connect_roles(src, "out", f, "in1").unwrap();
        g.connect_roles(f, "out", sink, "in1").unwrap();
        g.set_message(iface(&g, "sink", "in1"), Message::new(Gaussian, vec![0.0, 1.0])).unwrap();

        let cat = RuleCatalog::builder()
            .with(
                Rule::new("SPNonlinearIn1", "Nonlinear", "in1", [F(Gaussian)], Gaussian)
                    .with_fallback("g_inv", "in1"),
            )
            .unwrap()
            .build()
            .unwrap();

        let err = compile_target(&g, &cat, iface(&g, "f", "in1")).unwrap_err();
        assert!(matches!(err, CompileError::Assembly(AssemblyError::UnavailableApproximationPoint { .. })));

        g.set_param(f, "g_inv", 0.0).unwrap();
        let program = compile_target(&g, &cat, iface(&g, "f", "in1")).unwrap();
        assert!(matches!(program.entries[0].arguments.last(), Some(Argument::Param(name, _)) if name == "g_inv"));
    }

    #[test]
    fn test_plan_binds_buffers_and_exports_json() {
        let g = model();
        let cat = catalog();
        let mut partition = PartitioningScheme::single(&g);
        let target = iface(&g, "add", "out");
        partition.add_write_buffer(&g, WriteBuffer::Interface(target)).unwrap();

        let plan = build_plan(&g, &cat, &mut partition, &SchedulerConfig::default()).unwrap();
        assert_eq!(plan.programs.len(), 1);
        let (sg, idx) = plan.write_buffers[0].sources[0];
        assert_eq!(sg, SubgraphId(0));
        assert_eq!(plan.programs[0].entries[idx].interface, target);

        let restored = InferencePlan::from_json(&plan.to_json().unwrap()).unwrap();
        assert_eq!(restored, plan);
    }
}
