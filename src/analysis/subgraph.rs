//! Internal schedules for the subgraphs of a partitioning scheme.
use super::error::ScheduleError;
use super::schedule::{Resolver, Schedule};
use crate::config::SchedulerConfig;
use crate::store::{FactorGraph, InterfaceId, PartitioningScheme, SubgraphId};
use rayon::prelude::*;
use smallvec::SmallVec;
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Computes (without committing) the internal schedule of one subgraph.
///
/// The result is, in order and without repeats:
/// 1. the inbound messages of every boundary node, from inside the subgraph;
/// 2. for boundary nodes with a single internal edge, their own outbound on it;
/// 3. the `from` side of time-wraps living in the subgraph;
/// 4. the write-buffer targets living in the subgraph.
pub fn subgraph_schedule(
    graph: &FactorGraph,
    partition: &PartitioningScheme,
    id: SubgraphId,
    config: &SchedulerConfig,
) -> Result<Schedule, ScheduleError> {
    let sg = partition.subgraph(id).ok_or(ScheduleError::UnknownSubgraph(id))?;

    // 1 + 2. Boundary nodes
    let mut internal = Resolver::new(graph, Some(sg));
    let mut univariate = Vec::new();
    for node in sg.boundary_nodes(graph) {
        let inside: SmallVec<[InterfaceId; 4]> = graph
            .node(node)
            .interfaces
            .iter()
            .copied()
            .filter(|&i| graph.interface(i).edge.map_or(false, |e| sg.contains_edge(e)))
            .collect();

        for &iface in &inside {
            let partner = graph.partner(iface).ok_or_else(|| ScheduleError::DisconnectedInterface {
                interface: iface,
                label: graph.label(iface),
            })?;
            internal.resolve(partner)?;
        }
        if config.univariate_outbounds && inside.len() == 1 {
            univariate.push(inside[0]);
        }
    }

    // 3. Time-wraps
    let mut wraps = Resolver::new(graph, Some(sg));
    if config.include_time_wraps {
        for wrap in partition.time_wraps.iter().filter(|w| sg.owns_interface(graph, w.from)) {
            wraps.resolve(wrap.from)?;
        }
    }

    // 4. Write-buffers
    let mut buffers = Resolver::new(graph, Some(sg));
    if config.include_write_buffers {
        for buffer in &partition.write_buffers {
            for iface in buffer.required_interfaces(graph) {
                if sg.owns_interface(graph, iface) {
                    buffers.resolve(iface)?;
                }
            }
        }
    }

    let mut seen = HashSet::new();
    let order: Schedule = internal
        .finish()
        .into_iter()
        .chain(univariate)
        .chain(wraps.finish())
        .chain(buffers.finish())
        .filter(|i| seen.insert(*i))
        .collect();

    debug!(subgraph = id.0, entries = order.len(), "generated internal schedule");
    Ok(order)
}

/// Generates the internal schedule of one subgraph and stores it on the subgraph.
pub fn schedule_subgraph(
    graph: &FactorGraph,
    partition: &mut PartitioningScheme,
    id: SubgraphId,
    config: &SchedulerConfig,
) -> Result<(), ScheduleError> {
    let order = subgraph_schedule(graph, partition, id, config)?;
    partition.subgraphs[id.index()].internal_schedule = order;
    Ok(())
}

/// Schedules every subgraph of `partition`.
///
/// Generation only reads the graph; with `config.parallel` subgraphs are
/// scheduled concurrently. Results are written back on the calling thread and
/// only once every subgraph succeeded.
#[instrument(skip_all, fields(subgraphs = partition.subgraphs.len(), parallel = config.parallel))]
pub fn schedule_all(
    graph: &FactorGraph,
    partition: &mut PartitioningScheme,
    config: &SchedulerConfig,
) -> Result<(), ScheduleError> {
    let count = partition.subgraphs.len();
    let shared: &PartitioningScheme = partition;

    let schedules: Vec<Schedule> = if config.parallel {
        (0..count)
            .into_par_iter()
            .map(|i| subgraph_schedule(graph, shared, SubgraphId::new(i), config))
            .collect::<Result<_, _>>()?
    } else {
        (0..count)
            .map(|i| subgraph_schedule(graph, shared, SubgraphId::new(i), config))
            .collect::<Result<_, _>>()?
    };

    for (sg, order) in partition.subgraphs.iter_mut().zip(schedules) {
        sg.internal_schedule = order;
    }
    Ok(())
}
