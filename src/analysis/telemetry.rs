use crate::compute::{Argument, Program, RuleId};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentStats {
    /// References to entries computed earlier in the same program.
    pub entries: usize,
    /// Constants inlined as literals.
    pub literals: usize,
    /// Messages present on the graph before execution.
    pub stored: usize,
    /// Marginals of edges owned by other subgraphs.
    pub marginals: usize,
    /// Auxiliary node parameters.
    pub params: usize,
    /// Ports passed as absent (the outbound itself, or ignored by the rule).
    pub absent: usize,
}

#[derive(Debug, Clone)]
pub struct ScheduleReport {
    pub total_entries: usize,
    pub rule_counts: HashMap<RuleId, usize>,
    pub arguments: ArgumentStats,
    /// The average distance between an entry and the earlier entries it reads.
    /// A message consumed right after it is produced has distance 1.
    pub avg_entry_distance: f64,
    /// The largest such distance, i.e. how long a message must be kept alive.
    pub max_entry_distance: usize,
}

impl ScheduleReport {
    pub fn analyze(program: &Program) -> Self {
        let mut rule_counts = HashMap::new();
        let mut arguments = ArgumentStats::default();
        let mut total_distance: u64 = 0;
        let mut read_count: u64 = 0;
        let mut max_entry_distance = 0;

        for (i, entry) in program.entries.iter().enumerate() {
            *rule_counts.entry(entry.rule).or_insert(0) += 1;

            for arg in &entry.arguments {
                match arg {
                    Argument::Entry(source) => {
                        let dist = i.saturating_sub(*source);
                        total_distance += dist as u64;
                        read_count += 1;
                        max_entry_distance = max_entry_distance.max(dist);
                        arguments.entries += 1;
                    }
                    Argument::Literal(_) => arguments.literals += 1,
                    Argument::Stored(_) => arguments.stored += 1,
                    Argument::Marginal(_) => arguments.marginals += 1,
                    Argument::Param(..) => arguments.params += 1,
                    Argument::Absent => arguments.absent += 1,
                }
            }
        }

        Self {
            total_entries: program.entries.len(),
            rule_counts,
            arguments,
            avg_entry_distance: if read_count > 0 { total_distance as f64 / read_count as f64 } else { 0.0 },
            max_entry_distance,
        }
    }
}
