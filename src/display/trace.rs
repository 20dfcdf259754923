use crate::compute::{Argument, Program, RuleCatalog};
use crate::store::FactorGraph;
use std::fmt::Write;

/// Renders a compiled program as an indented listing, one block per entry:
///
/// ```text
/// [0] g1.out <- SPGaussianOutNPP : Gaussian
///    |-- m = 0.000
///    `-- v = 1.000
/// ```
///
/// Absent arguments are omitted.
pub fn format_program(graph: &FactorGraph, catalog: &RuleCatalog, program: &Program) -> String {
    let mut output = String::new();
    let scope = match program.subgraph {
        Some(id) => format!("subgraph {}", id.0),
        None => "whole graph".to_string(),
    };
    let _ = writeln!(output, "PROGRAM ({}, {} entries):", scope, program.len());
    let _ = writeln!(output, "--------------------------------------------------");

    for (i, entry) in program.entries.iter().enumerate() {
        let rule = catalog.rule(entry.rule);
        let _ = writeln!(output, "[{}] {} <- {} : {:?}", i, graph.label(entry.interface), rule.name, entry.outbound);

        let roles = &graph.node_of(entry.interface).interfaces;
        let lines: Vec<String> = entry
            .arguments
            .iter()
            .enumerate()
            .filter(|(_, arg)| !matches!(arg, Argument::Absent))
            .map(|(slot, arg)| {
                let name = roles.get(slot).map(|&r| graph.interface(r).role.as_str()).unwrap_or("param");
                format!("{} = {}", name, format_argument(graph, program, arg))
            })
            .collect();

        for (j, line) in lines.iter().enumerate() {
            let connector = if j == lines.len() - 1 { "`--" } else { "|--" };
            let _ = writeln!(output, "   {} {}", connector, line);
        }
    }
    output
}

fn format_argument(graph: &FactorGraph, program: &Program, arg: &Argument) -> String {
    match arg {
        Argument::Absent => "-".into(),
        Argument::Literal(value) => value.to_string(),
        Argument::Entry(idx) => match program.entries.get(*idx) {
            Some(source) => format!("#{} ({})", idx, graph.label(source.interface)),
            None => format!("#{} (?)", idx),
        },
        Argument::Stored(iface) => format!("stored {}", graph.label(*iface)),
        Argument::Marginal(edge) => format!("marginal {}", graph.edge(*edge).name),
        Argument::Param(name, value) => format!("{}: {}", name, value),
    }
}
