//! Trace Graph DOT Exporter
//!
//! Exports a NodeArena as Graphviz DOT, styling internal blocks and
//! external calls differently.

use crate::domain::graph::NodeArena;
use crate::domain::node::{NodeData, NodeKind};
use crate::ports::GraphExporter;
use std::io::Result;

pub struct DotExporter;

impl GraphExporter for DotExporter {
    fn export(&self, arena: &NodeArena, path: &str) -> Result<()> {
        std::fs::write(path, Self::to_dot(arena))
    }
}

impl DotExporter {
    /// Convert the arena to a DOT string.
    pub fn to_dot(arena: &NodeArena) -> String {
        let mut lines = Vec::new();

        lines.push("digraph Trace {".to_string());
        lines.push("    rankdir=TB;".to_string());
        lines.push("    node [fontname=\"Helvetica\", fontsize=11];".to_string());
        lines.push("".to_string());

        for node in arena.iter() {
            let (shape, fill, style) = Self::node_style(node);
            lines.push(format!(
                "    n{} [label=\"{}\", shape={}, style=\"{}\", fillcolor=\"{}\"];",
                node.index(),
                Self::escape_label(&Self::label(node)),
                shape,
                style,
                fill
            ));
        }

        lines.push("".to_string());

        // Edges come from the outgoing side only so each appears once
        for node in arena.iter() {
            for to in &node.outgoing {
                lines.push(format!("    n{} -> n{};", node.index(), to));
            }
        }

        lines.push("}".to_string());
        lines.join("\n")
    }

    fn label(node: &NodeData) -> String {
        match &node.kind {
            NodeKind::Internal(block) => {
                let ins = block.ins();
                format!(
                    "{:#x}: {} {}\nx{}",
                    node.address, ins.mnemonic, ins.op_str, node.execution_count
                )
            }
            NodeKind::External(call) => format!(
                "extern {:#x}\n{} call(s) captured",
                node.address,
                call.funcargs.len()
            ),
        }
    }

    fn node_style(node: &NodeData) -> (&'static str, &'static str, &'static str) {
        match &node.kind {
            NodeKind::External(_) => ("box", "#6c7086", "filled,dashed"),
            NodeKind::Internal(block) if block.ins().conditional => ("diamond", "#f9e2af", "filled"),
            NodeKind::Internal(_) => ("box", "#89b4fa", "filled"),
        }
    }

    fn escape_label(label: &str) -> String {
        label
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
    }
}
