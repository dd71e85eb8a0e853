use crate::domain::coords::{FCoord, Multipliers};
use crate::domain::disassembly::DisassemblyCache;
use crate::domain::graph::NodeArena;
use crate::infrastructure::GraphFile;
use crate::ports::GraphExporter;
use rayon::prelude::*;

/// Counts shown by `tracevis inspect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphSummary {
    pub nodes: usize,
    pub internal: usize,
    pub external: usize,
    pub edges: usize,
    pub self_loops: Vec<u32>,
    pub unmirrored_edges: Vec<(u32, u32)>,
}

impl GraphSummary {
    pub fn of(arena: &NodeArena) -> Self {
        let external = arena.external_count();
        Self {
            nodes: arena.len(),
            internal: arena.len() - external,
            external,
            edges: arena.edge_count(),
            self_loops: arena.self_loops(),
            unmirrored_edges: arena.unmirrored_edges(),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.self_loops.is_empty() && self.unmirrored_edges.is_empty()
    }
}

/// Sphere position of every node, computed in parallel, in index order.
pub fn layout(arena: &NodeArena, dims: &Multipliers, diam_modifier: f32) -> Vec<(u32, FCoord)> {
    arena
        .nodes()
        .par_iter()
        .map(|n| (n.index(), n.sphere_coord_b(dims, diam_modifier)))
        .collect()
}

pub struct ExportUsecase<'a> {
    pub exporter: &'a dyn GraphExporter,
}

impl<'a> ExportUsecase<'a> {
    /// Load a saved graph and hand it to the exporter.
    pub fn run(
        &self,
        file: &GraphFile,
        cache: &dyn DisassemblyCache,
        export_path: &str,
    ) -> anyhow::Result<GraphSummary> {
        let arena = file.load(cache)?;
        self.exporter.export(&arena, export_path)?;
        Ok(GraphSummary::of(&arena))
    }
}
