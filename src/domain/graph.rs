// Index-addressed node storage for a trace graph.
// Neighbours are raw indices into this arena, never references.

use crate::domain::coords::VCoord;
use crate::domain::node::{InternalBlock, NodeData};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArenaError {
    #[error("node {index} inserted out of order (next free index is {expected})")]
    OutOfOrder { index: u32, expected: u32 },
    #[error("node index {0} does not exist")]
    UnknownNode(u32),
    #[error("self edge on node {0}")]
    SelfEdge(u32),
}

/// The node population of one traced thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeArena {
    nodes: Vec<NodeData>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn next_index(&self) -> u32 {
        self.nodes.len() as u32
    }

    pub fn push_internal(&mut self, vcoord: VCoord, block: InternalBlock) -> u32 {
        let index = self.next_index();
        self.nodes.push(NodeData::internal(index, vcoord, block));
        index
    }

    pub fn push_external(&mut self, vcoord: VCoord, address: u64) -> u32 {
        let index = self.next_index();
        self.nodes.push(NodeData::external(index, vcoord, address));
        index
    }

    /// Place a node built elsewhere (e.g. by the decoder) at its own index.
    pub fn insert(&mut self, node: NodeData) -> Result<u32, ArenaError> {
        let expected = self.next_index();
        if node.index() != expected {
            return Err(ArenaError::OutOfOrder {
                index: node.index(),
                expected,
            });
        }
        self.nodes.push(node);
        Ok(expected)
    }

    pub fn get(&self, index: u32) -> Option<&NodeData> {
        self.nodes.get(index as usize)
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut NodeData> {
        self.nodes.get_mut(index as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeData> {
        self.nodes.iter()
    }

    pub fn nodes(&self) -> &[NodeData] {
        &self.nodes
    }

    /// Record `from -> to` on both endpoints. Returns whether the edge is new.
    pub fn add_edge(&mut self, from: u32, to: u32) -> Result<bool, ArenaError> {
        if from == to {
            return Err(ArenaError::SelfEdge(from));
        }
        if self.get(to).is_none() {
            return Err(ArenaError::UnknownNode(to));
        }
        let source = self.get_mut(from).ok_or(ArenaError::UnknownNode(from))?;
        let added = source.add_outgoing(to);
        if let Some(target) = self.get_mut(to) {
            target.add_incoming(from);
        }
        Ok(added)
    }

    /// Number of distinct directed edges, counted from the outgoing side.
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.outgoing.len()).sum()
    }

    pub fn external_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_external()).count()
    }

    /// Indices of nodes listing themselves as a neighbour.
    pub fn self_loops(&self) -> Vec<u32> {
        self.nodes
            .iter()
            .filter(|n| n.has_self_loop())
            .map(|n| n.index())
            .collect()
    }

    /// Edges present on one endpoint but not mirrored on the other.
    pub fn unmirrored_edges(&self) -> Vec<(u32, u32)> {
        let mut broken = Vec::new();
        for node in &self.nodes {
            for &to in &node.outgoing {
                let mirrored = self
                    .get(to)
                    .map(|t| t.incoming.contains(&node.index()))
                    .unwrap_or(false);
                if !mirrored {
                    broken.push((node.index(), to));
                }
            }
            for &from in &node.incoming {
                let mirrored = self
                    .get(from)
                    .map(|f| f.outgoing.contains(&node.index()))
                    .unwrap_or(false);
                if !mirrored {
                    broken.push((from, node.index()));
                }
            }
        }
        broken.sort_unstable();
        broken.dedup();
        broken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::disassembly::{InstructionData, MemoryDisassembly};

    fn sample_arena() -> NodeArena {
        let cache = MemoryDisassembly::new();
        let ins = cache.record(InstructionData::new(0x1000, "call", "0x2000", 5));

        let mut arena = NodeArena::new();
        arena.push_internal(VCoord::new(0, 0, 0), InternalBlock::from_instruction(ins));
        arena.push_external(VCoord::new(3, 4, 0), 0x7700_0000);
        arena
    }

    #[test]
    fn test_push_assigns_sequential_indices() {
        let arena = sample_arena();
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(0).unwrap().index(), 0);
        assert_eq!(arena.get(1).unwrap().index(), 1);
        assert_eq!(arena.external_count(), 1);
    }

    #[test]
    fn test_add_edge_is_mirrored() {
        let mut arena = sample_arena();
        assert_eq!(arena.add_edge(0, 1), Ok(true));
        assert_eq!(arena.add_edge(0, 1), Ok(false));

        assert!(arena.get(0).unwrap().outgoing.contains(&1));
        assert!(arena.get(1).unwrap().incoming.contains(&0));
        assert_eq!(arena.edge_count(), 1);
        assert!(arena.unmirrored_edges().is_empty());
    }

    #[test]
    fn test_add_edge_rejects_bad_endpoints() {
        let mut arena = sample_arena();
        assert_eq!(arena.add_edge(1, 1), Err(ArenaError::SelfEdge(1)));
        assert_eq!(arena.add_edge(0, 5), Err(ArenaError::UnknownNode(5)));
        assert_eq!(arena.add_edge(7, 0), Err(ArenaError::UnknownNode(7)));
        assert_eq!(arena.edge_count(), 0);
    }

    #[test]
    fn test_insert_requires_next_index() {
        let mut arena = sample_arena();
        let skipped = NodeData::external(5, VCoord::default(), 0);
        assert_eq!(
            arena.insert(skipped),
            Err(ArenaError::OutOfOrder { index: 5, expected: 2 })
        );

        let duplicate = NodeData::external(1, VCoord::default(), 0);
        assert!(arena.insert(duplicate).is_err());

        let next = NodeData::external(2, VCoord::default(), 0);
        assert_eq!(arena.insert(next), Ok(2));
    }

    #[test]
    fn test_detects_self_loops_and_unmirrored_edges() {
        let mut arena = sample_arena();
        arena.get_mut(0).unwrap().add_outgoing(0);
        arena.get_mut(1).unwrap().add_incoming(0);
        arena.get_mut(1).unwrap().add_outgoing(0);

        assert_eq!(arena.self_loops(), vec![0]);
        assert_eq!(arena.unmirrored_edges(), vec![(0, 0), (0, 1), (1, 0)]);
    }
}
