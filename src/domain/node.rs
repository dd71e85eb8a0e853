//! Graph vertex built during trace replay.
//!
//! A node is either an internal instruction block (bound to an entry in the
//! disassembly cache) or an external call into code outside the traced
//! binary (carrying captured arguments). The shared fields live on
//! `NodeData`; the variant-specific ones live in `NodeKind`.

use crate::domain::coords::{sphere_coord, FCoord, Multipliers, VCoord};
use crate::domain::disassembly::{CacheError, DisassemblyCache, InstructionData};
use std::collections::BTreeSet;
use std::sync::Arc;

/// One captured call: `(argument position, raw argument bytes)` pairs.
pub type ArgList = Vec<(i32, Vec<u8>)>;

/// Link from an internal node to its instruction block.
///
/// `ins` is a shared handle onto the cache's copy. The cache outlives every
/// node, and the node never mutates or frees the instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalBlock {
    mutation_index: u32,
    ins: Arc<InstructionData>,
}

impl InternalBlock {
    /// Resolve `(address, mutation_index)` through the cache.
    ///
    /// Returns `Ok(None)` when the pair is missing or the cache hands back an
    /// instruction recorded at a different address.
    pub fn bind(
        cache: &dyn DisassemblyCache,
        address: u64,
        mutation_index: u32,
    ) -> Result<Option<Self>, CacheError> {
        let ins = match cache.resolve(address, mutation_index)? {
            Some(ins) if ins.address == address => ins,
            _ => return Ok(None),
        };
        Ok(Some(Self { mutation_index, ins }))
    }

    /// Wrap a handle already obtained from the cache.
    pub fn from_instruction(ins: Arc<InstructionData>) -> Self {
        Self {
            mutation_index: ins.mutation_index,
            ins,
        }
    }

    pub fn mutation_index(&self) -> u32 {
        self.mutation_index
    }

    pub fn ins(&self) -> &InstructionData {
        &self.ins
    }
}

/// Calls observed on an external node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalCall {
    pub funcargs: Vec<ArgList>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Internal(InternalBlock),
    External(ExternalCall),
}

/// Scratch fields used by the builder and renderer. Never saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeState {
    pub parent_idx: u32,
    /// Times an external node was called. Recomputed after a load.
    pub calls: u64,
    /// Number of external functions called from this block.
    pub child_externs: u32,
    pub chain_remaining_in: u64,
    pub chain_remaining_out: u64,
    pub heat_run_marker: u32,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            parent_idx: 0,
            calls: 1,
            child_externs: 0,
            chain_remaining_in: 0,
            chain_remaining_out: 0,
            heat_run_marker: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeData {
    index: u32,
    pub vcoord: VCoord,
    /// Branch classification of the block; owned by the trace analysis.
    pub conditional: i32,
    pub node_mod: i32,
    pub address: u64,
    pub execution_count: u64,
    pub incoming: BTreeSet<u32>,
    pub outgoing: BTreeSet<u32>,
    pub kind: NodeKind,
    pub runtime: RuntimeState,
}

impl NodeData {
    /// Internal node at the address of the bound block.
    pub fn internal(index: u32, vcoord: VCoord, block: InternalBlock) -> Self {
        let address = block.ins().address;
        Self::with_kind(index, vcoord, address, NodeKind::Internal(block))
    }

    pub fn external(index: u32, vcoord: VCoord, address: u64) -> Self {
        Self::with_kind(
            index,
            vcoord,
            address,
            NodeKind::External(ExternalCall::default()),
        )
    }

    fn with_kind(index: u32, vcoord: VCoord, address: u64, kind: NodeKind) -> Self {
        Self {
            index,
            vcoord,
            conditional: 0,
            node_mod: 0,
            address,
            execution_count: 0,
            incoming: BTreeSet::new(),
            outgoing: BTreeSet::new(),
            kind,
            runtime: RuntimeState::default(),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_external(&self) -> bool {
        matches!(self.kind, NodeKind::External(_))
    }

    pub fn mutation_index(&self) -> Option<u32> {
        match &self.kind {
            NodeKind::Internal(block) => Some(block.mutation_index()),
            NodeKind::External(_) => None,
        }
    }

    pub fn ins(&self) -> Option<&InstructionData> {
        match &self.kind {
            NodeKind::Internal(block) => Some(block.ins()),
            NodeKind::External(_) => None,
        }
    }

    pub fn funcargs(&self) -> Option<&[ArgList]> {
        match &self.kind {
            NodeKind::External(call) => Some(&call.funcargs),
            NodeKind::Internal(_) => None,
        }
    }

    pub fn add_incoming(&mut self, from: u32) -> bool {
        self.incoming.insert(from)
    }

    pub fn add_outgoing(&mut self, to: u32) -> bool {
        self.outgoing.insert(to)
    }

    pub fn bump_execution(&mut self, by: u64) {
        self.execution_count = self.execution_count.saturating_add(by);
    }

    /// Record one more call of an external node with the arguments captured for it.
    ///
    /// The first call is implied by the node's creation, so `calls` only
    /// grows once arguments have already been stored. Returns `false` for
    /// internal nodes.
    pub fn push_call(&mut self, args: ArgList) -> bool {
        match &mut self.kind {
            NodeKind::External(call) => {
                if !call.funcargs.is_empty() {
                    self.runtime.calls += 1;
                }
                call.funcargs.push(args);
                true
            }
            NodeKind::Internal(_) => false,
        }
    }

    /// Rebuild `runtime.calls` after a load, when only `funcargs` survived.
    pub fn recount_calls(&mut self) {
        if let NodeKind::External(call) = &self.kind {
            self.runtime.calls = call.funcargs.len().max(1) as u64;
        }
    }

    /// Position on the render sphere, with `bmod` folded into `b`.
    pub fn sphere_coord_b(&self, dims: &Multipliers, diam_modifier: f32) -> FCoord {
        sphere_coord(self.vcoord.a, self.vcoord.adjusted_b(), dims, diam_modifier)
    }

    /// Whether either adjacency set mentions the node itself.
    pub fn has_self_loop(&self) -> bool {
        self.incoming.contains(&self.index) || self.outgoing.contains(&self.index)
    }
}

/// Equality covers the saved record only; `runtime` is scratch state.
impl PartialEq for NodeData {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.vcoord == other.vcoord
            && self.conditional == other.conditional
            && self.node_mod == other.node_mod
            && self.address == other.address
            && self.execution_count == other.execution_count
            && self.incoming == other.incoming
            && self.outgoing == other.outgoing
            && self.kind == other.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::disassembly::MemoryDisassembly;

    fn cache_with_block() -> MemoryDisassembly {
        let cache = MemoryDisassembly::new();
        cache.record(InstructionData::new(0x401000, "push", "ebp", 1));
        cache.record(InstructionData::new(0x401000, "nop", "", 1));
        cache
    }

    #[test]
    fn test_internal_node_binds_block() {
        let cache = cache_with_block();
        let block = InternalBlock::bind(&cache, 0x401000, 1).unwrap().unwrap();
        let node = NodeData::internal(4, VCoord::new(1, 2, 0), block);

        assert_eq!(node.index(), 4);
        assert_eq!(node.address, 0x401000);
        assert!(!node.is_external());
        assert_eq!(node.mutation_index(), Some(1));
        assert_eq!(node.ins().unwrap().mnemonic, "nop");
        assert!(node.funcargs().is_none());
    }

    #[test]
    fn test_bind_rejects_unknown_reference() {
        let cache = cache_with_block();
        assert!(InternalBlock::bind(&cache, 0x401000, 2).unwrap().is_none());
        assert!(InternalBlock::bind(&cache, 0x500000, 0).unwrap().is_none());
    }

    #[test]
    fn test_external_calls_and_recount() {
        let mut node = NodeData::external(9, VCoord::default(), 0x7ff0_1000);
        assert!(node.is_external());
        assert_eq!(node.runtime.calls, 1);

        assert!(node.push_call(vec![(0, b"kernel32.dll".to_vec())]));
        assert_eq!(node.runtime.calls, 1);
        assert!(node.push_call(vec![(0, b"user32.dll".to_vec()), (1, vec![0xff, 0x00])]));
        assert_eq!(node.runtime.calls, 2);
        assert_eq!(node.funcargs().unwrap().len(), 2);

        node.runtime.calls = 0;
        node.recount_calls();
        assert_eq!(node.runtime.calls, 2);
    }

    #[test]
    fn test_push_call_on_internal_node_is_refused() {
        let cache = cache_with_block();
        let block = InternalBlock::bind(&cache, 0x401000, 0).unwrap().unwrap();
        let mut node = NodeData::internal(0, VCoord::default(), block);
        assert!(!node.push_call(vec![]));
    }

    #[test]
    fn test_equality_ignores_runtime_state() {
        let mut left = NodeData::external(1, VCoord::new(5, 6, 1), 0x10);
        let right = left.clone();
        left.runtime.heat_run_marker = 77;
        left.runtime.chain_remaining_in = 3;
        assert_eq!(left, right);

        left.bump_execution(1);
        assert_ne!(left, right);
    }

    #[test]
    fn test_adjacency_and_self_loop() {
        let mut node = NodeData::external(3, VCoord::default(), 0x10);
        assert!(node.add_incoming(1));
        assert!(!node.add_incoming(1));
        assert!(node.add_outgoing(2));
        assert!(!node.has_self_loop());
        node.add_outgoing(3);
        assert!(node.has_self_loop());
    }

    #[test]
    fn test_execution_count_saturates() {
        let mut node = NodeData::external(0, VCoord::default(), 0);
        node.execution_count = u64::MAX - 1;
        node.bump_execution(5);
        assert_eq!(node.execution_count, u64::MAX);
    }
}
