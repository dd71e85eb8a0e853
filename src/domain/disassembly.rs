use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// One disassembled instruction block as seen at a particular point in the trace.
///
/// Self-modifying code can re-disassemble the same address to different
/// bytes, so each address owns an ordered list of these ("mutations").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionData {
    pub address: u64,
    pub mutation_index: u32,
    pub mnemonic: String,
    pub op_str: String,
    pub num_bytes: u8,
    pub conditional: bool,
}

impl InstructionData {
    /// Instruction with `mutation_index` left at 0; the cache assigns the real one.
    pub fn new(address: u64, mnemonic: &str, op_str: &str, num_bytes: u8) -> Self {
        Self {
            address,
            mutation_index: 0,
            mnemonic: mnemonic.to_string(),
            op_str: op_str.to_string(),
            num_bytes,
            conditional: mnemonic.starts_with('j') && mnemonic != "jmp",
        }
    }
}

/// The backing store could not be read; distinct from a missing entry.
#[derive(Debug, Error)]
#[error("disassembly store failure: {0}")]
pub struct CacheError(pub String);

/// Lookup side of the disassembly cache.
///
/// Nodes never own instructions: they hold a shared handle obtained from
/// `resolve`, and the cache keeps the canonical list.
/// Implementations must be thread-safe (Send + Sync).
pub trait DisassemblyCache: Send + Sync {
    /// `Ok(None)` when the pair was never recorded.
    fn resolve(
        &self,
        address: u64,
        mutation_index: u32,
    ) -> Result<Option<Arc<InstructionData>>, CacheError>;
    fn mutation_count(&self, address: u64) -> Result<usize, CacheError>;
}

// ============================================================================
// MemoryDisassembly - in-memory cache filled during trace replay
// ============================================================================

#[derive(Default)]
pub struct MemoryDisassembly {
    blocks: DashMap<u64, Vec<Arc<InstructionData>>>,
}

impl MemoryDisassembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new mutation at `ins.address` and return the cached handle.
    pub fn record(&self, mut ins: InstructionData) -> Arc<InstructionData> {
        let mut mutations = self.blocks.entry(ins.address).or_default();
        ins.mutation_index = mutations.len() as u32;
        let ins = Arc::new(ins);
        mutations.push(Arc::clone(&ins));
        ins
    }

    pub fn address_count(&self) -> usize {
        self.blocks.len()
    }
}

impl DisassemblyCache for MemoryDisassembly {
    fn resolve(
        &self,
        address: u64,
        mutation_index: u32,
    ) -> Result<Option<Arc<InstructionData>>, CacheError> {
        Ok(self
            .blocks
            .get(&address)
            .and_then(|m| m.get(mutation_index as usize).cloned()))
    }

    fn mutation_count(&self, address: u64) -> Result<usize, CacheError> {
        Ok(self.blocks.get(&address).map(|m| m.len()).unwrap_or(0))
    }
}
