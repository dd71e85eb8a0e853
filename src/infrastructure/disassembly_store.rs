use crate::domain::disassembly::{CacheError, DisassemblyCache, InstructionData};
use anyhow::{anyhow, Context, Result};
use sled::Db;
use std::path::Path;
use std::sync::{Arc, Mutex};

// ============================================================================
// DiskDisassembly - disassembly cache persisted with sled
// ============================================================================

/// Each address maps to its bincode-encoded `Vec<InstructionData>`.
pub struct DiskDisassembly {
    db: Db,
    blocks: sled::Tree,
    // Serializes the read-modify-write in `record`
    append_lock: Mutex<()>,
}

impl DiskDisassembly {
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path)
            .with_context(|| format!("Failed to open disassembly store {}", path.display()))?;
        let blocks = db.open_tree("blocks")?;
        Ok(Self {
            db,
            blocks,
            append_lock: Mutex::new(()),
        })
    }

    fn key(address: u64) -> [u8; 8] {
        address.to_be_bytes()
    }

    /// `Ok(None)` for an address never recorded; an unreadable or
    /// undecodable entry is an error, never an empty list.
    fn load_block(&self, address: u64) -> Result<Option<Vec<InstructionData>>, CacheError> {
        let bytes = match self.blocks.get(Self::key(address)) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(None),
            Err(e) => return Err(CacheError(format!("read {:#x}: {}", address, e))),
        };
        bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| CacheError(format!("decode {:#x}: {}", address, e)))
    }

    /// Append a new mutation at `ins.address`, assigning its mutation index.
    pub fn record(&self, mut ins: InstructionData) -> Result<Arc<InstructionData>> {
        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| anyhow!("Disassembly store lock poisoned"))?;

        let mut mutations = self.load_block(ins.address)?.unwrap_or_default();
        ins.mutation_index = mutations.len() as u32;
        mutations.push(ins.clone());

        let bytes = bincode::serialize(&mutations).context("Failed to encode instruction block")?;
        self.blocks
            .insert(Self::key(ins.address), bytes)
            .context("Failed to store instruction block")?;
        Ok(Arc::new(ins))
    }

    pub fn address_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().context("Failed to flush disassembly store")?;
        Ok(())
    }
}

impl DisassemblyCache for DiskDisassembly {
    fn resolve(
        &self,
        address: u64,
        mutation_index: u32,
    ) -> Result<Option<Arc<InstructionData>>, CacheError> {
        let resolved = self.load_block(address)?.and_then(|mut m| {
            let i = mutation_index as usize;
            (i < m.len()).then(|| m.swap_remove(i))
        });
        Ok(resolved.map(Arc::new))
    }

    fn mutation_count(&self, address: u64) -> Result<usize, CacheError> {
        Ok(self.load_block(address)?.map(|m| m.len()).unwrap_or(0))
    }
}
