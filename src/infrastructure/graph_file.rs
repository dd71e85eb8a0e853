/// Graph Save File
///
/// Owns file selection and framing around the node codec.
///
/// File structure:
/// - `<trace>.nodes` - `N{`, every node record in index order, then `}N,D`
/// - `<trace>.nodes.meta` - JSON metadata used to sanity-check a load

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use anyhow::{Context, Result};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::codec::{decode_node, encode_node, write_end_marker, FieldReader};
use crate::domain::disassembly::DisassemblyCache;
use crate::domain::graph::NodeArena;

/// Tag that opens the node section.
const SECTION_TAG: &str = "N";

/// Metadata stored alongside the node file.
#[derive(Debug, Serialize, Deserialize)]
pub struct GraphFileMetadata {
    pub version: u32,
    /// Unix seconds at save time
    pub created_at: u64,
    pub node_count: usize,
    pub external_count: usize,
}

impl GraphFileMetadata {
    pub const CURRENT_VERSION: u32 = 1;
}

pub struct GraphFile {
    nodes_path: PathBuf,
    meta_path: PathBuf,
}

impl GraphFile {
    /// Save location for `trace_name` inside `dir`.
    pub fn new(dir: &Path, trace_name: &str) -> Self {
        let nodes_path = dir.join(format!("{}.nodes", trace_name));
        let meta_path = dir.join(format!("{}.nodes.meta", trace_name));
        Self {
            nodes_path,
            meta_path,
        }
    }

    pub fn nodes_path(&self) -> &Path {
        &self.nodes_path
    }

    pub fn exists(&self) -> bool {
        self.nodes_path.exists()
    }

    /// Write every node in index order, then the metadata sidecar.
    ///
    /// Both files are staged next to their targets and renamed into place,
    /// so a failed save leaves the previous graph loadable.
    pub fn save(&self, arena: &NodeArena) -> Result<()> {
        let nodes_tmp = staging_path(&self.nodes_path);
        let meta_tmp = staging_path(&self.meta_path);

        let meta = match self.stage(arena, &nodes_tmp, &meta_tmp) {
            Ok(meta) => meta,
            Err(e) => {
                let _ = fs::remove_file(&nodes_tmp);
                let _ = fs::remove_file(&meta_tmp);
                return Err(e);
            }
        };

        // Load accepts a missing sidecar but not a stale one
        if self.meta_path.exists() {
            fs::remove_file(&self.meta_path).context("Failed to replace graph metadata")?;
        }
        fs::rename(&nodes_tmp, &self.nodes_path).with_context(|| {
            format!("Failed to move node file into {}", self.nodes_path.display())
        })?;
        fs::rename(&meta_tmp, &self.meta_path)
            .context("Failed to move graph metadata into place")?;

        info!(
            nodes = meta.node_count,
            externals = meta.external_count,
            path = %self.nodes_path.display(),
            "saved graph"
        );
        Ok(())
    }

    /// Load every node. Any bad record fails the whole load.
    ///
    /// The disassembly cache must already hold every block the nodes refer to.
    pub fn load(&self, cache: &dyn DisassemblyCache) -> Result<NodeArena> {
        let file = File::open(&self.nodes_path)
            .with_context(|| format!("Failed to open {}", self.nodes_path.display()))?;
        // SAFETY: the file is opened read-only and the caller holds exclusive
        // access to the save location for the duration of the load.
        let map = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to map {}", self.nodes_path.display()))?;

        let mut reader = FieldReader::new(&map[..]);
        let (tag, opened) = reader.token(b'{')?;
        if !opened || tag != SECTION_TAG {
            anyhow::bail!("Missing node section header, found {:?}", tag);
        }

        let mut arena = NodeArena::new();
        loop {
            let offset = reader.offset();
            let node = decode_node(&mut reader, cache)
                .with_context(|| format!("Corrupt node record at byte {}", offset))?;
            match node {
                Some(node) => {
                    arena.insert(node).context("Node records out of order")?;
                }
                None => break,
            }
        }
        debug!(nodes = arena.len(), bytes = reader.offset(), "decoded node section");

        if let Some(meta) = self.load_metadata()? {
            if meta.node_count != arena.len() {
                anyhow::bail!(
                    "Metadata expects {} nodes but the file holds {}",
                    meta.node_count,
                    arena.len()
                );
            }
            let externals = arena.external_count();
            if meta.external_count != externals {
                anyhow::bail!(
                    "Metadata expects {} external nodes but the file holds {}",
                    meta.external_count,
                    externals
                );
            }
        }

        info!(nodes = arena.len(), path = %self.nodes_path.display(), "loaded graph");
        Ok(arena)
    }

    /// Load, or start again from an empty graph if anything is wrong.
    pub fn load_or_empty(&self, cache: &dyn DisassemblyCache) -> NodeArena {
        if !self.exists() {
            debug!(path = %self.nodes_path.display(), "no saved graph");
            return NodeArena::new();
        }
        match self.load(cache) {
            Ok(arena) => arena,
            Err(e) => {
                warn!("Discarding saved graph {}: {:#}", self.nodes_path.display(), e);
                NodeArena::new()
            }
        }
    }

    /// Remove the node file, its metadata and any leftover staging files.
    pub fn invalidate(&self) -> Result<()> {
        for path in [&self.nodes_path, &self.meta_path] {
            if path.exists() {
                fs::remove_file(path)?;
            }
            let tmp = staging_path(path);
            if tmp.is_file() {
                fs::remove_file(&tmp)?;
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Private helpers
    // ─────────────────────────────────────────────────────────────────────

    /// Write both files to their staging paths and sync them to disk.
    fn stage(
        &self,
        arena: &NodeArena,
        nodes_tmp: &Path,
        meta_tmp: &Path,
    ) -> Result<GraphFileMetadata> {
        let file = File::create(nodes_tmp)
            .with_context(|| format!("Failed to create {}", nodes_tmp.display()))?;
        let mut out = BufWriter::new(file);

        write!(out, "{}{{", SECTION_TAG)?;
        for node in arena.iter() {
            encode_node(&mut out, node)
                .with_context(|| format!("Failed to write node {}", node.index()))?;
        }
        write_end_marker(&mut out)?;
        let file = out
            .into_inner()
            .map_err(|e| e.into_error())
            .context("Failed to flush node file")?;
        file.sync_all().context("Failed to sync node file")?;

        let meta = GraphFileMetadata {
            version: GraphFileMetadata::CURRENT_VERSION,
            created_at: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            node_count: arena.len(),
            external_count: arena.external_count(),
        };
        let json = serde_json::to_string_pretty(&meta)
            .context("Failed to serialize graph metadata")?;
        let mut file = File::create(meta_tmp)
            .with_context(|| format!("Failed to create {}", meta_tmp.display()))?;
        file.write_all(json.as_bytes())
            .context("Failed to write graph metadata")?;
        file.sync_all().context("Failed to sync graph metadata")?;

        Ok(meta)
    }

    fn load_metadata(&self) -> Result<Option<GraphFileMetadata>> {
        if !self.meta_path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.meta_path)?;
        let meta: GraphFileMetadata =
            serde_json::from_str(&contents).context("Invalid graph metadata")?;
        if meta.version != GraphFileMetadata::CURRENT_VERSION {
            anyhow::bail!("Unsupported graph metadata version {}", meta.version);
        }
        Ok(Some(meta))
    }
}

/// `<path>.tmp`, written before being renamed over `path`.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
