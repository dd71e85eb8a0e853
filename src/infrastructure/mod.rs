// Infrastructure implementations for TraceVis.

pub mod concurrency;
pub mod config;
pub mod disassembly_store;
pub mod graph_file;

pub use disassembly_store::DiskDisassembly;
pub use graph_file::{GraphFile, GraphFileMetadata};
