// Core trace graph types: nodes, their arena and the save format.

pub mod codec;
pub mod coords;
pub mod disassembly;
pub mod graph;
pub mod node;
