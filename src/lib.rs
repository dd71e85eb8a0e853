// Main library entry point for TraceVis.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;
