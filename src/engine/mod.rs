// AutoGrep - engine/mod.rs
//
// The run layer: archive extraction and the orchestrated scan
// lifecycle. Everything that touches disk layout, threads, or channels
// lives here, on top of the pure core.

pub mod extract;
pub mod orchestrator;

pub use orchestrator::{analyze, analyze_streaming};
