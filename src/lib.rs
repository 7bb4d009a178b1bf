// AutoGrep - lib.rs
//
// Library entry point. The CLI in main.rs is a thin wrapper over
// `engine::analyze` / `engine::analyze_streaming`; integration tests
// and embedding callers use the same surface.

pub mod core;
pub mod engine;
pub mod util;

pub use crate::core::model::{CancelFlag, Match, Options, Report, ScanEvent, Summary};
pub use crate::engine::{analyze, analyze_streaming};
pub use crate::util::error::{EngineError, Result};
