//! Session backends and drivers
//!
//! - `memory`: in-process `SessionApi` used by tests and the service loop
//! - `replay`: deterministic script driver behind `convoy replay`

pub mod memory;
pub mod replay;

pub use memory::InMemorySessionApi;
pub use replay::{ReplayDriver, ScriptStep, TranscriptPrinter};
