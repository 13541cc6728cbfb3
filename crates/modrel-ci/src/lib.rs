//! modrel CI - per-module release pipeline
//!
//! Provides the release procedure run for every changed module:
//! - parse and validate the module's `VERSION` file
//! - check that the derived tag does not exist yet
//! - publish the tag and release on merge, or render a preview
//!
//! plus a bounded fan-out over modules and an aggregate gate.

pub mod gate;
pub mod pipeline;
pub mod runner;
pub mod stage;

// Re-export key types
pub use gate::{GateError, GateVerdict, ReleaseGate, UnitStatus};
pub use pipeline::{ModulePipeline, ModuleReport, ReleaseOutcome};
pub use runner::{FanOutConfig, FanOutRunner};
pub use stage::{ReleaseStage, StageResult};
