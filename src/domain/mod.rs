//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - user-facing configuration enums (`FilterKind`, `RelaxationModel`)
//! - fit outputs (`RelaxationFit`, `IltSweep`, `StageOutcome`)
//! - the resolved run configuration (`FitConfig`, `SynthConfig`)

pub mod types;

pub use types::*;
