//! Input/output helpers.
//!
//! - JSON point-group containers and vendor trace matrices (`ingest`)

pub mod ingest;

pub use ingest::*;
