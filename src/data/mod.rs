//! In-memory datasets.
//!
//! - typed FID record sets with per-record metadata (`record`)
//! - deterministic synthetic relaxation datasets (`sample`)

pub mod record;
pub mod sample;

pub use record::*;
pub use sample::*;
