//! Signal processing on FID traces.
//!
//! - smoothing + phase rotation (`conditioner`)
//! - peak search and autophase (`autophase`)
//! - FFT and spectral-window integration (`spectrum`)
//! - time-domain integrals against field (`field_scan`)

pub mod autophase;
pub mod conditioner;
pub mod field_scan;
pub mod spectrum;

pub use autophase::*;
pub use conditioner::*;
pub use field_scan::*;
pub use spectrum::*;
