//! Relaxation analysis on integrated intensities.
//!
//! Responsibilities:
//!
//! - fit the spin-7/2 recovery law by differential evolution (`fitter`)
//! - recover a T1 distribution at several regularization strengths (`ilt`)
//! - the fixed T1 grid and initial guess shared by every ILT solve (`t1_grid`)

pub mod fitter;
pub mod ilt;
pub mod t1_grid;

pub use fitter::*;
pub use ilt::*;
pub use t1_grid::*;
