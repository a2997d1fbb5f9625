//! Mathematical utilities: sample grids, bounded global minimization, and the
//! capped-simplex projection used by the inverse Laplace solver.

pub mod optimize;
pub mod projection;
pub mod space;

pub use optimize::*;
pub use projection::*;
pub use space::*;
