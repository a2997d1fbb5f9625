//! `tnmr-relax` library crate.
//!
//! The binary (`tnmr`) is a thin wrapper around this library so that:
//!
//! - the signal chain and fitters are testable without spawning processes
//! - record sets can be built from JSON containers, vendor matrices or synthetic data
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
pub mod session;
pub mod signal;
