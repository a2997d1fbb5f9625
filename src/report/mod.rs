//! Reporting: the text summary and the JSON report.

pub mod format;
pub mod json;

pub use format::*;
pub use json::*;
