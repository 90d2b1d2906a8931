//! Output formatters for scan results.
//!
//! - [`TextOutput`]: human-readable report
//! - [`JsonOutput`]: machine-readable report for scripting

pub mod json;
pub mod text;

pub use json::{JsonOutput, OutputError};
pub use text::TextOutput;
