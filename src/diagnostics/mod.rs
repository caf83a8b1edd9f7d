// Per-session capture statistics.

pub mod stats;

pub use stats::{DiagnosticSnapshot, DiagnosticStats};
