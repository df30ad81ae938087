//! Statistical analysis of stored rank counters.
//!
//! Tests each rank column against the uniform distribution over the
//! identifiers observed so far.

pub mod uniformity;

pub use uniformity::*;
