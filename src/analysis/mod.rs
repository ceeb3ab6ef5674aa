//! Aggregate statistics over analysis results.

pub mod aggregator;

pub use aggregator::*;
