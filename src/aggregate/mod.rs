//! Aggregation engine and composite result builder.

pub mod builder;
pub mod engine;

pub use engine::Aggregator;
