//! Foundational types shared across the CEAM workspace.
//!
//! This crate holds the small, dependency-light building blocks the rest of
//! the framework is written against:
//!
//! - [`ids`] - Hierarchical [`Path`](ids::Path) and typed identifier wrappers
//! - [`stable_hash`] - Portable FNV-1a hashing for randomness keys
//! - [`rng`] - Stateless, index-addressed draw primitives for common random
//!   numbers
//!
//! Nothing in this crate knows about simulations; it only guarantees that
//! identifiers compare and display consistently and that hashing and draws
//! are bit-stable across platforms and runs.

pub mod ids;
pub mod rng;
pub mod stable_hash;

pub use ids::{
    ColumnId, ComponentId, EventId, MeasureId, Path, PipelineId, StratificationId, StreamId,
};
pub use rng::{draw_f64, draw_u64, normal_from_draws};
pub use stable_hash::fnv1a64_str;
