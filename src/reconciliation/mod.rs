//! Reconciliation of two normalized and aggregated feeds
//!
//! The reconciler outer-joins both sides on the composite key, computes one
//! diff per measure under its configured policy and classifies every row.
//! Partitions, the rollup summary and the field-difference listing are all
//! derived from the same reconciled rows.

pub mod engine;
pub mod policy;
pub mod reconciler;
pub mod rollup;

pub use engine::*;
pub use policy::*;
pub use reconciler::*;
pub use rollup::*;
