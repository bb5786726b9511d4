//! # Feed Recon
//!
//! A reconciliation library for comparing two transaction feeds of the same
//! activity, such as a clearing system's trade records against a broker's
//! statement.
//!
//! ## Features
//!
//! - **Schema normalization**: per-source renaming, row filtering and typed coercion
//! - **Key aggregation**: measure totals per composite key
//! - **Reconciliation**: full outer join with per-measure diff policies and match categories
//! - **Rollup**: coarse summary derived from the detailed rows
//! - **Exception resolution**: suppress pre-approved discrepancies
//! - **Report assembly**: named result sets ready for spreadsheet or CSV export
//!
//! ## Quick Start
//!
//! ```rust
//! use feed_recon::{
//!     DiffPolicy, FieldMapping, RawRecord, ReconciliationConfig, ReconciliationEngine,
//!     ReportAssembler, SourceConfig,
//! };
//!
//! let source = |label: &str| {
//!     SourceConfig::new(label, FieldMapping::new().keep("CB").keep("Qty").keep("Fee"))
//!         .key_fields(["CB"])
//!         .measure_fields(["Qty", "Fee"])
//! };
//! let config = ReconciliationConfig::new(source("Atlantis"), source("GMI"))
//!     .diff_policy("Qty", DiffPolicy::Difference)
//!     .diff_policy("Fee", DiffPolicy::SignedSum);
//! let engine = ReconciliationEngine::new(config).unwrap();
//!
//! let a = vec![RawRecord::new().with("CB", "001").with("Qty", "100").with("Fee", "50")];
//! let b = vec![RawRecord::new().with("CB", "001").with("Qty", "100").with("Fee", "-50")];
//!
//! let result = engine.run(&a, &b).unwrap();
//! assert!(result.rows[0].category.is_full_match());
//!
//! let report = ReportAssembler::assemble(&result);
//! assert!(report.get("Full Match").is_some());
//! ```

pub mod aggregate;
pub mod config;
pub mod exceptions;
pub mod logging;
pub mod normalize;
pub mod reconciliation;
pub mod report;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use aggregate::aggregate;
pub use config::*;
pub use exceptions::*;
pub use normalize::{available_periods, normalize, Coercion, FilterPredicate, InvalidPolicy};
pub use reconciliation::*;
pub use report::{Report, ReportAssembler, ResultSet};
pub use traits::*;
pub use types::*;
