//! Engine that runs the whole pipeline for one configuration

use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};
use uuid::Uuid;

use super::policy::DiffPolicies;
use super::reconciler::{field_differences, partition, reconcile, FieldDifference, MatchPartition};
use super::rollup::{rollup, RollupRow};
use crate::aggregate::{aggregate, ensure_key_alignment};
use crate::config::{ExceptionConfig, ReconciliationConfig};
use crate::exceptions::{align_entries, exceptions_from_records, resolve_exceptions, ExceptionEntry};
use crate::normalize::normalize;
use crate::traits::*;
use crate::types::*;

/// Everything one reconciliation run produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub run_id: Uuid,
    pub label_a: String,
    pub label_b: String,
    pub key_fields: Vec<String>,
    pub measure_fields: Vec<String>,
    pub rollup_fields: Vec<String>,
    /// One row per key in either source, sorted by key
    pub rows: Vec<ReconciledRow>,
    pub partitions: Vec<MatchPartition>,
    pub rollup: Vec<RollupRow>,
    pub field_differences: Vec<FieldDifference>,
    /// Non-matching rows not explained by the exception list, when one was given
    pub residual: Option<Vec<ReconciledRow>>,
    pub normalization_a: NormalizationReport,
    pub normalization_b: NormalizationReport,
    pub exception_normalization: Option<NormalizationReport>,
}

impl ReconciliationResult {
    /// Rows that are not a full match
    pub fn non_matches(&self) -> Vec<ReconciledRow> {
        self.rows
            .iter()
            .filter(|row| !row.category.is_full_match())
            .cloned()
            .collect()
    }

    pub fn partition(&self, category: &MatchCategory) -> Option<&MatchPartition> {
        self.partitions.iter().find(|p| &p.category == category)
    }

    /// Row count per category, in partition order
    pub fn category_counts(&self) -> Vec<(MatchCategory, usize)> {
        self.partitions
            .iter()
            .map(|p| (p.category.clone(), p.rows.len()))
            .collect()
    }

    pub fn row(&self, key: &CompositeKey) -> Option<&ReconciledRow> {
        self.rows
            .binary_search_by(|row| row.key.cmp(key))
            .ok()
            .map(|idx| &self.rows[idx])
    }

    /// Records dropped by normalization across both sources
    pub fn total_failures(&self) -> usize {
        self.normalization_a.failure_count() + self.normalization_b.failure_count()
    }

    pub fn measure_index(&self, measure: &str) -> Option<usize> {
        self.measure_fields.iter().position(|m| m == measure)
    }
}

/// Exception input for a run
enum ExceptionInput<'a> {
    Raw(&'a [RawRecord]),
    Entries(&'a [ExceptionEntry]),
}

/// Reconciliation engine bound to one validated configuration
///
/// The engine holds no mutable state; one instance can serve any number of
/// runs, including concurrent runs on separate threads.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    config: ReconciliationConfig,
    policies: DiffPolicies,
    /// Exception settings with key coercions inherited from source A
    exceptions: Option<ExceptionConfig>,
}

impl ReconciliationEngine {
    /// Create an engine, validating the configuration with the default rules
    pub fn new(config: ReconciliationConfig) -> ReconResult<Self> {
        Self::with_validator(config, &DefaultConfigValidator)
    }

    /// Create an engine with a custom validator
    pub fn with_validator(
        config: ReconciliationConfig,
        validator: &dyn ConfigValidator,
    ) -> ReconResult<Self> {
        validator.validate_config(&config)?;
        let policies = DiffPolicies::resolve(
            config.measure_fields(),
            &config.diff_policies,
            config.precision,
            config.tolerance.clone(),
        )?;
        let exceptions = config
            .exceptions
            .as_ref()
            .map(|exceptions| exceptions.inherit_key_coercions(&config.source_a));
        Ok(Self {
            config,
            policies,
            exceptions,
        })
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    pub fn policies(&self) -> &DiffPolicies {
        &self.policies
    }

    /// Reconcile two feeds without an exception list
    pub fn run(&self, feed_a: &[RawRecord], feed_b: &[RawRecord]) -> ReconResult<ReconciliationResult> {
        self.execute(feed_a, feed_b, None)
    }

    /// Reconcile two feeds and resolve non-matches against a raw exception list
    pub fn run_with_exceptions(
        &self,
        feed_a: &[RawRecord],
        feed_b: &[RawRecord],
        exceptions: &[RawRecord],
    ) -> ReconResult<ReconciliationResult> {
        self.execute(feed_a, feed_b, Some(ExceptionInput::Raw(exceptions)))
    }

    /// Reconcile two feeds and resolve non-matches against prepared entries
    pub fn run_with_exception_entries(
        &self,
        feed_a: &[RawRecord],
        feed_b: &[RawRecord],
        exceptions: &[ExceptionEntry],
    ) -> ReconResult<ReconciliationResult> {
        self.execute(feed_a, feed_b, Some(ExceptionInput::Entries(exceptions)))
    }

    fn execute(
        &self,
        feed_a: &[RawRecord],
        feed_b: &[RawRecord],
        exceptions: Option<ExceptionInput<'_>>,
    ) -> ReconResult<ReconciliationResult> {
        let run_id = Uuid::new_v4();
        let span = info_span!("reconciliation", %run_id);
        let _guard = span.enter();

        let config = &self.config;
        let source_a = &config.source_a;
        let source_b = &config.source_b;

        // Validated at construction, but the join is meaningless without it
        ensure_key_alignment(
            &source_a.label,
            &source_a.key_fields,
            &source_b.label,
            &source_b.key_fields,
        )?;

        let exception_config = match (&exceptions, &self.exceptions) {
            (Some(_), None) => {
                return Err(ReconError::Configuration(
                    "An exception list was supplied but no exception configuration exists"
                        .to_string(),
                ));
            }
            (Some(_), Some(exception_config)) => Some(exception_config),
            (None, _) => None,
        };

        info!(
            a_rows = feed_a.len(),
            b_rows = feed_b.len(),
            "Starting reconciliation"
        );

        let normalized_a = normalize(feed_a, source_a)?;
        let normalized_b = normalize(feed_b, source_b)?;

        let key_fields = config.key_fields();
        let measure_fields = config.measure_fields();
        let agg_a = aggregate(&normalized_a.records, key_fields, measure_fields)?;
        let agg_b = aggregate(&normalized_b.records, key_fields, measure_fields)?;

        let rows = reconcile(&agg_a, &agg_b, &self.policies)?;
        let partitions = partition(&rows, measure_fields);
        let rollup_fields = config.resolved_rollup_fields();
        let rollup_rows = rollup(&rows, key_fields, &rollup_fields, &self.policies)?;
        let differences = field_differences(&rows, &self.policies);

        for p in &partitions {
            info!(category = %p.category, rows = p.rows.len(), "Match partition");
        }

        let (residual, exception_normalization) = match (exceptions, exception_config) {
            (Some(input), Some(exception_config)) => {
                let non_matches: Vec<ReconciledRow> = rows
                    .iter()
                    .filter(|row| !row.category.is_full_match())
                    .cloned()
                    .collect();
                let (entries, report) = match input {
                    ExceptionInput::Raw(records) => {
                        let (entries, report) = exceptions_from_records(records, exception_config)?;
                        (entries, Some(report))
                    }
                    ExceptionInput::Entries(entries) => (
                        align_entries(
                            entries,
                            &exception_config.mapping,
                            &exception_config.match_fields,
                        ),
                        None,
                    ),
                };
                let residual = resolve_exceptions(
                    &non_matches,
                    Some(entries.as_slice()),
                    key_fields,
                    &exception_config.match_fields,
                )?;
                if !residual.is_empty() {
                    warn!(
                        residual = residual.len(),
                        "Unexplained discrepancies remain after exception check"
                    );
                }
                (Some(residual), report)
            }
            _ => (None, None),
        };

        if normalized_a.report.dropped_everything() || normalized_b.report.dropped_everything() {
            warn!("Normalization dropped every eligible record of at least one source");
        }

        info!(
            keys = rows.len(),
            failures = normalized_a.report.failure_count() + normalized_b.report.failure_count(),
            "Reconciliation complete"
        );

        Ok(ReconciliationResult {
            run_id,
            label_a: source_a.label.clone(),
            label_b: source_b.label.clone(),
            key_fields: key_fields.to_vec(),
            measure_fields: measure_fields.to_vec(),
            rollup_fields,
            rows,
            partitions,
            rollup: rollup_rows,
            field_differences: differences,
            residual,
            normalization_a: normalized_a.report,
            normalization_b: normalized_b.report,
            exception_normalization,
        })
    }
}
