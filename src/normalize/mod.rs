//! Schema normalizer: raw source rows to canonical key/measure records
//!
//! The stage filters, renames and coerces. Rows whose key attributes cannot be
//! established are dropped and counted in a [`NormalizationReport`]; they never
//! abort the run. Only a measure configured with
//! [`InvalidPolicy::Reject`] can fail the run, as an aggregation inconsistency.

pub mod coercion;
pub mod filter;

pub use coercion::*;
pub use filter::*;

use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::config::{FieldMapping, SourceConfig};
use crate::types::*;

/// Output of the normalization stage for one source
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub records: Vec<NormalizedRecord>,
    pub report: NormalizationReport,
}

enum Outcome {
    Kept(NormalizedRecord),
    Dropped(NormalizationFailure),
}

/// Applies one source's field mapping to its raw rows
#[derive(Debug)]
pub struct SchemaNormalizer<'a> {
    label: &'a str,
    mapping: &'a FieldMapping,
    key_fields: &'a [String],
    measure_fields: &'a [String],
}

impl<'a> SchemaNormalizer<'a> {
    pub fn new(
        label: &'a str,
        mapping: &'a FieldMapping,
        key_fields: &'a [String],
        measure_fields: &'a [String],
    ) -> Self {
        Self {
            label,
            mapping,
            key_fields,
            measure_fields,
        }
    }

    /// Normalizer for a configured source
    pub fn for_source(source: &'a SourceConfig) -> Self {
        Self::new(
            &source.label,
            &source.mapping,
            &source.key_fields,
            &source.measure_fields,
        )
    }

    /// Normalize every record, in input order
    pub fn normalize(&self, records: &[RawRecord]) -> ReconResult<Normalized> {
        let mut report = NormalizationReport::new(self.label);
        report.input_rows = records.len();
        let mut normalized = Vec::with_capacity(records.len());

        for (row_index, record) in records.iter().enumerate() {
            if let Some(filter) = &self.mapping.filter {
                if !filter.matches(record) {
                    report.filtered_out += 1;
                    continue;
                }
            }

            match self.normalize_record(row_index, record)? {
                Outcome::Kept(rec) => normalized.push(rec),
                Outcome::Dropped(failure) => {
                    debug!(
                        source = self.label,
                        row = failure.row_index,
                        attribute = %failure.attribute,
                        reason = %failure.reason,
                        "Dropping record"
                    );
                    report.failures.push(failure);
                }
            }
        }

        report.normalized = normalized.len();
        if report.failure_count() > 0 {
            warn!(
                source = self.label,
                dropped = report.failure_count(),
                "Records dropped during normalization"
            );
        }
        info!(
            source = self.label,
            input = report.input_rows,
            filtered_out = report.filtered_out,
            normalized = report.normalized,
            "Normalization complete"
        );

        Ok(Normalized {
            records: normalized,
            report,
        })
    }

    fn normalize_record(&self, row_index: usize, record: &RawRecord) -> ReconResult<Outcome> {
        let mut keys = IndexMap::with_capacity(self.key_fields.len());
        for attribute in self.key_fields {
            let Some(raw) = self.mapping.lookup(record, attribute) else {
                return Ok(Outcome::Dropped(NormalizationFailure {
                    row_index,
                    attribute: attribute.clone(),
                    reason: FailureReason::MissingKeyAttribute,
                }));
            };
            match self.mapping.key_coercion(attribute).coerce_key(raw) {
                Some(value) => {
                    keys.insert(attribute.clone(), value);
                }
                None => {
                    return Ok(Outcome::Dropped(NormalizationFailure {
                        row_index,
                        attribute: attribute.clone(),
                        reason: FailureReason::UnparseableKey {
                            value: raw.to_string(),
                        },
                    }));
                }
            }
        }

        let mut measures = IndexMap::with_capacity(self.measure_fields.len());
        for attribute in self.measure_fields {
            let coercion = self.mapping.measure_coercion(attribute);
            let value = match self.mapping.lookup(record, attribute) {
                None => None,
                Some(raw) => match coercion.coerce_measure(raw) {
                    Ok(value) => value,
                    Err(InvalidNumber) => match coercion.invalid_policy() {
                        InvalidPolicy::Null => None,
                        InvalidPolicy::Reject => {
                            return Err(ReconError::AggregationInconsistency {
                                feed: self.label.to_string(),
                                attribute: attribute.clone(),
                                row_index,
                                value: raw.to_string(),
                            });
                        }
                    },
                },
            };
            measures.insert(attribute.clone(), value);
        }

        Ok(Outcome::Kept(NormalizedRecord {
            row_index,
            keys,
            measures,
        }))
    }
}

/// Normalize a configured source's rows
pub fn normalize(records: &[RawRecord], source: &SourceConfig) -> ReconResult<Normalized> {
    SchemaNormalizer::for_source(source).normalize(records)
}

/// Sorted distinct `YYYY-MM` periods found in a raw date column.
///
/// Text cells contribute their first seven characters, date cells their
/// year and month. Blank cells are skipped.
pub fn available_periods(records: &[RawRecord], raw_field: &str) -> Vec<String> {
    let periods: BTreeSet<String> = records
        .iter()
        .filter_map(|record| record.get(raw_field))
        .filter(|value| !value.is_blank())
        .filter_map(|value| match value {
            Value::Date(date) => Some(period_of(*date)),
            Value::DateTime(ts) => Some(period_of(ts.date())),
            other => {
                let text = other.to_string();
                let prefix: String = text.trim().chars().take(7).collect();
                (prefix.chars().count() == 7).then_some(prefix)
            }
        })
        .collect();
    periods.into_iter().collect()
}

fn period_of(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}
