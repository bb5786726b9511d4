//! Key aggregator: one row per distinct composite key within a source

use bigdecimal::BigDecimal;
use std::collections::BTreeMap;
use tracing::debug;

use crate::types::*;

struct Accumulator {
    measures: Vec<MeasureAggregate>,
    record_count: usize,
}

impl Accumulator {
    fn new(measure_count: usize) -> Self {
        Self {
            measures: vec![MeasureAggregate::zero(); measure_count],
            record_count: 0,
        }
    }

    fn absorb(&mut self, values: &[Option<&BigDecimal>]) {
        self.record_count += 1;
        for (slot, value) in self.measures.iter_mut().zip(values) {
            if let Some(value) = value {
                slot.sum += *value;
                slot.count += 1;
            }
        }
    }
}

/// Group records by `key_fields` and sum `measure_fields` per group.
///
/// Null measure values are skipped, so a group whose values are all null sums
/// to zero. Rows come back sorted by key.
pub fn aggregate(
    records: &[NormalizedRecord],
    key_fields: &[String],
    measure_fields: &[String],
) -> ReconResult<Vec<AggregatedRow>> {
    if key_fields.is_empty() {
        return Err(ReconError::Configuration(
            "At least one key field is required for aggregation".to_string(),
        ));
    }

    let mut groups: BTreeMap<CompositeKey, Accumulator> = BTreeMap::new();

    for record in records {
        let key = record.composite_key(key_fields)?;
        let values = measure_fields
            .iter()
            .map(|field| {
                record
                    .measures
                    .get(field)
                    .map(Option::as_ref)
                    .ok_or_else(|| {
                        ReconError::Configuration(format!(
                            "Measure '{}' is not present on normalized records",
                            field
                        ))
                    })
            })
            .collect::<ReconResult<Vec<_>>>()?;

        groups
            .entry(key)
            .or_insert_with(|| Accumulator::new(measure_fields.len()))
            .absorb(&values);
    }

    debug!(
        records = records.len(),
        keys = groups.len(),
        "Aggregated records by key"
    );

    Ok(groups
        .into_iter()
        .map(|(key, acc)| AggregatedRow {
            key,
            measures: acc.measures,
            record_count: acc.record_count,
        })
        .collect())
}

/// Fail fast unless both sources group on the same key fields, in the same
/// order.
pub fn ensure_key_alignment(
    label_a: &str,
    key_fields_a: &[String],
    label_b: &str,
    key_fields_b: &[String],
) -> ReconResult<()> {
    if key_fields_a.len() != key_fields_b.len() {
        return Err(ReconError::Configuration(format!(
            "Key field arity mismatch: {} has {} {:?}, {} has {} {:?}",
            label_a,
            key_fields_a.len(),
            key_fields_a,
            label_b,
            key_fields_b.len(),
            key_fields_b
        )));
    }

    if key_fields_a != key_fields_b {
        return Err(ReconError::Configuration(format!(
            "Key field names differ: {} uses {:?}, {} uses {:?}",
            label_a, key_fields_a, label_b, key_fields_b
        )));
    }

    Ok(())
}
