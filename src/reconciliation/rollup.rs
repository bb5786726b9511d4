//! Coarse summary view derived from reconciled rows

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::policy::DiffPolicies;
use crate::types::*;

/// Reconciliation of a coarser key (e.g. the CB code alone)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupRow {
    pub key: CompositeKey,
    pub measures: Vec<MeasureComparison>,
    /// Number of fine-grained reconciled rows folded into this one
    pub member_rows: usize,
    pub category: MatchCategory,
}

/// Positions of `rollup_fields` within `key_fields`
pub fn rollup_positions(key_fields: &[String], rollup_fields: &[String]) -> ReconResult<Vec<usize>> {
    if rollup_fields.is_empty() {
        return Err(ReconError::Configuration(
            "Rollup needs at least one key field".to_string(),
        ));
    }
    rollup_fields
        .iter()
        .map(|field| {
            key_fields.iter().position(|k| k == field).ok_or_else(|| {
                ReconError::Configuration(format!(
                    "Rollup field '{}' is not a key field {:?}",
                    field, key_fields
                ))
            })
        })
        .collect()
}

/// Sum A and B sides of `rows` per rollup key and recompute diffs.
///
/// Built only from reconciled rows, so the summary can never disagree with the
/// detailed table. Diffs are recomputed from the summed sides, not summed.
pub fn rollup(
    rows: &[ReconciledRow],
    key_fields: &[String],
    rollup_fields: &[String],
    policies: &DiffPolicies,
) -> ReconResult<Vec<RollupRow>> {
    let positions = rollup_positions(key_fields, rollup_fields)?;

    let mut groups: BTreeMap<CompositeKey, (Vec<BigDecimal>, Vec<BigDecimal>, usize)> =
        BTreeMap::new();
    for row in rows {
        let (a, b, members) = groups.entry(row.key.project(&positions)).or_insert_with(|| {
            (
                vec![BigDecimal::from(0); policies.len()],
                vec![BigDecimal::from(0); policies.len()],
                0,
            )
        });
        for (idx, cmp) in row.measures.iter().enumerate().take(policies.len()) {
            a[idx] += &cmp.a;
            b[idx] += &cmp.b;
        }
        *members += 1;
    }

    Ok(groups
        .into_iter()
        .map(|(key, (a, b, member_rows))| {
            let measures = policies.compare(&a, &b);
            let category = policies.classify(&measures);
            RollupRow {
                key,
                measures,
                member_rows,
                category,
            }
        })
        .collect())
}
