//! Full outer join of the two per-source aggregates

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::debug;

use super::policy::DiffPolicies;
use crate::types::*;

#[derive(Default)]
struct JoinSlot {
    a: Option<SideTotals>,
    b: Option<SideTotals>,
}

struct SideTotals {
    sums: Vec<BigDecimal>,
    records: usize,
}

impl SideTotals {
    fn from_row(row: &AggregatedRow) -> Self {
        Self {
            sums: row.measures.iter().map(|m| m.sum.clone()).collect(),
            records: row.record_count,
        }
    }

    // Aggregates are unique per key, but repeated keys fold instead of duplicating
    fn absorb(&mut self, row: &AggregatedRow) {
        for (sum, measure) in self.sums.iter_mut().zip(&row.measures) {
            *sum += &measure.sum;
        }
        self.records += row.record_count;
    }
}

fn place(slot: &mut Option<SideTotals>, row: &AggregatedRow) {
    match slot {
        Some(totals) => totals.absorb(row),
        None => *slot = Some(SideTotals::from_row(row)),
    }
}

fn check_shape(rows: &[AggregatedRow], side: &str, measure_count: usize) -> ReconResult<Option<usize>> {
    let mut arity = None;
    for row in rows {
        if row.measures.len() != measure_count {
            return Err(ReconError::Configuration(format!(
                "Side {} row {} carries {} measures, expected {}",
                side,
                row.key,
                row.measures.len(),
                measure_count
            )));
        }
        match arity {
            None => arity = Some(row.key.len()),
            Some(len) if len != row.key.len() => {
                return Err(ReconError::Configuration(format!(
                    "Side {} mixes key arities {} and {}",
                    side,
                    len,
                    row.key.len()
                )));
            }
            Some(_) => {}
        }
    }
    Ok(arity)
}

/// Outer-join `agg_a` and `agg_b` on their composite keys.
///
/// Every key of either side yields exactly one row; the absent side's measures
/// are zero. Rows are sorted by key regardless of input order.
pub fn reconcile(
    agg_a: &[AggregatedRow],
    agg_b: &[AggregatedRow],
    policies: &DiffPolicies,
) -> ReconResult<Vec<ReconciledRow>> {
    let arity_a = check_shape(agg_a, "A", policies.len())?;
    let arity_b = check_shape(agg_b, "B", policies.len())?;
    if let (Some(a), Some(b)) = (arity_a, arity_b) {
        if a != b {
            return Err(ReconError::Configuration(format!(
                "Key arity mismatch between sources: A keys have {} attributes, B keys have {}",
                a, b
            )));
        }
    }

    let mut joined: BTreeMap<CompositeKey, JoinSlot> = BTreeMap::new();
    for row in agg_a {
        place(&mut joined.entry(row.key.clone()).or_default().a, row);
    }
    for row in agg_b {
        place(&mut joined.entry(row.key.clone()).or_default().b, row);
    }

    let zeros = vec![BigDecimal::from(0); policies.len()];
    let rows: Vec<ReconciledRow> = joined
        .into_iter()
        .map(|(key, slot)| {
            let presence = match (&slot.a, &slot.b) {
                (Some(_), Some(_)) => Presence::Both,
                (Some(_), None) => Presence::OnlyA,
                (None, _) => Presence::OnlyB,
            };
            let a_sums = slot.a.as_ref().map_or(&zeros, |t| &t.sums);
            let b_sums = slot.b.as_ref().map_or(&zeros, |t| &t.sums);
            let measures = policies.compare(a_sums, b_sums);
            let category = policies.classify(&measures);

            ReconciledRow {
                key,
                presence,
                measures,
                a_records: slot.a.as_ref().map_or(0, |t| t.records),
                b_records: slot.b.as_ref().map_or(0, |t| t.records),
                category,
            }
        })
        .collect();

    debug!(
        a_keys = agg_a.len(),
        b_keys = agg_b.len(),
        joined = rows.len(),
        "Outer join complete"
    );

    Ok(rows)
}

/// Rows sharing one match category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPartition {
    pub category: MatchCategory,
    pub rows: Vec<ReconciledRow>,
}

// Partials matching more measures sort first, then by measure order
fn category_rank(
    category: &MatchCategory,
    measure_fields: &[String],
) -> (u8, Reverse<usize>, Vec<usize>) {
    match category {
        MatchCategory::FullMatch => (0, Reverse(0), Vec::new()),
        MatchCategory::PartialMatch { matched } => (
            1,
            Reverse(matched.len()),
            matched
                .iter()
                .map(|name| {
                    measure_fields
                        .iter()
                        .position(|m| m == name)
                        .unwrap_or(usize::MAX)
                })
                .collect(),
        ),
        MatchCategory::NoMatch => (2, Reverse(0), Vec::new()),
    }
}

/// Split rows into match categories.
///
/// `FullMatch`, `NoMatch` and each single-measure partial match are always
/// present (possibly empty) when there are at least two measures, so the
/// Qty/Fee case always yields its four partitions. Other partial matches
/// appear when observed, ahead of the single-measure ones. Every row lands in exactly one partition.
pub fn partition(rows: &[ReconciledRow], measure_fields: &[String]) -> Vec<MatchPartition> {
    let mut buckets: Vec<MatchPartition> = vec![MatchPartition {
        category: MatchCategory::FullMatch,
        rows: Vec::new(),
    }];
    if measure_fields.len() >= 2 {
        buckets.extend(measure_fields.iter().map(|measure| MatchPartition {
            category: MatchCategory::PartialMatch {
                matched: vec![measure.clone()],
            },
            rows: Vec::new(),
        }));
    }
    buckets.push(MatchPartition {
        category: MatchCategory::NoMatch,
        rows: Vec::new(),
    });

    for row in rows {
        match buckets.iter_mut().find(|b| b.category == row.category) {
            Some(bucket) => bucket.rows.push(row.clone()),
            None => buckets.push(MatchPartition {
                category: row.category.clone(),
                rows: vec![row.clone()],
            }),
        }
    }

    buckets.sort_by_key(|b| category_rank(&b.category, measure_fields));
    buckets
}

/// One measure that disagrees for one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDifference {
    pub key: CompositeKey,
    pub measure: String,
    pub a: BigDecimal,
    pub b: BigDecimal,
    pub diff: BigDecimal,
}

/// List every non-zero diff, one entry per key and measure
pub fn field_differences(rows: &[ReconciledRow], policies: &DiffPolicies) -> Vec<FieldDifference> {
    let tolerance = policies.tolerance();
    rows.iter()
        .flat_map(|row| {
            row.measures
                .iter()
                .zip(policies.measure_fields())
                .filter(|(cmp, _)| cmp.diff.abs() > *tolerance)
                .map(|(cmp, measure)| FieldDifference {
                    key: row.key.clone(),
                    measure: measure.clone(),
                    a: cmp.a.clone(),
                    b: cmp.b.clone(),
                    diff: cmp.diff.clone(),
                })
        })
        .collect()
}
