//! Per-measure diff policies and match classification

use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::*;
use crate::utils::round_half_up;

/// How SOURCE-A and SOURCE-B sums combine into a diff.
///
/// Quantities are compared with `Difference` (A - B). Fees stored as a debit on
/// one side and a matching credit on the other are compared with `SignedSum`
/// (A + B). Both expect zero when the sources agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum DiffPolicy {
    Difference,
    SignedSum,
}

impl DiffPolicy {
    /// Combine the two sums, unrounded
    pub fn combine(&self, a: &BigDecimal, b: &BigDecimal) -> BigDecimal {
        match self {
            DiffPolicy::Difference => a - b,
            DiffPolicy::SignedSum => a + b,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiffPolicy::Difference => "difference",
            DiffPolicy::SignedSum => "signed_sum",
        }
    }
}

impl fmt::Display for DiffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for DiffPolicy {
    type Error = ReconError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for DiffPolicy {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "difference" | "a_minus_b" => Ok(DiffPolicy::Difference),
            "signed_sum" | "a_plus_b" => Ok(DiffPolicy::SignedSum),
            other => Err(ReconError::Configuration(format!(
                "Unknown diff policy '{}'",
                other
            ))),
        }
    }
}

/// Resolved diff rules for a run: one policy per measure plus rounding and
/// tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffPolicies {
    measures: Vec<String>,
    policies: Vec<DiffPolicy>,
    precision: u32,
    tolerance: BigDecimal,
}

impl DiffPolicies {
    /// Resolve policies for `measure_fields`; a measure without a policy is a
    /// configuration error.
    pub fn resolve(
        measure_fields: &[String],
        policies: &IndexMap<String, DiffPolicy>,
        precision: u32,
        tolerance: BigDecimal,
    ) -> ReconResult<Self> {
        let resolved = measure_fields
            .iter()
            .map(|measure| {
                policies.get(measure).copied().ok_or_else(|| {
                    ReconError::Configuration(format!(
                        "No diff policy configured for measure '{}'",
                        measure
                    ))
                })
            })
            .collect::<ReconResult<Vec<_>>>()?;

        if tolerance < BigDecimal::from(0) {
            return Err(ReconError::Configuration(format!(
                "Tolerance must not be negative, got {}",
                tolerance
            )));
        }

        Ok(Self {
            measures: measure_fields.to_vec(),
            policies: resolved,
            precision,
            tolerance,
        })
    }

    pub fn measure_fields(&self) -> &[String] {
        &self.measures
    }

    pub fn policy(&self, measure_index: usize) -> Option<DiffPolicy> {
        self.policies.get(measure_index).copied()
    }

    pub fn len(&self) -> usize {
        self.measures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn tolerance(&self) -> &BigDecimal {
        &self.tolerance
    }

    /// Compare both sides of every measure, rounding each diff
    pub fn compare(&self, a: &[BigDecimal], b: &[BigDecimal]) -> Vec<MeasureComparison> {
        self.policies
            .iter()
            .zip(a.iter().zip(b.iter()))
            .map(|(policy, (a, b))| MeasureComparison {
                a: a.clone(),
                b: b.clone(),
                diff: round_half_up(&policy.combine(a, b), self.precision),
            })
            .collect()
    }

    /// Classify a set of rounded diffs
    pub fn classify(&self, comparisons: &[MeasureComparison]) -> MatchCategory {
        let diffs: Vec<&BigDecimal> = comparisons.iter().map(|c| &c.diff).collect();
        classify(&diffs, &self.measures, &self.tolerance)
    }
}

/// Classify rounded diffs against a tolerance.
///
/// All zero is a full match, none zero is no match; anything in between is a
/// partial match naming the zero measures in configured order.
pub fn classify(
    diffs: &[&BigDecimal],
    measure_fields: &[String],
    tolerance: &BigDecimal,
) -> MatchCategory {
    let matched: Vec<String> = diffs
        .iter()
        .zip(measure_fields)
        .filter(|(diff, _)| diff.abs() <= *tolerance)
        .map(|(_, name)| name.clone())
        .collect();

    if matched.len() == diffs.len() {
        MatchCategory::FullMatch
    } else if matched.is_empty() {
        MatchCategory::NoMatch
    } else {
        MatchCategory::PartialMatch { matched }
    }
}
