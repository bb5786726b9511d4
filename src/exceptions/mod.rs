//! Exception resolver: drop pre-approved discrepancies from the residual

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::{ExceptionConfig, FieldMapping};
use crate::normalize::SchemaNormalizer;
use crate::types::*;

/// A key (possibly coarser than the reconciliation key) whose mismatch is
/// expected
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExceptionEntry {
    values: IndexMap<String, KeyValue>,
}

impl ExceptionEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<KeyValue>) -> Self {
        self.values.insert(attribute.into(), value.into());
        self
    }

    pub fn get(&self, attribute: &str) -> Option<&KeyValue> {
        self.values.get(attribute)
    }

    /// Key over `match_fields`, or `None` when the entry lacks one of them
    pub fn project(&self, match_fields: &[String]) -> Option<CompositeKey> {
        match_fields
            .iter()
            .map(|field| self.values.get(field).cloned())
            .collect::<Option<Vec<_>>>()
            .map(CompositeKey)
    }
}

impl From<IndexMap<String, KeyValue>> for ExceptionEntry {
    fn from(values: IndexMap<String, KeyValue>) -> Self {
        Self { values }
    }
}

/// Build exception entries from raw rows of an exception list.
///
/// Uses the same renaming and key coercion as the source normalizer so that,
/// for example, dates compare equal regardless of how the list spells them.
pub fn exceptions_from_records(
    records: &[RawRecord],
    config: &ExceptionConfig,
) -> ReconResult<(Vec<ExceptionEntry>, NormalizationReport)> {
    let normalized =
        SchemaNormalizer::new("exceptions", &config.mapping, &config.match_fields, &[])
            .normalize(records)?;

    let entries = normalized
        .records
        .into_iter()
        .map(|record| ExceptionEntry::from(record.keys))
        .collect();
    Ok((entries, normalized.report))
}

/// Re-type hand-built entries with `mapping`'s key coercions.
///
/// Only text values are touched; a text value the coercion cannot parse is
/// kept as is and will simply not match.
pub fn align_entries(
    entries: &[ExceptionEntry],
    mapping: &FieldMapping,
    match_fields: &[String],
) -> Vec<ExceptionEntry> {
    entries
        .iter()
        .map(|entry| {
            let mut aligned = entry.clone();
            for field in match_fields {
                let Some(KeyValue::Text(text)) = entry.get(field) else {
                    continue;
                };
                match mapping.key_coercion(field).coerce_key(&Value::from(text.as_str())) {
                    Some(value) => {
                        aligned.values.insert(field.clone(), value);
                    }
                    None => debug!(%field, %text, "Exception value does not parse as a key"),
                }
            }
            aligned
        })
        .collect()
}

/// Left anti-join `non_matches` against `exceptions` on `match_fields`.
///
/// Surviving rows are returned unchanged and in their original order. With no
/// exception list the input is returned as is.
pub fn resolve_exceptions(
    non_matches: &[ReconciledRow],
    exceptions: Option<&[ExceptionEntry]>,
    key_fields: &[String],
    match_fields: &[String],
) -> ReconResult<Vec<ReconciledRow>> {
    let Some(exceptions) = exceptions else {
        return Ok(non_matches.to_vec());
    };

    if match_fields.is_empty() {
        return Err(ReconError::Configuration(
            "Exception matching needs at least one match field".to_string(),
        ));
    }
    let positions = match_fields
        .iter()
        .map(|field| {
            key_fields.iter().position(|k| k == field).ok_or_else(|| {
                ReconError::Configuration(format!(
                    "Exception match field '{}' is not a key field {:?}",
                    field, key_fields
                ))
            })
        })
        .collect::<ReconResult<Vec<_>>>()?;

    let mut known: HashSet<CompositeKey> = HashSet::with_capacity(exceptions.len());
    for entry in exceptions {
        match entry.project(match_fields) {
            Some(key) => {
                known.insert(key);
            }
            None => debug!(?entry, "Exception entry lacks a match field, ignoring"),
        }
    }

    let residual: Vec<ReconciledRow> = non_matches
        .iter()
        .filter(|row| !known.contains(&row.key.project(&positions)))
        .cloned()
        .collect();

    info!(
        candidates = non_matches.len(),
        explained = non_matches.len() - residual.len(),
        residual = residual.len(),
        "Exception resolution complete"
    );

    Ok(residual)
}
