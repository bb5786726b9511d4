//! Row filter predicates evaluated over raw field names

use serde::{Deserialize, Serialize};

use crate::types::RawRecord;

/// Condition restricting which raw records take part in a run.
///
/// Comparisons are made on the trimmed text form of the cell. A predicate that
/// refers to a field the record does not have evaluates to `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterPredicate {
    Equals { field: String, value: String },
    NotEquals { field: String, value: String },
    OneOf { field: String, values: Vec<String> },
    /// Prefix match, e.g. a `YYYY-MM` period on a date column
    StartsWith { field: String, prefix: String },
    IsBlank { field: String },
    All { predicates: Vec<FilterPredicate> },
    Any { predicates: Vec<FilterPredicate> },
    Not { predicate: Box<FilterPredicate> },
}

impl FilterPredicate {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        FilterPredicate::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn not_equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        FilterPredicate::NotEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn one_of<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterPredicate::OneOf {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        FilterPredicate::StartsWith {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    /// Restrict a date column to one `YYYY-MM` period
    pub fn period(field: impl Into<String>, period: impl Into<String>) -> Self {
        Self::starts_with(field, period)
    }

    pub fn and(self, other: FilterPredicate) -> Self {
        match self {
            FilterPredicate::All { mut predicates } => {
                predicates.push(other);
                FilterPredicate::All { predicates }
            }
            first => FilterPredicate::All {
                predicates: vec![first, other],
            },
        }
    }

    pub fn negate(self) -> Self {
        FilterPredicate::Not {
            predicate: Box::new(self),
        }
    }

    /// Evaluate the predicate against one raw record
    pub fn matches(&self, record: &RawRecord) -> bool {
        match self {
            FilterPredicate::Equals { field, value } => {
                cell_text(record, field).is_some_and(|text| text == value.trim())
            }
            FilterPredicate::NotEquals { field, value } => {
                cell_text(record, field).is_some_and(|text| text != value.trim())
            }
            FilterPredicate::OneOf { field, values } => cell_text(record, field)
                .is_some_and(|text| values.iter().any(|value| value.trim() == text)),
            FilterPredicate::StartsWith { field, prefix } => {
                cell_text(record, field).is_some_and(|text| text.starts_with(prefix.trim()))
            }
            FilterPredicate::IsBlank { field } => {
                record.get(field).is_some_and(|value| value.is_blank())
            }
            FilterPredicate::All { predicates } => predicates.iter().all(|p| p.matches(record)),
            FilterPredicate::Any { predicates } => predicates.iter().any(|p| p.matches(record)),
            FilterPredicate::Not { predicate } => !predicate.matches(record),
        }
    }

    /// Raw field names the predicate refers to
    pub fn fields(&self) -> Vec<&str> {
        match self {
            FilterPredicate::Equals { field, .. }
            | FilterPredicate::NotEquals { field, .. }
            | FilterPredicate::OneOf { field, .. }
            | FilterPredicate::StartsWith { field, .. }
            | FilterPredicate::IsBlank { field } => vec![field.as_str()],
            FilterPredicate::All { predicates } | FilterPredicate::Any { predicates } => {
                predicates.iter().flat_map(|p| p.fields()).collect()
            }
            FilterPredicate::Not { predicate } => predicate.fields(),
        }
    }
}

fn cell_text(record: &RawRecord, field: &str) -> Option<String> {
    record
        .get(field)
        .map(|value| value.to_string().trim().to_string())
}
