//! Core types and data structures for the reconciliation engine

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar cell value as read from an already-parsed input table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Empty cell
    Null,
    /// Boolean cell
    Bool(bool),
    /// Free text, including numbers and dates the reader left unparsed
    Text(String),
    /// Decimal number
    Number(BigDecimal),
    /// Calendar date
    Date(NaiveDate),
    /// Timestamp without timezone
    DateTime(NaiveDateTime),
}

impl Value {
    /// Whether the value carries no data (null or whitespace-only text)
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(flag) => write!(f, "{}", flag),
            Value::Text(text) => write!(f, "{}", text),
            Value::Number(number) => write!(f, "{}", number),
            Value::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Value::DateTime(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(BigDecimal::from(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(BigDecimal::from(value))
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(BigDecimal::from(value as u64))
    }
}

impl From<BigDecimal> for Value {
    fn from(value: BigDecimal) -> Self {
        Value::Number(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One input row: an ordered mapping from source-specific field name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: IndexMap<String, Value>,
}

impl RawRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Insert or replace a field
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Look up a field by name, ignoring surrounding whitespace in header names
    pub fn get(&self, field: &str) -> Option<&Value> {
        if let Some(value) = self.fields.get(field) {
            return Some(value);
        }
        let wanted = field.trim();
        self.fields
            .iter()
            .find(|(name, _)| name.trim() == wanted)
            .map(|(_, value)| value)
    }

    /// Iterate fields in their original order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

/// A canonical key attribute value after coercion
///
/// `Null` is an ordinary, stable value: rows with a missing account on both sides
/// still join, and rows with a missing account on one side are reported unmatched.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    Null,
    Text(String),
    Date(NaiveDate),
    Number(BigDecimal),
}

impl KeyValue {
    /// Convenience constructor for text keys
    pub fn text(value: impl Into<String>) -> Self {
        KeyValue::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, KeyValue::Null)
    }

    /// Convert back into a report cell
    pub fn to_value(&self) -> Value {
        match self {
            KeyValue::Null => Value::Null,
            KeyValue::Text(text) => Value::Text(text.clone()),
            KeyValue::Date(date) => Value::Date(*date),
            KeyValue::Number(number) => Value::Number(number.clone()),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Null => write!(f, "<null>"),
            KeyValue::Text(text) => write!(f, "{}", text),
            KeyValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            KeyValue::Number(number) => write!(f, "{}", number),
        }
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::Text(value.to_string())
    }
}

impl From<NaiveDate> for KeyValue {
    fn from(value: NaiveDate) -> Self {
        KeyValue::Date(value)
    }
}

/// Ordered tuple of key attribute values identifying one reconciliation unit
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeKey(pub Vec<KeyValue>);

impl CompositeKey {
    pub fn new(values: Vec<KeyValue>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[KeyValue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build a coarser key from the attributes at `positions`
    pub fn project(&self, positions: &[usize]) -> CompositeKey {
        CompositeKey(
            positions
                .iter()
                .filter_map(|&idx| self.0.get(idx).cloned())
                .collect(),
        )
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, value) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}

impl<const N: usize> From<[&str; N]> for CompositeKey {
    fn from(values: [&str; N]) -> Self {
        CompositeKey(values.iter().map(|v| KeyValue::from(*v)).collect())
    }
}

/// A raw record after renaming and type coercion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Position of the originating row in its input table
    pub row_index: usize,
    /// Canonical key attributes
    pub keys: IndexMap<String, KeyValue>,
    /// Canonical measures; `None` means the source had no usable number
    pub measures: IndexMap<String, Option<BigDecimal>>,
}

impl NormalizedRecord {
    pub fn key(&self, attribute: &str) -> Option<&KeyValue> {
        self.keys.get(attribute)
    }

    pub fn measure(&self, attribute: &str) -> Option<&BigDecimal> {
        self.measures.get(attribute).and_then(Option::as_ref)
    }

    /// Assemble the composite key for the given key fields
    pub fn composite_key(&self, key_fields: &[String]) -> ReconResult<CompositeKey> {
        key_fields
            .iter()
            .map(|field| {
                self.keys.get(field).cloned().ok_or_else(|| {
                    ReconError::Configuration(format!(
                        "Key field '{}' is not present on normalized records",
                        field
                    ))
                })
            })
            .collect::<ReconResult<Vec<_>>>()
            .map(CompositeKey)
    }
}

/// Per-measure aggregate for one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureAggregate {
    /// Sum of non-null values; zero when every value was null
    pub sum: BigDecimal,
    /// Number of non-null values that went into the sum
    pub count: usize,
}

impl MeasureAggregate {
    pub fn zero() -> Self {
        Self {
            sum: BigDecimal::from(0),
            count: 0,
        }
    }

    /// Mean of the non-null values, if there were any
    pub fn average(&self) -> Option<BigDecimal> {
        if self.count == 0 {
            None
        } else {
            Some(&self.sum / BigDecimal::from(self.count as u64))
        }
    }
}

/// One distinct key observed in a single source, with its measures summed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRow {
    pub key: CompositeKey,
    /// Aligned with the configured measure fields
    pub measures: Vec<MeasureAggregate>,
    /// Number of normalized records sharing this key
    pub record_count: usize,
}

impl AggregatedRow {
    pub fn sum(&self, measure_index: usize) -> Option<&BigDecimal> {
        self.measures.get(measure_index).map(|m| &m.sum)
    }
}

/// Which sources a reconciled key was observed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Presence {
    Both,
    OnlyA,
    OnlyB,
}

impl Presence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Both => "both",
            Presence::OnlyA => "left_only",
            Presence::OnlyB => "right_only",
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Both sources' sums for one measure and their configured combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureComparison {
    /// SOURCE-A sum, zero-filled when the key is absent from A
    pub a: BigDecimal,
    /// SOURCE-B sum, zero-filled when the key is absent from B
    pub b: BigDecimal,
    /// Rounded diff per the measure's policy
    pub diff: BigDecimal,
}

/// Classification of a row's diffs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchCategory {
    /// Every diff is zero within tolerance
    FullMatch,
    /// Only the listed measures are zero, in configured measure order
    PartialMatch { matched: Vec<String> },
    /// No diff is zero
    NoMatch,
}

impl MatchCategory {
    /// Human-readable title used for result set names, e.g. "Qty Match Only"
    pub fn title(&self) -> String {
        match self {
            MatchCategory::FullMatch => "Full Match".to_string(),
            MatchCategory::PartialMatch { matched } if matched.len() == 1 => {
                format!("{} Match Only", matched[0])
            }
            MatchCategory::PartialMatch { matched } => {
                format!("Partial Match ({})", matched.join(", "))
            }
            MatchCategory::NoMatch => "No Match".to_string(),
        }
    }

    pub fn is_full_match(&self) -> bool {
        matches!(self, MatchCategory::FullMatch)
    }
}

impl fmt::Display for MatchCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchCategory::FullMatch => write!(f, "FullMatch"),
            MatchCategory::PartialMatch { matched } if matched.len() == 1 => {
                write!(f, "{}MatchOnly", matched[0])
            }
            MatchCategory::PartialMatch { matched } => {
                write!(f, "PartialMatch({})", matched.join(", "))
            }
            MatchCategory::NoMatch => write!(f, "NoMatch"),
        }
    }
}

/// One key from the union of both sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledRow {
    pub key: CompositeKey,
    pub presence: Presence,
    /// Aligned with the configured measure fields
    pub measures: Vec<MeasureComparison>,
    /// Normalized records behind the A side (0 when absent)
    pub a_records: usize,
    /// Normalized records behind the B side (0 when absent)
    pub b_records: usize,
    pub category: MatchCategory,
}

impl ReconciledRow {
    pub fn diff(&self, measure_index: usize) -> Option<&BigDecimal> {
        self.measures.get(measure_index).map(|m| &m.diff)
    }
}

/// Why a record was dropped during normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FailureReason {
    /// No raw field mapped to the key attribute was present
    MissingKeyAttribute,
    /// The key attribute was present but failed its coercion rule
    UnparseableKey { value: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::MissingKeyAttribute => write!(f, "missing key attribute"),
            FailureReason::UnparseableKey { value } => {
                write!(f, "cannot parse key value '{}'", value)
            }
        }
    }
}

/// A record dropped by the normalizer; counted, never thrown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationFailure {
    pub row_index: usize,
    pub attribute: String,
    pub reason: FailureReason,
}

/// Per-source bookkeeping from the normalization stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationReport {
    pub label: String,
    pub input_rows: usize,
    /// Rows excluded by the source's filter predicate
    pub filtered_out: usize,
    pub normalized: usize,
    pub failures: Vec<NormalizationFailure>,
}

impl NormalizationReport {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// True when rows were supplied but none survived normalization
    pub fn dropped_everything(&self) -> bool {
        self.input_rows > self.filtered_out && self.normalized == 0
    }
}

/// Errors that can occur in the reconciliation engine
#[derive(Debug, thiserror::Error)]
pub enum ReconError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(
        "Aggregation inconsistency in {feed} attribute '{attribute}' at row {row_index}: \
         cannot coerce '{value}' to a number"
    )]
    AggregationInconsistency {
        feed: String,
        attribute: String,
        row_index: usize,
        value: String,
    },
}

/// Result type for reconciliation operations
pub type ReconResult<T> = Result<T, ReconError>;
