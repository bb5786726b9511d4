//! Per-attribute type coercion rules

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{KeyValue, Value};
use crate::utils::{parse_decimal, within_magnitude};

/// Date formats tried when a date coercion lists none
pub const DEFAULT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d", "%m/%d/%Y", "%d-%b-%Y"];

/// What to do with a measure value that is not a number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidPolicy {
    /// Treat as missing data; sums as zero at aggregation
    #[default]
    Null,
    /// Abort the run with an aggregation inconsistency
    Reject,
}

/// A measure value that is present but not a number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidNumber;

/// Parsing rule for one canonical attribute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Coercion {
    /// Trimmed text
    #[default]
    Text,
    /// Calendar date, trying each chrono format in order
    Date {
        #[serde(default)]
        formats: Vec<String>,
    },
    /// Decimal number
    Number {
        #[serde(default)]
        on_invalid: InvalidPolicy,
    },
}

impl Coercion {
    /// Date coercion with explicit formats
    pub fn date<I, S>(formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Coercion::Date {
            formats: formats.into_iter().map(Into::into).collect(),
        }
    }

    /// Numeric coercion that nulls unparseable values
    pub fn number() -> Self {
        Coercion::Number {
            on_invalid: InvalidPolicy::Null,
        }
    }

    /// Numeric coercion that fails the run on unparseable values
    pub fn strict_number() -> Self {
        Coercion::Number {
            on_invalid: InvalidPolicy::Reject,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Coercion::Number { .. })
    }

    /// Variant name, used to check that two sources type a key the same way
    pub fn kind(&self) -> &'static str {
        match self {
            Coercion::Text => "text",
            Coercion::Date { .. } => "date",
            Coercion::Number { .. } => "number",
        }
    }

    pub fn invalid_policy(&self) -> InvalidPolicy {
        match self {
            Coercion::Number { on_invalid } => *on_invalid,
            _ => InvalidPolicy::Null,
        }
    }

    /// Coerce a key attribute. Blank cells become `KeyValue::Null`;
    /// `None` means the value is present but unparseable.
    pub fn coerce_key(&self, value: &Value) -> Option<KeyValue> {
        if value.is_blank() {
            return Some(KeyValue::Null);
        }
        match self {
            Coercion::Text => Some(KeyValue::Text(value.to_string().trim().to_string())),
            Coercion::Date { formats } => parse_date(value, formats).map(KeyValue::Date),
            Coercion::Number { .. } => number_of(value).map(KeyValue::Number),
        }
    }

    /// Coerce a measure. `Ok(None)` is a blank cell.
    pub fn coerce_measure(&self, value: &Value) -> Result<Option<BigDecimal>, InvalidNumber> {
        if value.is_blank() {
            return Ok(None);
        }
        number_of(value).map(Some).ok_or(InvalidNumber)
    }
}

fn number_of(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::Number(number) => within_magnitude(number).then(|| number.clone()),
        Value::Text(text) => parse_decimal(text),
        Value::Bool(_) | Value::Date(_) | Value::DateTime(_) | Value::Null => None,
    }
}

fn parse_date(value: &Value, formats: &[String]) -> Option<NaiveDate> {
    match value {
        Value::Date(date) => Some(*date),
        Value::DateTime(ts) => Some(ts.date()),
        Value::Text(_) | Value::Number(_) => {
            let text = value.to_string();
            let text = text.trim();
            if formats.is_empty() {
                DEFAULT_DATE_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
            } else {
                formats
                    .iter()
                    .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
            }
        }
        Value::Bool(_) | Value::Null => None,
    }
}
