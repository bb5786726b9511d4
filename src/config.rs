//! Reconciliation run configuration
//!
//! One [`FieldMapping`] per source replaces hard-coded rename tables. A whole
//! [`ReconciliationConfig`] can be built in code or loaded from JSON, and is
//! validated once through a [`ConfigValidator`](crate::traits::ConfigValidator)
//! before any record is touched.

use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::normalize::{Coercion, FilterPredicate};
use crate::reconciliation::DiffPolicy;
use crate::types::*;

/// Default number of decimal places diffs are rounded to
pub const DEFAULT_PRECISION: u32 = 2;

fn default_precision() -> u32 {
    DEFAULT_PRECISION
}

fn default_tolerance() -> BigDecimal {
    BigDecimal::from(0)
}

/// How one source's raw fields map onto canonical attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Raw field name -> canonical attribute. Several raw fields may map to the
    /// same attribute; the first one present in a record wins.
    pub rename: IndexMap<String, String>,
    /// Optional predicate over raw fields; failing rows are excluded
    #[serde(default)]
    pub filter: Option<FilterPredicate>,
    /// Per canonical attribute parsing rule
    #[serde(default)]
    pub coercions: IndexMap<String, Coercion>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a raw field onto a canonical attribute
    pub fn rename(mut self, raw: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.rename.insert(raw.into(), canonical.into());
        self
    }

    /// Use a raw field under its own name
    pub fn keep(self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.rename(field.clone(), field)
    }

    pub fn filter(mut self, predicate: FilterPredicate) -> Self {
        self.filter = Some(predicate);
        self
    }

    pub fn coerce(mut self, canonical: impl Into<String>, coercion: Coercion) -> Self {
        self.coercions.insert(canonical.into(), coercion);
        self
    }

    /// Whether any raw field maps to the canonical attribute
    pub fn maps_to(&self, canonical: &str) -> bool {
        self.rename.values().any(|target| target == canonical)
    }

    /// Raw fields mapped to a canonical attribute, in priority order
    pub fn sources_for<'a>(&'a self, canonical: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.rename
            .iter()
            .filter(move |(_, target)| target.as_str() == canonical)
            .map(|(raw, _)| raw.as_str())
    }

    /// Find the raw value for a canonical attribute.
    ///
    /// Aliases are tried in order; the first non-blank value wins, otherwise the
    /// first present (blank) value is returned.
    pub fn lookup<'r>(&self, record: &'r RawRecord, canonical: &str) -> Option<&'r Value> {
        let mut fallback = None;
        for raw in self.sources_for(canonical) {
            if let Some(value) = record.get(raw) {
                if !value.is_blank() {
                    return Some(value);
                }
                fallback.get_or_insert(value);
            }
        }
        fallback
    }

    /// Coercion for a key attribute; text unless configured otherwise
    pub fn key_coercion(&self, canonical: &str) -> Coercion {
        self.coercions.get(canonical).cloned().unwrap_or_default()
    }

    /// Coercion for a measure; nulling numeric parse unless configured otherwise
    pub fn measure_coercion(&self, canonical: &str) -> Coercion {
        self.coercions
            .get(canonical)
            .cloned()
            .unwrap_or_else(Coercion::number)
    }
}

/// Everything the engine needs to know about one input feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Display label, e.g. "Atlantis" or "GMI"
    pub label: String,
    pub mapping: FieldMapping,
    /// Canonical key attributes, in key order
    pub key_fields: Vec<String>,
    /// Canonical measures, in report order
    pub measure_fields: Vec<String>,
}

impl SourceConfig {
    pub fn new(label: impl Into<String>, mapping: FieldMapping) -> Self {
        Self {
            label: label.into(),
            mapping,
            key_fields: Vec::new(),
            measure_fields: Vec::new(),
        }
    }

    pub fn key_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn measure_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.measure_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// Known-exception list settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionConfig {
    /// Mapping from the exception list's raw fields to canonical attributes
    pub mapping: FieldMapping,
    /// Subset of the key fields exceptions are matched on
    pub match_fields: Vec<String>,
}

impl ExceptionConfig {
    /// Copy of this config where every match field without its own coercion
    /// takes the key coercion of `source`, so exception keys type the same
    /// way as reconciled keys.
    pub fn inherit_key_coercions(&self, source: &SourceConfig) -> ExceptionConfig {
        let mut mapping = self.mapping.clone();
        for field in &self.match_fields {
            if !mapping.coercions.contains_key(field) {
                mapping
                    .coercions
                    .insert(field.clone(), source.mapping.key_coercion(field));
            }
        }
        ExceptionConfig {
            mapping,
            match_fields: self.match_fields.clone(),
        }
    }
}

/// Full configuration of one reconciliation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    pub source_a: SourceConfig,
    pub source_b: SourceConfig,
    /// Measure name -> diff policy; every measure needs one
    pub diff_policies: IndexMap<String, DiffPolicy>,
    /// Decimal places diffs are rounded to before classification
    #[serde(default = "default_precision")]
    pub precision: u32,
    /// Largest absolute rounded diff still treated as zero
    #[serde(default = "default_tolerance")]
    pub tolerance: BigDecimal,
    /// Key fields kept in the summary rollup; empty means the leading key field
    #[serde(default)]
    pub rollup_fields: Vec<String>,
    #[serde(default)]
    pub exceptions: Option<ExceptionConfig>,
}

impl ReconciliationConfig {
    pub fn new(source_a: SourceConfig, source_b: SourceConfig) -> Self {
        Self {
            source_a,
            source_b,
            diff_policies: IndexMap::new(),
            precision: DEFAULT_PRECISION,
            tolerance: default_tolerance(),
            rollup_fields: Vec::new(),
            exceptions: None,
        }
    }

    /// Parse a configuration from JSON. Unknown diff policies and malformed
    /// predicates surface as configuration errors.
    pub fn from_json_str(json: &str) -> ReconResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ReconError::Configuration(format!("Invalid configuration: {}", e)))
    }

    pub fn diff_policy(mut self, measure: impl Into<String>, policy: DiffPolicy) -> Self {
        self.diff_policies.insert(measure.into(), policy);
        self
    }

    pub fn precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    pub fn tolerance(mut self, tolerance: BigDecimal) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn rollup_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rollup_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn exceptions(mut self, exceptions: ExceptionConfig) -> Self {
        self.exceptions = Some(exceptions);
        self
    }

    /// Key fields of the run (identical across sources once validated)
    pub fn key_fields(&self) -> &[String] {
        &self.source_a.key_fields
    }

    /// Measure fields of the run (identical across sources once validated)
    pub fn measure_fields(&self) -> &[String] {
        &self.source_a.measure_fields
    }

    /// Rollup grouping, defaulting to the leading key field
    pub fn resolved_rollup_fields(&self) -> Vec<String> {
        if self.rollup_fields.is_empty() {
            self.key_fields().iter().take(1).cloned().collect()
        } else {
            self.rollup_fields.clone()
        }
    }
}
