//! Traits for pluggable configuration validation

use std::collections::HashSet;

use crate::aggregate::ensure_key_alignment;
use crate::config::*;
use crate::reconciliation::{rollup_positions, DiffPolicies};
use crate::types::*;

/// Largest rounding precision accepted for diffs
pub const MAX_PRECISION: u32 = 12;

/// Trait for implementing configuration validation rules.
///
/// Validation runs once, before any record is normalized, so configuration
/// problems never surface halfway through a run.
pub trait ConfigValidator: Send + Sync {
    /// Validate a single source's mapping and field lists
    fn validate_source(&self, source: &SourceConfig) -> ReconResult<()>;

    /// Validate the whole run configuration
    fn validate_config(&self, config: &ReconciliationConfig) -> ReconResult<()>;
}

fn ensure_unique(fields: &[String], what: &str, label: &str) -> ReconResult<()> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.as_str()) {
            return Err(ReconError::Configuration(format!(
                "{} lists {} '{}' more than once",
                label, what, field
            )));
        }
    }
    Ok(())
}

/// Every key field must be typed the same way on both sides; a date never
/// equals text, so mismatched coercions would silently join nothing.
fn ensure_key_coercions(
    key_fields: &[String],
    left: (&str, &FieldMapping),
    right: (&str, &FieldMapping),
) -> ReconResult<()> {
    for field in key_fields {
        let left_kind = left.1.key_coercion(field).kind();
        let right_kind = right.1.key_coercion(field).kind();
        if left_kind != right_kind {
            return Err(ReconError::Configuration(format!(
                "Key field '{}' is coerced as {} by {} but as {} by {}",
                field, left_kind, left.0, right_kind, right.0
            )));
        }
    }
    Ok(())
}

/// Default validator with the structural rules every run needs
pub struct DefaultConfigValidator;

impl ConfigValidator for DefaultConfigValidator {
    fn validate_source(&self, source: &SourceConfig) -> ReconResult<()> {
        if source.key_fields.is_empty() {
            return Err(ReconError::Configuration(format!(
                "{} has no key fields",
                source.label
            )));
        }
        if source.measure_fields.is_empty() {
            return Err(ReconError::Configuration(format!(
                "{} has no measure fields",
                source.label
            )));
        }
        ensure_unique(&source.key_fields, "key field", &source.label)?;
        ensure_unique(&source.measure_fields, "measure field", &source.label)?;

        for field in source.key_fields.iter().chain(&source.measure_fields) {
            if !source.mapping.maps_to(field) {
                return Err(ReconError::Configuration(format!(
                    "{} mapping has no raw field for canonical attribute '{}'",
                    source.label, field
                )));
            }
        }

        if let Some(field) = source
            .key_fields
            .iter()
            .find(|field| source.measure_fields.contains(field))
        {
            return Err(ReconError::Configuration(format!(
                "{} uses '{}' as both key and measure",
                source.label, field
            )));
        }

        for field in &source.measure_fields {
            if let Some(coercion) = source.mapping.coercions.get(field) {
                if !coercion.is_numeric() {
                    return Err(ReconError::Configuration(format!(
                        "{} measure '{}' must use a number coercion, got {:?}",
                        source.label, field, coercion
                    )));
                }
            }
        }

        Ok(())
    }

    fn validate_config(&self, config: &ReconciliationConfig) -> ReconResult<()> {
        self.validate_source(&config.source_a)?;
        self.validate_source(&config.source_b)?;

        ensure_key_alignment(
            &config.source_a.label,
            &config.source_a.key_fields,
            &config.source_b.label,
            &config.source_b.key_fields,
        )?;
        ensure_key_coercions(
            config.key_fields(),
            (&config.source_a.label, &config.source_a.mapping),
            (&config.source_b.label, &config.source_b.mapping),
        )?;

        if config.source_a.measure_fields != config.source_b.measure_fields {
            return Err(ReconError::Configuration(format!(
                "Measure fields differ: {} uses {:?}, {} uses {:?}",
                config.source_a.label,
                config.source_a.measure_fields,
                config.source_b.label,
                config.source_b.measure_fields
            )));
        }

        if config.precision > MAX_PRECISION {
            return Err(ReconError::Configuration(format!(
                "Precision {} exceeds the maximum of {}",
                config.precision, MAX_PRECISION
            )));
        }

        DiffPolicies::resolve(
            config.measure_fields(),
            &config.diff_policies,
            config.precision,
            config.tolerance.clone(),
        )?;

        let rollup_fields = config.resolved_rollup_fields();
        ensure_unique(&rollup_fields, "rollup field", "Rollup")?;
        rollup_positions(config.key_fields(), &rollup_fields)?;

        if let Some(exceptions) = &config.exceptions {
            if exceptions.match_fields.is_empty() {
                return Err(ReconError::Configuration(
                    "Exception list has no match fields".to_string(),
                ));
            }
            ensure_unique(&exceptions.match_fields, "match field", "Exception list")?;
            for field in &exceptions.match_fields {
                if !config.key_fields().contains(field) {
                    return Err(ReconError::Configuration(format!(
                        "Exception match field '{}' is not a key field {:?}",
                        field,
                        config.key_fields()
                    )));
                }
                if !exceptions.mapping.maps_to(field) {
                    return Err(ReconError::Configuration(format!(
                        "Exception list mapping has no raw field for '{}'",
                        field
                    )));
                }
            }
            // Fields without their own coercion inherit the source's
            let explicit: Vec<String> = exceptions
                .match_fields
                .iter()
                .filter(|field| exceptions.mapping.coercions.contains_key(*field))
                .cloned()
                .collect();
            ensure_key_coercions(
                &explicit,
                (&config.source_a.label, &config.source_a.mapping),
                ("exception list", &exceptions.mapping),
            )?;
        }

        Ok(())
    }
}
