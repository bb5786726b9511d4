//! Validation utilities

use crate::config::*;
use crate::traits::*;
use crate::types::*;

/// Validate a canonical attribute name
pub fn validate_attribute_name(name: &str) -> ReconResult<()> {
    if name.trim().is_empty() {
        return Err(ReconError::Configuration(
            "Attribute name cannot be empty".to_string(),
        ));
    }

    if name.len() > 64 {
        return Err(ReconError::Configuration(format!(
            "Attribute name '{}' cannot exceed 64 characters",
            name
        )));
    }

    // Canonical names end up as column headers; keep them simple
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ReconError::Configuration(format!(
            "Attribute name '{}' can only contain alphanumeric characters, dashes, and underscores",
            name
        )));
    }

    Ok(())
}

/// Validate a source label
pub fn validate_label(label: &str) -> ReconResult<()> {
    if label.trim().is_empty() {
        return Err(ReconError::Configuration(
            "Source label cannot be empty".to_string(),
        ));
    }

    if label.len() > 32 {
        return Err(ReconError::Configuration(format!(
            "Source label '{}' cannot exceed 32 characters",
            label
        )));
    }

    Ok(())
}

/// Validator that adds naming rules on top of the default structural checks
pub struct StrictConfigValidator;

impl ConfigValidator for StrictConfigValidator {
    fn validate_source(&self, source: &SourceConfig) -> ReconResult<()> {
        DefaultConfigValidator.validate_source(source)?;

        validate_label(&source.label)?;
        for name in source.mapping.rename.values() {
            validate_attribute_name(name)?;
        }
        for raw in source.mapping.rename.keys() {
            if raw.trim().is_empty() {
                return Err(ReconError::Configuration(format!(
                    "{} mapping contains an empty raw field name",
                    source.label
                )));
            }
        }

        Ok(())
    }

    fn validate_config(&self, config: &ReconciliationConfig) -> ReconResult<()> {
        // Source checks run through self so naming rules apply to both feeds
        self.validate_source(&config.source_a)?;
        self.validate_source(&config.source_b)?;
        DefaultConfigValidator.validate_config(config)?;

        if config.source_a.label.trim() == config.source_b.label.trim() {
            return Err(ReconError::Configuration(format!(
                "Both sources are labelled '{}'; result columns would collide",
                config.source_a.label
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciliation::DiffPolicy;

    fn source(label: &str, canonical_cb: &str) -> SourceConfig {
        SourceConfig::new(
            label,
            FieldMapping::new()
                .rename("TGIVF#", canonical_cb)
                .rename("TQTY", "Qty"),
        )
        .key_fields([canonical_cb])
        .measure_fields(["Qty"])
    }

    #[test]
    fn test_attribute_names() {
        assert!(validate_attribute_name("CB").is_ok());
        assert!(validate_attribute_name("Trade_Date").is_ok());
        assert!(validate_attribute_name("").is_err());
        assert!(validate_attribute_name("TGIVF#").is_err());
        assert!(validate_attribute_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_strict_rejects_odd_names_default_accepts() {
        let config = ReconciliationConfig::new(source("Atlantis", "CB #"), source("GMI", "CB #"))
            .diff_policy("Qty", DiffPolicy::Difference);

        assert!(DefaultConfigValidator.validate_config(&config).is_ok());
        assert!(StrictConfigValidator.validate_config(&config).is_err());
    }

    #[test]
    fn test_strict_rejects_duplicate_labels() {
        let config = ReconciliationConfig::new(source("Feed", "CB"), source("Feed", "CB"))
            .diff_policy("Qty", DiffPolicy::Difference);

        assert!(DefaultConfigValidator.validate_config(&config).is_ok());
        assert!(matches!(
            StrictConfigValidator.validate_config(&config),
            Err(ReconError::Configuration(_))
        ));
    }
}
