//! Report assembler: named tabular result sets for export
//!
//! This is the only place that knows about column headers and sheet names.
//! Writers for spreadsheets, CSV or screen tables consume [`Report`] as is.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::reconciliation::ReconciliationResult;
use crate::types::*;

pub const RECONCILIATION_SET: &str = "Reconciliation";
pub const SUMMARY_SET: &str = "Summary";
pub const FIELD_DIFFERENCES_SET: &str = "Field Differences";
pub const UNEXPLAINED_SET: &str = "Unexplained Exceptions";
pub const RUN_SUMMARY_SET: &str = "Run Summary";

/// One named table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by header
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `row` under header `column`
    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }
}

/// Ordered collection of result sets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub sets: Vec<ResultSet>,
}

impl Report {
    pub fn get(&self, name: &str) -> Option<&ResultSet> {
        self.sets.iter().find(|set| set.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.sets.iter().map(|set| set.name.as_str()).collect()
    }
}

/// Turns a [`ReconciliationResult`] into a [`Report`]
pub struct ReportAssembler;

impl ReportAssembler {
    pub fn assemble(result: &ReconciliationResult) -> Report {
        let mut sets = Vec::new();

        sets.push(Self::row_set(RECONCILIATION_SET, result, &result.rows));
        for partition in &result.partitions {
            sets.push(Self::row_set(&partition.category.title(), result, &partition.rows));
        }
        sets.push(Self::summary_set(result));
        sets.push(Self::field_differences_set(result));
        if let Some(residual) = &result.residual {
            sets.push(Self::row_set(UNEXPLAINED_SET, result, residual));
        }
        sets.push(Self::run_summary_set(result));

        debug!(run_id = %result.run_id, sets = sets.len(), "Report assembled");
        Report { sets }
    }

    fn measure_columns(result: &ReconciliationResult) -> Vec<String> {
        result
            .measure_fields
            .iter()
            .flat_map(|measure| {
                [
                    format!("{}_{}", measure, result.label_a),
                    format!("{}_{}", measure, result.label_b),
                    format!("{}_Diff", measure),
                ]
            })
            .collect()
    }

    fn measure_cells(measures: &[MeasureComparison]) -> impl Iterator<Item = Value> + '_ {
        measures.iter().flat_map(|cmp| {
            [
                Value::from(cmp.a.clone()),
                Value::from(cmp.b.clone()),
                Value::from(cmp.diff.clone()),
            ]
        })
    }

    fn row_set(name: &str, result: &ReconciliationResult, rows: &[ReconciledRow]) -> ResultSet {
        let mut columns = result.key_fields.clone();
        columns.push("Presence".to_string());
        columns.extend(Self::measure_columns(result));
        columns.push("Category".to_string());

        let mut set = ResultSet::new(name, columns);
        for row in rows {
            let mut cells: Vec<Value> = row.key.values().iter().map(KeyValue::to_value).collect();
            cells.push(Value::from(row.presence.as_str()));
            cells.extend(Self::measure_cells(&row.measures));
            cells.push(Value::from(row.category.to_string()));
            set.rows.push(cells);
        }
        set
    }

    fn summary_set(result: &ReconciliationResult) -> ResultSet {
        let mut columns = result.rollup_fields.clone();
        columns.extend(Self::measure_columns(result));
        columns.push("Rows".to_string());
        columns.push("Category".to_string());

        let mut set = ResultSet::new(SUMMARY_SET, columns);
        for row in &result.rollup {
            let mut cells: Vec<Value> = row.key.values().iter().map(KeyValue::to_value).collect();
            cells.extend(Self::measure_cells(&row.measures));
            cells.push(Value::from(row.member_rows));
            cells.push(Value::from(row.category.to_string()));
            set.rows.push(cells);
        }
        set
    }

    fn field_differences_set(result: &ReconciliationResult) -> ResultSet {
        let mut columns = result.key_fields.clone();
        columns.extend([
            "Field".to_string(),
            format!("{} Value", result.label_a),
            format!("{} Value", result.label_b),
            "Diff".to_string(),
        ]);

        let mut set = ResultSet::new(FIELD_DIFFERENCES_SET, columns);
        for difference in &result.field_differences {
            let mut cells: Vec<Value> = difference
                .key
                .values()
                .iter()
                .map(KeyValue::to_value)
                .collect();
            cells.push(Value::from(difference.measure.as_str()));
            cells.push(Value::from(difference.a.clone()));
            cells.push(Value::from(difference.b.clone()));
            cells.push(Value::from(difference.diff.clone()));
            set.rows.push(cells);
        }
        set
    }

    fn run_summary_set(result: &ReconciliationResult) -> ResultSet {
        let mut set = ResultSet::new(
            RUN_SUMMARY_SET,
            vec!["Metric".to_string(), "Value".to_string()],
        );
        let mut metric = |name: String, value: Value| set.rows.push(vec![Value::from(name), value]);

        metric("Run Id".to_string(), Value::from(result.run_id.to_string()));
        for report in [&result.normalization_a, &result.normalization_b] {
            metric(format!("{} Input Rows", report.label), Value::from(report.input_rows));
            metric(format!("{} Filtered Out", report.label), Value::from(report.filtered_out));
            metric(format!("{} Normalized", report.label), Value::from(report.normalized));
            metric(
                format!("{} Dropped", report.label),
                Value::from(report.failure_count()),
            );
        }
        metric("Keys".to_string(), Value::from(result.rows.len()));
        for (category, count) in result.category_counts() {
            metric(category.title(), Value::from(count));
        }
        if let Some(residual) = &result.residual {
            metric("Unexplained Exceptions".to_string(), Value::from(residual.len()));
        }
        set
    }
}
