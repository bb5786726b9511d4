//! Integration tests for feed-recon

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use feed_recon::{
    available_periods, logging, utils::StrictConfigValidator, Coercion, CompositeKey,
    DiffPolicy, ExceptionConfig, ExceptionEntry, FieldMapping, FilterPredicate, InvalidPolicy,
    KeyValue, MatchCategory, Presence, RawRecord, ReconError, ReconciliationConfig,
    ReconciliationEngine, ReportAssembler, SourceConfig, Value,
};
use std::str::FromStr;

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> KeyValue {
    KeyValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

/// Clearing-side feed: trade records tagged by record type
fn atlantis() -> SourceConfig {
    SourceConfig::new(
        "Atlantis",
        FieldMapping::new()
            .rename("TGIVF#", "CB")
            .rename("TEDATE", "Date")
            .rename("ACCT", "Account")
            .rename("TQTY", "Qty")
            .rename("TFEE", "Fee")
            .filter(FilterPredicate::equals("RecordType", "TP"))
            .coerce("Date", Coercion::date(["%Y-%m-%d"])),
    )
    .key_fields(["CB", "Date", "Account"])
    .measure_fields(["Qty", "Fee"])
}

/// Broker statement: different headers, US dates
fn gmi() -> SourceConfig {
    SourceConfig::new(
        "GMI",
        FieldMapping::new()
            .rename("CB Code", "CB")
            .rename("Trade Date", "Date")
            .rename("Account No", "Account")
            .rename("Quantity", "Qty")
            .rename("Commission", "Fee")
            .coerce("Date", Coercion::date(["%m/%d/%Y"])),
    )
    .key_fields(["CB", "Date", "Account"])
    .measure_fields(["Qty", "Fee"])
}

fn config() -> ReconciliationConfig {
    ReconciliationConfig::new(atlantis(), gmi())
        .diff_policy("Qty", DiffPolicy::Difference)
        .diff_policy("Fee", DiffPolicy::SignedSum)
}

fn a_row(cb: &str, date: &str, account: &str, qty: &str, fee: &str) -> RawRecord {
    RawRecord::new()
        .with("RecordType", "TP")
        .with("TGIVF#", cb)
        .with("TEDATE", date)
        .with("ACCT", account)
        .with("TQTY", qty)
        .with("TFEE", fee)
}

fn b_row(cb: &str, date: &str, account: &str, qty: &str, fee: &str) -> RawRecord {
    RawRecord::new()
        .with("CB Code", cb)
        .with("Trade Date", date)
        .with("Account No", account)
        .with("Quantity", qty)
        .with("Commission", fee)
}

fn key(cb: &str, account: &str) -> CompositeKey {
    CompositeKey::new(vec![KeyValue::from(cb), date(2025, 2, 1), KeyValue::from(account)])
}

#[test]
fn test_complete_monthly_reconciliation() {
    logging::init_test();
    let engine = ReconciliationEngine::new(config()).unwrap();

    let feed_a = vec![
        a_row("001", "2025-02-01", "A1", "100", "50"),
        a_row("001", "2025-02-01", "A1", "20", "10"),
        a_row("002", "2025-02-01", "A1", "90", "25"),
        a_row("003", "2025-02-01", "A1", "10", "5"),
        // Non-trade record types are filtered before anything else
        a_row("004", "2025-02-01", "A1", "999", "999").with("RecordType", "XX"),
    ];
    let feed_b = vec![
        b_row("001", "02/01/2025", "A1", "120", "(60.00)"),
        b_row("002", "02/01/2025", "A1", "100", "-25"),
        b_row("005", "02/01/2025", "A1", "1,000", "-7.50"),
    ];

    let result = engine.run(&feed_a, &feed_b).unwrap();

    assert_eq!(result.normalization_a.filtered_out, 1);
    assert_eq!(result.total_failures(), 0);
    assert_eq!(result.rows.len(), 4);

    // Two A rows fold into one key; signed-sum fee cancels the negative B fee
    let full = result.row(&key("001", "A1")).unwrap();
    assert_eq!(full.category, MatchCategory::FullMatch);
    assert_eq!(full.a_records, 2);
    assert_eq!(full.measures[0].a, dec("120"));

    // B quantity differs, fee agrees
    let fee_only = result.row(&key("002", "A1")).unwrap();
    assert_eq!(fee_only.measures[0].diff, dec("-10"));
    assert_eq!(
        fee_only.category,
        MatchCategory::PartialMatch {
            matched: vec!["Fee".to_string()]
        }
    );

    // A-only key: missing side is zero-filled
    let a_only = result.row(&key("003", "A1")).unwrap();
    assert_eq!(a_only.presence, Presence::OnlyA);
    assert_eq!(a_only.measures[0].diff, dec("10"));
    assert_eq!(a_only.measures[1].diff, dec("5"));
    assert_eq!(a_only.category, MatchCategory::NoMatch);

    let b_only = result.row(&key("005", "A1")).unwrap();
    assert_eq!(b_only.presence, Presence::OnlyB);
    assert_eq!(b_only.measures[0].b, dec("1000"));
    assert_eq!(b_only.measures[0].diff, dec("-1000"));
}

#[test]
fn test_quantity_match_only_scenario() {
    let engine = ReconciliationEngine::new(config()).unwrap();
    let feed_a = vec![a_row("001", "2025-02-01", "A1", "100", "50")];
    let feed_b = vec![b_row("001", "02/01/2025", "A1", "100", "-40")];

    let result = engine.run(&feed_a, &feed_b).unwrap();

    assert_eq!(result.rows[0].category.to_string(), "QtyMatchOnly");
    assert_eq!(result.rows[0].measures[1].diff, dec("10"));
}

#[test]
fn test_partitions_cover_every_row_once() {
    let engine = ReconciliationEngine::new(config()).unwrap();
    let feed_a = vec![
        a_row("001", "2025-02-01", "A1", "100", "50"),
        a_row("002", "2025-02-01", "A1", "100", "50"),
        a_row("003", "2025-02-01", "A1", "100", "50"),
        a_row("004", "2025-02-01", "A1", "100", "50"),
    ];
    let feed_b = vec![
        b_row("001", "02/01/2025", "A1", "100", "-50"),
        b_row("002", "02/01/2025", "A1", "100", "-45"),
        b_row("003", "02/01/2025", "A1", "90", "-50"),
        b_row("004", "02/01/2025", "A1", "90", "-45"),
    ];

    let result = engine.run(&feed_a, &feed_b).unwrap();

    let titles: Vec<String> = result.partitions.iter().map(|p| p.category.title()).collect();
    assert_eq!(
        titles,
        vec!["Full Match", "Qty Match Only", "Fee Match Only", "No Match"]
    );
    for partition in &result.partitions {
        assert_eq!(partition.rows.len(), 1);
    }
    let total: usize = result.category_counts().iter().map(|(_, n)| n).sum();
    assert_eq!(total, result.rows.len());
}

#[test]
fn test_result_independent_of_input_order() {
    let engine = ReconciliationEngine::new(config()).unwrap();
    let mut feed_a = vec![
        a_row("003", "2025-02-01", "A2", "7", "1.25"),
        a_row("001", "2025-02-01", "A1", "100", "50"),
        a_row("002", "2025-02-01", "A1", "12.5", "0.10"),
        a_row("001", "2025-02-01", "A1", "1", "0.333"),
    ];
    let mut feed_b = vec![
        b_row("002", "02/01/2025", "A1", "12.5", "-0.10"),
        b_row("001", "02/01/2025", "A1", "101", "-50.33"),
        b_row("009", "02/01/2025", "A9", "4", "-2"),
    ];

    let first = engine.run(&feed_a, &feed_b).unwrap();
    feed_a.reverse();
    feed_b.rotate_left(1);
    let second = engine.run(&feed_a, &feed_b).unwrap();

    assert_eq!(first.rows, second.rows);
    assert_eq!(first.partitions, second.partitions);
    assert_eq!(first.rollup, second.rollup);
    assert_ne!(first.run_id, second.run_id);
}

#[test]
fn test_exception_list_suppresses_known_breaks() {
    let config = config().exceptions(ExceptionConfig {
        mapping: FieldMapping::new()
            .rename("CB Code", "CB")
            .rename("Date", "Date")
            .coerce("Date", Coercion::date(["%Y-%m-%d"])),
        match_fields: vec!["CB".to_string(), "Date".to_string()],
    });
    let engine = ReconciliationEngine::new(config).unwrap();

    let feed_a = vec![
        a_row("001", "2025-02-01", "A1", "100", "50"),
        a_row("002", "2025-02-01", "A1", "10", "5"),
        a_row("003", "2025-02-01", "A1", "10", "5"),
    ];
    let feed_b = vec![b_row("001", "02/01/2025", "A1", "100", "-50")];
    let exceptions = vec![
        RawRecord::new()
            .with("CB Code", "002")
            .with("Date", "2025-02-01"),
        RawRecord::new().with("CB Code", "003").with("Date", "not a date"),
    ];

    let result = engine
        .run_with_exceptions(&feed_a, &feed_b, &exceptions)
        .unwrap();

    let residual = result.residual.as_ref().unwrap();
    assert_eq!(residual.len(), 1);
    assert_eq!(residual[0].key, key("003", "A1"));
    assert_eq!(
        result.exception_normalization.as_ref().unwrap().failure_count(),
        1
    );

    let report = ReportAssembler::assemble(&result);
    assert_eq!(report.get("Unexplained Exceptions").unwrap().len(), 1);
}

#[test]
fn test_prepared_exception_entries() {
    let config = config().exceptions(ExceptionConfig {
        mapping: FieldMapping::new().keep("CB"),
        match_fields: vec!["CB".to_string()],
    });
    let engine = ReconciliationEngine::new(config).unwrap();

    let feed_a = vec![a_row("002", "2025-02-01", "A1", "10", "5")];
    let entries = vec![ExceptionEntry::new().with("CB", "002")];

    let result = engine
        .run_with_exception_entries(&feed_a, &[], &entries)
        .unwrap();

    assert_eq!(result.residual, Some(Vec::new()));
    assert!(result.exception_normalization.is_none());
}

#[test]
fn test_exception_keys_inherit_source_coercion() {
    let config = config().exceptions(ExceptionConfig {
        mapping: FieldMapping::new().keep("CB").keep("Date"),
        match_fields: vec!["CB".to_string(), "Date".to_string()],
    });
    let engine = ReconciliationEngine::new(config).unwrap();
    let feed_a = vec![a_row("001", "2025-02-01", "A1", "10", "5")];

    let raw = vec![RawRecord::new().with("CB", "001").with("Date", "2025-02-01")];
    let result = engine.run_with_exceptions(&feed_a, &[], &raw).unwrap();
    assert_eq!(result.residual, Some(Vec::new()));

    let entries = vec![ExceptionEntry::new().with("CB", "001").with("Date", "2025-02-01")];
    let result = engine
        .run_with_exception_entries(&feed_a, &[], &entries)
        .unwrap();
    assert_eq!(result.residual, Some(Vec::new()));
}

#[test]
fn test_mismatched_key_coercions_rejected() {
    let mut config = config();
    config.source_b.mapping.coercions.shift_remove("Date");

    assert!(matches!(
        ReconciliationEngine::new(config),
        Err(ReconError::Configuration(_))
    ));
}

#[test]
fn test_exceptions_without_configuration_fail() {
    let engine = ReconciliationEngine::new(config()).unwrap();
    let err = engine
        .run_with_exceptions(&[], &[], &[RawRecord::new().with("CB Code", "001")])
        .unwrap_err();
    assert!(matches!(err, ReconError::Configuration(_)));
}

#[test]
fn test_unparseable_keys_are_counted_not_fatal() {
    let engine = ReconciliationEngine::new(config()).unwrap();
    let feed_a = vec![
        a_row("001", "2025-02-01", "A1", "100", "50"),
        a_row("002", "Feb 1st", "A1", "100", "50"),
        RawRecord::new()
            .with("RecordType", "TP")
            .with("TGIVF#", "003")
            .with("TQTY", "1"),
    ];

    let result = engine.run(&feed_a, &[]).unwrap();

    assert_eq!(result.normalization_a.failure_count(), 2);
    assert_eq!(result.normalization_a.normalized, 1);
    assert_eq!(result.rows.len(), 1);
}

#[test]
fn test_everything_dropped_is_distinguishable() {
    let engine = ReconciliationEngine::new(config()).unwrap();
    let feed_a = vec![a_row("001", "garbage", "A1", "1", "1")];
    let feed_b = vec![b_row("001", "garbage", "A1", "1", "-1")];

    let result = engine.run(&feed_a, &feed_b).unwrap();

    assert!(result.rows.is_empty());
    assert!(result.normalization_a.dropped_everything());
    assert!(result.normalization_b.dropped_everything());
}

#[test]
fn test_reject_policy_raises_aggregation_inconsistency() {
    let mut config = config();
    config.source_a.mapping = config
        .source_a
        .mapping
        .clone()
        .coerce("Qty", Coercion::strict_number());
    let engine = ReconciliationEngine::new(config).unwrap();

    let feed_a = vec![a_row("001", "2025-02-01", "A1", "lots", "5")];
    let err = engine.run(&feed_a, &[]).unwrap_err();

    match err {
        ReconError::AggregationInconsistency {
            feed, attribute, ..
        } => {
            assert_eq!(feed, "Atlantis");
            assert_eq!(attribute, "Qty");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(Coercion::strict_number().invalid_policy(), InvalidPolicy::Reject);
}

#[test]
fn test_invalid_measure_defaults_to_null() {
    let engine = ReconciliationEngine::new(config()).unwrap();
    let feed_a = vec![
        a_row("001", "2025-02-01", "A1", "n/a", "5"),
        a_row("001", "2025-02-01", "A1", "3", "5"),
    ];

    let result = engine.run(&feed_a, &[]).unwrap();

    assert_eq!(result.rows[0].measures[0].a, dec("3"));
    assert_eq!(result.rows[0].measures[1].a, dec("10"));
}

#[test]
fn test_rollup_consistent_with_detail() {
    let engine = ReconciliationEngine::new(config()).unwrap();
    let feed_a = vec![
        a_row("001", "2025-02-01", "A1", "100", "50"),
        a_row("001", "2025-02-02", "A2", "20", "10"),
        a_row("002", "2025-02-01", "A1", "5", "1.5"),
    ];
    let feed_b = vec![
        b_row("001", "02/01/2025", "A1", "90", "-50"),
        b_row("001", "02/02/2025", "A2", "30", "-10"),
        b_row("003", "02/03/2025", "A3", "1", "-1"),
    ];

    let result = engine.run(&feed_a, &feed_b).unwrap();

    assert_eq!(result.rollup_fields, vec!["CB".to_string()]);
    assert_eq!(result.rollup.len(), 3);
    for measure in 0..2 {
        let detail: BigDecimal = result.rows.iter().map(|r| &r.measures[measure].a).sum();
        let rolled: BigDecimal = result.rollup.iter().map(|r| &r.measures[measure].a).sum();
        assert_eq!(detail, rolled);
    }
    // Offsetting quantity breaks on CB 001 cancel at the summary level
    assert_eq!(result.rollup[0].category, MatchCategory::FullMatch);
    assert_eq!(result.rollup[0].member_rows, 2);
}

#[test]
fn test_tolerance_and_precision() {
    let engine = ReconciliationEngine::new(config().tolerance(dec("0.01"))).unwrap();
    let feed_a = vec![a_row("001", "2025-02-01", "A1", "100", "50.004")];
    let feed_b = vec![b_row("001", "02/01/2025", "A1", "100", "-49.99")];

    let result = engine.run(&feed_a, &feed_b).unwrap();

    // 50.004 - 49.99 = 0.014, rounds to 0.01 which is within tolerance
    assert_eq!(result.rows[0].measures[1].diff, dec("0.01"));
    assert_eq!(result.rows[0].category, MatchCategory::FullMatch);
}

#[test]
fn test_period_filter_and_discovery() {
    let records = vec![
        a_row("001", "2025-01-31", "A1", "1", "1"),
        a_row("001", "2025-02-01", "A1", "2", "2"),
        a_row("001", "2025-02-15", "A1", "4", "4"),
        a_row("001", "", "A1", "8", "8"),
    ];
    assert_eq!(
        available_periods(&records, "TEDATE"),
        vec!["2025-01".to_string(), "2025-02".to_string()]
    );

    let mut source = atlantis();
    source.mapping = source.mapping.clone().filter(
        FilterPredicate::equals("RecordType", "TP").and(FilterPredicate::period("TEDATE", "2025-02")),
    );
    let config = ReconciliationConfig::new(source, gmi())
        .diff_policy("Qty", DiffPolicy::Difference)
        .diff_policy("Fee", DiffPolicy::SignedSum);
    let engine = ReconciliationEngine::new(config).unwrap();

    let result = engine.run(&records, &[]).unwrap();

    assert_eq!(result.normalization_a.filtered_out, 2);
    assert_eq!(result.rows.len(), 2);
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "source_a": {
            "label": "Atlantis",
            "mapping": {
                "rename": {"PRODUCT": "SYM", "TFC": "SYM", "TGIVF#": "CB", "TQTY": "Qty"},
                "filter": {"op": "equals", "field": "RecordType", "value": "TP"}
            },
            "key_fields": ["CB", "SYM"],
            "measure_fields": ["Qty"]
        },
        "source_b": {
            "label": "GMI",
            "mapping": {"rename": {"CB": "CB", "Symbol": "SYM", "Qty": "Qty"}},
            "key_fields": ["CB", "SYM"],
            "measure_fields": ["Qty"]
        },
        "diff_policies": {"Qty": "a_minus_b"}
    }"#;

    let config = ReconciliationConfig::from_json_str(json).unwrap();
    assert_eq!(config.precision, 2);
    let engine = ReconciliationEngine::new(config).unwrap();

    let feed_a = vec![RawRecord::new()
        .with("RecordType", "TP")
        .with("TGIVF#", "001")
        .with("PRODUCT", "")
        .with("TFC", "ES")
        .with("TQTY", "5")];
    let feed_b = vec![RawRecord::new()
        .with("CB", "001")
        .with("Symbol", "ES")
        .with("Qty", 5)];

    let result = engine.run(&feed_a, &feed_b).unwrap();

    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].key.values()[1], KeyValue::from("ES"));
    assert!(result.rows[0].category.is_full_match());
}

#[test]
fn test_config_with_unknown_policy_fails() {
    let json = r#"{
        "source_a": {"label": "A", "mapping": {"rename": {"k": "k", "q": "q"}},
                     "key_fields": ["k"], "measure_fields": ["q"]},
        "source_b": {"label": "B", "mapping": {"rename": {"k": "k", "q": "q"}},
                     "key_fields": ["k"], "measure_fields": ["q"]},
        "diff_policies": {"q": "ratio"}
    }"#;

    let err = ReconciliationConfig::from_json_str(json).unwrap_err();
    assert!(matches!(err, ReconError::Configuration(_)));
}

#[test]
fn test_missing_policy_rejected_before_any_record() {
    let config = ReconciliationConfig::new(atlantis(), gmi()).diff_policy("Qty", DiffPolicy::Difference);
    assert!(matches!(
        ReconciliationEngine::new(config),
        Err(ReconError::Configuration(_))
    ));
}

#[test]
fn test_strict_validator() {
    let engine = ReconciliationEngine::with_validator(config(), &StrictConfigValidator);
    assert!(engine.is_ok());

    let mut clashing = config();
    clashing.source_b.label = "Atlantis".to_string();
    assert!(ReconciliationEngine::with_validator(clashing, &StrictConfigValidator).is_err());
}

#[test]
fn test_report_reflects_run() {
    let engine = ReconciliationEngine::new(config()).unwrap();
    let feed_a = vec![a_row("001", "2025-02-01", "A1", "100", "50")];
    let feed_b = vec![b_row("001", "02/01/2025", "A1", "90", "-50")];

    let result = engine.run(&feed_a, &feed_b).unwrap();
    let report = ReportAssembler::assemble(&result);

    let fee_only = report.get("Fee Match Only").unwrap();
    assert_eq!(fee_only.len(), 1);
    assert_eq!(
        fee_only.cell(0, "Date"),
        Some(&Value::Date(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()))
    );
    assert_eq!(fee_only.cell(0, "Qty_Diff"), Some(&Value::from(dec("10"))));

    let summary = report.get("Summary").unwrap();
    assert_eq!(summary.columns[0], "CB");
    assert_eq!(summary.len(), 1);
}

#[test]
fn test_result_serializes() {
    let engine = ReconciliationEngine::new(config()).unwrap();
    let feed_a = vec![a_row("001", "2025-02-01", "A1", "100", "50")];

    let result = engine.run(&feed_a, &[]).unwrap();
    let json = serde_json::to_string(&result).unwrap();

    assert!(json.contains("\"run_id\""));
    assert!(json.contains("\"Atlantis\""));
}

#[test]
fn test_parallel_runs_share_engine() {
    let engine = ReconciliationEngine::new(config()).unwrap();

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (1..=4)
            .map(|n| {
                let engine = &engine;
                scope.spawn(move || {
                    let qty = n.to_string();
                    let feed_a = vec![a_row("001", "2025-02-01", "A1", &qty, "1")];
                    let feed_b = vec![b_row("001", "02/01/2025", "A1", &qty, "-1")];
                    engine.run(&feed_a, &feed_b).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.len(), 4);
    for result in results {
        assert!(result.rows[0].category.is_full_match());
    }
}
