//! Monthly clearing-fee reconciliation between a clearing system export and a
//! broker statement

use feed_recon::{
    available_periods, logging, report::ResultSet, Coercion, DiffPolicy, ExceptionConfig,
    FieldMapping, FilterPredicate, RawRecord, ReconciliationConfig, ReconciliationEngine,
    ReportAssembler, SourceConfig,
};

fn atlantis_feed() -> Vec<RawRecord> {
    let rows = [
        ("TP", "001", "ES", "2025-01-30", "ACC1", "5", "12.50"),
        ("TP", "001", "ES", "2025-02-03", "ACC1", "100", "50.00"),
        ("TP", "001", "ES", "2025-02-03", "ACC1", "20", "10.00"),
        ("TP", "002", "NQ", "2025-02-04", "ACC2", "90", "25.00"),
        ("TP", "003", "CL", "2025-02-05", "ACC1", "10", "5.00"),
        ("TP", "004", "GC", "2025-02-06", "ACC3", "7", "3.50"),
        ("XX", "001", "ES", "2025-02-03", "ACC1", "999", "999"),
    ];
    rows.iter()
        .map(|(kind, cb, sym, date, acct, qty, fee)| {
            RawRecord::new()
                .with("RecordType", *kind)
                .with("TGIVF#", *cb)
                .with("PRODUCT", *sym)
                .with("TEDATE", *date)
                .with("ACCT", *acct)
                .with("TQTY", *qty)
                .with("TFEE", *fee)
        })
        .collect()
}

fn gmi_feed() -> Vec<RawRecord> {
    let rows = [
        ("001", "02/03/2025", "ACC1", "120", "(60.00)"),
        ("002", "02/04/2025", "ACC2", "100", "(25.00)"),
        ("004", "02/06/2025", "ACC3", "7", "(3.00)"),
        ("005", "02/07/2025", "ACC9", "1,000", "(450.00)"),
    ];
    rows.iter()
        .map(|(cb, date, acct, qty, fee)| {
            RawRecord::new()
                .with("CB", *cb)
                .with("Trade Date", *date)
                .with("Account", *acct)
                .with("Qty", *qty)
                .with("Fee", *fee)
        })
        .collect()
}

fn known_exceptions() -> Vec<RawRecord> {
    vec![RawRecord::new().with("CB", "005").with("Note", "Give-up pending")]
}

fn print_set(set: &ResultSet) {
    println!("== {} ({} rows)", set.name, set.len());
    println!("   {}", set.columns.join(" | "));
    for row in &set.rows {
        let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
        println!("   {}", cells.join(" | "));
    }
    println!();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let feed_a = atlantis_feed();
    let feed_b = gmi_feed();

    let periods = available_periods(&feed_a, "TEDATE");
    println!("Periods in clearing export: {}", periods.join(", "));
    let period = periods.last().cloned().unwrap_or_default();
    println!("Reconciling {}\n", period);

    let atlantis = SourceConfig::new(
        "Atlantis",
        FieldMapping::new()
            .rename("TGIVF#", "CB")
            .rename("TEDATE", "Date")
            .rename("ACCT", "Account")
            .rename("TQTY", "Qty")
            .rename("TFEE", "Fee")
            .filter(
                FilterPredicate::equals("RecordType", "TP")
                    .and(FilterPredicate::period("TEDATE", period.as_str())),
            )
            .coerce("Date", Coercion::date(["%Y-%m-%d"])),
    )
    .key_fields(["CB", "Date", "Account"])
    .measure_fields(["Qty", "Fee"]);

    let gmi = SourceConfig::new(
        "GMI",
        FieldMapping::new()
            .keep("CB")
            .rename("Trade Date", "Date")
            .keep("Account")
            .keep("Qty")
            .keep("Fee")
            .coerce("Date", Coercion::date(["%m/%d/%Y"])),
    )
    .key_fields(["CB", "Date", "Account"])
    .measure_fields(["Qty", "Fee"]);

    // The broker reports fees as negatives, so matching fees sum to zero
    let config = ReconciliationConfig::new(atlantis, gmi)
        .diff_policy("Qty", DiffPolicy::Difference)
        .diff_policy("Fee", DiffPolicy::SignedSum)
        .exceptions(ExceptionConfig {
            mapping: FieldMapping::new().keep("CB"),
            match_fields: vec!["CB".to_string()],
        });

    let engine = ReconciliationEngine::new(config)?;
    let result = engine.run_with_exceptions(&feed_a, &feed_b, &known_exceptions())?;

    let report = ReportAssembler::assemble(&result);
    for set in &report.sets {
        print_set(set);
    }

    Ok(())
}
