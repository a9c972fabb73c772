//! Export Integration Tests
//!
//! Writes filtered table data to disk in both formats.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::{Value, json};

use dashboard_sync::infrastructure::export::{self, ExportFormat};
use dashboard_sync::{DecimalSettings, TableConfig};

fn fees() -> Vec<Value> {
    vec![
        json!({"name": "Clearing", "fee_type": "PER_SHARE", "rate": "0.25", "amount": "1234.5", "effective_date": "2024-03-01"}),
        json!({"name": "Listing", "fee_type": "FLAT", "rate": null, "amount": "25000", "effective_date": "2024-01-15"}),
        json!({"name": "Routing", "fee_type": "PER_SHARE", "rate": "0.1", "amount": "0", "effective_date": "2024-02-01"}),
    ]
}

#[test]
fn test_filtered_rows_written_as_csv() {
    let dir = tempfile::tempdir().unwrap();
    let mut table = TableConfig::fees(&DecimalSettings::default());
    table.filters.set("fee_type", Some("PER_SHARE".to_string()));

    let rows = fees();
    let visible: Vec<Value> = table.visible(&rows).into_iter().cloned().collect();
    let path = export::write_export(dir.path(), &table, &visible, ExportFormat::Csv).unwrap();

    assert_eq!(path.extension().unwrap(), "csv");
    assert!(
        path.file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("fees_")
    );

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Fee,Type,Rate,Amount,Effective",
            "Clearing,PER_SHARE,0.25%,\"1,234.50\",03/01/2024 00:00:00",
            "Routing,PER_SHARE,0.10%,0.00,02/01/2024 00:00:00",
        ]
    );
}

#[test]
fn test_xlsx_written_into_new_directory() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("exports").join("today");
    let table = TableConfig::fees(&DecimalSettings::default());

    let path = export::write_export(&target, &table, &fees(), ExportFormat::Xlsx).unwrap();

    assert!(path.starts_with(&target));
    assert_eq!(path.extension().unwrap(), "xlsx");
    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.len() > 100);
    assert_eq!(&bytes[..2], b"PK");
}

#[test]
fn test_instances_filter_independently() {
    let decimals = DecimalSettings::default();
    let mut flat = TableConfig::fees(&decimals);
    let all = TableConfig::fees(&decimals);
    flat.filters.set("fee_type", Some("FLAT".to_string()));

    let rows = fees();
    assert_eq!(flat.visible(&rows).len(), 1);
    assert_eq!(all.visible(&rows).len(), 3);

    let csv = String::from_utf8(export::to_csv(&all, &rows).unwrap()).unwrap();
    assert_eq!(csv.lines().count(), 4);
}
