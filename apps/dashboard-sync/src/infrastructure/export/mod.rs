//! Table Export
//!
//! Writes an already-filtered dataset to CSV or XLSX using a table's column
//! definitions: one header row, then one row per record with cells rendered
//! per column format. Numeric columns are written as numbers in XLSX so the
//! spreadsheet keeps them sortable.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Format, Workbook, XlsxError};

use crate::domain::filter::Record;
use crate::domain::table::{CellValue, ColumnFormat, TableConfig};

/// Rows per worksheet, header included.
pub const XLSX_MAX_ROWS: usize = 1_048_576;

/// Columns per worksheet.
pub const XLSX_MAX_COLUMNS: usize = 16_384;

/// Export errors.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// CSV serialization failed.
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    /// XLSX generation failed.
    #[error("XLSX export failed: {0}")]
    Xlsx(#[from] XlsxError),

    /// Writing the file failed.
    #[error("failed to write export file: {0}")]
    Io(#[from] std::io::Error),

    /// Too many rows or columns for the target format.
    #[error("dataset too large for {format}: {reason}")]
    TooLarge {
        /// Target format.
        format: ExportFormat,
        /// Limit exceeded.
        reason: String,
    },
}

/// Export file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    /// Comma-separated values.
    Csv,
    /// Excel workbook.
    Xlsx,
}

impl ExportFormat {
    /// File extension without the dot.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// =============================================================================
// Encoders
// =============================================================================

/// Render rows to CSV bytes.
///
/// # Errors
///
/// Returns an error if the CSV writer fails.
pub fn to_csv<R: Record>(config: &TableConfig, rows: &[R]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(config.headers())?;
    for row in rows {
        writer.write_record(config.render_row(row))?;
    }
    writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))
}

/// Render rows to an XLSX workbook with a single sheet.
///
/// # Errors
///
/// Returns an error if the dataset exceeds sheet limits or the workbook
/// cannot be generated.
pub fn to_xlsx<R: Record>(config: &TableConfig, rows: &[R]) -> Result<Vec<u8>, ExportError> {
    let too_large = |reason: String| ExportError::TooLarge {
        format: ExportFormat::Xlsx,
        reason,
    };

    if config.columns.len() > XLSX_MAX_COLUMNS {
        return Err(too_large(format!(
            "{} columns exceed the sheet limit of {XLSX_MAX_COLUMNS}",
            config.columns.len()
        )));
    }
    if rows.len() >= XLSX_MAX_ROWS {
        return Err(too_large(format!(
            "{} rows exceed the sheet limit of {}",
            rows.len(),
            XLSX_MAX_ROWS - 1
        )));
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name(config))?;

    let header = Format::new().set_bold();
    for (col, title) in config.headers().enumerate() {
        let col = u16::try_from(col).map_err(|_| too_large(format!("{col} columns")))?;
        sheet.write_string_with_format(0, col, title, &header)?;
    }

    let number_formats: Vec<Option<Format>> = config
        .columns
        .iter()
        .map(|column| number_format_for(column.format))
        .collect();

    for (index, row) in rows.iter().enumerate() {
        let line = u32::try_from(index + 1).map_err(|_| too_large(format!("{index} rows")))?;
        for (col, column) in config.columns.iter().enumerate() {
            let col = u16::try_from(col).map_err(|_| too_large(format!("{col} columns")))?;
            match (&number_formats[usize::from(col)], column.cell(row)) {
                (_, CellValue::Empty) => {}
                (Some(format), CellValue::Number(value)) => {
                    let value = spreadsheet_value(column.format, value);
                    sheet.write_number_with_format(line, col, value, format)?;
                }
                _ => {
                    sheet.write_string(line, col, column.render(row))?;
                }
            }
        }
    }

    sheet.autofit();
    Ok(workbook.save_to_buffer()?)
}

fn sheet_name(config: &TableConfig) -> &'static str {
    config.kind.as_str()
}

fn number_format_for(format: ColumnFormat) -> Option<Format> {
    let decimals = |n: u32| {
        if n == 0 {
            String::new()
        } else {
            format!(".{}", "0".repeat(n as usize))
        }
    };

    match format {
        ColumnFormat::Number { decimals: n } => {
            Some(Format::new().set_num_format(format!("#,##0{}", decimals(n))))
        }
        ColumnFormat::Percent { decimals: n } => {
            Some(Format::new().set_num_format(format!("0{}%", decimals(n))))
        }
        ColumnFormat::Text | ColumnFormat::DateTime => None,
    }
}

// Percent columns carry whole percentages; spreadsheets expect fractions.
fn spreadsheet_value(format: ColumnFormat, value: Decimal) -> f64 {
    let value = match format {
        ColumnFormat::Percent { .. } => value / Decimal::ONE_HUNDRED,
        _ => value,
    };
    value.to_f64().unwrap_or_default()
}

// =============================================================================
// Files
// =============================================================================

/// File name for an export taken at `at`, e.g. `orders_20240105_143000.csv`.
#[must_use]
pub fn file_name(config: &TableConfig, format: ExportFormat, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}.{}",
        config.kind.as_str(),
        at.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Encode rows and write them into `dir`, returning the written path.
///
/// # Errors
///
/// Returns an error if encoding or writing fails.
pub fn write_export<R: Record>(
    dir: &Path,
    config: &TableConfig,
    rows: &[R],
    format: ExportFormat,
) -> Result<PathBuf, ExportError> {
    let bytes = match format {
        ExportFormat::Csv => to_csv(config, rows)?,
        ExportFormat::Xlsx => to_xlsx(config, rows)?,
    };

    std::fs::create_dir_all(dir)?;
    let path = dir.join(file_name(config, format, Utc::now()));
    std::fs::write(&path, &bytes)?;

    tracing::info!(
        table = config.kind.as_str(),
        rows = rows.len(),
        bytes = bytes.len(),
        path = %path.display(),
        "Exported table"
    );
    Ok(path)
}

// =============================================================================
// Tests
// =============================================================================
