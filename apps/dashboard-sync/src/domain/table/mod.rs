//! Table Configuration
//!
//! Column and filter definitions for each dashboard table. Every factory
//! call builds a fresh [`TableConfig`], so two instances of the same table
//! never share filter selections.

use rust_decimal::Decimal;

use super::filter::{FilterSet, Record};
use super::format::{
    DecimalSettings, format_timestamp_str, number_format, parse_number, percent_format,
};

// =============================================================================
// Columns
// =============================================================================

/// How a column's raw value is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnFormat {
    /// Raw text.
    Text,
    /// Grouped number with fixed decimal places.
    Number {
        /// Decimal places.
        decimals: u32,
    },
    /// Percentage with fixed decimal places.
    Percent {
        /// Decimal places.
        decimals: u32,
    },
    /// Timestamp in the display date-time format.
    DateTime,
}

/// A typed cell value extracted from a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    /// Field absent or null.
    Empty,
    /// Text (including values that failed numeric/date parsing).
    Text(String),
    /// Numeric value.
    Number(Decimal),
}

/// A single column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Field name in the row.
    pub key: String,
    /// Column header.
    pub header: String,
    /// Render format.
    pub format: ColumnFormat,
}

impl ColumnDef {
    /// Text column.
    #[must_use]
    pub fn text(key: &str, header: &str) -> Self {
        Self::new(key, header, ColumnFormat::Text)
    }

    /// Number column.
    #[must_use]
    pub fn number(key: &str, header: &str, decimals: u32) -> Self {
        Self::new(key, header, ColumnFormat::Number { decimals })
    }

    /// Percentage column.
    #[must_use]
    pub fn percent(key: &str, header: &str, decimals: u32) -> Self {
        Self::new(key, header, ColumnFormat::Percent { decimals })
    }

    /// Date-time column.
    #[must_use]
    pub fn date_time(key: &str, header: &str) -> Self {
        Self::new(key, header, ColumnFormat::DateTime)
    }

    fn new(key: &str, header: &str, format: ColumnFormat) -> Self {
        Self {
            key: key.to_string(),
            header: header.to_string(),
            format,
        }
    }

    /// Extract the typed cell value for a row.
    pub fn cell<R: Record + ?Sized>(&self, row: &R) -> CellValue {
        let Some(raw) = row.field(&self.key) else {
            return CellValue::Empty;
        };

        match self.format {
            ColumnFormat::Number { .. } | ColumnFormat::Percent { .. } => parse_number(&raw)
                .map_or_else(|_| CellValue::Text(raw.into_owned()), CellValue::Number),
            ColumnFormat::Text | ColumnFormat::DateTime => CellValue::Text(raw.into_owned()),
        }
    }

    /// Render the display text for a row.
    ///
    /// Values that cannot be parsed for the column's format are shown as-is.
    pub fn render<R: Record + ?Sized>(&self, row: &R) -> String {
        match (self.format, self.cell(row)) {
            (_, CellValue::Empty) => String::new(),
            (ColumnFormat::Number { decimals }, CellValue::Number(value)) => {
                number_format(value, decimals)
            }
            (ColumnFormat::Percent { decimals }, CellValue::Number(value)) => {
                percent_format(value, decimals)
            }
            (ColumnFormat::DateTime, CellValue::Text(text)) => {
                format_timestamp_str(&text).unwrap_or(text)
            }
            (_, CellValue::Text(text)) => text,
            (_, CellValue::Number(value)) => value.to_string(),
        }
    }
}

// =============================================================================
// Table Config
// =============================================================================

/// Which dashboard table a configuration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// Listed symbols.
    Symbols,
    /// Reported orders.
    Orders,
    /// Best bid and offer quotes.
    Bbo,
    /// Last-sale reports.
    LastSale,
    /// Member firms.
    Firms,
    /// Firm bank accounts.
    BankAccounts,
    /// Fee schedules.
    Fees,
}

impl TableKind {
    /// Short name used in logs and export file names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Symbols => "symbols",
            Self::Orders => "orders",
            Self::Bbo => "bbo",
            Self::LastSale => "last_sale",
            Self::Firms => "firms",
            Self::BankAccounts => "bank_accounts",
            Self::Fees => "fees",
        }
    }
}

/// Per-instance table definition: columns plus the instance's own filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Table kind.
    pub kind: TableKind,
    /// Columns in display order.
    pub columns: Vec<ColumnDef>,
    /// Filter selections owned by this instance.
    pub filters: FilterSet,
}

impl TableConfig {
    /// Build the configuration for a table kind.
    #[must_use]
    pub fn for_kind(kind: TableKind, decimals: &DecimalSettings) -> Self {
        match kind {
            TableKind::Symbols => Self::symbols(decimals),
            TableKind::Orders => Self::orders(decimals),
            TableKind::Bbo => Self::bbo(decimals),
            TableKind::LastSale => Self::last_sale(decimals),
            TableKind::Firms => Self::firms(),
            TableKind::BankAccounts => Self::bank_accounts(),
            TableKind::Fees => Self::fees(decimals),
        }
    }

    /// Symbols table.
    #[must_use]
    pub fn symbols(decimals: &DecimalSettings) -> Self {
        Self {
            kind: TableKind::Symbols,
            columns: vec![
                ColumnDef::text("symbol", "Symbol"),
                ColumnDef::text("security_desc", "Security Description"),
                ColumnDef::text("cusip", "CUSIP"),
                ColumnDef::number("fractional_lot_size", "Fractional Lot Size", decimals.quantity),
                ColumnDef::text("status", "Status"),
                ColumnDef::date_time("updated_at", "Updated"),
            ],
            filters: FilterSet::for_fields(["symbol", "status"]),
        }
    }

    /// Orders table.
    #[must_use]
    pub fn orders(decimals: &DecimalSettings) -> Self {
        Self {
            kind: TableKind::Orders,
            columns: vec![
                ColumnDef::text("order_id", "Order ID"),
                ColumnDef::text("symbol", "Symbol"),
                ColumnDef::text("side", "Side"),
                ColumnDef::number("quantity", "Quantity", decimals.quantity),
                ColumnDef::number("price", "Price", decimals.price),
                ColumnDef::text("mpid", "MPID"),
                ColumnDef::text("status", "Status"),
                ColumnDef::date_time("timestamp", "Time"),
            ],
            filters: FilterSet::for_fields(["symbol", "side", "mpid", "status"]),
        }
    }

    /// BBO quotes table.
    #[must_use]
    pub fn bbo(decimals: &DecimalSettings) -> Self {
        Self {
            kind: TableKind::Bbo,
            columns: vec![
                ColumnDef::text("symbol", "Symbol"),
                ColumnDef::number("bid_quantity", "Bid Size", decimals.quantity),
                ColumnDef::number("bid_price", "Bid", decimals.price),
                ColumnDef::number("offer_price", "Offer", decimals.price),
                ColumnDef::number("offer_quantity", "Offer Size", decimals.quantity),
                ColumnDef::text("mpid", "MPID"),
                ColumnDef::date_time("timestamp", "Time"),
            ],
            filters: FilterSet::for_fields(["symbol", "mpid"]),
        }
    }

    /// Last-sale reports table.
    #[must_use]
    pub fn last_sale(decimals: &DecimalSettings) -> Self {
        Self {
            kind: TableKind::LastSale,
            columns: vec![
                ColumnDef::text("uti", "UTI"),
                ColumnDef::text("symbol", "Symbol"),
                ColumnDef::number("price", "Price", decimals.price),
                ColumnDef::number("quantity", "Quantity", decimals.quantity),
                ColumnDef::text("mpid", "MPID"),
                ColumnDef::date_time("timestamp", "Time"),
            ],
            filters: FilterSet::for_fields(["symbol", "mpid"]),
        }
    }

    /// Firms table.
    #[must_use]
    pub fn firms() -> Self {
        Self {
            kind: TableKind::Firms,
            columns: vec![
                ColumnDef::text("name", "Name"),
                ColumnDef::text("mpid", "MPID"),
                ColumnDef::text("firm_type", "Type"),
                ColumnDef::text("status", "Status"),
            ],
            filters: FilterSet::for_fields(["firm_type", "status"]),
        }
    }

    /// Bank accounts table.
    #[must_use]
    pub fn bank_accounts() -> Self {
        Self {
            kind: TableKind::BankAccounts,
            columns: vec![
                ColumnDef::text("firm", "Firm"),
                ColumnDef::text("bank_name", "Bank"),
                ColumnDef::text("account_number", "Account"),
                ColumnDef::text("status", "Status"),
            ],
            filters: FilterSet::for_fields(["firm", "status"]),
        }
    }

    /// Fee schedules table.
    #[must_use]
    pub fn fees(decimals: &DecimalSettings) -> Self {
        Self {
            kind: TableKind::Fees,
            columns: vec![
                ColumnDef::text("name", "Fee"),
                ColumnDef::text("fee_type", "Type"),
                ColumnDef::percent("rate", "Rate", decimals.percent),
                ColumnDef::number("amount", "Amount", decimals.price),
                ColumnDef::date_time("effective_date", "Effective"),
            ],
            filters: FilterSet::for_fields(["fee_type"]),
        }
    }

    /// Column headers in display order.
    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.header.as_str())
    }

    /// Render one row to display strings.
    pub fn render_row<R: Record + ?Sized>(&self, row: &R) -> Vec<String> {
        self.columns.iter().map(|c| c.render(row)).collect()
    }

    /// Apply this instance's filters and return the visible rows.
    pub fn visible<'a, R: Record>(&self, rows: &'a [R]) -> Vec<&'a R> {
        self.filters.apply(rows)
    }
}

// =============================================================================
// Tests
// =============================================================================
