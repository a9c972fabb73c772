//! Display Formatting
//!
//! Pure conversions used by table cells, chart labels and exports:
//!
//! - Numbers with fixed decimal places and thousands grouping
//! - Dates and timestamps in the dashboard's fixed display format
//! - Decimal precision derived from a symbol's fractional lot size
//!
//! All arithmetic is done on `rust_decimal::Decimal` so that prices never
//! pick up binary floating point artifacts on their way to the screen.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

/// Display format for timestamps (`MM/DD/YYYY HH:MM:SS`).
pub const DATE_TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Display format for calendar dates (`MM/DD/YYYY`).
pub const DATE_FORMAT: &str = "%m/%d/%Y";

/// Largest scale a `Decimal` can represent.
const MAX_DECIMALS: u32 = 28;

/// Input layouts accepted for naive (zone-less) timestamps.
const NAIVE_INPUT_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

// =============================================================================
// Errors
// =============================================================================

/// Errors from parsing or deriving display values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// Lot size was zero or negative.
    #[error("lot size must be positive, got {0}")]
    NonPositiveLotSize(Decimal),

    /// Text could not be read as a number.
    #[error("not a number: {0}")]
    InvalidNumber(String),

    /// Floating point value has no decimal representation (NaN, infinity).
    #[error("value is not finite")]
    NotFinite,

    /// Text could not be read as a date or timestamp.
    #[error("unrecognized date/time: {0}")]
    InvalidDate(String),
}

// =============================================================================
// Decimal Settings
// =============================================================================

/// Decimal places used across the dashboard, read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalSettings {
    /// Decimal places for prices.
    pub price: u32,
    /// Decimal places for quantities.
    pub quantity: u32,
    /// Decimal places for percentages and rates.
    pub percent: u32,
}

impl Default for DecimalSettings {
    fn default() -> Self {
        Self {
            price: 2,
            quantity: 0,
            percent: 2,
        }
    }
}

// =============================================================================
// Number Formatting
// =============================================================================

/// Number formatting options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    /// Digits after the decimal separator (always padded).
    pub decimals: u32,
    /// Character inserted between groups of three integer digits.
    pub thousands_separator: Option<char>,
    /// Character between the integer and fractional parts.
    pub decimal_separator: char,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self::new(2)
    }
}

impl NumberFormat {
    /// Comma-grouped format with the given decimal places.
    #[must_use]
    pub const fn new(decimals: u32) -> Self {
        Self {
            decimals,
            thousands_separator: Some(','),
            decimal_separator: '.',
        }
    }

    /// Disable thousands grouping.
    #[must_use]
    pub const fn without_grouping(mut self) -> Self {
        self.thousands_separator = None;
        self
    }

    /// Use custom separators (e.g. `'.'` and `','` for European display).
    #[must_use]
    pub const fn with_separators(mut self, thousands: Option<char>, decimal: char) -> Self {
        self.thousands_separator = thousands;
        self.decimal_separator = decimal;
        self
    }

    /// Format a decimal value.
    ///
    /// Rounds half away from zero, pads to exactly `decimals` fractional
    /// digits, and never renders a negative zero.
    #[must_use]
    pub fn format(&self, value: Decimal) -> String {
        let decimals = self.decimals.min(MAX_DECIMALS);
        let mut rounded =
            value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(decimals);

        let negative = rounded.is_sign_negative() && !rounded.is_zero();
        let digits = rounded.abs().to_string();
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((int_part, frac_part)) => (int_part, Some(frac_part)),
            None => (digits.as_str(), None),
        };

        let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
        if negative {
            out.push('-');
        }
        push_grouped(&mut out, int_part, self.thousands_separator);
        if decimals > 0 {
            // Large magnitudes cannot carry every requested digit in the mantissa.
            let frac_part = frac_part.unwrap_or_default();
            out.push(self.decimal_separator);
            out.push_str(frac_part);
            for _ in frac_part.len()..decimals as usize {
                out.push('0');
            }
        }
        out
    }
}

fn push_grouped(out: &mut String, int_part: &str, separator: Option<char>) {
    let Some(separator) = separator else {
        out.push_str(int_part);
        return;
    };

    let len = int_part.len();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(ch);
    }
}

/// Format a number with thousands separators and fixed decimal places.
///
/// ```rust
/// use dashboard_sync::domain::format::number_format;
/// use rust_decimal::Decimal;
///
/// assert_eq!(number_format(Decimal::new(12345, 1), 2), "1,234.50");
/// assert_eq!(number_format(Decimal::ZERO, 0), "0");
/// ```
#[must_use]
pub fn number_format(value: Decimal, decimals: u32) -> String {
    NumberFormat::new(decimals).format(value)
}

/// Format a floating point number.
///
/// # Errors
///
/// Returns `FormatError::NotFinite` for NaN and infinities.
pub fn number_format_f64(value: f64, decimals: u32) -> Result<String, FormatError> {
    let decimal = Decimal::try_from(value).map_err(|_| FormatError::NotFinite)?;
    Ok(number_format(decimal, decimals))
}

/// Format a value as a percentage (`12.50%`).
#[must_use]
pub fn percent_format(value: Decimal, decimals: u32) -> String {
    let mut out = number_format(value, decimals);
    out.push('%');
    out
}

/// Parse a displayed or raw number, ignoring thousands separators.
///
/// # Errors
///
/// Returns `FormatError::InvalidNumber` if the text is not numeric.
pub fn parse_number(text: &str) -> Result<Decimal, FormatError> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '_')
        .collect();

    if cleaned.is_empty() {
        return Err(FormatError::InvalidNumber(text.to_string()));
    }

    cleaned
        .parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| FormatError::InvalidNumber(text.to_string()))
}

// =============================================================================
// Date Formatting
// =============================================================================

/// Format a UTC timestamp for display.
#[must_use]
pub fn format_date_time(value: DateTime<Utc>) -> String {
    value.format(DATE_TIME_FORMAT).to_string()
}

/// Format a calendar date for display.
#[must_use]
pub fn format_date(value: NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

/// Parse a timestamp as sent by the API.
///
/// Accepts RFC 3339 (converted to UTC), naive ISO-8601 date-times (assumed
/// UTC), and plain `YYYY-MM-DD` dates (midnight UTC).
///
/// # Errors
///
/// Returns `FormatError::InvalidDate` if no accepted layout matches.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, FormatError> {
    let trimmed = text.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for layout in NAIVE_INPUT_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, layout) {
            return Ok(parsed.and_utc());
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| FormatError::InvalidDate(text.to_string()))
}

/// Re-render an API timestamp string in the display format.
///
/// # Errors
///
/// Returns `FormatError::InvalidDate` if the input cannot be parsed.
pub fn format_timestamp_str(text: &str) -> Result<String, FormatError> {
    parse_timestamp(text).map(format_date_time)
}

// =============================================================================
// Lot Size Precision
// =============================================================================

/// Derive the number of decimal places to display for a fractional lot size.
///
/// Whole lot sizes map to their power of ten (`1` → 0, `100` → 2).
/// Sub-unit lot sizes map to twice their negative power of ten
/// (`0.1` → 2, `0.01` → 4). Values between powers of ten use the
/// power of ten at or below them.
///
/// # Errors
///
/// Returns `FormatError::NonPositiveLotSize` for zero or negative input.
pub fn decimals_from_lot_size(lot_size: Decimal) -> Result<u32, FormatError> {
    if lot_size <= Decimal::ZERO {
        return Err(FormatError::NonPositiveLotSize(lot_size));
    }

    let exponent = power_of_ten_exponent(lot_size);
    let magnitude = u32::try_from(exponent.unsigned_abs()).unwrap_or(MAX_DECIMALS);

    let decimals = if exponent >= 0 {
        magnitude
    } else {
        magnitude.saturating_mul(2)
    };
    Ok(decimals.min(MAX_DECIMALS))
}

/// `floor(log10(value))` for a positive decimal, computed without floats.
fn power_of_ten_exponent(value: Decimal) -> i64 {
    let normalized = value.normalize();
    let mantissa = normalized.mantissa().unsigned_abs();
    i64::from(mantissa.ilog10()) - i64::from(normalized.scale())
}

// =============================================================================
// Tests
// =============================================================================
