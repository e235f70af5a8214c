//! Raw cell -> typed value conversions with their fallback policy.

use crate::record::Month;
use crate::schema::MonthTable;
use crate::source::RawCell;

/// Numeric reading of a cell, `None` when it is not a number.
pub fn coerce_numeric(cell: &RawCell) -> Option<f64> {
    let value = match cell {
        RawCell::Empty => return None,
        RawCell::Number(n) => *n,
        RawCell::Bool(b) => f64::from(u8::from(*b)),
        RawCell::Text(s) => s.trim().parse::<f64>().ok()?,
    };
    value.is_finite().then_some(value)
}

/// Detention count: truncated to an integer, zero when unparseable.
/// Negative numbers pass through unchanged.
pub fn coerce_count(cell: &RawCell) -> i64 {
    coerce_numeric(cell).map(|n| n.trunc() as i64).unwrap_or(0)
}

/// Month number from a localized name. Numeric cells already in 1..=12 are
/// taken as the month itself; anything else is [`Month::Undefined`].
pub fn coerce_month(cell: &RawCell, months: &MonthTable) -> Month {
    match cell {
        RawCell::Text(s) => match months.lookup(s) {
            Some(n) => Month::Number(n),
            None => Month::Undefined,
        },
        RawCell::Number(n) if n.fract() == 0.0 && (1.0..=12.0).contains(n) => {
            Month::Number(*n as u32)
        }
        _ => Month::Undefined,
    }
}

/// Month kept verbatim, for runs without the month stage.
pub fn month_label(cell: &RawCell) -> Month {
    match cell.to_text() {
        Some(text) => Month::Label(text),
        None => Month::Undefined,
    }
}
