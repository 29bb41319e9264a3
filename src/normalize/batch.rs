use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::debug;

use super::{build_timestamp, within_ceiling, RowCounts};
use crate::importers::workbook_reader::{BatchSheet, CellValue};

/// One cleaned batch sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchRecord {
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub batch_number: i64,
    pub source_tag: String,
    pub group_tag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub records: Vec<BatchRecord>,
    pub counts: RowCounts,
}

fn non_numeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\d,.\-]").expect("static pattern"))
}

fn repeated_dots() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.{2,}").expect("static pattern"))
}

/// Clean a batch value: keep digits, commas, periods and minus signs, use "."
/// as decimal separator, collapse repeated periods, then parse.
pub fn parse_batch_value(cell: &CellValue) -> Option<f64> {
    let text = cell.to_text();
    let kept = non_numeric().replace_all(&text, "");
    let dotted = kept.replace(',', ".");
    let collapsed = repeated_dots().replace_all(&dotted, ".");
    collapsed.trim().parse().ok()
}

/// Parse a batch number, keeping only whole numbers.
pub fn parse_batch_number(cell: &CellValue) -> Option<i64> {
    let number = match cell {
        CellValue::Number(n) => *n,
        CellValue::Text(s) => s.trim().parse::<f64>().ok()?,
    };
    if !number.is_finite() || number.fract() != 0.0 {
        return None;
    }
    if number < i64::MIN as f64 || number >= i64::MAX as f64 {
        return None;
    }
    Some(number as i64)
}

/// Turn batch rows into records, dropping anything that does not clean up.
pub fn normalize_batch(sheet: &BatchSheet, ceiling: f64, source_tag: &str) -> BatchOutcome {
    let considered = sheet.rows.len();

    let records: Vec<BatchRecord> = sheet
        .rows
        .iter()
        .filter_map(|row| {
            let value = parse_batch_value(&row.raw_value).filter(|v| within_ceiling(*v, ceiling))?;
            let timestamp = build_timestamp(&row.date, &row.time_label)?;
            let batch_number = parse_batch_number(&row.batch_number)?;
            Some(BatchRecord {
                timestamp,
                value,
                batch_number,
                source_tag: source_tag.to_string(),
                group_tag: None,
            })
        })
        .collect();

    let counts = RowCounts::finish(sheet.rows_read, considered, records.len());
    debug!(
        source = source_tag,
        accepted = counts.accepted,
        rejected = counts.rejected,
        "Normalized batch block"
    );
    BatchOutcome { records, counts }
}
