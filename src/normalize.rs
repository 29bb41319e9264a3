// Normalization of extracted sheet blocks into long-form records
//
// Row-level problems (unparseable values, dates or times) never fail a run:
// the offending reading is dropped and counted in the spec's outcome.

pub mod batch;
pub mod series;

use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::importers::workbook_reader::RowDate;

pub use batch::{normalize_batch, BatchOutcome, BatchRecord};
pub use series::{normalize_series, SeriesOutcome, SeriesRecord};

/// Window of the per-spec rolling mean.
pub const ROLLING_WINDOW: usize = 6;

/// Day-end label used by the workbook; not a valid time of day.
const DAY_END_LABEL: &str = "24:00";
const DAY_END_TIME: &str = "23:59";

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%H:%M:%S%.f"];

/// Accepted/rejected counts for one spec.
///
/// `considered` counts non-empty value cells; `rejected` is the part of them
/// that did not make it into the output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    pub rows_read: usize,
    pub considered: usize,
    pub accepted: usize,
    pub rejected: usize,
}

impl RowCounts {
    pub(crate) fn finish(rows_read: usize, considered: usize, accepted: usize) -> Self {
        Self {
            rows_read,
            considered,
            accepted,
            rejected: considered.saturating_sub(accepted),
        }
    }
}

/// Combine a row date with a time label, mapping "24:00" to 23:59.
pub fn build_timestamp(date: &RowDate, label: &str) -> Option<NaiveDateTime> {
    let date = date.as_date()?;
    let label = label.trim();
    let label = if label == DAY_END_LABEL {
        DAY_END_TIME
    } else {
        label
    };
    let time = TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(label, fmt).ok())?;
    Some(date.and_time(time))
}

/// Plausibility filter shared by both datasets: non-zero, finite and not above the ceiling.
pub fn within_ceiling(value: f64, ceiling: f64) -> bool {
    value.is_finite() && value != 0.0 && value <= ceiling
}

/// Mean of up to the last `window` values at each position, in the given order.
///
/// The first `window - 1` positions use a shrinking window (minimum period 1).
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}
