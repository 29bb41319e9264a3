use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use super::{build_timestamp, rolling_mean, within_ceiling, RowCounts, ROLLING_WINDOW};
use crate::importers::workbook_reader::{CellValue, SeriesSheet};

/// One cleaned reading of a timed series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRecord {
    pub source_tag: String,
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub rolling_mean_6: f64,
    pub group_tag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesOutcome {
    pub records: Vec<SeriesRecord>,
    pub counts: RowCounts,
}

/// Parse a series cell: text loses "<" markers and uses "," as decimal separator.
pub fn parse_series_value(cell: &CellValue) -> Option<f64> {
    match cell {
        CellValue::Number(n) => Some(*n),
        CellValue::Text(s) => s.replace('<', "").replace(',', ".").trim().parse().ok(),
    }
}

/// Turn a wide series block into long rows with a rolling mean.
///
/// Rows are emitted row by row and, inside a row, label by label; the rolling
/// mean runs over that emission order, not over time.
pub fn normalize_series(sheet: &SeriesSheet, ceiling: f64, source_tag: &str) -> SeriesOutcome {
    let mut considered = 0;
    let mut points: Vec<(NaiveDateTime, f64)> = Vec::new();

    for row in &sheet.rows {
        for (label, cell) in sheet.labels.iter().zip(&row.cells) {
            let Some(cell) = cell else {
                continue;
            };
            considered += 1;

            let Some(value) = parse_series_value(cell).filter(|v| within_ceiling(*v, ceiling))
            else {
                continue;
            };
            let Some(timestamp) = build_timestamp(&row.date, label) else {
                continue;
            };
            points.push((timestamp, value));
        }
    }

    let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
    let means = rolling_mean(&values, ROLLING_WINDOW);

    let records: Vec<SeriesRecord> = points
        .into_iter()
        .zip(means)
        .map(|((timestamp, value), rolling_mean_6)| SeriesRecord {
            source_tag: source_tag.to_string(),
            timestamp,
            value,
            rolling_mean_6,
            group_tag: None,
        })
        .collect();

    let counts = RowCounts::finish(sheet.rows_read, considered, records.len());
    debug!(
        source = source_tag,
        accepted = counts.accepted,
        rejected = counts.rejected,
        "Normalized series block"
    );
    SeriesOutcome { records, counts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importers::workbook_reader::{RowDate, SeriesRow};
    use chrono::NaiveDate;

    fn date(day: u32) -> RowDate {
        RowDate::Known(NaiveDate::from_ymd_opt(2024, 1, day).unwrap())
    }

    fn num(v: f64) -> Option<CellValue> {
        Some(CellValue::Number(v))
    }

    fn text(s: &str) -> Option<CellValue> {
        Some(CellValue::Text(s.to_string()))
    }

    fn sheet(labels: &[&str], rows: Vec<SeriesRow>) -> SeriesSheet {
        SeriesSheet {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            rows_read: rows.len(),
            rows,
        }
    }

    #[test]
    fn test_parse_series_value_markers() {
        assert_eq!(parse_series_value(&CellValue::Text("<0,02".into())), Some(0.02));
        assert_eq!(parse_series_value(&CellValue::Text(" 1,25 ".into())), Some(1.25));
        assert_eq!(parse_series_value(&CellValue::Text("3.5".into())), Some(3.5));
        assert_eq!(parse_series_value(&CellValue::Number(7.0)), Some(7.0));
        assert_eq!(parse_series_value(&CellValue::Text("n/a".into())), None);
        assert_eq!(parse_series_value(&CellValue::Text("1.234,5".into())), None);
    }

    #[test]
    fn test_normalize_filters_zero_and_ceiling() {
        let sheet = sheet(
            &["08:00", "16:00", "24:00"],
            vec![SeriesRow {
                date: date(5),
                cells: vec![num(0.0), num(51.0), text("<1,5")],
            }],
        );

        let outcome = normalize_series(&sheet, 50.0, "LIX_Au_S");
        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records[0];
        assert_eq!(record.value, 1.5);
        assert_eq!(record.source_tag, "LIX_Au_S");
        assert_eq!(
            record.timestamp,
            NaiveDate::from_ymd_opt(2024, 1, 5)
                .unwrap()
                .and_hms_opt(23, 59, 0)
                .unwrap()
        );
        assert_eq!(outcome.counts.considered, 3);
        assert_eq!(outcome.counts.rejected, 2);
    }

    #[test]
    fn test_rolling_mean_follows_emission_order() {
        // Emitted row by row: day 2 08:00, day 2 16:00, day 1 08:00, day 1 16:00
        let sheet = sheet(
            &["08:00", "16:00"],
            vec![
                SeriesRow {
                    date: date(2),
                    cells: vec![num(10.0), num(20.0)],
                },
                SeriesRow {
                    date: date(1),
                    cells: vec![num(30.0), num(40.0)],
                },
            ],
        );

        let outcome = normalize_series(&sheet, 100.0, "TQ2_Au_S");
        let means: Vec<f64> = outcome.records.iter().map(|r| r.rolling_mean_6).collect();
        assert_eq!(means, vec![10.0, 15.0, 20.0, 25.0]);
        assert_eq!(outcome.records[2].timestamp.date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn test_unreadable_date_rows_are_dropped_before_rolling() {
        let sheet = sheet(
            &["12:00"],
            vec![
                SeriesRow {
                    date: date(1),
                    cells: vec![num(10.0)],
                },
                SeriesRow {
                    date: RowDate::Unreadable("sem data".into()),
                    cells: vec![num(99.0)],
                },
                SeriesRow {
                    date: date(3),
                    cells: vec![num(20.0)],
                },
            ],
        );

        let outcome = normalize_series(&sheet, 100.0, "TQ2_Au_S");
        let means: Vec<f64> = outcome.records.iter().map(|r| r.rolling_mean_6).collect();
        assert_eq!(means, vec![10.0, 15.0]);
        assert_eq!(outcome.counts.rejected, 1);
    }

    #[test]
    fn test_empty_cells_are_not_counted() {
        let sheet = sheet(
            &["08:00", "16:00"],
            vec![SeriesRow {
                date: date(1),
                cells: vec![None, None],
            }],
        );

        let outcome = normalize_series(&sheet, 50.0, "LIX_PX");
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.counts.considered, 0);
        assert_eq!(outcome.counts.rows_read, 1);
    }
}
