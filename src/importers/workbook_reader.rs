use calamine::{open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use chrono::{Days, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::io::Cursor;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::importers::downloader::SpreadsheetSource;
use crate::specs::{BatchExtractionSpec, ExtractionSpec};

/// Zero-based index of the header row; data starts on the row after it.
pub const HEADER_ROW: u32 = 4;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("Failed to open workbook: {0}")]
    WorkbookOpen(String),

    #[error("Sheet not found: {0}")]
    MissingSheet(String),

    #[error("Sheet '{sheet}' has {available} columns but column position {requested} was requested")]
    MalformedHeader {
        sheet: String,
        requested: usize,
        available: usize,
    },

    #[error("Failed to read spreadsheet source: {0}")]
    Io(#[from] std::io::Error),
}

/// A non-empty cell as read from the sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Text rendering used when a cell is coerced to a string.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }
}

/// The date of a sheet row once it is known to be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowDate {
    Known(NaiveDate),
    /// Present in the sheet but not readable as a date.
    Unreadable(String),
}

impl RowDate {
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            RowDate::Known(d) => Some(*d),
            RowDate::Unreadable(_) => None,
        }
    }
}

/// One row of a wide series block: a date plus one cell per time label.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRow {
    pub date: RowDate,
    pub cells: Vec<Option<CellValue>>,
}

/// A series block with its column labels ("Data" is implicit).
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSheet {
    pub labels: Vec<String>,
    pub rows: Vec<SeriesRow>,
    /// Data rows under the header before any row was dropped.
    pub rows_read: usize,
}

/// One row of a batch block with all four fields present.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRow {
    pub date: RowDate,
    pub batch_number: CellValue,
    pub time_label: String,
    pub raw_value: CellValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchSheet {
    pub rows: Vec<BatchRow>,
    pub rows_read: usize,
}

/// Forward-fill absent dates from the row directly above, one day per row.
///
/// Only the immediately preceding row is consulted, so a run of absent dates
/// after a known date becomes D+1, D+2, ... An unreadable date above, or an
/// increment past the calendar range, leaves the row absent.
pub fn backfill_dates(dates: &mut [Option<RowDate>]) {
    for i in 1..dates.len() {
        if dates[i].is_some() {
            continue;
        }
        if let Some(RowDate::Known(previous)) = &dates[i - 1] {
            dates[i] = previous.checked_add_days(Days::new(1)).map(RowDate::Known);
        }
    }
}

/// The plant workbook, opened once and shared by every spec of a run.
pub struct PlantWorkbook {
    sheets: Sheets<Cursor<Vec<u8>>>,
    ranges: HashMap<String, Range<Data>>,
}

impl PlantWorkbook {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ReaderError> {
        let sheets = open_workbook_auto_from_rs(Cursor::new(bytes))
            .map_err(|e| ReaderError::WorkbookOpen(e.to_string()))?;
        Ok(Self {
            sheets,
            ranges: HashMap::new(),
        })
    }

    pub fn from_source(source: SpreadsheetSource) -> Result<Self, ReaderError> {
        info!("Opening workbook {}", source.describe());
        let bytes = source.into_bytes()?;
        Self::from_bytes(bytes)
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names()
    }

    fn range(&mut self, sheet_name: &str) -> Result<&Range<Data>, ReaderError> {
        if !self.ranges.contains_key(sheet_name) {
            if !self.sheets.sheet_names().iter().any(|n| n == sheet_name) {
                return Err(ReaderError::MissingSheet(sheet_name.to_string()));
            }
            let range = self
                .sheets
                .worksheet_range(sheet_name)
                .map_err(|e| ReaderError::WorkbookOpen(e.to_string()))?;
            debug!(
                "Loaded sheet '{}' ({:?} to {:?})",
                sheet_name,
                range.start(),
                range.end()
            );
            self.ranges.insert(sheet_name.to_string(), range);
        }
        self.ranges
            .get(sheet_name)
            .ok_or_else(|| ReaderError::MissingSheet(sheet_name.to_string()))
    }

    /// Read a wide series block.
    ///
    /// `column_positions[0]` becomes the date column, the rest are named by
    /// `spec.labels()`. Rows still without a date after back-fill are dropped.
    #[instrument(skip(self, spec), fields(sheet = %spec.sheet_name, source = %spec.source_tag))]
    pub fn read_series(&mut self, spec: &ExtractionSpec) -> Result<SeriesSheet, ReaderError> {
        let labels = spec.labels();
        let range = self.range(&spec.sheet_name)?;
        check_columns(range, &spec.sheet_name, &spec.column_positions)?;

        let Some((date_col, value_cols)) = spec.column_positions.split_first() else {
            return Err(ReaderError::MalformedHeader {
                sheet: spec.sheet_name.clone(),
                requested: 0,
                available: sheet_width(range),
            });
        };

        let mut dates = Vec::new();
        let mut cells = Vec::new();
        for row in data_rows(range) {
            dates.push(cell_date(cell(range, row, *date_col)));
            cells.push(
                value_cols
                    .iter()
                    .map(|col| cell_value(cell(range, row, *col)))
                    .collect::<Vec<_>>(),
            );
        }
        let rows_read = dates.len();

        backfill_dates(&mut dates);

        let rows: Vec<SeriesRow> = dates
            .into_iter()
            .zip(cells)
            .filter_map(|(date, cells)| date.map(|date| SeriesRow { date, cells }))
            .collect();

        debug!(
            "Read {} of {} rows from '{}'",
            rows.len(),
            rows_read,
            spec.sheet_name
        );
        Ok(SeriesSheet {
            labels,
            rows,
            rows_read,
        })
    }

    /// Read a fixed four-column batch block (date, batch number, time label, value).
    #[instrument(skip(self, spec), fields(sheet = %spec.sheet_name, source = %spec.source_tag))]
    pub fn read_batch(&mut self, spec: &BatchExtractionSpec) -> Result<BatchSheet, ReaderError> {
        let range = self.range(&spec.sheet_name)?;
        check_columns(range, &spec.sheet_name, &spec.column_positions)?;
        let [date_col, batch_col, time_col, value_col] = spec.column_positions;

        let mut dates = Vec::new();
        let mut fields = Vec::new();
        for row in data_rows(range) {
            dates.push(cell_date(cell(range, row, date_col)));
            fields.push((
                cell_value(cell(range, row, batch_col)),
                cell_text(cell(range, row, time_col)),
                cell_value(cell(range, row, value_col)),
            ));
        }
        let rows_read = dates.len();

        backfill_dates(&mut dates);

        let rows: Vec<BatchRow> = dates
            .into_iter()
            .zip(fields)
            .filter_map(|(date, (batch_number, time_label, raw_value))| {
                Some(BatchRow {
                    date: date?,
                    batch_number: batch_number?,
                    time_label: time_label?,
                    raw_value: raw_value?,
                })
            })
            .collect();

        debug!(
            "Read {} of {} batch rows from '{}'",
            rows.len(),
            rows_read,
            spec.sheet_name
        );
        Ok(BatchSheet { rows, rows_read })
    }
}

fn sheet_width(range: &Range<Data>) -> usize {
    range.end().map(|(_, col)| col as usize + 1).unwrap_or(0)
}

fn check_columns(range: &Range<Data>, sheet: &str, positions: &[usize]) -> Result<(), ReaderError> {
    let available = sheet_width(range);
    match positions.iter().copied().find(|p| *p >= available) {
        Some(requested) => Err(ReaderError::MalformedHeader {
            sheet: sheet.to_string(),
            requested,
            available,
        }),
        None => Ok(()),
    }
}

fn data_rows(range: &Range<Data>) -> std::ops::RangeInclusive<u32> {
    let last = range.end().map(|(row, _)| row).unwrap_or(0);
    // An empty range (HEADER_ROW + 1 > last) yields no rows.
    (HEADER_ROW + 1)..=last
}

fn cell(range: &Range<Data>, row: u32, col: usize) -> &Data {
    u32::try_from(col)
        .ok()
        .and_then(|col| range.get_value((row, col)))
        .unwrap_or(&Data::Empty)
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d/%m/%y", "%Y/%m/%d", "%d-%m-%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S"];

/// Parse a textual date as written in the workbook.
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Excel serial day number (1900 system) to a calendar date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let days = serial.floor();
    if days < 0.0 {
        return None;
    }
    epoch.checked_add_days(Days::new(days as u64))
}

fn cell_date(data: &Data) -> Option<RowDate> {
    match data {
        Data::Empty | Data::Error(_) => None,
        Data::DateTime(dt) => Some(
            dt.as_datetime()
                .map(|d| RowDate::Known(d.date()))
                .unwrap_or_else(|| RowDate::Unreadable(dt.as_f64().to_string())),
        ),
        Data::DateTimeIso(s) | Data::String(s) => {
            if s.trim().is_empty() {
                return None;
            }
            Some(
                parse_date_text(s)
                    .map(RowDate::Known)
                    .unwrap_or_else(|| RowDate::Unreadable(s.clone())),
            )
        }
        Data::Float(f) => Some(
            excel_serial_to_date(*f)
                .map(RowDate::Known)
                .unwrap_or_else(|| RowDate::Unreadable(f.to_string())),
        ),
        Data::Int(i) => Some(
            excel_serial_to_date(*i as f64)
                .map(RowDate::Known)
                .unwrap_or_else(|| RowDate::Unreadable(i.to_string())),
        ),
        other => Some(RowDate::Unreadable(other.to_string())),
    }
}

fn cell_value(data: &Data) -> Option<CellValue> {
    match data {
        Data::Empty | Data::Error(_) => None,
        Data::Float(f) => Some(CellValue::Number(*f)),
        Data::Int(i) => Some(CellValue::Number(*i as f64)),
        Data::String(s) if s.is_empty() => None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            Some(CellValue::Text(s.clone()))
        }
        other => Some(CellValue::Text(other.to_string())),
    }
}

/// Text form of a time-of-day cell. Time-formatted cells render as `HH:MM:SS`.
fn cell_text(data: &Data) -> Option<String> {
    match data {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            let rendered = dt.as_datetime().map(|d| {
                if (0.0..1.0).contains(&serial) {
                    d.time().format("%H:%M:%S").to_string()
                } else {
                    d.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            });
            Some(rendered.unwrap_or_else(|| serial.to_string()))
        }
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_backfill_run_of_absent_dates() {
        let mut dates = vec![
            Some(RowDate::Known(d(2024, 1, 1))),
            None,
            None,
            Some(RowDate::Known(d(2024, 3, 1))),
        ];
        backfill_dates(&mut dates);
        assert_eq!(
            dates,
            vec![
                Some(RowDate::Known(d(2024, 1, 1))),
                Some(RowDate::Known(d(2024, 1, 2))),
                Some(RowDate::Known(d(2024, 1, 3))),
                Some(RowDate::Known(d(2024, 3, 1))),
            ]
        );
    }

    #[test]
    fn test_backfill_leading_absent_stays_absent() {
        let mut dates = vec![None, Some(RowDate::Known(d(2024, 1, 1))), None];
        backfill_dates(&mut dates);
        assert_eq!(dates[0], None);
        assert_eq!(dates[2], Some(RowDate::Known(d(2024, 1, 2))));
    }

    #[test]
    fn test_backfill_does_not_carry_unreadable_dates() {
        let mut dates = vec![
            Some(RowDate::Known(d(2024, 1, 1))),
            Some(RowDate::Unreadable("n/d".into())),
            None,
        ];
        backfill_dates(&mut dates);
        assert_eq!(dates[2], None);
    }

    #[test]
    fn test_backfill_crosses_month_end() {
        let mut dates = vec![Some(RowDate::Known(d(2024, 2, 28))), None, None];
        backfill_dates(&mut dates);
        assert_eq!(dates[1], Some(RowDate::Known(d(2024, 2, 29))));
        assert_eq!(dates[2], Some(RowDate::Known(d(2024, 3, 1))));
    }

    #[test]
    fn test_parse_date_text_formats() {
        assert_eq!(parse_date_text("2024-01-05"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date_text("05/01/2024"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date_text(" 2024-01-05 00:00:00 "), Some(d(2024, 1, 5)));
        assert_eq!(parse_date_text("sem data"), None);
    }

    #[test]
    fn test_excel_serial_to_date() {
        assert_eq!(excel_serial_to_date(45296.0), Some(d(2024, 1, 5)));
        assert_eq!(excel_serial_to_date(45296.75), Some(d(2024, 1, 5)));
        assert_eq!(excel_serial_to_date(-1.0), None);
        assert_eq!(excel_serial_to_date(f64::NAN), None);
    }

    #[test]
    fn test_cell_conversions() {
        assert_eq!(cell_value(&Data::Empty), None);
        assert_eq!(cell_value(&Data::String(String::new())), None);
        assert_eq!(cell_value(&Data::Int(3)), Some(CellValue::Number(3.0)));
        assert_eq!(
            cell_value(&Data::String("<0,02".into())),
            Some(CellValue::Text("<0,02".into()))
        );
        assert_eq!(cell_text(&Data::String("08:00".into())), Some("08:00".into()));
        assert_eq!(cell_date(&Data::String("  ".into())), None);
        assert_eq!(
            cell_date(&Data::String("x".into())),
            Some(RowDate::Unreadable("x".into()))
        );
    }

    #[test]
    fn test_cell_value_text_rendering() {
        assert_eq!(CellValue::Number(12.0).to_text(), "12");
        assert_eq!(CellValue::Number(0.25).to_text(), "0.25");
        assert_eq!(CellValue::Text("1,5 g/t".into()).to_text(), "1,5 g/t");
    }
}
