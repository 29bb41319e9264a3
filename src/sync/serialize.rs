// JSON payloads for the remote table store
use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Number, Value};

use super::SyncError;
use crate::normalize::{BatchRecord, SeriesRecord};

/// Plant wall-clock offset (America/Sao_Paulo, no DST since 2019).
pub const PLANT_UTC_OFFSET_HOURS: i32 = -3;

pub fn plant_offset() -> Result<FixedOffset, SyncError> {
    FixedOffset::east_opt(PLANT_UTC_OFFSET_HOURS * 3600)
        .ok_or(SyncError::InvalidOffset(PLANT_UTC_OFFSET_HOURS))
}

/// Read a naive plant timestamp as local time and convert it to UTC.
pub fn plant_time_to_utc(
    timestamp: NaiveDateTime,
    offset: &FixedOffset,
) -> Result<DateTime<Utc>, SyncError> {
    offset
        .from_local_datetime(&timestamp)
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or(SyncError::UnrepresentableTimestamp(timestamp))
}

/// Numbers that JSON cannot carry (NaN, ±Inf) become null.
pub fn finite_number(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn text_or_null(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::String(s.to_string()))
}

fn utc_text(
    timestamp: NaiveDateTime,
    offset: &FixedOffset,
) -> Result<Value, SyncError> {
    let utc = plant_time_to_utc(timestamp, offset)?;
    Ok(Value::String(utc.to_rfc3339_opts(SecondsFormat::Secs, false)))
}

pub fn series_row(record: &SeriesRecord, offset: &FixedOffset) -> Result<Value, SyncError> {
    let mut row = Map::new();
    row.insert("source_tag".into(), Value::String(record.source_tag.clone()));
    row.insert("timestamp".into(), utc_text(record.timestamp, offset)?);
    row.insert("value".into(), finite_number(record.value));
    row.insert("rolling_mean_6".into(), finite_number(record.rolling_mean_6));
    row.insert("group_tag".into(), text_or_null(record.group_tag.as_deref()));
    Ok(Value::Object(row))
}

pub fn batch_row(record: &BatchRecord, offset: &FixedOffset) -> Result<Value, SyncError> {
    let mut row = Map::new();
    row.insert("timestamp".into(), utc_text(record.timestamp, offset)?);
    row.insert("value".into(), finite_number(record.value));
    row.insert("batch_number".into(), Value::from(record.batch_number));
    row.insert("source_tag".into(), Value::String(record.source_tag.clone()));
    row.insert("group_tag".into(), text_or_null(record.group_tag.as_deref()));
    Ok(Value::Object(row))
}

pub fn series_rows(records: &[SeriesRecord]) -> Result<Vec<Value>, SyncError> {
    let offset = plant_offset()?;
    records.iter().map(|r| series_row(r, &offset)).collect()
}

pub fn batch_rows(records: &[BatchRecord]) -> Result<Vec<Value>, SyncError> {
    let offset = plant_offset()?;
    records.iter().map(|r| batch_row(r, &offset)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn ts(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 30)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_plant_time_shifts_three_hours() {
        let offset = plant_offset().unwrap();
        let utc = plant_time_to_utc(ts(22), &offset).unwrap();
        assert_eq!(utc.to_rfc3339(), "2024-07-01T01:00:00+00:00");
    }

    #[test]
    fn test_non_finite_numbers_become_null() {
        assert_eq!(finite_number(f64::NAN), Value::Null);
        assert_eq!(finite_number(f64::INFINITY), Value::Null);
        assert_eq!(finite_number(f64::NEG_INFINITY), Value::Null);
        assert_eq!(finite_number(1.25), json!(1.25));
    }

    #[test]
    fn test_series_row_payload() {
        let record = SeriesRecord {
            source_tag: "LIX_Au_L".into(),
            timestamp: ts(8),
            value: 0.4,
            rolling_mean_6: f64::NAN,
            group_tag: None,
        };
        let rows = series_rows(&[record]).unwrap();
        assert_eq!(
            rows[0],
            json!({
                "source_tag": "LIX_Au_L",
                "timestamp": "2024-06-30T11:00:00+00:00",
                "value": 0.4,
                "rolling_mean_6": null,
                "group_tag": null
            })
        );
    }

    #[test]
    fn test_batch_row_payload() {
        let record = BatchRecord {
            timestamp: ts(0),
            value: 12.5,
            batch_number: 41,
            source_tag: "ELU_Eluato".into(),
            group_tag: Some("Eluição".into()),
        };
        let rows = batch_rows(&[record]).unwrap();
        assert_eq!(rows[0]["timestamp"], json!("2024-06-30T03:00:00+00:00"));
        assert_eq!(rows[0]["batch_number"], json!(41));
        assert_eq!(rows[0]["group_tag"], json!("Eluição"));
    }
}
