use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, instrument};

use crate::importers::downloader::{DownloadError, SourceFetcher, SpreadsheetSource};
use crate::importers::workbook_reader::{PlantWorkbook, ReaderError};
use crate::normalize::{normalize_batch, normalize_series, BatchRecord, RowCounts, SeriesRecord};
use crate::output::{write_batch_table, write_series_table, OutputError, TableCompression};
use crate::specs::{BatchExtractionSpec, ExtractionSpec, SpecCatalog, SpecError};

/// Error types for an ETL run
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("Invalid spec catalogue: {0}")]
    Spec(#[from] SpecError),

    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Spreadsheet error: {0}")]
    Reader(#[from] ReaderError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("ETL task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Series,
    Batch,
}

/// What one spec contributed to its dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecReport {
    pub dataset: Dataset,
    pub source_tag: String,
    pub group_tag: String,
    pub sheet_name: String,
    #[serde(flatten)]
    pub counts: RowCounts,
}

/// Both consolidated tables plus the per-spec accounting.
#[derive(Debug, Clone, Default)]
pub struct ConsolidatedTables {
    pub series: Vec<SeriesRecord>,
    pub batch: Vec<BatchRecord>,
    pub reports: Vec<SpecReport>,
    pub duplicates_removed: usize,
}

/// Where the two tables are written.
#[derive(Debug, Clone)]
pub struct OutputTargets {
    pub series_path: PathBuf,
    pub batch_path: PathBuf,
    pub compression: TableCompression,
}

/// Extract and normalize every series spec, in order, into one table sorted newest first.
pub fn consolidate_series(
    workbook: &mut PlantWorkbook,
    specs: &[ExtractionSpec],
) -> Result<(Vec<SeriesRecord>, Vec<SpecReport>), ReaderError> {
    let mut collected = Vec::new();
    let mut reports = Vec::with_capacity(specs.len());

    for spec in specs {
        let sheet = workbook.read_series(spec)?;
        let outcome = normalize_series(&sheet, spec.value_ceiling, &spec.source_tag);
        info!(
            "{}: {} rows processed ({} rejected)",
            spec.source_tag, outcome.counts.accepted, outcome.counts.rejected
        );

        reports.push(SpecReport {
            dataset: Dataset::Series,
            source_tag: spec.source_tag.clone(),
            group_tag: spec.group_tag.clone(),
            sheet_name: spec.sheet_name.clone(),
            counts: outcome.counts,
        });

        collected.extend(outcome.records.into_iter().map(|mut record| {
            record.group_tag = Some(spec.group_tag.clone());
            record
        }));
    }

    sort_newest_first(&mut collected, |r| r.timestamp);
    Ok((collected, reports))
}

/// Extract and normalize every batch spec, dropping duplicate samples.
///
/// Returns the table sorted newest first and the number of duplicates removed.
pub fn consolidate_batch(
    workbook: &mut PlantWorkbook,
    specs: &[BatchExtractionSpec],
) -> Result<(Vec<BatchRecord>, Vec<SpecReport>, usize), ReaderError> {
    let mut collected = Vec::new();
    let mut reports = Vec::with_capacity(specs.len());

    for spec in specs {
        let sheet = workbook.read_batch(spec)?;
        let outcome = normalize_batch(&sheet, spec.value_ceiling, &spec.source_tag);
        info!(
            "{}: {} rows processed ({} rejected)",
            spec.source_tag, outcome.counts.accepted, outcome.counts.rejected
        );

        reports.push(SpecReport {
            dataset: Dataset::Batch,
            source_tag: spec.source_tag.clone(),
            group_tag: spec.group_tag.clone(),
            sheet_name: spec.sheet_name.clone(),
            counts: outcome.counts,
        });

        collected.extend(outcome.records.into_iter().map(|mut record| {
            record.group_tag = Some(spec.group_tag.clone());
            record
        }));
    }

    let (mut deduplicated, removed) = deduplicate_batch(collected);
    sort_newest_first(&mut deduplicated, |r| r.timestamp);
    Ok((deduplicated, reports, removed))
}

/// Keep the first occurrence of each (source_tag, timestamp, value, batch_number).
pub fn deduplicate_batch(records: Vec<BatchRecord>) -> (Vec<BatchRecord>, usize) {
    let before = records.len();
    let mut seen = HashSet::with_capacity(before);
    let kept: Vec<BatchRecord> = records
        .into_iter()
        .filter(|r| {
            seen.insert((
                r.source_tag.clone(),
                r.timestamp,
                r.value.to_bits(),
                r.batch_number,
            ))
        })
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

/// Stable sort, newest first; ties keep concatenation order.
pub fn sort_newest_first<T, K: Ord>(records: &mut [T], key: impl Fn(&T) -> K) {
    records.sort_by(|a, b| key(b).cmp(&key(a)));
}

/// Run both datasets against an open workbook and persist them.
///
/// The series table is written before batch extraction starts, so a failing
/// batch spec leaves a fresh series file behind.
#[instrument(skip(workbook, catalog, targets))]
pub fn consolidate_and_write(
    workbook: &mut PlantWorkbook,
    catalog: &SpecCatalog,
    targets: &OutputTargets,
) -> Result<ConsolidatedTables, EtlError> {
    info!("Processing series data ({} specs)", catalog.series().len());
    let (series, mut reports) = consolidate_series(workbook, catalog.series())?;
    info!("Consolidated series: {} rows", series.len());
    write_series_table(&targets.series_path, &series, targets.compression)?;

    info!("Processing batch data ({} specs)", catalog.batch().len());
    let (batch, batch_reports, duplicates_removed) = consolidate_batch(workbook, catalog.batch())?;
    info!(
        "Consolidated batch: {} rows ({} duplicates removed)",
        batch.len(),
        duplicates_removed
    );
    write_batch_table(&targets.batch_path, &batch, targets.compression)?;

    reports.extend(batch_reports);
    Ok(ConsolidatedTables {
        series,
        batch,
        reports,
        duplicates_removed,
    })
}

/// Open a resolved source and run the full consolidation.
pub fn run_etl(
    source: SpreadsheetSource,
    catalog: &SpecCatalog,
    targets: &OutputTargets,
) -> Result<ConsolidatedTables, EtlError> {
    let mut workbook = PlantWorkbook::from_source(source)?;
    consolidate_and_write(&mut workbook, catalog, targets)
}

/// Resolve `reference`, then run the ETL on the blocking pool.
#[instrument(skip(fetcher, catalog, targets))]
pub async fn fetch_and_consolidate(
    fetcher: &SourceFetcher,
    reference: &str,
    catalog: SpecCatalog,
    targets: OutputTargets,
) -> Result<ConsolidatedTables, EtlError> {
    let start = Instant::now();
    let source = fetcher.resolve(reference).await?;

    // calamine parsing is synchronous and CPU bound
    let tables =
        tokio::task::spawn_blocking(move || run_etl(source, &catalog, &targets)).await??;

    info!(
        series = tables.series.len(),
        batch = tables.batch.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "ETL finished"
    );
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn sample(source: &str, day: u32, value: f64, batch_number: i64) -> BatchRecord {
        BatchRecord {
            timestamp: ts(day),
            value,
            batch_number,
            source_tag: source.to_string(),
            group_tag: Some("Cuba Principal".to_string()),
        }
    }

    #[test]
    fn test_deduplicate_keeps_first() {
        let mut second = sample("CUBA_Entrada_Au", 1, 10.0, 7);
        second.group_tag = Some("other".into());
        let records = vec![
            sample("CUBA_Entrada_Au", 1, 10.0, 7),
            second,
            sample("CUBA_Entrada_Au", 1, 10.0, 8),
            sample("CUBA_Saida_Au", 1, 10.0, 7),
        ];

        let (kept, removed) = deduplicate_batch(records);
        assert_eq!(removed, 1);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].group_tag.as_deref(), Some("Cuba Principal"));
    }

    #[test]
    fn test_sort_newest_first_is_stable() {
        let mut records = vec![
            sample("A", 1, 1.0, 1),
            sample("B", 3, 2.0, 1),
            sample("C", 1, 3.0, 1),
            sample("D", 2, 4.0, 1),
        ];
        sort_newest_first(&mut records, |r| r.timestamp);
        let order: Vec<&str> = records.iter().map(|r| r.source_tag.as_str()).collect();
        assert_eq!(order, vec!["B", "D", "A", "C"]);
    }
}
