// Extraction spec catalogue
//
// Specs describe where each measurement point lives in the plant workbook.
// They are read once at startup, validated, and never mutated afterwards.

pub mod catalog;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

pub use catalog::plant_catalog;

#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Spec {source_tag} has an empty sheet name")]
    EmptySheetName { source_tag: String },

    #[error("Spec on sheet '{sheet}' has an empty source tag")]
    EmptySourceTag { sheet: String },

    #[error("Spec {source_tag} selects no columns")]
    NoColumns { source_tag: String },

    #[error("Spec {source_tag} selects column {position} more than once")]
    DuplicateColumn { source_tag: String, position: usize },

    #[error("Spec {source_tag} has an invalid ceiling: {ceiling}")]
    InvalidCeiling { source_tag: String, ceiling: f64 },

    #[error("Spec {source_tag} has {labels} time labels for {columns} value columns")]
    LabelCountMismatch {
        source_tag: String,
        labels: usize,
        columns: usize,
    },

    #[error("Spec {source_tag} has an invalid time label: {label:?}")]
    InvalidLabel { source_tag: String, label: String },

    #[error("Failed to read spec catalogue: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse spec catalogue: {0}")]
    Json(#[from] serde_json::Error),
}

/// One wide, time-indexed block on a sheet.
///
/// `column_positions[0]` is the date column; every following position is a
/// value column named by the matching entry of `timestamp_labels` (or of the
/// default hourly sequence when no labels are given).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSpec {
    pub sheet_name: String,
    pub column_positions: Vec<usize>,
    pub value_ceiling: f64,
    pub source_tag: String,
    #[serde(default)]
    pub timestamp_labels: Option<Vec<String>>,
    pub group_tag: String,
}

impl ExtractionSpec {
    pub fn new(
        sheet_name: impl Into<String>,
        column_positions: Vec<usize>,
        value_ceiling: f64,
        source_tag: impl Into<String>,
        timestamp_labels: Option<&[&str]>,
        group_tag: impl Into<String>,
    ) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            column_positions,
            value_ceiling,
            source_tag: source_tag.into(),
            timestamp_labels: timestamp_labels
                .map(|labels| labels.iter().map(|l| l.to_string()).collect()),
            group_tag: group_tag.into(),
        }
    }

    /// Labels for the value columns, falling back to "01:00".."24:00".
    pub fn labels(&self) -> Vec<String> {
        match &self.timestamp_labels {
            Some(labels) => labels.clone(),
            None => default_hour_labels(),
        }
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        validate_common(
            &self.sheet_name,
            &self.source_tag,
            &self.column_positions,
            self.value_ceiling,
        )?;

        let labels = self.labels();
        let value_columns = self.column_positions.len() - 1;
        if labels.len() != value_columns {
            return Err(SpecError::LabelCountMismatch {
                source_tag: self.source_tag.clone(),
                labels: labels.len(),
                columns: value_columns,
            });
        }

        if let Some(bad) = labels.iter().find(|l| !is_valid_time_label(l)) {
            return Err(SpecError::InvalidLabel {
                source_tag: self.source_tag.clone(),
                label: bad.clone(),
            });
        }

        Ok(())
    }
}

/// One fixed-layout block keyed by a batch number.
///
/// Positions are, in order: date, batch number, time label, raw value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchExtractionSpec {
    pub sheet_name: String,
    pub column_positions: [usize; 4],
    pub value_ceiling: f64,
    pub source_tag: String,
    pub group_tag: String,
}

impl BatchExtractionSpec {
    pub fn new(
        sheet_name: impl Into<String>,
        column_positions: [usize; 4],
        value_ceiling: f64,
        source_tag: impl Into<String>,
        group_tag: impl Into<String>,
    ) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            column_positions,
            value_ceiling,
            source_tag: source_tag.into(),
            group_tag: group_tag.into(),
        }
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        validate_common(
            &self.sheet_name,
            &self.source_tag,
            &self.column_positions,
            self.value_ceiling,
        )
    }
}

/// The validated series and batch spec lists for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCatalog")]
pub struct SpecCatalog {
    series: Vec<ExtractionSpec>,
    batch: Vec<BatchExtractionSpec>,
}

#[derive(Deserialize)]
struct RawCatalog {
    #[serde(default)]
    series: Vec<ExtractionSpec>,
    #[serde(default)]
    batch: Vec<BatchExtractionSpec>,
}

impl TryFrom<RawCatalog> for SpecCatalog {
    type Error = SpecError;

    fn try_from(raw: RawCatalog) -> Result<Self, Self::Error> {
        SpecCatalog::new(raw.series, raw.batch)
    }
}

impl SpecCatalog {
    /// Build a catalogue, rejecting it if any spec is malformed.
    pub fn new(
        series: Vec<ExtractionSpec>,
        batch: Vec<BatchExtractionSpec>,
    ) -> Result<Self, SpecError> {
        for spec in &series {
            spec.validate()?;
        }
        for spec in &batch {
            spec.validate()?;
        }
        debug!(
            series = series.len(),
            batch = batch.len(),
            "Validated spec catalogue"
        );
        Ok(Self { series, batch })
    }

    /// Load a catalogue from a JSON file shaped `{"series": [...], "batch": [...]}`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SpecError> {
        let path = path.as_ref();
        info!("Loading spec catalogue from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let raw: RawCatalog = serde_json::from_str(&contents)?;
        Self::try_from(raw)
    }

    /// Use the catalogue at `path` when given, otherwise the built-in plant layout.
    pub fn load(path: Option<&Path>) -> Result<Self, SpecError> {
        match path {
            Some(p) => Self::from_json_file(p),
            None => plant_catalog(),
        }
    }

    pub fn series(&self) -> &[ExtractionSpec] {
        &self.series
    }

    pub fn batch(&self) -> &[BatchExtractionSpec] {
        &self.batch
    }
}

/// "01:00", "02:00", ..., "23:00", "24:00"
pub fn default_hour_labels() -> Vec<String> {
    (1..=24).map(|h| format!("{h:02}:00")).collect()
}

fn validate_common(
    sheet_name: &str,
    source_tag: &str,
    positions: &[usize],
    ceiling: f64,
) -> Result<(), SpecError> {
    if source_tag.trim().is_empty() {
        return Err(SpecError::EmptySourceTag {
            sheet: sheet_name.to_string(),
        });
    }
    if sheet_name.trim().is_empty() {
        return Err(SpecError::EmptySheetName {
            source_tag: source_tag.to_string(),
        });
    }
    if positions.is_empty() {
        return Err(SpecError::NoColumns {
            source_tag: source_tag.to_string(),
        });
    }
    for (i, position) in positions.iter().enumerate() {
        if positions[..i].contains(position) {
            return Err(SpecError::DuplicateColumn {
                source_tag: source_tag.to_string(),
                position: *position,
            });
        }
    }
    if !ceiling.is_finite() || ceiling <= 0.0 {
        return Err(SpecError::InvalidCeiling {
            source_tag: source_tag.to_string(),
            ceiling,
        });
    }
    Ok(())
}

/// `HH:MM` with hours 00-23 and minutes 00-59, or the day-end label `24:00`.
fn is_valid_time_label(label: &str) -> bool {
    if label == "24:00" {
        return true;
    }
    let Some((hours, minutes)) = label.split_once(':') else {
        return false;
    };
    if hours.len() != 2 || minutes.len() != 2 {
        return false;
    }
    match (hours.parse::<u32>(), minutes.parse::<u32>()) {
        (Ok(h), Ok(m)) => h < 24 && m < 60,
        _ => false,
    }
}
