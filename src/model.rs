//! Data structures describing an athlete report as served by the backend.
//!
//! Records are validated once at the boundary where they are fetched or loaded
//! ([`Report::validate`]); everything downstream, including the exporter,
//! assumes a valid record.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// One labelled numeric series of a chart.
///
/// `labels[i]` names `values[i]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSeries {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub values: Vec<f64>,
}

impl GraphSeries {
    pub fn new<L, S>(points: impl IntoIterator<Item = (L, S)>) -> Self
    where
        L: Into<String>,
        S: Into<f64>,
    {
        let (labels, values) = points
            .into_iter()
            .map(|(label, value)| (label.into(), value.into()))
            .unzip();
        Self { labels, values }
    }

    /// Iterates `(label, value)` pairs.
    pub fn points(&self) -> impl Iterator<Item = (&str, f64)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Largest value in the series, or `0.0` for an empty series.
    pub fn max_value(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }
}

/// The four chart series of a report.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    #[serde(default)]
    pub offense_attempts: GraphSeries,
    #[serde(default)]
    pub offense_successes: GraphSeries,
    #[serde(default)]
    pub defense_attempts: GraphSeries,
    #[serde(default)]
    pub defense_successes: GraphSeries,
}

/// Narrative describing attempted and successful moves on one side of the match.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveAnalysis {
    #[serde(default)]
    pub attempted: String,
    #[serde(default)]
    pub successful: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalSummary {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,
}

/// The analytical payload of a report.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    #[serde(default)]
    pub athlete_name: String,
    #[serde(default)]
    pub report_date: String,
    #[serde(default)]
    pub submissions: Vec<String>,
    #[serde(default)]
    pub match_types: Vec<String>,
    #[serde(default, rename = "win/loss_ratio")]
    pub win_loss_ratio: Vec<String>,
    #[serde(default)]
    pub points: Vec<String>,
    #[serde(default)]
    pub graph_data: GraphData,
    #[serde(default)]
    pub offensive_analysis: MoveAnalysis,
    #[serde(default)]
    pub defensive_analysis: MoveAnalysis,
    #[serde(default)]
    pub final_summary: FinalSummary,
}

/// A generated report together with the metadata of its source upload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: u64,
    pub filename: String,
    pub uploaded_at: String,
    #[serde(default)]
    pub file_size_mb: f64,
    #[serde(default)]
    pub uploaded_by: String,
    #[serde(default)]
    pub pdf_data: ReportData,
}

impl Report {
    /// Creates a report with empty analytical content.
    pub fn new(id: u64, filename: impl Into<String>, uploaded_at: impl Into<String>) -> Self {
        Self {
            id,
            filename: filename.into(),
            uploaded_at: uploaded_at.into(),
            file_size_mb: 0.0,
            uploaded_by: String::new(),
            pdf_data: ReportData::default(),
        }
    }

    /// Sets the analytical payload and returns the updated report.
    pub fn with_data(mut self, data: ReportData) -> Self {
        self.pdf_data = data;
        self
    }

    /// Sets the uploader and returns the updated report.
    pub fn with_uploaded_by(mut self, uploaded_by: impl Into<String>) -> Self {
        self.uploaded_by = uploaded_by.into();
        self
    }

    /// Parses and validates a report from JSON.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ReportError> {
        let report: Self = serde_json::from_slice(bytes)?;
        report.validate()?;
        Ok(report)
    }

    /// Checks the invariants the exporter relies on.
    pub fn validate(&self) -> Result<(), ReportError> {
        let graphs = &self.pdf_data.graph_data;
        for (name, series) in [
            ("offense_attempts", &graphs.offense_attempts),
            ("offense_successes", &graphs.offense_successes),
            ("defense_attempts", &graphs.defense_attempts),
            ("defense_successes", &graphs.defense_successes),
        ] {
            if series.labels.len() != series.values.len() {
                return Err(ReportError::MisalignedSeries {
                    report_id: self.id,
                    series: name,
                    labels: series.labels.len(),
                    values: series.values.len(),
                });
            }
            if let Some(value) = series.values.iter().find(|value| !value.is_finite()) {
                return Err(ReportError::InvalidValue {
                    report_id: self.id,
                    series: name,
                    value: *value,
                });
            }
        }
        Ok(())
    }

    /// The date printed on the report, falling back to the upload timestamp.
    pub fn display_date(&self) -> &str {
        let date = self.pdf_data.report_date.trim();
        if date.is_empty() {
            &self.uploaded_at
        } else {
            date
        }
    }

    /// Upload time as UTC, if the backend timestamp is parseable.
    pub fn uploaded_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.uploaded_at)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Errors produced while loading or validating a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("report payload is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("report {report_id}: series {series} has {labels} labels but {values} values")]
    MisalignedSeries {
        report_id: u64,
        series: &'static str,
        labels: usize,
        values: usize,
    },

    #[error("report {report_id}: series {series} contains non-finite value {value}")]
    InvalidValue {
        report_id: u64,
        series: &'static str,
        value: f64,
    },

    #[error("report {0} not found")]
    NotFound(u64),
}

/// Column used to order a report listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortKey {
    Filename,
    FileSize,
    UploadedAt,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Returns `reports` ordered by `key`.
///
/// Filenames compare case-insensitively; unparseable timestamps sort before
/// parseable ones. The sort is stable.
pub fn sort_reports(reports: &[Report], key: SortKey, direction: SortDirection) -> Vec<Report> {
    let mut sorted = reports.to_vec();
    sorted.sort_by(|a, b| {
        let ordering = match key {
            SortKey::Filename => a.filename.to_lowercase().cmp(&b.filename.to_lowercase()),
            SortKey::FileSize => a
                .file_size_mb
                .partial_cmp(&b.file_size_mb)
                .unwrap_or(Ordering::Equal),
            SortKey::UploadedAt => a.uploaded_at_utc().cmp(&b.uploaded_at_utc()),
        };
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
    sorted
}
