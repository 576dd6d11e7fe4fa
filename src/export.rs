//! Turning a report into a delivered PDF.
//!
//! [`ReportExporter::export`] lays the report out, renders it and hands the
//! bytes to an [`ArtifactSink`] exactly once. If any fatal step fails the sink
//! is never called.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::charts::ChartImages;
use crate::fonts::{self, FontSet};
use crate::layout::PageGeometry;
use crate::model::Report;
use crate::render::{render_plan, RenderError};
use crate::report::{layout_report, REPORT_TITLE};

pub use crate::layout::SectionMark;

/// Receives the finished document, e.g. as a download or a file on disk.
pub trait ArtifactSink {
    fn deliver(&mut self, bytes: &[u8], filename: &str) -> io::Result<()>;
}

/// Writes artifacts into a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    directory: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            written: Vec::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Paths written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ArtifactSink for DirectorySink {
    fn deliver(&mut self, bytes: &[u8], filename: &str) -> io::Result<()> {
        fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(filename);
        fs::write(&path, bytes)?;
        info!("Wrote {} ({} bytes)", path.display(), bytes.len());
        self.written.push(path);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to load fonts: {0}")]
    Font(#[from] genpdf::error::Error),

    #[error(transparent)]
    Pdf(#[from] RenderError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to deliver {filename}: {source}")]
    Delivery {
        filename: String,
        #[source]
        source: io::Error,
    },
}

/// A rendered report.
#[derive(Debug, Clone)]
pub struct ExportedDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub page_count: usize,
    pub sections: Vec<SectionMark>,
}

/// Download filename for a report: the athlete name with whitespace runs
/// replaced by underscores, suffixed with `_report.pdf`.
pub fn suggested_filename(athlete_name: &str) -> String {
    let stem = athlete_name.split_whitespace().collect::<Vec<_>>().join("_");
    let stem = stem.replace(['/', '\\'], "_");
    if stem.is_empty() {
        "athlete_report.pdf".to_string()
    } else {
        format!("{stem}_report.pdf")
    }
}

/// Lays out and renders reports with one font set.
#[derive(Debug)]
pub struct ReportExporter {
    fonts: FontSet,
    geometry: PageGeometry,
}

impl ReportExporter {
    pub fn new(fonts: FontSet) -> Self {
        Self {
            fonts,
            geometry: PageGeometry::A4,
        }
    }

    /// Uses the discovered font family, falling back to Helvetica.
    pub fn with_default_fonts() -> Result<Self, ExportError> {
        Ok(Self::new(fonts::default_font_set()?))
    }

    /// Sets the page geometry and returns the updated exporter.
    pub fn with_geometry(mut self, geometry: PageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn fonts(&self) -> &FontSet {
        &self.fonts
    }

    /// Renders `report` without delivering it.
    pub fn render(
        &self,
        report: &Report,
        charts: &ChartImages,
    ) -> Result<ExportedDocument, ExportError> {
        let plan = layout_report(report, charts, &self.fonts, self.geometry);
        debug!(
            "Laid out report {} on {} page(s) with {} of 4 charts in {}{}",
            report.id,
            plan.page_count,
            charts.available(),
            self.fonts.family_name(),
            if self.fonts.is_builtin() { " (built-in)" } else { "" }
        );
        let bytes = render_plan(&plan, &self.fonts, REPORT_TITLE)?;
        Ok(ExportedDocument {
            bytes,
            filename: suggested_filename(&report.pdf_data.athlete_name),
            page_count: plan.page_count,
            sections: plan.sections,
        })
    }

    /// Renders `report` and delivers it to `sink`.
    pub fn export(
        &self,
        report: &Report,
        charts: &ChartImages,
        sink: &mut dyn ArtifactSink,
    ) -> Result<ExportedDocument, ExportError> {
        let document = self.render(report, charts)?;
        sink.deliver(&document.bytes, &document.filename)
            .map_err(|source| ExportError::Delivery {
                filename: document.filename.clone(),
                source,
            })?;
        info!(
            "Exported report {} as {} ({} page(s))",
            report.id, document.filename, document.page_count
        );
        Ok(document)
    }
}
