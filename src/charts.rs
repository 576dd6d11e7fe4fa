//! The four report charts and their off-screen rasterization.
//!
//! Charts are rendered to PNG bytes before layout starts. A chart that fails
//! to render leaves an empty slot, which the exporter turns into a
//! placeholder line instead of aborting the document.

use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgb, RgbImage};
use log::warn;

use crate::config::ExportConfig;
use crate::model::{GraphSeries, Report};

/// One of the four charts, in document order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChartKind {
    OffenseSuccesses,
    OffenseAttempts,
    DefenseSuccesses,
    DefenseAttempts,
}

impl ChartKind {
    pub const ALL: [ChartKind; 4] = [
        ChartKind::OffenseSuccesses,
        ChartKind::OffenseAttempts,
        ChartKind::DefenseSuccesses,
        ChartKind::DefenseAttempts,
    ];

    /// Title of the document section that shows this chart.
    pub fn title(self) -> &'static str {
        match self {
            ChartKind::OffenseSuccesses => "Offensive Move Analysis",
            ChartKind::OffenseAttempts => "Offensive Attempts",
            ChartKind::DefenseSuccesses => "Defensive Move Analysis",
            ChartKind::DefenseAttempts => "Defensive Attempts",
        }
    }

    pub fn series(self, report: &Report) -> &GraphSeries {
        let graphs = &report.pdf_data.graph_data;
        match self {
            ChartKind::OffenseSuccesses => &graphs.offense_successes,
            ChartKind::OffenseAttempts => &graphs.offense_attempts,
            ChartKind::DefenseSuccesses => &graphs.defense_successes,
            ChartKind::DefenseAttempts => &graphs.defense_attempts,
        }
    }

    /// Narrative printed under the chart.
    pub fn narrative(self, report: &Report) -> &str {
        let data = &report.pdf_data;
        match self {
            ChartKind::OffenseSuccesses => &data.offensive_analysis.successful,
            ChartKind::OffenseAttempts => &data.offensive_analysis.attempted,
            ChartKind::DefenseSuccesses => &data.defensive_analysis.successful,
            ChartKind::DefenseAttempts => &data.defensive_analysis.attempted,
        }
    }

    fn index(self) -> usize {
        match self {
            ChartKind::OffenseSuccesses => 0,
            ChartKind::OffenseAttempts => 1,
            ChartKind::DefenseSuccesses => 2,
            ChartKind::DefenseAttempts => 3,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("chart size {width}x{height} is not drawable")]
    InvalidSize { width: u32, height: u32 },

    #[error("{bars} bars do not fit in a {width} px wide chart")]
    TooManyBars { bars: usize, width: u32 },

    #[error("failed to encode chart: {0}")]
    Encode(#[from] image::ImageError),

    #[error("{0}")]
    Other(String),
}

/// Produces a raster (PNG or JPEG bytes) for one series.
pub trait ChartRenderer {
    fn render_series(
        &self,
        series: &GraphSeries,
        title: &str,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, ChartError>;
}

/// Built-in vertical bar chart.
#[derive(Clone, Debug)]
pub struct BarChartRenderer {
    background: Rgb<u8>,
    axis: Rgb<u8>,
    palette: Vec<Rgb<u8>>,
}

impl Default for BarChartRenderer {
    fn default() -> Self {
        Self {
            background: Rgb([255, 255, 255]),
            axis: Rgb([90, 90, 90]),
            palette: vec![
                Rgb([54, 162, 235]),
                Rgb([255, 99, 132]),
                Rgb([75, 192, 192]),
                Rgb([255, 159, 64]),
                Rgb([153, 102, 255]),
                Rgb([255, 205, 86]),
            ],
        }
    }
}

impl BarChartRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bar colours and returns the updated renderer.
    pub fn with_palette(mut self, palette: Vec<Rgb<u8>>) -> Self {
        if !palette.is_empty() {
            self.palette = palette;
        }
        self
    }

    fn draw(&self, series: &GraphSeries, width: u32, height: u32) -> Result<RgbImage, ChartError> {
        let mut canvas: RgbImage = ImageBuffer::from_pixel(width, height, self.background);

        let margin_x = width / 12;
        let margin_y = height / 10;
        let plot_left = margin_x;
        let plot_right = width.saturating_sub(margin_x / 2).max(plot_left + 1);
        let plot_top = margin_y / 2;
        let plot_bottom = height.saturating_sub(margin_y).max(plot_top + 1);

        fill_rect(&mut canvas, plot_left, plot_top, 2, plot_bottom - plot_top, self.axis);
        fill_rect(&mut canvas, plot_left, plot_bottom, plot_right - plot_left, 2, self.axis);

        let max = series.max_value();
        if series.is_empty() || max <= 0.0 {
            return Ok(canvas);
        }

        // Every bar needs at least one pixel column.
        let slot = u32::try_from(series.len())
            .ok()
            .map(|count| (plot_right - plot_left).saturating_sub(2) / count)
            .filter(|slot| *slot > 0)
            .ok_or(ChartError::TooManyBars {
                bars: series.len(),
                width,
            })?;
        let bar_width = (slot * 3 / 5).max(1);
        let plot_height = f64::from(plot_bottom - plot_top);

        for (index, (_, value)) in series.points().enumerate() {
            let bar_height = ((value.max(0.0) / max) * plot_height).round() as u32;
            let x = plot_left + 2 + slot * index as u32 + (slot - bar_width) / 2;
            let colour = self.palette[index % self.palette.len()];
            fill_rect(
                &mut canvas,
                x,
                plot_bottom.saturating_sub(bar_height),
                bar_width,
                bar_height,
                colour,
            );
        }
        Ok(canvas)
    }
}

fn fill_rect(canvas: &mut RgbImage, x: u32, y: u32, width: u32, height: u32, colour: Rgb<u8>) {
    let x_end = x.saturating_add(width).min(canvas.width());
    let y_end = y.saturating_add(height).min(canvas.height());
    for py in y..y_end {
        for px in x..x_end {
            canvas.put_pixel(px, py, colour);
        }
    }
}

impl ChartRenderer for BarChartRenderer {
    /// Draws bars and axes only. `title` is not drawn; the exporter prints
    /// the section heading and a `label: value` caption around the image.
    fn render_series(
        &self,
        series: &GraphSeries,
        _title: &str,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, ChartError> {
        if width < 16 || height < 16 {
            return Err(ChartError::InvalidSize { width, height });
        }
        let canvas = self.draw(series, width, height)?;
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(canvas).write_to(&mut bytes, ImageOutputFormat::Png)?;
        Ok(bytes)
    }
}

/// Rendered chart rasters, one optional slot per [`ChartKind`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChartImages {
    slots: [Option<Vec<u8>>; 4],
}

impl ChartImages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the raster for `kind` and returns the updated set.
    pub fn with_image(mut self, kind: ChartKind, bytes: impl Into<Vec<u8>>) -> Self {
        self.set(kind, Some(bytes.into()));
        self
    }

    pub fn set(&mut self, kind: ChartKind, bytes: Option<Vec<u8>>) {
        self.slots[kind.index()] = bytes;
    }

    pub fn get(&self, kind: ChartKind) -> Option<&[u8]> {
        self.slots[kind.index()].as_deref()
    }

    /// Number of slots holding a raster.
    pub fn available(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Renders all four charts of `report` at the configured size.
    pub fn render_all(
        report: &Report,
        renderer: &dyn ChartRenderer,
        config: &ExportConfig,
    ) -> Self {
        let mut images = Self::new();
        for kind in ChartKind::ALL {
            match renderer.render_series(
                kind.series(report),
                kind.title(),
                config.chart_width,
                config.chart_height,
            ) {
                Ok(bytes) => images.set(kind, Some(bytes)),
                Err(err) => warn!("Chart '{}' could not be rendered: {}", kind.title(), err),
            }
        }
        images
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    #[test]
    fn bar_chart_is_a_png_of_the_requested_size() {
        let series = GraphSeries::new([("Single Leg", 7.0), ("Guard Pass", 3.0)]);
        let bytes = BarChartRenderer::new()
            .render_series(&series, "Offensive Attempts", 300, 200)
            .unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (300, 200));
    }

    #[test]
    fn tallest_bar_reaches_the_plot_top() {
        let renderer = BarChartRenderer::new().with_palette(vec![Rgb([200, 0, 0])]);
        let canvas = renderer
            .draw(&GraphSeries::new([("Arm Bar", 5.0)]), 240, 200)
            .unwrap();
        // Plot top is height/10/2 = 10; the bar is centred in the single slot.
        let centre = 20 + 2 + (240 - 10 - 20 - 2) / 2;
        assert_eq!(*canvas.get_pixel(centre, 10), Rgb([200, 0, 0]));
        assert_eq!(*canvas.get_pixel(centre, 9), Rgb([255, 255, 255]));
    }

    #[test]
    fn tiny_sizes_are_rejected() {
        let err = BarChartRenderer::new()
            .render_series(&GraphSeries::default(), "x", 4, 4)
            .unwrap_err();
        assert!(matches!(err, ChartError::InvalidSize { width: 4, height: 4 }));
    }

    #[test]
    fn more_bars_than_pixels_is_an_error() {
        let crowded = GraphSeries::new((0..1000).map(|i| (format!("Move {i}"), 1.0)));
        let err = BarChartRenderer::new()
            .render_series(&crowded, "Offensive Attempts", 900, 520)
            .unwrap_err();
        assert!(matches!(err, ChartError::TooManyBars { bars: 1000, width: 900 }));

        let small = GraphSeries::new((0..100).map(|i| (format!("Move {i}"), 1.0)));
        assert!(BarChartRenderer::new()
            .render_series(&small, "Offensive Attempts", 64, 48)
            .is_err());
    }

    #[test]
    fn crowded_series_leaves_an_empty_slot_instead_of_aborting() {
        let mut report = Report::new(1, "match.csv", "2024-01-01T00:00:00Z");
        report.pdf_data.graph_data.offense_attempts =
            GraphSeries::new((0..1000).map(|i| (format!("Move {i}"), 1.0)));
        report.pdf_data.graph_data.defense_attempts = GraphSeries::new([("Sprawl", 3.0)]);

        let images =
            ChartImages::render_all(&report, &BarChartRenderer::new(), &ExportConfig::default());
        assert!(images.get(ChartKind::OffenseAttempts).is_none());
        assert_eq!(images.available(), 3);
    }

    struct FailOn(ChartKind);

    impl ChartRenderer for FailOn {
        fn render_series(
            &self,
            _series: &GraphSeries,
            title: &str,
            width: u32,
            height: u32,
        ) -> Result<Vec<u8>, ChartError> {
            if title == self.0.title() {
                Err(ChartError::Other("renderer crashed".into()))
            } else {
                BarChartRenderer::new().render_series(&GraphSeries::default(), title, width, height)
            }
        }
    }

    #[test]
    fn one_failing_chart_leaves_one_empty_slot() {
        let report = Report::new(1, "match.csv", "2024-01-01T00:00:00Z");
        let images = ChartImages::render_all(
            &report,
            &FailOn(ChartKind::DefenseSuccesses),
            &ExportConfig::default(),
        );
        assert_eq!(images.available(), 3);
        assert!(images.get(ChartKind::DefenseSuccesses).is_none());
        assert!(images.get(ChartKind::OffenseAttempts).is_some());
    }
}
