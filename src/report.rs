//! Composition of a report into pages.
//!
//! The section order is fixed:
//!
//! 1. title block
//! 2. submissions, match types, win/loss ratio (bullets) and points (numbered)
//! 3. the four chart sections, each on a fresh page
//! 4. final analysis with an optional disclaimer

use log::warn;

use crate::charts::{ChartImages, ChartKind};
use crate::elements::decode_image_from_bytes;
use crate::fonts::TextMeasure;
use crate::layout::{Colour, Layout, LayoutPlan, ListMarker, PageGeometry, TextStyle};
use crate::model::{GraphSeries, Report};

pub const REPORT_TITLE: &str = "Jiu-Jitsu Match Report";
pub const FINAL_SECTION_TITLE: &str = "Final Analysis & Recommendation";
pub const KEY_TAKEAWAY: &str = "Key Takeaway";

pub const EMPTY_LIST_PLACEHOLDER: &str = "No data available";
pub const EMPTY_NARRATIVE_PLACEHOLDER: &str = "No analysis available.";
pub const EMPTY_SUMMARY_PLACEHOLDER: &str = "No summary available.";

const LINE_HEIGHT: f64 = 20.0;
const SECTION_COLOUR: Colour = Colour::rgb(0.2, 0.2, 0.6);
const CAPTION_COLOUR: Colour = Colour::rgb(0.35, 0.35, 0.35);
const DISCLAIMER_COLOUR: Colour = Colour::rgb(0.7, 0.2, 0.2);

const TITLE: TextStyle = TextStyle::bold(22.0);
const ATHLETE: TextStyle = TextStyle::bold(14.0);
const INFO: TextStyle = TextStyle::regular(12.0);
const SECTION: TextStyle = TextStyle::bold(14.0).with_colour(SECTION_COLOUR);
const SUBHEADING: TextStyle = TextStyle::bold(12.0);
const BODY: TextStyle = TextStyle::regular(11.0);
const CAPTION: TextStyle = TextStyle::regular(9.0).with_colour(CAPTION_COLOUR);
const DISCLAIMER: TextStyle = TextStyle::regular(9.0).with_colour(DISCLAIMER_COLOUR);

/// Line shown where a chart could not be decoded.
pub fn chart_placeholder(kind: ChartKind) -> String {
    format!("Chart unavailable: {}", kind.title())
}

/// Lays out `report` with its chart rasters on pages of `geometry`.
///
/// Charts that are missing or fail to decode become a placeholder line; the
/// rest of the document is unaffected.
pub fn layout_report<M>(
    report: &Report,
    charts: &ChartImages,
    measure: &M,
    geometry: PageGeometry,
) -> LayoutPlan
where
    M: TextMeasure + ?Sized,
{
    let mut layout = Layout::new(measure, geometry);

    title_block(&mut layout, report);

    let data = &report.pdf_data;
    list_section(&mut layout, "Submissions", &data.submissions, ListMarker::Bullet);
    list_section(&mut layout, "Match Types", &data.match_types, ListMarker::Bullet);
    list_section(&mut layout, "Win/Loss Ratio", &data.win_loss_ratio, ListMarker::Bullet);
    list_section(&mut layout, "Points", &data.points, ListMarker::Numbered);

    for kind in ChartKind::ALL {
        chart_section(&mut layout, report, charts, kind);
    }

    final_section(&mut layout, report);
    layout.finish()
}

fn title_block<M: TextMeasure + ?Sized>(layout: &mut Layout<'_, M>, report: &Report) {
    layout.paragraph(REPORT_TITLE, TITLE, 0.0, LINE_HEIGHT * 1.5);

    let athlete = report.pdf_data.athlete_name.trim();
    let athlete = if athlete.is_empty() { "Unknown athlete" } else { athlete };
    layout.paragraph(&format!("Athlete: {athlete}"), ATHLETE, 0.0, LINE_HEIGHT);
    layout.paragraph(
        &format!("Report Date: {}", report.display_date()),
        INFO,
        0.0,
        LINE_HEIGHT,
    );
    layout.paragraph(&format!("Source File: {}", report.filename), INFO, 0.0, LINE_HEIGHT);
    if !report.uploaded_by.trim().is_empty() {
        layout.paragraph(
            &format!("Uploaded By: {}", report.uploaded_by.trim()),
            INFO,
            0.0,
            LINE_HEIGHT,
        );
    }
    layout.gap(LINE_HEIGHT * 0.5);
}

fn list_section<M: TextMeasure + ?Sized>(
    layout: &mut Layout<'_, M>,
    title: &str,
    items: &[String],
    marker: ListMarker,
) {
    layout.heading(title, SECTION, LINE_HEIGHT);
    layout.list(items, marker, BODY, LINE_HEIGHT * 0.9, EMPTY_LIST_PLACEHOLDER);
    layout.gap(LINE_HEIGHT * 0.5);
}

fn legend(series: &GraphSeries) -> String {
    series
        .points()
        .map(|(label, value)| format!("{label}: {value}"))
        .collect::<Vec<_>>()
        .join("  |  ")
}

fn chart_section<M: TextMeasure + ?Sized>(
    layout: &mut Layout<'_, M>,
    report: &Report,
    charts: &ChartImages,
    kind: ChartKind,
) {
    layout.start_new_page();
    layout.heading(kind.title(), SECTION, LINE_HEIGHT);

    let decoded = match charts.get(kind) {
        Some(bytes) => match decode_image_from_bytes(bytes) {
            Ok(image) => Some(image),
            Err(err) => {
                warn!("Chart '{}' could not be decoded: {}", kind.title(), err);
                None
            }
        },
        None => {
            warn!("Chart '{}' was not rendered", kind.title());
            None
        }
    };

    match decoded {
        Some(image) => {
            layout.gap(LINE_HEIGHT * 0.25);
            // Stay on the heading's page.
            let room = layout.cursor().remaining();
            layout.image_within(image, room);
            layout.gap(LINE_HEIGHT * 0.25);
            let series = kind.series(report);
            if !series.is_empty() {
                layout.paragraph(&legend(series), CAPTION, 0.0, LINE_HEIGHT * 0.7);
            }
        }
        None => layout.paragraph(&chart_placeholder(kind), BODY, 0.0, LINE_HEIGHT),
    }

    layout.gap(LINE_HEIGHT * 0.5);
    layout.paragraph(KEY_TAKEAWAY, SUBHEADING, 0.0, LINE_HEIGHT);
    narrative(layout, kind.narrative(report), EMPTY_NARRATIVE_PLACEHOLDER);
}

fn narrative<M: TextMeasure + ?Sized>(layout: &mut Layout<'_, M>, text: &str, placeholder: &str) {
    let text = if text.trim().is_empty() { placeholder } else { text.trim() };
    layout.paragraph(text, BODY, 0.0, LINE_HEIGHT * 0.8);
}

fn final_section<M: TextMeasure + ?Sized>(layout: &mut Layout<'_, M>, report: &Report) {
    let summary = &report.pdf_data.final_summary;
    layout.gap(LINE_HEIGHT);
    layout.heading(FINAL_SECTION_TITLE, SECTION, LINE_HEIGHT);
    narrative(layout, &summary.text, EMPTY_SUMMARY_PLACEHOLDER);

    if let Some(disclaimer) = summary.disclaimer.as_deref().map(str::trim) {
        if !disclaimer.is_empty() {
            layout.gap(LINE_HEIGHT * 0.5);
            layout.paragraph(disclaimer, DISCLAIMER, 0.0, LINE_HEIGHT * 0.8);
        }
    }
}
