//! Greedy single-pass page layout.
//!
//! Layout produces a [`LayoutPlan`]: absolute placements on fixed-size pages
//! in PDF points, with the origin at the bottom-left corner of each page. The
//! plan is independent of the PDF backend, which makes pagination testable
//! without parsing PDF output.
//!
//! Every placement first asks the [`LayoutCursor`] for room. When the next
//! unit (a single text line or a single image) does not fit above the bottom
//! margin, a new page is allocated and the cursor resets to the top margin.
//! There is no look-ahead beyond that unit.

use image::{DynamicImage, GenericImageView};

use crate::elements::fit_to_column;
use crate::fonts::{FontFace, TextMeasure};

/// Page size and margins in points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
}

impl PageGeometry {
    /// A4 portrait with a 50pt side margin, writing from y = 800 down to y = 80.
    pub const A4: PageGeometry = PageGeometry {
        width: 595.0,
        height: 842.0,
        margin_left: 50.0,
        margin_right: 50.0,
        margin_top: 42.0,
        margin_bottom: 80.0,
    };

    /// Usable text width between the side margins.
    pub fn column_width(&self) -> f64 {
        self.width - self.margin_left - self.margin_right
    }

    /// Y coordinate where writing starts on a fresh page.
    pub fn top(&self) -> f64 {
        self.height - self.margin_top
    }

    /// Lowest y coordinate any placement may reach.
    pub fn bottom(&self) -> f64 {
        self.margin_bottom
    }

    /// Height available on an empty page.
    pub fn usable_height(&self) -> f64 {
        self.top() - self.bottom()
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::A4
    }
}

/// RGB colour with components in `0.0..=1.0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Colour {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Colour {
    pub const BLACK: Colour = Colour::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextStyle {
    pub face: FontFace,
    pub size: f64,
    pub colour: Colour,
}

impl TextStyle {
    pub const fn regular(size: f64) -> Self {
        Self {
            face: FontFace::Regular,
            size,
            colour: Colour::BLACK,
        }
    }

    pub const fn bold(size: f64) -> Self {
        Self {
            face: FontFace::Bold,
            size,
            colour: Colour::BLACK,
        }
    }

    /// Sets the colour and returns the updated style.
    pub const fn with_colour(mut self, colour: Colour) -> Self {
        self.colour = colour;
        self
    }
}

/// One positioned item on a page.
#[derive(Clone, Debug, PartialEq)]
pub enum Placement {
    /// A single line of text; `y` is the baseline.
    Text {
        page: usize,
        x: f64,
        y: f64,
        text: String,
        style: TextStyle,
    },
    /// A filled round list marker centred on (`x`, `y`).
    Bullet {
        page: usize,
        x: f64,
        y: f64,
        radius: f64,
        colour: Colour,
    },
    /// An image whose lower-left corner is (`x`, `y`); `image` indexes [`LayoutPlan::images`].
    Image {
        page: usize,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        image: usize,
    },
}

impl Placement {
    pub fn page(&self) -> usize {
        match self {
            Placement::Text { page, .. }
            | Placement::Bullet { page, .. }
            | Placement::Image { page, .. } => *page,
        }
    }
}

/// A section title and the zero-based page it starts on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionMark {
    pub title: String,
    pub page: usize,
}

/// Write position on the current page.
#[derive(Clone, Debug)]
pub struct LayoutCursor {
    geometry: PageGeometry,
    page: usize,
    y: f64,
}

impl LayoutCursor {
    pub fn new(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            page: 0,
            y: geometry.top(),
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    /// Space left above the bottom margin.
    pub fn remaining(&self) -> f64 {
        self.y - self.geometry.bottom()
    }

    pub fn at_page_top(&self) -> bool {
        (self.y - self.geometry.top()).abs() < f64::EPSILON
    }

    pub fn new_page(&mut self) {
        self.page += 1;
        self.y = self.geometry.top();
    }

    /// Allocates a new page unless `height` fits on the current one.
    ///
    /// Returns true when a page was added.
    pub fn ensure_space(&mut self, height: f64) -> bool {
        if self.remaining() + 1e-9 < height && !self.at_page_top() {
            self.new_page();
            true
        } else {
            false
        }
    }

    /// Moves down by `dy`, stopping at the bottom margin.
    pub fn advance(&mut self, dy: f64) {
        self.y = (self.y - dy).max(self.geometry.bottom());
    }
}

/// The result of laying out a document.
#[derive(Clone, Debug)]
pub struct LayoutPlan {
    pub geometry: PageGeometry,
    pub page_count: usize,
    pub placements: Vec<Placement>,
    pub images: Vec<DynamicImage>,
    pub sections: Vec<SectionMark>,
}

impl LayoutPlan {
    pub fn placements_on(&self, page: usize) -> impl Iterator<Item = &Placement> {
        self.placements.iter().filter(move |p| p.page() == page)
    }

    /// All text lines in placement order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.placements.iter().filter_map(|p| match p {
            Placement::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn section(&self, title: &str) -> Option<&SectionMark> {
        self.sections.iter().find(|mark| mark.title == title)
    }
}

/// Breaks `text` into lines no wider than `width` when set in `style`.
///
/// Words are packed greedily. Newlines in `text` always start a new line and
/// blank input lines are kept as empty strings. A word wider than `width` on
/// its own is split between characters.
pub fn wrap_text<M>(measure: &M, text: &str, style: &TextStyle, width: f64) -> Vec<String>
where
    M: TextMeasure + ?Sized,
{
    let fits =
        |candidate: &str| measure.text_width(candidate, style.face, style.size) <= width + 1e-9;
    let mut lines = Vec::new();

    for raw_line in text.lines() {
        let mut current = String::new();
        for word in raw_line.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_owned()
            } else {
                format!("{current} {word}")
            };
            if fits(&candidate) {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if fits(word) {
                current = word.to_owned();
            } else {
                let mut pieces = break_word(word, &fits);
                current = pieces.pop().unwrap_or_default();
                lines.extend(pieces);
            }
        }
        lines.push(current);
    }
    lines
}

fn break_word(word: &str, fits: &dyn Fn(&str) -> bool) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();
    for ch in word.chars() {
        piece.push(ch);
        if !fits(&piece) && piece.chars().count() > 1 {
            piece.pop();
            pieces.push(std::mem::take(&mut piece));
            piece.push(ch);
        }
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}

/// Marker style of a list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListMarker {
    Bullet,
    Numbered,
}

/// Indent of list markers from the left margin.
pub const LIST_MARKER_INDENT: f64 = 10.0;

/// Accumulates placements while walking a cursor down the pages.
pub struct Layout<'a, M: TextMeasure + ?Sized> {
    measure: &'a M,
    cursor: LayoutCursor,
    placements: Vec<Placement>,
    images: Vec<DynamicImage>,
    sections: Vec<SectionMark>,
}

impl<'a, M: TextMeasure + ?Sized> Layout<'a, M> {
    pub fn new(measure: &'a M, geometry: PageGeometry) -> Self {
        Self {
            measure,
            cursor: LayoutCursor::new(geometry),
            placements: Vec::new(),
            images: Vec::new(),
            sections: Vec::new(),
        }
    }

    pub fn cursor(&self) -> &LayoutCursor {
        &self.cursor
    }

    fn geometry(&self) -> PageGeometry {
        *self.cursor.geometry()
    }

    fn page_has_content(&self) -> bool {
        let page = self.cursor.page();
        self.placements.iter().any(|p| p.page() == page)
    }

    /// Continues on a fresh page unless the current page is still empty.
    pub fn start_new_page(&mut self) {
        if self.page_has_content() || !self.cursor.at_page_top() {
            self.cursor.new_page();
        }
    }

    /// Vertical whitespace. Never crosses onto a new page.
    pub fn gap(&mut self, dy: f64) {
        self.cursor.advance(dy);
    }

    /// Places one unwrapped line at `indent` from the left margin.
    pub fn line(&mut self, text: &str, style: TextStyle, indent: f64, line_height: f64) {
        let advance = line_height.max(style.size);
        self.cursor.ensure_space(advance);
        if !text.is_empty() {
            let placement = Placement::Text {
                page: self.cursor.page(),
                x: self.geometry().margin_left + indent,
                y: self.cursor.y() - style.size,
                text: text.to_owned(),
                style,
            };
            self.placements.push(placement);
        }
        self.cursor.advance(advance);
    }

    /// A section heading, recorded as a [`SectionMark`] on the page it lands on.
    pub fn heading(&mut self, title: &str, style: TextStyle, line_height: f64) {
        self.cursor.ensure_space(line_height.max(style.size));
        self.sections.push(SectionMark {
            title: title.to_owned(),
            page: self.cursor.page(),
        });
        self.line(title, style, 0.0, line_height);
    }

    /// Wrapped text starting `indent` points from the left margin.
    pub fn paragraph(&mut self, text: &str, style: TextStyle, indent: f64, line_height: f64) {
        let width = self.geometry().column_width() - indent;
        for line in wrap_text(self.measure, text, &style, width) {
            self.line(&line, style, indent, line_height);
        }
    }

    /// A list with hanging indent; an empty list renders `placeholder` as its only item.
    pub fn list<S: AsRef<str>>(
        &mut self,
        items: &[S],
        marker: ListMarker,
        style: TextStyle,
        line_height: f64,
        placeholder: &str,
    ) {
        let items: Vec<&str> = if items.iter().all(|item| item.as_ref().trim().is_empty()) {
            vec![placeholder]
        } else {
            items
                .iter()
                .map(AsRef::as_ref)
                .filter(|item| !item.trim().is_empty())
                .collect()
        };

        let marker_width = match marker {
            ListMarker::Bullet => self.measure.text_width("\u{2022} ", style.face, style.size),
            ListMarker::Numbered => {
                let widest = format!("{}. ", items.len());
                self.measure.text_width(&widest, style.face, style.size)
            }
        };
        let text_indent = LIST_MARKER_INDENT + marker_width;
        let width = self.geometry().column_width() - text_indent;
        let advance = line_height.max(style.size);

        for (index, item) in items.iter().enumerate() {
            for (line_no, line) in wrap_text(self.measure, item, &style, width)
                .into_iter()
                .enumerate()
            {
                self.cursor.ensure_space(advance);
                if line_no == 0 {
                    self.place_marker(marker, index + 1, style);
                }
                if !line.is_empty() {
                    let placement = Placement::Text {
                        page: self.cursor.page(),
                        x: self.geometry().margin_left + text_indent,
                        y: self.cursor.y() - style.size,
                        text: line,
                        style,
                    };
                    self.placements.push(placement);
                }
                self.cursor.advance(advance);
            }
        }
    }

    fn place_marker(&mut self, marker: ListMarker, number: usize, style: TextStyle) {
        let x = self.geometry().margin_left + LIST_MARKER_INDENT;
        let baseline = self.cursor.y() - style.size;
        let page = self.cursor.page();
        match marker {
            ListMarker::Bullet => {
                let radius = style.size * 0.17;
                self.placements.push(Placement::Bullet {
                    page,
                    x: x + radius,
                    y: baseline + style.size * 0.33,
                    radius,
                    colour: style.colour,
                });
            }
            ListMarker::Numbered => self.placements.push(Placement::Text {
                page,
                x,
                y: baseline,
                text: format!("{number}."),
                style,
            }),
        }
    }

    /// Places `image` centred in the column at full column width.
    ///
    /// The aspect ratio is preserved. An image too tall for an empty page is
    /// scaled down uniformly to the usable page height.
    pub fn image(&mut self, image: DynamicImage) {
        let max_height = self.geometry().usable_height();
        self.image_within(image, max_height);
    }

    /// Like [`Layout::image`], but never taller than `max_height` points.
    pub fn image_within(&mut self, image: DynamicImage, max_height: f64) {
        let geometry = self.geometry();
        let (px_width, px_height) = image.dimensions();
        let (width, height) = fit_to_column(
            f64::from(px_width),
            f64::from(px_height),
            geometry.column_width(),
            max_height.min(geometry.usable_height()),
        );
        if width <= 0.0 || height <= 0.0 {
            return;
        }
        self.cursor.ensure_space(height);
        let index = self.images.len();
        self.images.push(image);
        self.placements.push(Placement::Image {
            page: self.cursor.page(),
            x: geometry.margin_left + (geometry.column_width() - width) / 2.0,
            y: self.cursor.y() - height,
            width,
            height,
            image: index,
        });
        self.cursor.advance(height);
    }

    pub fn finish(self) -> LayoutPlan {
        LayoutPlan {
            geometry: *self.cursor.geometry(),
            page_count: self.cursor.page() + 1,
            placements: self.placements,
            images: self.images,
            sections: self.sections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::BuiltinMetrics;

    /// Every character is `size` points wide.
    struct Monospace;

    impl TextMeasure for Monospace {
        fn text_width(&self, text: &str, _face: FontFace, size: f64) -> f64 {
            text.chars().count() as f64 * size
        }
    }

    const STYLE: TextStyle = TextStyle::regular(10.0);

    #[test]
    fn wrap_packs_words_greedily() {
        let lines = wrap_text(&Monospace, "aa bb cc dd", &STYLE, 50.0);
        assert_eq!(lines, vec!["aa bb", "cc dd"]);
    }

    #[test]
    fn wrap_honours_newlines_and_blank_lines() {
        let lines = wrap_text(&Monospace, "one\n\ntwo three", &STYLE, 1000.0);
        assert_eq!(lines, vec!["one", "", "two three"]);
    }

    #[test]
    fn overlong_words_are_split_between_characters() {
        let lines = wrap_text(&Monospace, "ab abcdefghij", &STYLE, 40.0);
        assert_eq!(lines, vec!["ab", "abcd", "efgh", "ij"]);
        assert!(lines.iter().all(|line| line.chars().count() <= 4));
    }

    #[test]
    fn wrapped_lines_never_exceed_width_with_real_metrics() {
        let text = "Athlete consistently secured dominant positions through well-timed guard \
                    passes and controlled top pressure, finishing with an armbar from mount.";
        for width in [80.0, 150.0, 300.0, 495.0] {
            for line in wrap_text(&BuiltinMetrics, text, &TextStyle::regular(11.0), width) {
                assert!(BuiltinMetrics.text_width(&line, FontFace::Regular, 11.0) <= width + 1e-9);
            }
        }
    }

    #[test]
    fn cursor_allocates_page_when_unit_does_not_fit() {
        let mut cursor = LayoutCursor::new(PageGeometry::A4);
        cursor.advance(700.0);
        assert!((cursor.y() - 100.0).abs() < 1e-9);
        assert!(!cursor.ensure_space(20.0));
        assert!(cursor.ensure_space(20.1));
        assert_eq!(cursor.page(), 1);
        assert!(cursor.at_page_top());
    }

    #[test]
    fn advance_stops_at_bottom_margin() {
        let mut cursor = LayoutCursor::new(PageGeometry::A4);
        cursor.advance(10_000.0);
        assert_eq!(cursor.y(), PageGeometry::A4.bottom());
        assert_eq!(cursor.page(), 0);
    }

    #[test]
    fn long_text_paginates_without_crossing_the_bottom_margin() {
        let mut layout = Layout::new(&Monospace, PageGeometry::A4);
        let text = vec!["word"; 2000].join(" ");
        layout.paragraph(&text, STYLE, 0.0, 18.0);
        let plan = layout.finish();

        assert!(plan.page_count > 1);
        for placement in &plan.placements {
            if let Placement::Text { y, .. } = placement {
                assert!(*y >= plan.geometry.bottom());
                assert!(*y <= plan.geometry.top());
            }
        }
    }

    #[test]
    fn list_continuation_lines_hang_under_item_text() {
        let mut layout = Layout::new(&Monospace, PageGeometry::A4);
        let long_item = vec!["xx"; 40].join(" ");
        layout.list(&[long_item], ListMarker::Bullet, STYLE, 18.0, "No data available");
        let plan = layout.finish();

        let xs: Vec<f64> = plan
            .placements
            .iter()
            .filter_map(|p| match p {
                Placement::Text { x, .. } => Some(*x),
                _ => None,
            })
            .collect();
        assert!(xs.len() > 1);
        assert!(xs.iter().all(|x| (*x - xs[0]).abs() < 1e-9));

        let bullet_x = plan
            .placements
            .iter()
            .find_map(|p| match p {
                Placement::Bullet { x, radius, .. } => Some(x + radius),
                _ => None,
            })
            .unwrap();
        assert!(xs[0] > bullet_x);
    }

    #[test]
    fn empty_list_gets_placeholder_bullet() {
        let mut layout = Layout::new(&Monospace, PageGeometry::A4);
        let empty: [&str; 0] = [];
        layout.list(&empty, ListMarker::Bullet, STYLE, 18.0, "No data available");
        let plan = layout.finish();
        assert_eq!(plan.lines().collect::<Vec<_>>(), vec!["No data available"]);
        assert_eq!(
            plan.placements
                .iter()
                .filter(|p| matches!(p, Placement::Bullet { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn numbered_lists_number_from_one() {
        let mut layout = Layout::new(&Monospace, PageGeometry::A4);
        layout.list(&["Guard pass", "Mount"], ListMarker::Numbered, STYLE, 18.0, "-");
        let plan = layout.finish();
        let lines: Vec<_> = plan.lines().collect();
        assert_eq!(lines, vec!["1.", "Guard pass", "2.", "Mount"]);
    }

    #[test]
    fn image_scales_to_column_width() {
        let mut layout = Layout::new(&Monospace, PageGeometry::A4);
        layout.image(DynamicImage::new_rgb8(900, 520));
        let plan = layout.finish();
        match &plan.placements[0] {
            Placement::Image { width, height, x, .. } => {
                assert!((width - 495.0).abs() < 1e-9);
                assert!((height - 520.0 * 495.0 / 900.0).abs() < 1e-9);
                assert!((x - 50.0).abs() < 1e-9);
            }
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[test]
    fn image_that_does_not_fit_moves_to_next_page() {
        let mut layout = Layout::new(&Monospace, PageGeometry::A4);
        layout.gap(500.0);
        layout.image(DynamicImage::new_rgb8(900, 520));
        let plan = layout.finish();
        assert_eq!(plan.page_count, 2);
        assert_eq!(plan.placements[0].page(), 1);
    }

    #[test]
    fn image_within_shrinks_to_the_given_height() {
        let mut layout = Layout::new(&Monospace, PageGeometry::A4);
        layout.gap(100.0);
        let room = layout.cursor().remaining();
        layout.image_within(DynamicImage::new_rgb8(100, 1000), room);
        let plan = layout.finish();

        assert_eq!(plan.page_count, 1);
        match &plan.placements[0] {
            Placement::Image { width, height, .. } => {
                assert!((height - room).abs() < 1e-9);
                assert!((width / height - 0.1).abs() < 1e-9);
            }
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[test]
    fn start_new_page_skips_empty_pages() {
        let mut layout = Layout::new(&Monospace, PageGeometry::A4);
        layout.start_new_page();
        assert_eq!(layout.cursor().page(), 0);
        layout.line("Title", STYLE, 0.0, 20.0);
        layout.start_new_page();
        layout.start_new_page();
        assert_eq!(layout.cursor().page(), 1);
    }
}
