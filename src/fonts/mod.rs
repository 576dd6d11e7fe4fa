//! Font discovery and text metrics for the report exporter.
//!
//! Layout never measures text itself; it asks a [`TextMeasure`]. Two
//! implementations exist:
//!
//! * a TrueType family loaded through `genpdf` from a fonts directory
//!   ([`LoadedFamily`]), measured with `genpdf`'s font cache, and
//! * the PDF base-14 Helvetica pair ([`BuiltinMetrics`]), whose widths are
//!   embedded below so documents can be produced without any font files.
//!
//! [`default_font_set`] prefers the former and falls back to the latter with a
//! warning.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use genpdf::error::{Error, ErrorKind};
use genpdf::fonts::{FontCache, FontData, FontFamily};
use genpdf::style::{Style, StyledString};
use log::{debug, warn};

/// Environment variable naming a directory that holds a TrueType family.
pub const FONTS_DIR_ENV: &str = "ATHLETE_REPORT_FONTS_DIR";

const REGULAR_SUFFIX: &str = "-Regular.ttf";
const BOLD_SUFFIX: &str = "-Bold.ttf";

/// Size at which `genpdf` measures; widths scale linearly from here.
const MEASURE_SIZE: u8 = 100;
const PT_PER_MM: f64 = 72.0 / 25.4;

/// The two faces the report uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FontFace {
    Regular,
    Bold,
}

/// Width metrics at an exact font size.
pub trait TextMeasure {
    /// Advance width of `text` in points when set in `face` at `size` points.
    fn text_width(&self, text: &str, face: FontFace, size: f64) -> f64;
}

/// Metrics of the PDF built-in Helvetica and Helvetica-Bold fonts.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinMetrics;

/// Advance widths (1/1000 em) for ASCII 32..=126, Helvetica.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p..~
];

/// Advance widths (1/1000 em) for ASCII 32..=126, Helvetica-Bold.
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // 0..?
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // P.._
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // `..o
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, // p..~
];

const BULLET_WIDTH: u16 = 350;
const FALLBACK_WIDTH: u16 = 556;

impl BuiltinMetrics {
    fn glyph_width(ch: char, face: FontFace) -> u16 {
        let table = match face {
            FontFace::Regular => &HELVETICA_WIDTHS,
            FontFace::Bold => &HELVETICA_BOLD_WIDTHS,
        };
        match ch {
            ' '..='~' => table[(ch as usize) - 32],
            '\u{2022}' => BULLET_WIDTH,
            _ => FALLBACK_WIDTH,
        }
    }
}

impl TextMeasure for BuiltinMetrics {
    fn text_width(&self, text: &str, face: FontFace, size: f64) -> f64 {
        let units: u32 = text
            .chars()
            .map(|ch| u32::from(Self::glyph_width(ch, face)))
            .sum();
        f64::from(units) * size / 1000.0
    }
}

/// Replaces characters the built-in fonts cannot encode.
///
/// Typographic quotes and dashes map to their ASCII forms; anything else
/// outside printable ASCII becomes `?`.
pub fn builtin_safe(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            ' '..='~' => ch,
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            '\u{00A0}' | '\t' => ' ',
            _ => '?',
        })
        .collect()
}

/// A TrueType family with the raw bytes kept for embedding.
pub struct LoadedFamily {
    name: String,
    directory: PathBuf,
    regular: Vec<u8>,
    bold: Vec<u8>,
    cache: FontCache,
}

impl LoadedFamily {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Raw TrueType data of `face`.
    pub fn font_bytes(&self, face: FontFace) -> &[u8] {
        match face {
            FontFace::Regular => &self.regular,
            FontFace::Bold => &self.bold,
        }
    }
}

impl std::fmt::Debug for LoadedFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedFamily")
            .field("name", &self.name)
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}

impl TextMeasure for LoadedFamily {
    fn text_width(&self, text: &str, face: FontFace, size: f64) -> f64 {
        let mut style = Style::new();
        style.set_font_size(MEASURE_SIZE);
        if face == FontFace::Bold {
            style.set_bold();
        }
        let width: printpdf::Mm = StyledString::new(text.to_owned(), style)
            .width(&self.cache)
            .into();
        width.0 * PT_PER_MM * size / f64::from(MEASURE_SIZE)
    }
}

/// The fonts a document is rendered with.
#[derive(Debug)]
pub enum FontSet {
    /// PDF base-14 Helvetica; nothing is embedded.
    Builtin(BuiltinMetrics),
    /// An embedded TrueType family.
    External(LoadedFamily),
}

impl FontSet {
    pub fn builtin() -> Self {
        Self::Builtin(BuiltinMetrics)
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::Builtin(_))
    }

    pub fn family_name(&self) -> &str {
        match self {
            Self::Builtin(_) => "Helvetica",
            Self::External(family) => family.name(),
        }
    }
}

impl TextMeasure for FontSet {
    fn text_width(&self, text: &str, face: FontFace, size: f64) -> f64 {
        match self {
            Self::Builtin(metrics) => metrics.text_width(text, face, size),
            Self::External(family) => family.text_width(text, face, size),
        }
    }
}

fn io_error(kind: io::ErrorKind, message: impl Into<String>) -> io::Error {
    io::Error::new(kind, message.into())
}

fn font_directory_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = env::var_os(FONTS_DIR_ENV).map(PathBuf::from) {
        if !path.as_os_str().is_empty() {
            candidates.push(path);
        }
    }

    if let Ok(current_exe) = env::current_exe() {
        if let Some(bin_dir) = current_exe.parent() {
            candidates.push(bin_dir.join("assets/fonts"));
        }
    }

    let manifest_candidate = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/fonts");
    if !candidates.contains(&manifest_candidate) {
        candidates.push(manifest_candidate);
    }

    candidates
}

/// Finds the first family in `directory` with both a regular and a bold file.
fn discover_family(directory: &Path) -> Result<String, Error> {
    let entries = fs::read_dir(directory).map_err(|err| {
        Error::new(
            format!("Cannot read font directory {}", directory.display()),
            err,
        )
    })?;

    let mut families: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            name.strip_suffix(REGULAR_SUFFIX).map(str::to_owned)
        })
        .filter(|family| directory.join(format!("{family}{BOLD_SUFFIX}")).is_file())
        .collect();
    families.sort();

    families.into_iter().next().ok_or_else(|| {
        Error::new(
            format!(
                "No <Family>{} / <Family>{} pair in {}",
                REGULAR_SUFFIX,
                BOLD_SUFFIX,
                directory.display()
            ),
            io_error(io::ErrorKind::NotFound, "font family not found"),
        )
    })
}

fn read_font(path: &Path) -> Result<(Vec<u8>, FontData), Error> {
    let bytes = fs::read(path)
        .map_err(|err| Error::new(format!("Failed to read font {}", path.display()), err))?;
    let data = FontData::new(bytes.clone(), None).map_err(|err| {
        Error::new(
            format!("Failed to parse font {}: {}", path.display(), err),
            io_error(io::ErrorKind::InvalidData, err.to_string()),
        )
    })?;
    Ok((bytes, data))
}

/// Loads `family` (`<family>-Regular.ttf` and `<family>-Bold.ttf`) from `directory`.
pub fn load_family(directory: &Path, family: &str) -> Result<LoadedFamily, Error> {
    let (regular, regular_data) =
        read_font(&directory.join(format!("{family}{REGULAR_SUFFIX}")))?;
    let (bold, bold_data) = read_font(&directory.join(format!("{family}{BOLD_SUFFIX}")))?;

    let cache = FontCache::new(FontFamily {
        italic: regular_data.clone(),
        bold_italic: bold_data.clone(),
        regular: regular_data,
        bold: bold_data,
    });

    Ok(LoadedFamily {
        name: family.to_owned(),
        directory: directory.to_owned(),
        regular,
        bold,
        cache,
    })
}

/// Searches the font directories and loads the first complete family.
pub fn find_font_family() -> Result<LoadedFamily, Error> {
    let mut attempts = Vec::new();

    for candidate in font_directory_candidates() {
        if !candidate.is_dir() {
            attempts.push(format!("{} (directory missing)", candidate.display()));
            continue;
        }
        match discover_family(&candidate).and_then(|family| load_family(&candidate, &family)) {
            Ok(family) => return Ok(family),
            Err(err) => attempts.push(format!("{} ({})", candidate.display(), err)),
        }
    }

    Err(Error::new(
        format!(
            "Unable to locate a report font family. Checked: {}. Set {}.",
            attempts.join(", "),
            FONTS_DIR_ENV
        ),
        io_error(io::ErrorKind::NotFound, "report fonts not found"),
    ))
}

fn fonts_missing(err: &Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::IoError(io_err)
            if io_err.kind() == io::ErrorKind::NotFound
                || io_err.kind() == io::ErrorKind::PermissionDenied
    )
}

/// Returns the discovered TrueType family, or Helvetica when no family is installed.
///
/// A family that exists but cannot be parsed is an error.
pub fn default_font_set() -> Result<FontSet, Error> {
    match find_font_family() {
        Ok(family) => {
            debug!(
                "Using font family '{}' from {}",
                family.name(),
                family.directory().display()
            );
            Ok(FontSet::External(family))
        }
        Err(err) if fonts_missing(&err) => {
            warn!("{}; falling back to built-in Helvetica.", err);
            Ok(FontSet::builtin())
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_widths_match_helvetica_afm() {
        let metrics = BuiltinMetrics;
        // "Hi" = H(722) + i(222) at 10pt.
        assert!((metrics.text_width("Hi", FontFace::Regular, 10.0) - 9.44).abs() < 1e-9);
        // Bold "Hi" = H(722) + i(278).
        assert!((metrics.text_width("Hi", FontFace::Bold, 10.0) - 10.0).abs() < 1e-9);
        assert_eq!(metrics.text_width("", FontFace::Regular, 12.0), 0.0);
    }

    #[test]
    fn width_scales_linearly_with_size() {
        let metrics = BuiltinMetrics;
        let small = metrics.text_width("Single Leg Takedown", FontFace::Regular, 11.0);
        let large = metrics.text_width("Single Leg Takedown", FontFace::Regular, 22.0);
        assert!((large - 2.0 * small).abs() < 1e-9);
    }

    #[test]
    fn unknown_glyphs_use_fallback_width() {
        let metrics = BuiltinMetrics;
        assert_eq!(
            metrics.text_width("\u{4E2D}", FontFace::Regular, 1.0),
            f64::from(FALLBACK_WIDTH) / 1000.0
        );
    }

    #[test]
    fn builtin_safe_maps_typography() {
        assert_eq!(
            builtin_safe("It\u{2019}s \u{201C}ok\u{201D} \u{2013} Jos\u{e9}"),
            "It's \"ok\" - Jos?"
        );
    }

    #[test]
    fn missing_directory_is_reported_as_not_found() {
        let dir = std::env::temp_dir().join("athlete_report_no_such_fonts");
        let err = discover_family(&dir).unwrap_err();
        assert!(fonts_missing(&err));
    }
}
