//! `printpdf` backend for layout plans.

use std::f64::consts::PI;
use std::io::{BufWriter, Cursor};

use image::DynamicImage;
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Rgb,
};

use crate::elements::{natural_size_mm, pt_to_mm, DEFAULT_IMAGE_DPI};
use crate::fonts::{builtin_safe, FontFace, FontSet};
use crate::layout::{Colour, LayoutPlan, Placement};

const LAYER_NAME: &str = "Layer 1";
const BULLET_SEGMENTS: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to register font: {0}")]
    Font(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("placement refers to missing image #{0}")]
    MissingImage(usize),
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    builtin: bool,
}

impl Fonts {
    fn register(doc: &PdfDocumentReference, fonts: &FontSet) -> Result<Self, RenderError> {
        match fonts {
            FontSet::Builtin(_) => Ok(Self {
                regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(font_error)?,
                bold: doc
                    .add_builtin_font(BuiltinFont::HelveticaBold)
                    .map_err(font_error)?,
                builtin: true,
            }),
            FontSet::External(family) => Ok(Self {
                regular: doc
                    .add_external_font(Cursor::new(family.font_bytes(FontFace::Regular)))
                    .map_err(font_error)?,
                bold: doc
                    .add_external_font(Cursor::new(family.font_bytes(FontFace::Bold)))
                    .map_err(font_error)?,
                builtin: false,
            }),
        }
    }

    fn face(&self, face: FontFace) -> &IndirectFontRef {
        match face {
            FontFace::Regular => &self.regular,
            FontFace::Bold => &self.bold,
        }
    }
}

fn font_error(err: impl std::fmt::Display) -> RenderError {
    RenderError::Font(err.to_string())
}

fn fill(colour: Colour) -> Color {
    Color::Rgb(Rgb::new(colour.r, colour.g, colour.b, None))
}

fn mm(points: f64) -> Mm {
    Mm(pt_to_mm(points))
}

/// Renders `plan` to PDF bytes using `fonts`.
pub fn render_plan(
    plan: &LayoutPlan,
    fonts: &FontSet,
    title: &str,
) -> Result<Vec<u8>, RenderError> {
    let width = mm(plan.geometry.width);
    let height = mm(plan.geometry.height);

    let (doc, first_page, first_layer) = PdfDocument::new(title, width, height, LAYER_NAME);
    let registered = Fonts::register(&doc, fonts)?;

    let mut layers = vec![doc.get_page(first_page).get_layer(first_layer)];
    for _ in 1..plan.page_count.max(1) {
        let (page, layer) = doc.add_page(width, height, LAYER_NAME);
        layers.push(doc.get_page(page).get_layer(layer));
    }

    for placement in &plan.placements {
        let layer = layers.get(placement.page()).ok_or_else(|| {
            RenderError::Pdf(format!("page {} was not allocated", placement.page()))
        })?;
        match placement {
            Placement::Text {
                x, y, text, style, ..
            } => {
                let text = if registered.builtin {
                    builtin_safe(text)
                } else {
                    text.clone()
                };
                layer.set_fill_color(fill(style.colour));
                layer.use_text(
                    text,
                    style.size,
                    mm(*x),
                    mm(*y),
                    registered.face(style.face),
                );
            }
            Placement::Bullet {
                x, y, radius, colour, ..
            } => {
                layer.set_fill_color(fill(*colour));
                layer.add_shape(disc(*x, *y, *radius));
            }
            Placement::Image {
                x,
                y,
                width,
                height,
                image,
                ..
            } => {
                let source = plan
                    .images
                    .get(*image)
                    .ok_or(RenderError::MissingImage(*image))?;
                place_image(layer, source, *x, *y, *width, *height);
            }
        }
    }

    let mut bytes = Vec::new();
    doc.save(&mut BufWriter::new(&mut bytes))
        .map_err(|err| RenderError::Pdf(err.to_string()))?;
    Ok(bytes)
}

fn disc(cx: f64, cy: f64, radius: f64) -> Line {
    let points = (0..BULLET_SEGMENTS)
        .map(|step| {
            let angle = 2.0 * PI * step as f64 / BULLET_SEGMENTS as f64;
            (
                Point::new(mm(cx + radius * angle.cos()), mm(cy + radius * angle.sin())),
                false,
            )
        })
        .collect();
    Line {
        points,
        is_closed: true,
        has_fill: true,
        has_stroke: false,
        is_clipping_path: false,
    }
}

fn place_image(
    layer: &PdfLayerReference,
    source: &DynamicImage,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
) {
    let (natural_width, natural_height) = natural_size_mm(source);
    let scale_x = pt_to_mm(width) / natural_width;
    let scale_y = pt_to_mm(height) / natural_height;
    let flattened = DynamicImage::ImageRgb8(source.to_rgb8());
    printpdf::Image::from_dynamic_image(&flattened).add_to_layer(
        layer.clone(),
        Some(mm(x)),
        Some(mm(y)),
        None,
        Some(scale_x),
        Some(scale_y),
        Some(DEFAULT_IMAGE_DPI),
    );
}
