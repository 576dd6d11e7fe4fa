//! Raster helpers shared by the layout and render stages.
//!
//! Layout works in PDF points, printpdf in millimetres and rasters in pixels;
//! the conversions between them live here.

use genpdf::error::{Context as _, Error};
use image::{DynamicImage, GenericImageView};

/// Resolution used to derive the natural size of a raster.
pub const DEFAULT_IMAGE_DPI: f64 = 300.0;
const MM_PER_INCH: f64 = 25.4;
const PT_PER_INCH: f64 = 72.0;

pub fn pt_to_mm(points: f64) -> f64 {
    points * MM_PER_INCH / PT_PER_INCH
}

/// Size of a raster in pixels at [`DEFAULT_IMAGE_DPI`], expressed in millimetres.
pub fn natural_size_mm(image: &DynamicImage) -> (f64, f64) {
    let (px_width, px_height) = image.dimensions();
    (
        MM_PER_INCH * f64::from(px_width) / DEFAULT_IMAGE_DPI,
        MM_PER_INCH * f64::from(px_height) / DEFAULT_IMAGE_DPI,
    )
}

/// Decodes PNG/JPEG bytes with a descriptive error.
pub fn decode_image_from_bytes(bytes: impl AsRef<[u8]>) -> Result<DynamicImage, Error> {
    let bytes = bytes.as_ref();
    if bytes.is_empty() {
        return Err(Error::new(
            "Image data is empty",
            std::io::Error::new(std::io::ErrorKind::InvalidData, "no image bytes"),
        ));
    }
    let image = image::load_from_memory(bytes)
        .context("Failed to decode image from provided bytes")?;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::new(
            format!("Image has degenerate size {width}x{height}"),
            std::io::Error::new(std::io::ErrorKind::InvalidData, "zero-sized image"),
        ));
    }
    Ok(image)
}

/// Scales a `width` x `height` box to `column` width, preserving aspect ratio.
///
/// When the scaled height exceeds `max_height` the box is shrunk uniformly
/// again so it fits. Degenerate input yields a zero-sized box.
pub fn fit_to_column(width: f64, height: f64, column: f64, max_height: f64) -> (f64, f64) {
    if width <= f64::EPSILON || height <= f64::EPSILON {
        return (0.0, 0.0);
    }
    let scaled_height = height * column / width;
    if scaled_height <= max_height {
        (column, scaled_height)
    } else {
        let shrink = max_height / scaled_height;
        (column * shrink, max_height)
    }
}
