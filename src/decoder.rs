//! Image decoder: opaque bytes in, colour + grayscale grids out.

use image::{GrayImage, ImageFormat, Luma, RgbImage};
use tracing::debug;

use crate::error::DecodeError;

/// A decoded document: the colour grid and the grayscale grid derived from it.
///
/// Both grids always share the same width and height; the only way to build
/// one outside this module is [`DecodedImage::from_rgb`], which derives the
/// grayscale view itself.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    color: RgbImage,
    gray: GrayImage,
}

impl DecodedImage {
    pub fn from_rgb(color: RgbImage) -> Self {
        let gray = bt601_gray(&color);
        Self { color, gray }
    }

    pub fn color(&self) -> &RgbImage {
        &self.color
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    pub fn width(&self) -> u32 {
        self.color.width()
    }

    pub fn height(&self) -> u32 {
        self.color.height()
    }
}

/// BT.601 luma in the 14-bit fixed point scanned-document tooling uses:
/// `Y = (4899 R + 9617 G + 1868 B + 2^13) >> 14`.
pub fn bt601_gray(color: &RgbImage) -> GrayImage {
    GrayImage::from_fn(color.width(), color.height(), |x, y| {
        let [r, g, b] = color.get_pixel(x, y).0;
        let y = (4899 * u32::from(r) + 9617 * u32::from(g) + 1868 * u32::from(b) + (1 << 13)) >> 14;
        Luma([y as u8])
    })
}

/// Decode a self-describing raster container (PNG, JPEG, ...).
///
/// Fails atomically: a buffer that is empty, truncated, unrecognised or
/// decodes to a zero-area image yields [`DecodeError`] and nothing else.
pub fn decode(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    let dynamic = image::load_from_memory(bytes).map_err(|e| {
        debug!(error = %e, len = bytes.len(), "image decode failed");
        DecodeError
    })?;

    let color = dynamic.to_rgb8();
    if color.width() == 0 || color.height() == 0 {
        return Err(DecodeError);
    }

    Ok(DecodedImage::from_rgb(color))
}

/// Whether this build can decode any raster format at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderSupport {
    Available { formats: Vec<ImageFormat> },
    Missing { reason: String },
}

impl DecoderSupport {
    /// Inspect the codecs compiled into the `image` crate. Run once at startup.
    pub fn probe() -> Self {
        let formats: Vec<ImageFormat> = ImageFormat::all().filter(|f| f.reading_enabled()).collect();
        if formats.is_empty() {
            Self::Missing {
                reason: "no image decoding codecs are compiled into this build".to_string(),
            }
        } else {
            Self::Available { formats }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }

    /// Lower-case format names, for logs and the health endpoint.
    pub fn format_names(&self) -> Vec<String> {
        match self {
            Self::Available { formats } => formats
                .iter()
                .map(|f| format!("{f:?}").to_lowercase())
                .collect(),
            Self::Missing { .. } => Vec::new(),
        }
    }
}
