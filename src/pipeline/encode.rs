//! Image encoding: `DynamicImage` → base64 JPEG wrapped in [`PageImage`].
//!
//! Index pages are mostly small black text on white, and a single request
//! may carry several pages, so JPEG at quality 80 keeps the payload small
//! while digits stay legible at the 1.5× render scale.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// JPEG quality used for every page (0.8 on a 0–1 scale).
pub const JPEG_QUALITY: u8 = 80;

/// A rendered page, ready to be sent to a vision model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-indexed page number in the source document.
    pub page: u32,
    pub width: u32,
    pub height: u32,
    /// Base64 (standard alphabet, padded) JPEG bytes.
    pub jpeg_base64: String,
}

impl PageImage {
    /// Wrap the image for an `edgequake-llm` chat message.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.jpeg_base64.clone(), "image/jpeg").with_detail("high")
    }

    /// `data:` URI form, handy for HTML overlays.
    pub fn data_uri(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.jpeg_base64)
    }
}

/// Encode a rasterised page as a base64 JPEG.
///
/// JPEG has no alpha channel, so the bitmap is flattened to RGB first.
pub fn encode_page(page: u32, img: &DynamicImage) -> Result<PageImage, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut buf = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))?;

    let jpeg_base64 = STANDARD.encode(&buf);
    debug!(
        "Encoded page {} ({}x{}) → {} bytes base64",
        page,
        img.width(),
        img.height(),
        jpeg_base64.len()
    );

    Ok(PageImage {
        page,
        width: img.width(),
        height: img.height(),
        jpeg_base64,
    })
}
