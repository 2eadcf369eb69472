//! Variant encoding: decode a freshly selected file once and produce resized
//! WebP encodings for the `main`, `display` and `thumb` variants.
//!
//! Size and quality are fixed policy (see [`ImageVariant`]). Every failure is
//! reported as an [`ImagingError`]; deciding what to do about it belongs to the
//! upload pipeline.

use image::{DynamicImage, ImageReader, imageops::FilterType};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::debug;

/// One of the stored encodings of an uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageVariant {
    /// Canonical full-size encoding stored under the base name.
    Main,
    /// Lightbox-sized sibling, `<base>-display.webp`.
    Display,
    /// Grid-sized sibling, `<base>-thumb.webp`.
    Thumb,
}

impl ImageVariant {
    pub const ALL: [ImageVariant; 3] = [ImageVariant::Main, ImageVariant::Display, ImageVariant::Thumb];

    /// Variants stored next to the canonical object.
    pub const SIBLINGS: [ImageVariant; 2] = [ImageVariant::Thumb, ImageVariant::Display];

    /// Target long edge in pixels.
    pub fn max_edge(self) -> u32 {
        match self {
            ImageVariant::Main => 2400,
            ImageVariant::Display => 1800,
            ImageVariant::Thumb => 900,
        }
    }

    /// Encoder quality in `0.0..=1.0`.
    pub fn quality(self) -> f32 {
        match self {
            ImageVariant::Main => 0.86,
            ImageVariant::Display => 0.82,
            ImageVariant::Thumb => 0.72,
        }
    }

    /// File-name suffix of sibling variants; `None` for the canonical object.
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            ImageVariant::Main => None,
            ImageVariant::Display => Some("display"),
            ImageVariant::Thumb => Some("thumb"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImagingError {
    #[error("image could not be decoded: {0}")]
    DecodeFailed(String),
    #[error("image could not be encoded: {0}")]
    EncodingFailed(String),
}

pub type ImagingResult<T> = Result<T, ImagingError>;

/// A single encoded variant held in memory.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub variant: ImageVariant,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Decode `bytes` into pixels.
///
/// Tries the in-memory decoder first (format sniffed from magic bytes). If
/// that fails, the bytes are spilled to a temporary file named after
/// `file_name`'s extension and decoded from there, which lets the extension
/// pick a decoder for formats without a reliable signature. The temporary file
/// is removed when this function returns, whatever the outcome.
pub fn decode(bytes: &[u8], file_name: Option<&str>) -> ImagingResult<DynamicImage> {
    match image::load_from_memory(bytes) {
        Ok(img) => return Ok(img),
        Err(err) => debug!(
            "in-memory decode failed for {:?} ({} bytes): {}",
            file_name,
            bytes.len(),
            err
        ),
    }

    decode_via_temp_file(bytes, file_name)
}

fn decode_via_temp_file(bytes: &[u8], file_name: Option<&str>) -> ImagingResult<DynamicImage> {
    let extension = file_name.and_then(file_extension).unwrap_or_else(|| "bin".into());
    let mut spill = tempfile::Builder::new()
        .prefix("folio-decode-")
        .suffix(&format!(".{}", extension))
        .tempfile()
        .map_err(|err| ImagingError::DecodeFailed(format!("temporary file: {}", err)))?;

    spill
        .write_all(bytes)
        .and_then(|_| spill.flush())
        .map_err(|err| ImagingError::DecodeFailed(format!("temporary file: {}", err)))?;

    ImageReader::open(spill.path())
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|err| ImagingError::DecodeFailed(err.to_string()))?
        .decode()
        .map_err(|err| ImagingError::DecodeFailed(err.to_string()))
}

/// Lower-cased extension of a file name, if it has one.
pub fn file_extension(file_name: &str) -> Option<String> {
    let name = file_name.rsplit('/').next().unwrap_or(file_name);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Aspect-preserving target size for a long edge of `max_edge`.
///
/// Never upscales; each side is at least one pixel.
pub fn target_dimensions(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let long_edge = width.max(height).max(1) as f64;
    let scale = (max_edge as f64 / long_edge).min(1.0);
    let scaled = |side: u32| ((side as f64 * scale).round() as u32).max(1);
    (scaled(width), scaled(height))
}

/// Encode `img` as lossy WebP. `quality` is in `0.0..=1.0`.
pub fn encode_webp(img: &DynamicImage, quality: f32) -> ImagingResult<Vec<u8>> {
    // libwebp only takes 8-bit RGB/RGBA buffers.
    let pixels = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };

    let encoder = webp::Encoder::from_image(&pixels)
        .map_err(|err| ImagingError::EncodingFailed(err.to_string()))?;
    let memory = panic::catch_unwind(AssertUnwindSafe(|| {
        encoder.encode((quality * 100.0).clamp(0.0, 100.0))
    }))
    .map_err(|_| ImagingError::EncodingFailed("webp encoder panicked".into()))?;

    if memory.is_empty() {
        return Err(ImagingError::EncodingFailed("encoder returned no data".into()));
    }
    Ok(memory.to_vec())
}

/// Decode `bytes` and encode each of `wanted`, largest first.
///
/// Smaller variants are resampled from the previous (larger) result, with
/// target sizes always computed from the source dimensions.
pub fn encode_variants(
    bytes: &[u8],
    file_name: Option<&str>,
    wanted: &[ImageVariant],
) -> ImagingResult<Vec<EncodedImage>> {
    let source = decode(bytes, file_name)?;
    let (src_width, src_height) = (source.width(), source.height());

    let mut order = wanted.to_vec();
    order.sort_by_key(|variant| std::cmp::Reverse(variant.max_edge()));
    order.dedup();

    let mut encoded = Vec::with_capacity(order.len());
    let mut working = source;
    for variant in order {
        let (width, height) = target_dimensions(src_width, src_height, variant.max_edge());
        if (width, height) != (working.width(), working.height()) {
            working = working.resize_exact(width, height, FilterType::Lanczos3);
        }

        let bytes = encode_webp(&working, variant.quality())?;
        debug!(
            "encoded {:?} variant {}x{} ({} bytes)",
            variant,
            width,
            height,
            bytes.len()
        );
        encoded.push(EncodedImage {
            variant,
            width,
            height,
            bytes,
        });
    }

    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgb8(width, height);
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Jpeg)
            .unwrap();
        out
    }

    #[test]
    fn variant_policy_is_fixed() {
        assert_eq!(ImageVariant::Main.max_edge(), 2400);
        assert_eq!(ImageVariant::Display.max_edge(), 1800);
        assert_eq!(ImageVariant::Thumb.max_edge(), 900);
        assert_eq!(ImageVariant::Thumb.quality(), 0.72);
        assert_eq!(ImageVariant::Display.suffix(), Some("display"));
        assert_eq!(ImageVariant::Main.suffix(), None);
    }

    #[test]
    fn target_dimensions_for_a_4000x3000_source() {
        assert_eq!(target_dimensions(4000, 3000, 2400), (2400, 1800));
        assert_eq!(target_dimensions(4000, 3000, 1800), (1800, 1350));
        assert_eq!(target_dimensions(4000, 3000, 900), (900, 675));
    }

    #[test]
    fn target_dimensions_never_upscale_and_stay_positive() {
        assert_eq!(target_dimensions(640, 480, 2400), (640, 480));
        assert_eq!(target_dimensions(3000, 4000, 900), (675, 900));
        assert_eq!(target_dimensions(10_000, 1, 900), (900, 1));
        assert_eq!(target_dimensions(0, 0, 900), (1, 1));
    }

    #[test]
    fn file_extension_is_lowercased() {
        assert_eq!(file_extension("IMG_0001.JPG").as_deref(), Some("jpg"));
        assert_eq!(file_extension("dir/a.b.png").as_deref(), Some("png"));
        assert_eq!(file_extension("README"), None);
        assert_eq!(file_extension(".hidden"), None);
    }

    #[test]
    fn encode_variants_produces_webp_at_policy_sizes() {
        let bytes = jpeg_bytes(1600, 1200);
        let encoded = encode_variants(&bytes, Some("shoot.jpg"), &ImageVariant::ALL).unwrap();

        let sizes = encoded
            .iter()
            .map(|e| (e.variant, e.width, e.height))
            .collect::<Vec<_>>();
        assert_eq!(
            sizes,
            vec![
                (ImageVariant::Main, 1600, 1200),
                (ImageVariant::Display, 1600, 1200),
                (ImageVariant::Thumb, 900, 675),
            ]
        );
        for image in &encoded {
            assert_eq!(&image.bytes[0..4], b"RIFF");
            assert_eq!(&image.bytes[8..12], b"WEBP");
            let decoded = image::load_from_memory(&image.bytes).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (image.width, image.height));
        }
    }

    #[test]
    fn encode_variants_downscales_a_4000x3000_source() {
        let bytes = jpeg_bytes(4000, 3000);
        let encoded = encode_variants(&bytes, Some("DSC_0420.jpg"), &ImageVariant::ALL).unwrap();

        let sizes = encoded
            .iter()
            .map(|e| (e.variant, e.width, e.height))
            .collect::<Vec<_>>();
        assert_eq!(
            sizes,
            vec![
                (ImageVariant::Main, 2400, 1800),
                (ImageVariant::Display, 1800, 1350),
                (ImageVariant::Thumb, 900, 675),
            ]
        );
        for image in &encoded {
            let decoded = image::load_from_memory(&image.bytes).unwrap();
            assert_eq!(
                decoded.width().max(decoded.height()),
                image.variant.max_edge()
            );
        }
    }

    #[test]
    fn encode_variants_only_builds_requested_variants() {
        let bytes = jpeg_bytes(400, 300);
        let encoded = encode_variants(&bytes, None, &[ImageVariant::Thumb]).unwrap();
        assert_eq!(encoded.len(), 1);
        assert_eq!(encoded[0].variant, ImageVariant::Thumb);
        assert_eq!((encoded[0].width, encoded[0].height), (400, 300));
    }

    #[test]
    fn corrupt_input_is_decode_failed() {
        let err = encode_variants(b"definitely not an image", Some("broken.jpg"), &ImageVariant::ALL)
            .unwrap_err();
        assert!(matches!(err, ImagingError::DecodeFailed(_)), "{err:?}");
    }

    #[test]
    fn decode_falls_back_to_extension_hint() {
        // TGA has no magic bytes, so only the file-name hint can select its decoder.
        let img = DynamicImage::new_rgb8(12, 8);
        let mut tga = Vec::new();
        img.write_to(&mut Cursor::new(&mut tga), image::ImageFormat::Tga)
            .unwrap();

        let decoded = decode(&tga, Some("scan.tga")).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (12, 8));
    }
}
