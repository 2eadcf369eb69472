//! On-the-fly transform behind the local render endpoint.

use super::encoder::{ImagingError, ImagingResult, decode, encode_webp, target_dimensions};
use super::url::{OutputFormat, ResizeMode};
use image::{DynamicImage, ImageFormat, imageops::FilterType};
use std::io::Cursor;
use tracing::debug;

const DEFAULT_QUALITY: u8 = 80;

/// A parsed render request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<u8>,
    pub resize: Option<ResizeMode>,
    pub format: Option<OutputFormat>,
}

#[derive(Debug)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Decode a stored object, resize it per `request` and re-encode it.
///
/// Without a `format`, the stored format is kept. AVIF requests are answered
/// with WebP.
pub fn render(bytes: &[u8], request: &RenderRequest) -> ImagingResult<Rendered> {
    let source = decode(bytes, None)?;
    let resized = resize(source, request);
    let quality = request.quality.unwrap_or(DEFAULT_QUALITY).clamp(1, 100);

    let (bytes, content_type) = match request.format.unwrap_or(OutputFormat::Origin) {
        OutputFormat::Webp | OutputFormat::Avif => {
            (encode_webp(&resized, quality as f32 / 100.0)?, "image/webp")
        }
        OutputFormat::Origin => {
            let format = image::guess_format(bytes).unwrap_or(ImageFormat::Png);
            encode_in(&resized, format, quality)?
        }
    };

    Ok(Rendered {
        bytes,
        content_type,
        width: resized.width(),
        height: resized.height(),
    })
}

fn resize(img: DynamicImage, request: &RenderRequest) -> DynamicImage {
    let (src_w, src_h) = (img.width(), img.height());
    let width = request.width.filter(|w| *w > 0);
    let height = request.height.filter(|h| *h > 0);

    let (box_w, box_h) = match (width, height) {
        (None, None) => return img,
        (Some(w), None) => {
            let (tw, th) = target_dimensions(src_w, src_h, scaled_edge(src_w, src_h, w, src_w));
            return resample(img, tw, th);
        }
        (None, Some(h)) => {
            let (tw, th) = target_dimensions(src_w, src_h, scaled_edge(src_w, src_h, h, src_h));
            return resample(img, tw, th);
        }
        (Some(w), Some(h)) => (w, h),
    };

    // Shrink the box until it fits inside the source; never upscale.
    let fit = (src_w as f64 / box_w as f64)
        .min(src_h as f64 / box_h as f64)
        .min(1.0);
    let box_w = ((box_w as f64 * fit).round() as u32).max(1);
    let box_h = ((box_h as f64 * fit).round() as u32).max(1);

    debug!(
        "render resize {}x{} -> {}x{} ({:?})",
        src_w, src_h, box_w, box_h, request.resize
    );
    match request.resize.unwrap_or(ResizeMode::Cover) {
        ResizeMode::Cover => img.resize_to_fill(box_w, box_h, FilterType::Lanczos3),
        ResizeMode::Fill => img.resize_exact(box_w, box_h, FilterType::Lanczos3),
        ResizeMode::Contain | ResizeMode::Inside => img.resize(box_w, box_h, FilterType::Lanczos3),
        ResizeMode::Outside => {
            let scale = (box_w as f64 / src_w as f64)
                .max(box_h as f64 / src_h as f64)
                .min(1.0);
            let tw = ((src_w as f64 * scale).round() as u32).max(1);
            let th = ((src_h as f64 * scale).round() as u32).max(1);
            resample(img, tw, th)
        }
    }
}

/// Long edge that makes the constrained side equal `wanted`.
fn scaled_edge(src_w: u32, src_h: u32, wanted: u32, side: u32) -> u32 {
    let long = src_w.max(src_h) as f64;
    ((long * wanted as f64 / side.max(1) as f64).round() as u32).max(1)
}

fn resample(img: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if (width, height) == (img.width(), img.height()) {
        img
    } else {
        img.resize_exact(width, height, FilterType::Lanczos3)
    }
}

fn encode_in(
    img: &DynamicImage,
    format: ImageFormat,
    quality: u8,
) -> ImagingResult<(Vec<u8>, &'static str)> {
    let mut out = Vec::new();
    let result = match format {
        ImageFormat::Jpeg => {
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
        }
        ImageFormat::WebP => {
            return Ok((encode_webp(img, quality as f32 / 100.0)?, "image/webp"));
        }
        other => img.write_to(&mut Cursor::new(&mut out), other),
    };
    result.map_err(|err| ImagingError::EncodingFailed(err.to_string()))?;
    Ok((out, format.to_mime_type()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        DynamicImage::new_rgb8(width, height)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn width_only_preserves_aspect() {
        let request = RenderRequest {
            width: Some(200),
            format: Some(OutputFormat::Webp),
            ..RenderRequest::default()
        };
        let rendered = render(&png_bytes(800, 400), &request).unwrap();
        assert_eq!((rendered.width, rendered.height), (200, 100));
        assert_eq!(rendered.content_type, "image/webp");
    }

    #[test]
    fn requests_larger_than_source_do_not_upscale() {
        let request = RenderRequest {
            width: Some(2000),
            ..RenderRequest::default()
        };
        let rendered = render(&png_bytes(300, 200), &request).unwrap();
        assert_eq!((rendered.width, rendered.height), (300, 200));
        assert_eq!(rendered.content_type, "image/png");
    }

    #[test]
    fn cover_fills_the_requested_box() {
        let request = RenderRequest {
            width: Some(100),
            height: Some(100),
            resize: Some(ResizeMode::Cover),
            format: Some(OutputFormat::Webp),
            ..RenderRequest::default()
        };
        let rendered = render(&png_bytes(400, 200), &request).unwrap();
        assert_eq!((rendered.width, rendered.height), (100, 100));
    }

    #[test]
    fn contain_fits_inside_the_box() {
        let request = RenderRequest {
            width: Some(100),
            height: Some(100),
            resize: Some(ResizeMode::Contain),
            ..RenderRequest::default()
        };
        let rendered = render(&png_bytes(400, 200), &request).unwrap();
        assert_eq!((rendered.width, rendered.height), (100, 50));
    }

    #[test]
    fn undecodable_payload_is_an_error() {
        let err = render(b"<html>", &RenderRequest::default()).unwrap_err();
        assert!(matches!(err, ImagingError::DecodeFailed(_)));
    }
}
