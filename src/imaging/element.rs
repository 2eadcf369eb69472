//! Adaptive image element: decides which URL an `<img>` should request and
//! demotes to a safer source when loading fails.
//!
//! Sources only ever move forward: render -> variant -> fallback.

use super::encoder::ImageVariant;
use super::url::{OutputFormat, Transform, render_url, responsive_candidates, variant_url};
use serde::Serialize;

pub const DEFAULT_WIDTHS: [u32; 4] = [480, 768, 1024, 1280];
pub const DEFAULT_QUALITY: u8 = 70;

/// Which URL the element is currently requesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ImageSource {
    /// On-the-fly transform endpoint.
    Render,
    /// Pre-computed `-thumb`/`-display` sibling.
    Variant,
    /// The stored original, unmodified.
    Fallback,
}

/// Caller preferences for one image.
#[derive(Debug, Clone)]
pub struct ImageOptions {
    /// Width buckets for the responsive candidate list; the largest is used
    /// for the primary render URL.
    pub widths: Vec<u32>,
    pub quality: u8,
    pub format: OutputFormat,
    /// Sibling variant to use when transforms are off or fail.
    pub variant: Option<ImageVariant>,
    /// Request the render endpoint even when transforms are disabled globally.
    pub prefer_render: bool,
    /// `sizes` attribute, only emitted alongside a candidate list.
    pub sizes: Option<String>,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            widths: DEFAULT_WIDTHS.to_vec(),
            quality: DEFAULT_QUALITY,
            format: OutputFormat::Webp,
            variant: None,
            prefer_render: false,
            sizes: None,
        }
    }
}

impl ImageOptions {
    pub fn variant(mut self, variant: ImageVariant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn widths(mut self, widths: &[u32]) -> Self {
        self.widths = widths.to_vec();
        self
    }

    pub fn prefer_render(mut self) -> Self {
        self.prefer_render = true;
        self
    }

    pub fn sizes(mut self, sizes: impl Into<String>) -> Self {
        self.sizes = Some(sizes.into());
        self
    }

    fn transform(&self) -> Transform {
        Transform {
            quality: Some(self.quality),
            format: self.format,
            ..Transform::default()
        }
    }
}

/// Attributes to put on the rendered `<img>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImgAttributes {
    pub src: String,
    pub srcset: Option<String>,
    pub sizes: Option<String>,
    /// Inline style. Alt text stays transparent until the image has painted.
    pub style: Option<&'static str>,
}

/// Result of reporting a load error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Retry with this URL.
    Retry(String),
    /// The original itself failed; surface the error to the caller.
    Failed,
}

#[derive(Debug, Clone)]
pub struct AdaptiveImage {
    original: String,
    options: ImageOptions,
    source: ImageSource,
    painted: bool,
}

impl AdaptiveImage {
    /// `transforms_enabled` is the process-wide flag read from configuration.
    pub fn new(original: impl Into<String>, options: ImageOptions, transforms_enabled: bool) -> Self {
        let mut image = Self {
            original: original.into(),
            options,
            source: ImageSource::Fallback,
            painted: false,
        };

        image.source = if (transforms_enabled || image.options.prefer_render)
            && image.render_src().is_some()
        {
            ImageSource::Render
        } else if image.variant_src().is_some() {
            ImageSource::Variant
        } else {
            ImageSource::Fallback
        };
        image
    }

    pub fn source(&self) -> ImageSource {
        self.source
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    /// URL to request in the current state.
    pub fn src(&self) -> String {
        let resolved = match self.source {
            ImageSource::Render => self.render_src(),
            ImageSource::Variant => self.variant_src(),
            ImageSource::Fallback => None,
        };
        resolved.unwrap_or_else(|| self.original.clone())
    }

    /// Responsive candidates, only while rendering: neither siblings nor the
    /// original exist at arbitrary widths.
    pub fn srcset(&self) -> Option<String> {
        if self.source != ImageSource::Render {
            return None;
        }
        responsive_candidates(&self.original, &self.options.widths, &self.options.transform())
    }

    pub fn attributes(&self) -> ImgAttributes {
        let srcset = self.srcset();
        let sizes = srcset.as_ref().and(self.options.sizes.clone());
        ImgAttributes {
            src: self.src(),
            srcset,
            sizes,
            style: (!self.painted).then_some("color: transparent"),
        }
    }

    /// The browser painted the image.
    pub fn on_load(&mut self) {
        self.painted = true;
    }

    /// The current URL failed to load; move one step towards the original.
    pub fn on_load_error(&mut self) -> LoadOutcome {
        let next = match self.source {
            ImageSource::Render if self.variant_src().is_some() => ImageSource::Variant,
            ImageSource::Render | ImageSource::Variant => ImageSource::Fallback,
            ImageSource::Fallback => {
                tracing::debug!("image {} failed at its original url", self.original);
                return LoadOutcome::Failed;
            }
        };

        tracing::debug!(
            "image {} demoted from {:?} to {:?}",
            self.original,
            self.source,
            next
        );
        self.source = next;
        self.painted = false;
        LoadOutcome::Retry(self.src())
    }

    fn render_src(&self) -> Option<String> {
        let width = self.options.widths.iter().copied().max()?;
        let transform = Transform {
            width: Some(width),
            ..self.options.transform()
        };
        render_url(&self.original, &transform)
    }

    fn variant_src(&self) -> Option<String> {
        let suffix = self.options.variant?.suffix()?;
        variant_url(&self.original, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORED: &str =
        "https://cdn.example.com/storage/v1/object/public/portfolio-images/photos/1-abc.webp";
    const EXTERNAL: &str = "https://images.example.org/sunset.jpg";

    #[test]
    fn starts_rendering_when_transforms_are_enabled() {
        let img = AdaptiveImage::new(STORED, ImageOptions::default(), true);
        assert_eq!(img.source(), ImageSource::Render);
        assert!(img.src().contains("/render/image/"));
        assert!(img.src().contains("width=1280"));
    }

    #[test]
    fn prefer_render_overrides_disabled_transforms() {
        let options = ImageOptions::default().prefer_render();
        let img = AdaptiveImage::new(STORED, options, false);
        assert_eq!(img.source(), ImageSource::Render);
    }

    #[test]
    fn starts_on_variant_when_transforms_are_disabled() {
        let options = ImageOptions::default().variant(ImageVariant::Thumb);
        let img = AdaptiveImage::new(STORED, options, false);
        assert_eq!(img.source(), ImageSource::Variant);
        assert!(img.src().ends_with("1-abc-thumb.webp"));
        assert_eq!(img.srcset(), None);
    }

    #[test]
    fn external_urls_start_on_fallback() {
        let options = ImageOptions::default().variant(ImageVariant::Display);
        let img = AdaptiveImage::new(EXTERNAL, options, true);
        assert_eq!(img.source(), ImageSource::Fallback);
        assert_eq!(img.src(), EXTERNAL);
    }

    #[test]
    fn load_errors_walk_render_variant_fallback() {
        let options = ImageOptions::default().variant(ImageVariant::Display);
        let mut img = AdaptiveImage::new(STORED, options, true);
        assert_eq!(img.source(), ImageSource::Render);

        let retry = img.on_load_error();
        assert_eq!(img.source(), ImageSource::Variant);
        assert_eq!(retry, LoadOutcome::Retry(img.src()));

        assert_eq!(img.on_load_error(), LoadOutcome::Retry(STORED.to_string()));
        assert_eq!(img.source(), ImageSource::Fallback);

        for _ in 0..3 {
            assert_eq!(img.on_load_error(), LoadOutcome::Failed);
            assert_eq!(img.source(), ImageSource::Fallback);
        }
    }

    #[test]
    fn render_error_without_variant_goes_straight_to_fallback() {
        let mut img = AdaptiveImage::new(STORED, ImageOptions::default(), true);
        img.on_load_error();
        assert_eq!(img.source(), ImageSource::Fallback);
    }

    #[test]
    fn candidate_set_only_while_rendering() {
        let options = ImageOptions::default()
            .widths(&[400, 800])
            .variant(ImageVariant::Thumb)
            .sizes("100vw");
        let mut img = AdaptiveImage::new(STORED, options, true);

        let attrs = img.attributes();
        assert!(attrs.srcset.as_deref().unwrap().contains(" 800w"));
        assert_eq!(attrs.sizes.as_deref(), Some("100vw"));

        img.on_load_error();
        let attrs = img.attributes();
        assert_eq!(attrs.srcset, None);
        assert_eq!(attrs.sizes, None);
    }

    #[test]
    fn alt_text_is_transparent_until_painted() {
        let mut img = AdaptiveImage::new(STORED, ImageOptions::default(), false);
        assert_eq!(img.attributes().style, Some("color: transparent"));
        img.on_load();
        assert_eq!(img.attributes().style, None);
    }
}
