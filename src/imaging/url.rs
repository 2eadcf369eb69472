//! Image URL resolution.
//!
//! Pure rewrites of public storage-object URLs into:
//! - a render URL (`/storage/v1/render/image/…?width=…`) served by the
//!   on-the-fly transform endpoint,
//! - a pre-computed variant URL (`<base>-<suffix>.webp` next to the original),
//! - a responsive candidate list (`"<url> <w>w, …"`).
//!
//! Every function returns `None` for URLs that are not storage-object URLs;
//! callers then use the original URL untouched. Nothing here performs I/O.

use axum::http::{Uri, uri::PathAndQuery};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Path marker of the raw object endpoint.
pub const OBJECT_MARKER: &str = "/storage/v1/object/";

/// Path marker of the render (transform) endpoint.
pub const RENDER_MARKER: &str = "/storage/v1/render/image/";

/// Output format requested from the render endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Keep the stored format; no `format` parameter is sent.
    Origin,
    #[default]
    Webp,
    Avif,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Origin => "origin",
            OutputFormat::Webp => "webp",
            OutputFormat::Avif => "avif",
        }
    }
}

/// Fit mode for render requests that carry both width and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    Cover,
    Contain,
    Fill,
    Inside,
    Outside,
}

impl ResizeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResizeMode::Cover => "cover",
            ResizeMode::Contain => "contain",
            ResizeMode::Fill => "fill",
            ResizeMode::Inside => "inside",
            ResizeMode::Outside => "outside",
        }
    }
}

impl fmt::Display for ResizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a render request. Absent or zero numeric values are omitted
/// from the query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transform {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<u8>,
    pub resize: Option<ResizeMode>,
    pub format: OutputFormat,
}

impl Transform {
    pub fn width(width: u32) -> Self {
        Self {
            width: Some(width),
            ..Self::default()
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(width) = self.width.filter(|w| *w > 0) {
            params.push(("width", width.to_string()));
        }
        if let Some(height) = self.height.filter(|h| *h > 0) {
            params.push(("height", height.to_string()));
        }
        if let Some(quality) = self.quality.filter(|q| *q > 0) {
            params.push(("quality", quality.to_string()));
        }
        if let Some(resize) = self.resize {
            params.push(("resize", resize.as_str().to_string()));
        }
        if self.format != OutputFormat::Origin {
            params.push(("format", self.format.as_str().to_string()));
        }
        params
    }
}

/// Rewrite `original` to the render endpoint with `transform` applied.
pub fn render_url(original: &str, transform: &Transform) -> Option<String> {
    let uri = parse_storage_url(original)?;
    let path = uri.path().replacen(OBJECT_MARKER, RENDER_MARKER, 1);
    let query = merge_query(uri.query(), &transform.query_params());
    rebuild(&uri, &path, Some(&query))
}

/// Rewrite `original` to its `<base>-<suffix>.webp` sibling, dropping the query.
pub fn variant_url(original: &str, suffix: &str) -> Option<String> {
    let uri = parse_storage_url(original)?;
    let path = variant_path(uri.path(), suffix)?;
    rebuild(&uri, &path, None)
}

/// Build a `srcset`-style candidate list, one render URL per width.
pub fn responsive_candidates(original: &str, widths: &[u32], base: &Transform) -> Option<String> {
    let candidates = widths
        .iter()
        .filter_map(|&width| {
            let transform = Transform {
                width: Some(width),
                ..*base
            };
            render_url(original, &transform).map(|url| format!("{} {}w", url, width))
        })
        .collect::<Vec<_>>();

    if candidates.is_empty() {
        None
    } else {
        Some(candidates.join(", "))
    }
}

/// Sibling path of a stored object for a given variant suffix.
///
/// `photos/17-ab.jpg` with `thumb` becomes `photos/17-ab-thumb.webp`. Works on
/// both URL paths and bare storage keys.
pub fn variant_path(path: &str, suffix: &str) -> Option<String> {
    let (dir, file) = match path.rfind('/') {
        Some(idx) => (&path[..=idx], &path[idx + 1..]),
        None => ("", path),
    };
    if file.is_empty() {
        return None;
    }

    let base = match file.rfind('.') {
        Some(dot) => &file[..dot],
        None => file,
    };
    Some(format!("{}{}-{}.webp", dir, base, suffix))
}

fn parse_storage_url(input: &str) -> Option<Uri> {
    if input.is_empty() {
        return None;
    }
    let uri: Uri = input.parse().ok()?;
    uri.scheme()?;
    uri.authority()?;
    if !uri.path().contains(OBJECT_MARKER) {
        return None;
    }
    Some(uri)
}

/// Replace any existing occurrence of each key, keeping unrelated parameters.
fn merge_query(existing: Option<&str>, params: &[(&'static str, String)]) -> String {
    let mut pairs = existing
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or("");
            !params.iter().any(|(name, _)| *name == key)
        })
        .map(str::to_string)
        .collect::<Vec<_>>();

    pairs.extend(params.iter().map(|(name, value)| format!("{}={}", name, value)));
    pairs.join("&")
}

fn rebuild(uri: &Uri, path: &str, query: Option<&str>) -> Option<String> {
    let path_and_query = match query {
        Some(q) if !q.is_empty() => format!("{}?{}", path, q),
        _ => path.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).ok()?);
    Uri::from_parts(parts).ok().map(|u| u.to_string())
}
