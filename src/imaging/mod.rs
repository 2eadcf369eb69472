//! Image delivery: URL rewriting, variant encoding, on-the-fly rendering and
//! the adaptive element state machine.

pub mod element;
pub mod encoder;
pub mod render;
pub mod url;

pub use element::{AdaptiveImage, ImageOptions, ImageSource, LoadOutcome};
pub use encoder::{EncodedImage, ImageVariant, ImagingError};
