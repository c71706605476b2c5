//! Derivative generation: resize an uploaded original into a fixed set of
//! named, re-encoded WebP renditions.

pub mod codec;
pub mod orientation;

use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub use codec::{CodecError, ImageCodec};

pub const DEFAULT_WEBP_QUALITY: f32 = 85.0;

/// Ordered mapping of size label to target width. Order is preserved all the
/// way to the output so callers can rely on it.
#[derive(Debug, Clone)]
pub struct SizeSpec {
    entries: Vec<(String, u32)>,
}

impl SizeSpec {
    pub fn new(entries: Vec<(String, u32)>) -> Self {
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries
            .iter()
            .map(|(label, width)| (label.as_str(), *width))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SizeSpec {
    fn default() -> Self {
        Self::new(vec![
            ("large".to_string(), 1200),
            ("medium".to_string(), 800),
            ("thumb".to_string(), 320),
        ])
    }
}

#[derive(Debug, Error)]
pub enum DerivativeError {
    #[error("source image not found or not readable: {0}")]
    SourceUnreadable(PathBuf),

    #[error("failed to decode source image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("no image backend available")]
    NoCodecAvailable,

    #[error("failed to write derivative '{label}' at {}", path.display())]
    WriteFailed {
        label: String,
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Produces resized derivatives of a source image under a destination
/// directory, one subdirectory per size label.
///
/// Backends are tried in probe order; when one fails for any reason the whole
/// operation is rerun from scratch on the next one, so a half-finished
/// attempt never mixes output from two encoders.
pub struct DerivativeGenerator {
    codecs: Vec<Box<dyn ImageCodec>>,
}

impl DerivativeGenerator {
    pub fn new(quality: f32) -> Self {
        Self {
            codecs: codec::available_codecs(quality),
        }
    }

    #[cfg(test)]
    fn with_codecs(codecs: Vec<Box<dyn ImageCodec>>) -> Self {
        Self { codecs }
    }

    /// Generate every derivative in `sizes`, returning `(label, path)` pairs
    /// in spec order.
    ///
    /// Derivatives are never upscaled: the target width is clamped to the
    /// (orientation-corrected) source width, with a floor of one pixel.
    pub fn generate(
        &self,
        source: &Path,
        dest_dir: &Path,
        sizes: &SizeSpec,
    ) -> Result<Vec<(String, PathBuf)>, DerivativeError> {
        if !source.is_file() {
            return Err(DerivativeError::SourceUnreadable(source.to_path_buf()));
        }
        std::fs::create_dir_all(dest_dir)?;

        if self.codecs.is_empty() {
            return Err(DerivativeError::NoCodecAvailable);
        }

        let mut last_error = None;
        for codec in &self.codecs {
            match self.generate_with(codec.as_ref(), source, dest_dir, sizes) {
                Ok(outputs) => {
                    if last_error.is_some() {
                        debug!(
                            "derivatives for {} produced by fallback backend '{}'",
                            source.display(),
                            codec.name()
                        );
                    }
                    return Ok(outputs);
                }
                Err(e) => {
                    warn!(
                        "image backend '{}' failed for {}: {}",
                        codec.name(),
                        source.display(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(DerivativeError::NoCodecAvailable))
    }

    fn generate_with(
        &self,
        codec: &dyn ImageCodec,
        source: &Path,
        dest_dir: &Path,
        sizes: &SizeSpec,
    ) -> Result<Vec<(String, PathBuf)>, DerivativeError> {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| DerivativeError::SourceUnreadable(source.to_path_buf()))?;

        let img = image::open(source)?;
        // One orientation pass before any resize so all sizes agree.
        let img = orientation::apply(img, orientation::read_orientation(source));
        let (src_width, src_height) = (img.width(), img.height());

        let mut outputs = Vec::with_capacity(sizes.len());
        for (label, configured_width) in sizes.iter() {
            let target_width = configured_width.min(src_width).max(1);
            let target_height = scaled_height(src_width, src_height, target_width);

            let resized = if target_width == src_width && target_height == src_height {
                img.clone()
            } else {
                img.resize_exact(target_width, target_height, FilterType::Lanczos3)
            };

            let label_dir = dest_dir.join(label);
            std::fs::create_dir_all(&label_dir)?;
            let out_path = label_dir.join(format!("{stem}.{}", codec.extension()));

            if let Err(source) = codec.encode_to_file(&resized, &out_path) {
                // Don't leave a truncated file where the serving layer will
                // find it.
                let _ = std::fs::remove_file(&out_path);
                return Err(DerivativeError::WriteFailed {
                    label: label.to_string(),
                    path: out_path,
                    source,
                });
            }

            outputs.push((label.to_string(), out_path));
        }

        Ok(outputs)
    }
}

/// Proportional height for a target width, rounded, clamped to 1px.
fn scaled_height(src_width: u32, src_height: u32, target_width: u32) -> u32 {
    let scaled =
        (u64::from(src_height) * u64::from(target_width) + u64::from(src_width) / 2) / u64::from(src_width);
    (scaled as u32).max(1)
}
