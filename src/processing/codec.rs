use image::DynamicImage;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding failed: {0}")]
    Encode(String),
}

/// Encoding capability behind the derivative pipeline. Implementations must
/// strip source metadata by construction: they only ever see decoded pixel
/// data, normalized to 8-bit RGB before encoding.
pub trait ImageCodec: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extension of the files this codec produces, without the dot.
    fn extension(&self) -> &'static str;

    fn encode_to_file(&self, image: &DynamicImage, path: &Path) -> Result<(), CodecError>;
}

/// Lossy WebP encoder backed by native libwebp. Optional: only compiled with
/// the default `webp` feature, since the native library is not buildable
/// everywhere.
#[cfg(feature = "webp")]
pub struct LibwebpCodec {
    quality: f32,
}

#[cfg(feature = "webp")]
impl LibwebpCodec {
    pub fn new(quality: f32) -> Self {
        Self { quality }
    }
}

#[cfg(feature = "webp")]
impl ImageCodec for LibwebpCodec {
    fn name(&self) -> &'static str {
        "libwebp"
    }

    fn extension(&self) -> &'static str {
        "webp"
    }

    fn encode_to_file(&self, image: &DynamicImage, path: &Path) -> Result<(), CodecError> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let encoder = webp::Encoder::from_rgb(rgb.as_raw(), width, height);
        let encoded = encoder.encode(self.quality);
        std::fs::write(path, &*encoded)?;
        Ok(())
    }
}

/// Pure-Rust fallback encoder using the image crate. Only lossless WebP is
/// available here, so files are larger than the libwebp output, but the
/// derivative extension stays the same and the serving layer never has to
/// know which backend produced a file.
pub struct RasterCodec;

impl ImageCodec for RasterCodec {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn extension(&self) -> &'static str {
        "webp"
    }

    fn encode_to_file(&self, image: &DynamicImage, path: &Path) -> Result<(), CodecError> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::webp::WebPEncoder::new_lossless(std::io::BufWriter::new(output));
        encoder
            .encode(rgb.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(())
    }
}

/// Probe the encoders available in this build, best first.
pub fn available_codecs(quality: f32) -> Vec<Box<dyn ImageCodec>> {
    let mut codecs: Vec<Box<dyn ImageCodec>> = Vec::new();

    #[cfg(feature = "webp")]
    codecs.push(Box::new(LibwebpCodec::new(quality)));
    #[cfg(not(feature = "webp"))]
    let _ = quality;

    codecs.push(Box::new(RasterCodec));
    codecs
}
