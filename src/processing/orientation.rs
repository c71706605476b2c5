use image::DynamicImage;
use std::path::Path;
use tracing::trace;

/// EXIF orientation values the pipeline corrects for. Mirrored transforms
/// (2, 4, 5, 7) are rare in camera output and are left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Normal,
    Rotate180,
    Rotate90Cw,
    Rotate90Ccw,
}

/// Read the EXIF orientation tag from an image file.
///
/// Missing or unparseable EXIF data is treated as normal orientation; the
/// derivative pipeline must not fail just because metadata is absent.
pub fn read_orientation(path: &Path) -> Orientation {
    let exif = match rexif::parse_file(path) {
        Ok(exif) => exif,
        Err(e) => {
            trace!("No EXIF data for {}: {}", path.display(), e);
            return Orientation::Normal;
        }
    };

    let raw = exif
        .entries
        .iter()
        .find(|entry| entry.tag == rexif::ExifTag::Orientation)
        .and_then(|entry| match &entry.value {
            rexif::TagValue::U16(values) => values.first().copied(),
            _ => None,
        });

    match raw {
        Some(3) => Orientation::Rotate180,
        Some(6) => Orientation::Rotate90Cw,
        Some(8) => Orientation::Rotate90Ccw,
        _ => Orientation::Normal,
    }
}

/// Apply an orientation correction. Runs once per source image, before any
/// resizing, so every derivative size shares a consistently-oriented source.
pub fn apply(image: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::Normal => image,
        Orientation::Rotate180 => image.rotate180(),
        Orientation::Rotate90Cw => image.rotate90(),
        Orientation::Rotate90Ccw => image.rotate270(),
    }
}
