//! Brick payloads as ordinary images.
//!
//! Export writes the pixel grid as a PNG. Import takes an edited PNG of the same size and
//! packing and swaps it in as the payload while keeping the header, which is how a brick
//! gets modified by hand.

use std::path::{Path, PathBuf};

use image::{ExtendedColorType, ImageReader};
use thiserror::Error;

use crate::format::Brick;
use crate::validate::{ValidationError, check_header};

#[derive(Debug, Error)]
pub enum BrickImageError {
    #[error("brick header is invalid: {0}")]
    InvalidHeader(#[from] ValidationError),
    #[error("{bytes_per_pixel} bytes per pixel has no image color type")]
    UnsupportedPacking { bytes_per_pixel: u8 },
    #[error("image {path} is {width}x{height}, brick grid is {side}x{side}")]
    SizeMismatch {
        path: PathBuf,
        width: u32,
        height: u32,
        side: u32,
    },
    #[error("image error for {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("io error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn color_type_for(bytes_per_pixel: u8) -> Result<ExtendedColorType, BrickImageError> {
    match bytes_per_pixel {
        1 => Ok(ExtendedColorType::L8),
        2 => Ok(ExtendedColorType::La8),
        3 => Ok(ExtendedColorType::Rgb8),
        4 => Ok(ExtendedColorType::Rgba8),
        other => Err(BrickImageError::UnsupportedPacking {
            bytes_per_pixel: other,
        }),
    }
}

pub fn export_png(brick: &Brick, path: &Path) -> Result<(), BrickImageError> {
    check_header(brick)?;
    let color_type = color_type_for(brick.header.bytes_per_pixel)?;
    let side = brick.side().unwrap_or(0);
    image::save_buffer_with_format(
        path,
        &brick.payload,
        side,
        side,
        color_type,
        image::ImageFormat::Png,
    )
    .map_err(|source| BrickImageError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Replace the payload of `brick` with the pixels of `path`, keeping every header field.
pub fn import_png_payload(brick: &Brick, path: &Path) -> Result<Brick, BrickImageError> {
    check_header(brick)?;
    color_type_for(brick.header.bytes_per_pixel)?;
    let side = brick.side().unwrap_or(0);

    let image = ImageReader::open(path)
        .map_err(|source| BrickImageError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .decode()
        .map_err(|source| BrickImageError::Image {
            path: path.to_path_buf(),
            source,
        })?;
    if image.width() != side || image.height() != side {
        return Err(BrickImageError::SizeMismatch {
            path: path.to_path_buf(),
            width: image.width(),
            height: image.height(),
            side,
        });
    }

    let payload = match brick.header.bytes_per_pixel {
        1 => image.into_luma8().into_raw(),
        2 => image.into_luma_alpha8().into_raw(),
        3 => image.into_rgb8().into_raw(),
        _ => image.into_rgba8().into_raw(),
    };
    Ok(Brick {
        header: brick.header,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};
    use crate::validate::{BrickValidator, ValidationWarning};

    #[test]
    fn exported_png_imports_back_to_the_same_payload() {
        let directory = tempfile::tempdir().expect("tempdir");
        let png_path = directory.path().join("shader.png");
        let brick = encode(b"@fragment fn fs_main() {}", 3, 4).expect("fits");

        export_png(&brick, &png_path).expect("export");
        let imported = import_png_payload(&brick, &png_path).expect("import");
        assert_eq!(imported, brick);
    }

    #[test]
    fn edited_png_keeps_header_and_flags_entropy() {
        let directory = tempfile::tempdir().expect("tempdir");
        let png_path = directory.path().join("edited.png");
        let brick = encode(&[b'A'; 64], 3, 4).expect("fits");

        let mut edited = brick.payload.clone();
        for (index, byte) in edited.iter_mut().enumerate() {
            *byte = index as u8;
        }
        image::save_buffer(&png_path, &edited, 8, 8, ExtendedColorType::Rgba8).expect("save");

        let imported = import_png_payload(&brick, &png_path).expect("import");
        assert_eq!(imported.header, brick.header);
        assert_eq!(decode(&imported).expect("decode").len(), 64);
        let report = BrickValidator::default().validate(&imported).expect("well formed");
        assert!(matches!(
            report.warnings.as_slice(),
            [ValidationWarning::EntropyMismatch { .. }]
        ));
    }

    #[test]
    fn wrong_image_size_is_rejected() {
        let directory = tempfile::tempdir().expect("tempdir");
        let png_path = directory.path().join("small.png");
        image::save_buffer(&png_path, &[0u8; 16], 2, 2, ExtendedColorType::Rgba8).expect("save");
        let brick = encode(b"abc", 3, 4).expect("fits");
        assert!(matches!(
            import_png_payload(&brick, &png_path),
            Err(BrickImageError::SizeMismatch { side: 8, .. })
        ));
    }

    #[test]
    fn wide_packing_cannot_be_exported() {
        let directory = tempfile::tempdir().expect("tempdir");
        let brick = encode(b"abc", 1, 8).expect("fits");
        assert!(matches!(
            export_png(&brick, &directory.path().join("wide.png")),
            Err(BrickImageError::UnsupportedPacking { bytes_per_pixel: 8 })
        ));
    }
}
