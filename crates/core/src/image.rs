//! Background image loading and format detection.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Raster formats accepted as a background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
}

impl ImageFormat {
    /// Detect format from file magic bytes.
    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }

        if bytes.len() >= 14 && bytes.starts_with(b"BM") {
            return Some(Self::Bmp);
        }

        None
    }

    /// File extension used for the media part.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
        }
    }

    /// MIME content type registered in the package.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
        }
    }
}

/// A picture stretched over every slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundImage {
    pub data: Vec<u8>,
    pub format: ImageFormat,
}

impl BackgroundImage {
    /// Wrap raw bytes, detecting the format.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let format = ImageFormat::from_magic(&data).ok_or_else(|| {
            Error::UnsupportedImage(format!(
                "unrecognized header ({} bytes)",
                data.len().min(8)
            ))
        })?;
        Ok(Self { data, format })
    }

    /// Read and detect an image file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        Self::from_bytes(data).map_err(|e| match e {
            Error::UnsupportedImage(reason) => {
                Error::UnsupportedImage(format!("{}: {}", path.display(), reason))
            }
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_magic() {
        assert_eq!(
            ImageFormat::from_magic(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            ImageFormat::from_magic(b"\x89PNG\r\n\x1a\n...."),
            Some(ImageFormat::Png)
        );
        assert_eq!(ImageFormat::from_magic(b"GIF89a..."), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::from_magic(b"PK\x03\x04"), None);
        assert_eq!(ImageFormat::from_magic(b""), None);
    }

    #[test]
    fn test_from_bytes_rejects_text() {
        let err = BackgroundImage::from_bytes(b"not an image".to_vec()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedImage(_)));
    }

    #[test]
    fn test_open_missing_file_is_io_error() {
        let err = BackgroundImage::open("/definitely/not/here.jpg").unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
    }

    #[test]
    fn test_part_naming() {
        assert_eq!(ImageFormat::Jpeg.extension(), "jpeg");
        assert_eq!(ImageFormat::Png.content_type(), "image/png");
    }
}
