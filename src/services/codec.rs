//! Image codec service
//!
//! Decoding and encoding live outside the pixel pipeline: the pipeline only
//! ever sees `Bitmap`s. Codec failures surface verbatim as `Decode`/`Encode`.

use crate::{
    error::{BgRemovalError, Result},
    types::Bitmap,
};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// Service for converting between encoded bytes and bitmaps
pub struct ImageCodec;

impl ImageCodec {
    /// Decode any supported format into an RGBA bitmap
    ///
    /// # Examples
    /// ```rust,no_run
    /// use nobg::services::ImageCodec;
    ///
    /// let bytes = std::fs::read("input.jpg")?;
    /// let bitmap = ImageCodec::decode(&bytes)?;
    /// println!("{}x{}", bitmap.width(), bitmap.height());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn decode(bytes: &[u8]) -> Result<Bitmap> {
        let image = image::load_from_memory(bytes).map_err(BgRemovalError::Decode)?;
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            color = ?image.color(),
            "Decoded image"
        );
        Bitmap::from_rgba_image(image.to_rgba8())
    }

    /// Decode with an explicit format instead of content sniffing
    pub fn decode_with_format(bytes: &[u8], format: ImageFormat) -> Result<Bitmap> {
        let image =
            image::load_from_memory_with_format(bytes, format).map_err(BgRemovalError::Decode)?;
        Bitmap::from_rgba_image(image.to_rgba8())
    }

    /// Encode a bitmap as PNG, keeping its alpha channel
    pub fn encode_png(bitmap: &Bitmap) -> Result<Vec<u8>> {
        let image = DynamicImage::ImageRgba8(bitmap.to_rgba_image());
        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(BgRemovalError::Encode)?;
        Ok(buffer.into_inner())
    }

    /// Read and decode an image file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Bitmap> {
        let path_ref = path.as_ref();
        let data = std::fs::read(path_ref)
            .map_err(|e| BgRemovalError::file_io_error("read image file", path_ref, &e))?;
        Self::decode(&data)
    }

    /// Encode as PNG and write to `path`, creating parent directories
    pub fn save_png<P: AsRef<Path>>(bitmap: &Bitmap, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BgRemovalError::file_io_error("create output directory", parent, &e)
                })?;
            }
        }

        let bytes = Self::encode_png(bitmap)?;
        std::fs::write(path_ref, bytes)
            .map_err(|e| BgRemovalError::file_io_error("write output image", path_ref, &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> Bitmap {
        let mut bitmap = Bitmap::filled(4, 3, [255, 0, 0, 255]).unwrap();
        bitmap.set_pixel(1, 1, [0, 0, 255, 0]);
        bitmap.set_pixel(3, 2, [10, 20, 30, 128]);
        bitmap
    }

    #[test]
    fn test_png_preserves_alpha() {
        let original = checker();
        let bytes = ImageCodec::encode_png(&original).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");

        let decoded = ImageCodec::decode(&bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let err = ImageCodec::decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, BgRemovalError::Decode(_)));

        let err = ImageCodec::decode(&[]).unwrap_err();
        assert!(matches!(err, BgRemovalError::Decode(_)));
    }

    #[test]
    fn test_decode_with_wrong_format() {
        let bytes = ImageCodec::encode_png(&checker()).unwrap();
        assert!(ImageCodec::decode_with_format(&bytes, ImageFormat::Png).is_ok());
        assert!(matches!(
            ImageCodec::decode_with_format(&bytes, ImageFormat::Jpeg),
            Err(BgRemovalError::Decode(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.png");

        ImageCodec::save_png(&checker(), &path).unwrap();
        assert_eq!(ImageCodec::load(&path).unwrap(), checker());

        let missing = ImageCodec::load(dir.path().join("missing.png"));
        assert!(matches!(missing, Err(BgRemovalError::Io(_))));
    }
}
