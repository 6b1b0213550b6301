//! Thumbnail derivation for stored images.
//!
//! A thumbnail lives next to its source as `<stem>.tmb.png` and is
//! generated at most once: an existing thumbnail is always reused.
//!
//! The server only depends on the [`ThumbnailGenerator`] trait;
//! [`ImageThumbnailer`] is the default implementation backed by the
//! `image` crate.

use std::future::Future;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use image::ImageFormat;
use image::imageops::FilterType;
use scdft_file_store::{StoreError, thumbnail_path, write_atomic};
use tracing::{debug, info};

/// Default thumbnail width in pixels.
pub const THUMBNAIL_WIDTH: u32 = 100;

/// Default thumbnail height in pixels.
pub const THUMBNAIL_HEIGHT: u32 = 75;

/// Errors produced while deriving a thumbnail.
#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("source image not found: {0}")]
    SourceNotFound(String),

    #[error("loading image file error: {path} => {message}")]
    Load { path: String, message: String },

    #[error("save thumbnail error: {0}")]
    Encode(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("thumbnail task failed: {0}")]
    Task(String),
}

/// A boxed future returned by [`ThumbnailGenerator::thumbnail`].
pub type ThumbnailFuture<'a> = Pin<Box<dyn Future<Output = Result<PathBuf, ThumbnailError>> + Send + 'a>>;

/// Produces (or reuses) the thumbnail of a stored image.
pub trait ThumbnailGenerator: Send + Sync + 'static {
    /// Returns the thumbnail path for `source`, generating it if missing.
    fn thumbnail<'a>(&'a self, source: &'a Path) -> ThumbnailFuture<'a>;
}

/// Fixed-size PNG thumbnails via the `image` crate.
///
/// The source format is sniffed from its content; the image is scaled to
/// exactly `width x height` (aspect ratio ignored) with a smoothing filter.
#[derive(Debug, Clone, Copy)]
pub struct ImageThumbnailer {
    width: u32,
    height: u32,
}

impl Default for ImageThumbnailer {
    fn default() -> Self {
        Self::new(THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT)
    }
}

impl ImageThumbnailer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Thumbnail dimensions as `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl ThumbnailGenerator for ImageThumbnailer {
    fn thumbnail<'a>(&'a self, source: &'a Path) -> ThumbnailFuture<'a> {
        Box::pin(async move {
            let thumb = thumbnail_path(source);
            if tokio::fs::try_exists(&thumb).await.unwrap_or(false) {
                debug!(path = %thumb.display(), "reusing existing thumbnail");
                return Ok(thumb);
            }

            if !tokio::fs::try_exists(source).await.unwrap_or(false) {
                return Err(ThumbnailError::SourceNotFound(source.display().to_string()));
            }

            // Decode/resize/encode is CPU-bound; keep it off the runtime.
            let (width, height) = self.size();
            let src = source.to_path_buf();
            let png = tokio::task::spawn_blocking(move || render_png(&src, width, height))
                .await
                .map_err(|e| ThumbnailError::Task(e.to_string()))??;

            write_atomic(&thumb, &png).await?;
            info!(
                source = %source.display(),
                path = %thumb.display(),
                bytes = png.len(),
                "thumbnail generated"
            );
            Ok(thumb)
        })
    }
}

/// Decodes `source` and returns a `width x height` PNG encoding of it.
pub fn render_png(source: &Path, width: u32, height: u32) -> Result<Vec<u8>, ThumbnailError> {
    let load_err = |message: String| ThumbnailError::Load {
        path: source.display().to_string(),
        message,
    };

    let img = image::ImageReader::open(source)
        .map_err(|e| load_err(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| load_err(e.to_string()))?
        .decode()
        .map_err(|e| load_err(e.to_string()))?;

    let thumb = img.resize_exact(width, height, FilterType::Triangle);

    let mut out = Cursor::new(Vec::new());
    thumb
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| ThumbnailError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_image(path: &Path) {
        let img = image::RgbImage::from_fn(32, 24, |x, y| image::Rgb([(x * 8) as u8, (y * 10) as u8, 128]));
        img.save_with_format(path, ImageFormat::Png).unwrap();
    }

    #[tokio::test]
    async fn generates_png_with_expected_size() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("photo.png");
        write_test_image(&source);

        let thumb = ImageThumbnailer::default().thumbnail(&source).await.unwrap();
        assert_eq!(thumb, dir.path().join("photo.tmb.png"));

        let decoded = image::open(&thumb).unwrap();
        assert_eq!(decoded.width(), THUMBNAIL_WIDTH);
        assert_eq!(decoded.height(), THUMBNAIL_HEIGHT);
        assert!(!dir.path().join("photo.tmb.tmp").exists());
    }

    #[tokio::test]
    async fn format_is_sniffed_from_content() {
        let dir = tempfile::tempdir().unwrap();
        // PNG bytes behind a misleading extension.
        let source = dir.path().join("scan.dat");
        write_test_image(&dir.path().join("real.png"));
        std::fs::rename(dir.path().join("real.png"), &source).unwrap();

        let thumb = ImageThumbnailer::new(10, 10).thumbnail(&source).await.unwrap();
        assert_eq!(image::open(&thumb).unwrap().width(), 10);
    }

    #[tokio::test]
    async fn existing_thumbnail_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("photo.png");
        write_test_image(&source);

        let generator = ImageThumbnailer::default();
        let first = generator.thumbnail(&source).await.unwrap();
        let first_bytes = std::fs::read(&first).unwrap();

        // Generation would now fail, so success proves reuse.
        std::fs::write(&source, b"not an image any more").unwrap();

        let second = generator.thumbnail(&source).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), first_bytes);
    }

    #[tokio::test]
    async fn missing_source_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageThumbnailer::default()
            .thumbnail(&dir.path().join("missing.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ThumbnailError::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn undecodable_source_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("notes.txt");
        std::fs::write(&source, b"plain text").unwrap();

        let err = ImageThumbnailer::default().thumbnail(&source).await.unwrap_err();
        assert!(matches!(err, ThumbnailError::Load { .. }));
        assert!(!dir.path().join("notes.tmb.png").exists());
    }
}
