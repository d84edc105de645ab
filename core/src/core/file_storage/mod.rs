//! Blob and thumbnail files of file messages.
//!
//! Layout: `{files_path}/{id}.send` holds the uploaded bytes and
//! `{files_path}/{id}.small` the PNG thumbnail of image uploads.

use crate::types::RecordId;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub mod error {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum FileStorageError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Image error: {0}")]
        Image(#[from] image::ImageError),

        #[error("Resize error: {0}")]
        Resize(#[from] fast_image_resize::ResizeError),

        #[error("Zip error: {0}")]
        Zip(#[from] zip::result::ZipError),

        #[error("Unsupported image format")]
        UnsupportedFormat,
    }
}

use error::FileStorageError;

pub struct FileStorage {
    pub files_path: PathBuf,
}

fn remove_if_exists(path: &Path) -> Result<(), FileStorageError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl FileStorage {
    /// Opens the files directory, creating it if needed.
    pub fn new(files_path: PathBuf) -> Result<Self, FileStorageError> {
        std::fs::create_dir_all(&files_path)?;
        Ok(Self { files_path })
    }

    pub fn blob_path(&self, id: &RecordId) -> PathBuf {
        self.files_path.join(format!("{id}.send"))
    }

    pub fn thumbnail_path(&self, id: &RecordId) -> PathBuf {
        self.files_path.join(format!("{id}.small"))
    }
}

/// Blob operations.
impl FileStorage {
    pub fn write_blob(&self, id: &RecordId, bytes: &[u8]) -> Result<(), FileStorageError> {
        std::fs::write(self.blob_path(id), bytes)?;
        Ok(())
    }

    pub fn read_blob(&self, id: &RecordId) -> Result<Vec<u8>, FileStorageError> {
        Ok(std::fs::read(self.blob_path(id))?)
    }

    /// Removes the blob and thumbnail of every id. Missing files are fine.
    ///
    /// Every path is attempted; the failures are returned.
    pub fn remove(&self, ids: &[RecordId]) -> Vec<FileStorageError> {
        ids.iter()
            .flat_map(|id| [self.blob_path(id), self.thumbnail_path(id)])
            .filter_map(|path| remove_if_exists(&path).err())
            .collect()
    }

    /// Removes the whole files directory and recreates it empty.
    pub fn reset(&self) -> Result<(), FileStorageError> {
        match std::fs::remove_dir_all(&self.files_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        std::fs::create_dir_all(&self.files_path)?;
        Ok(())
    }

    /// Writes a deflated zip of `entries` (blob id, name inside the archive)
    /// to the blob of `archive_id` and returns its size.
    ///
    /// A partially written archive is removed on failure.
    pub fn zip_files(
        &self,
        archive_id: &RecordId,
        entries: &[(RecordId, String)],
    ) -> Result<u64, FileStorageError> {
        let archive_path = self.blob_path(archive_id);

        match self.write_zip(&archive_path, entries) {
            Ok(()) => Ok(std::fs::metadata(&archive_path)?.len()),
            Err(e) => {
                let _ = remove_if_exists(&archive_path);
                Err(e)
            }
        }
    }

    fn write_zip(
        &self,
        archive_path: &Path,
        entries: &[(RecordId, String)],
    ) -> Result<(), FileStorageError> {
        let mut writer = zip::ZipWriter::new(BufWriter::new(File::create(archive_path)?));
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for (id, name) in entries {
            let mut blob = File::open(self.blob_path(id))?;
            writer.start_file(name.as_str(), options)?;
            io::copy(&mut blob, &mut writer)?;
        }

        writer.finish()?.flush()?;
        Ok(())
    }
}

/// Thumbnail operations.
impl FileStorage {
    const THUMB_SIZE: u32 = 200;
    const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

    pub fn is_supported_image(filename: &str) -> bool {
        let Some((_, ext)) = filename.rsplit_once('.') else {
            return false;
        };
        Self::SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
    }

    /// Rejects bytes that claim a supported image extension but don't decode.
    pub fn check_image(filename: &str, bytes: &[u8]) -> Result<(), FileStorageError> {
        if Self::is_supported_image(filename) {
            image::load_from_memory(bytes)?;
        }
        Ok(())
    }

    /// Renders the blob of `id` into a PNG at most 200 px on its long edge.
    ///
    /// Returns `Err(UnsupportedFormat)` if the file is not a supported image.
    pub fn generate_thumbnail(
        &self,
        id: &RecordId,
        filename: &str,
    ) -> Result<(), FileStorageError> {
        if !Self::is_supported_image(filename) {
            return Err(FileStorageError::UnsupportedFormat);
        }

        // Blobs carry no image extension, so sniff the format
        let src_image = image::ImageReader::open(self.blob_path(id))?
            .with_guessed_format()?
            .decode()?;
        let (src_width, src_height) = (src_image.width(), src_image.height());

        // Calculate target dimensions preserving aspect ratio
        let scale = (Self::THUMB_SIZE as f32 / src_width.max(src_height) as f32).min(1.0);
        let dst_width = ((src_width as f32 * scale) as u32).max(1);
        let dst_height = ((src_height as f32 * scale) as u32).max(1);

        let mut dst_image = image::DynamicImage::new(dst_width, dst_height, src_image.color());

        let mut resizer = fast_image_resize::Resizer::new();
        resizer.resize(
            &src_image,
            &mut dst_image,
            Some(&fast_image_resize::ResizeOptions::new().resize_alg(
                fast_image_resize::ResizeAlg::Convolution(fast_image_resize::FilterType::Lanczos3),
            )),
        )?;

        dst_image.save_with_format(self.thumbnail_path(id), image::ImageFormat::Png)?;

        Ok(())
    }
}
