//! Product image uploads written to the local uploads directory.
//!
//! Files land in `<uploads>/products/<uuid>.<ext>` and are served back under
//! `/uploads/products/`. A batch succeeds if at least one file is accepted;
//! rejected files are reported as warnings.

use std::path::{Path, PathBuf};

use axum::body::Bytes;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Largest accepted image.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];
const ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// Public URL prefix of stored product images.
const PUBLIC_PREFIX: &str = "/uploads/products";

/// One file from a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    fn display_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or("unknown")
    }

    /// Lowercased extension, if it is one we accept and the MIME type agrees.
    fn image_extension(&self) -> Option<String> {
        let ext = Path::new(self.file_name.as_deref()?)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        let mime = self.content_type.as_deref()?.to_ascii_lowercase();
        (ALLOWED_EXTENSIONS.contains(&ext.as_str()) && ALLOWED_MIME_TYPES.contains(&mime.as_str()))
            .then_some(ext)
    }
}

/// Result of a successful upload request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum UploadOutcome {
    /// Exactly one file was sent and accepted.
    Single { url: String },
    Multiple {
        urls: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No image file provided")]
    NoFiles,

    /// Every file was rejected. Carries the joined reasons.
    #[error("{0}")]
    Rejected(String),

    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes accepted images under the uploads root.
#[derive(Debug, Clone)]
pub struct ImageUploads {
    root: PathBuf,
}

impl ImageUploads {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn products_dir(&self) -> PathBuf {
        self.root.join("products")
    }

    /// Validate and store a batch of files.
    ///
    /// # Errors
    ///
    /// `NoFiles` for an empty batch, `Rejected` when no file passes the type
    /// and size checks, `Io` when writing fails.
    pub async fn store(&self, files: Vec<UploadedFile>) -> Result<UploadOutcome, UploadError> {
        if files.is_empty() {
            return Err(UploadError::NoFiles);
        }

        let dir = self.products_dir();
        tokio::fs::create_dir_all(&dir).await?;

        let sent = files.len();
        let mut urls = Vec::with_capacity(sent);
        let mut warnings = Vec::new();

        for file in &files {
            let Some(ext) = file.image_extension() else {
                warnings.push(format!(
                    "File \"{}\" is not a valid image. Only JPG, PNG and WebP files are allowed.",
                    file.display_name()
                ));
                continue;
            };
            if file.data.len() > MAX_IMAGE_BYTES {
                warnings.push(format!(
                    "File \"{}\" exceeds 5MB size limit.",
                    file.display_name()
                ));
                continue;
            }
            if file.data.is_empty() {
                warnings.push(format!("File \"{}\" is empty.", file.display_name()));
                continue;
            }

            let name = format!("{}.{ext}", Uuid::new_v4());
            tokio::fs::write(dir.join(&name), &file.data).await?;
            tracing::info!(file = %name, bytes = file.data.len(), "Stored product image");
            urls.push(format!("{PUBLIC_PREFIX}/{name}"));
        }

        if urls.is_empty() {
            tracing::warn!(files = sent, "Rejected every uploaded file");
            return Err(UploadError::Rejected(warnings.join(" ")));
        }

        if sent == 1 && urls.len() == 1 {
            return Ok(UploadOutcome::Single {
                url: urls.swap_remove(0),
            });
        }
        Ok(UploadOutcome::Multiple { urls, warnings })
    }
}
