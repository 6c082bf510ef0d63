//! Enrollment: a face image plus the name or roll number it belongs to.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::client::AttendanceClient;
use crate::error::{ClientError, Result, ValidationError};
use crate::notifier::{NotificationKind, Notifier};

pub const VALIDATION_MESSAGE: &str = "Please select a file and enter a name or roll number.";
pub const UPLOAD_ERROR_MESSAGE: &str = "Error uploading file.";

/// What the operator has entered so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadForm {
    pub file: Option<PathBuf>,
    pub label: String,
}

impl UploadForm {
    pub fn new(file: Option<PathBuf>, label: impl Into<String>) -> Self {
        Self { file, label: label.into() }
    }

    /// Returns the selected file and the trimmed label.
    ///
    /// A whitespace-only label counts as missing, stricter than an emptiness check.
    pub fn validate(&self) -> std::result::Result<(&Path, &str), ValidationError> {
        let file = self
            .file
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(ValidationError::MissingFile)?;

        let label = self.label.trim();
        if label.is_empty() {
            return Err(ValidationError::MissingLabel);
        }

        Ok((file, label))
    }
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Name the file is sent under, derived from the label
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub label: String,
}

impl UploadRequest {
    pub async fn read(path: &Path, label: &str) -> Result<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ClientError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            file_name: upload_file_name(label, path),
            bytes,
            label: label.to_string(),
        })
    }

    pub fn mime_type(&self) -> &'static str {
        mime_for(Path::new(&self.file_name))
    }
}

/// The server files an upload under the stem of its name, so the label becomes the stem.
///
/// Deliberate departure from a plain form post: the selected file's own name is
/// not sent, the upload always goes out as `<label>.<ext>`.
pub fn upload_file_name(label: &str, original: &Path) -> String {
    let stem: String = label
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') || c.is_control() { '_' } else { c })
        .collect();

    match original.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{stem}.{}", ext.to_ascii_lowercase()),
        _ => stem,
    }
}

pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("bmp") => "image/bmp",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

#[derive(Clone)]
pub struct Uploader {
    client: Arc<AttendanceClient>,
    notifier: Notifier,
}

impl Uploader {
    pub fn new(client: Arc<AttendanceClient>, notifier: Notifier) -> Self {
        Self { client, notifier }
    }

    /// Validates the form, sends it and reports the outcome.
    ///
    /// Returns the kind of notification that was shown.
    pub async fn upload_file(&self, form: &UploadForm) -> NotificationKind {
        let (path, label) = match form.validate() {
            Ok(valid) => valid,
            Err(e) => {
                debug!(%e, "upload form incomplete");
                self.notifier.notify(VALIDATION_MESSAGE, NotificationKind::Error);
                return NotificationKind::Error;
            }
        };

        match self.send(path, label).await {
            Ok(message) => {
                info!(label, %message, "upload answered");
                self.notifier.notify(message, NotificationKind::Success);
                NotificationKind::Success
            }
            Err(e) => {
                error!(error = %e, "upload failed");
                self.notifier.notify(UPLOAD_ERROR_MESSAGE, NotificationKind::Error);
                NotificationKind::Error
            }
        }
    }

    async fn send(&self, path: &Path, label: &str) -> Result<String> {
        let request = UploadRequest::read(path, label).await?;
        let result = self.client.upload(request).await?;
        Ok(result.message)
    }
}
