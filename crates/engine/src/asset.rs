use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// An importable or recorded video the session can trim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAsset {
    pub path: PathBuf,
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub duration_seconds: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl VideoAsset {
    /// Creates an asset whose name and MIME type are derived from `path`.
    ///
    /// # Example
    /// ```
    /// use trim_engine::VideoAsset;
    ///
    /// let asset = VideoAsset::new("/v/a.mp4", 10.0);
    /// assert_eq!(asset.name, "a.mp4");
    /// assert_eq!(asset.mime_type, "video/mp4");
    /// assert!(asset.is_usable());
    /// ```
    pub fn new(path: impl Into<PathBuf>, duration_seconds: f64) -> Self {
        let path = path.into();
        Self {
            name: display_name(&path),
            mime_type: mime_type_for_path(&path).to_string(),
            path,
            size_bytes: 0,
            duration_seconds,
            width: None,
            height: None,
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    pub fn with_dimensions(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Returns whether the asset has a positive, finite duration.
    pub fn is_usable(&self) -> bool {
        self.duration_seconds.is_finite() && self.duration_seconds > 0.0
    }
}

/// File name of `path`, or the whole path when it has none.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Guesses a container MIME type from the file extension.
pub fn mime_type_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|extension| extension.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("mp4") => "video/mp4",
        Some("m4v") => "video/x-m4v",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("ogv") => "video/ogg",
        Some("ts") => "video/mp2t",
        _ => "application/octet-stream",
    }
}
