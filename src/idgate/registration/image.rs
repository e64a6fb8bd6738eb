use std::fmt;
use std::path::Path;

use crate::idgate::{Error, Result};

const MIB: usize = 1024 * 1024;
const ALLOWED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    Face,
    Nic,
}

impl ImageKind {
    #[must_use]
    pub const fn max_bytes(self) -> usize {
        match self {
            Self::Face => 5 * MIB,
            Self::Nic => 10 * MIB,
        }
    }

    /// Multipart field name expected by the backend.
    #[must_use]
    pub const fn field_name(self) -> &'static str {
        match self {
            Self::Face => "faceImage",
            Self::Nic => "nicImage",
        }
    }
}

#[derive(Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Content type from the file extension, `None` when unknown.
#[must_use]
pub fn content_type_for(file_name: &str) -> Option<&'static str> {
    let extension = Path::new(file_name).extension()?.to_str()?.to_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

impl ImageUpload {
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = content_type_for(&file_name)
            .unwrap_or("application/octet-stream")
            .to_string();
        Self {
            file_name,
            content_type,
            bytes,
        }
    }

    /// # Errors
    /// Returns [`Error::InvalidImage`] if the file cannot be read.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| Error::InvalidImage(format!("cannot read {}: {err}", path.display())))?;
        let file_name = path
            .file_name()
            .map_or_else(|| "image".to_string(), |name| name.to_string_lossy().into_owned());
        Ok(Self::new(file_name, bytes))
    }

    /// Local checks before the upload: non-empty, an allowed type and within
    /// the size limit for `kind`.
    ///
    /// # Errors
    /// Returns a user-facing description of the first problem found.
    pub fn check(&self, kind: ImageKind) -> std::result::Result<(), String> {
        if self.bytes.is_empty() {
            return Err("Image file is empty".to_string());
        }
        if !ALLOWED_CONTENT_TYPES.contains(&self.content_type.as_str()) {
            return Err("Invalid image format. Only JPEG, PNG, and GIF are allowed".to_string());
        }
        if self.bytes.len() > kind.max_bytes() {
            return Err(format!(
                "Image is too large. Maximum size is {} MB",
                kind.max_bytes() / MIB
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_from_extension() {
        assert_eq!(content_type_for("me.JPG"), Some("image/jpeg"));
        assert_eq!(content_type_for("nic.png"), Some("image/png"));
        assert_eq!(content_type_for("nic.bmp"), None);
        assert_eq!(content_type_for("noext"), None);
    }

    #[test]
    fn rejects_empty_and_unknown_types() {
        assert!(ImageUpload::new("face.jpg", Vec::new()).check(ImageKind::Face).is_err());
        assert!(ImageUpload::new("face.tiff", vec![1]).check(ImageKind::Face).is_err());
        assert!(ImageUpload::new("face.jpg", vec![1]).check(ImageKind::Face).is_ok());
    }

    #[test]
    fn size_limit_depends_on_kind() {
        let image = ImageUpload::new("doc.png", vec![0; 6 * MIB]);
        assert!(image.check(ImageKind::Face).is_err());
        assert!(image.check(ImageKind::Nic).is_ok());
    }

    #[test]
    fn debug_omits_bytes() {
        let image = ImageUpload::new("face.jpg", vec![42; 3]);
        assert!(format!("{image:?}").contains("len: 3"));
    }

    #[tokio::test]
    async fn from_path_reads_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nic.jpeg");
        std::fs::write(&path, [0xff, 0xd8, 0xff])?;
        let image = ImageUpload::from_path(&path).await?;
        assert_eq!(image.file_name, "nic.jpeg");
        assert_eq!(image.content_type, "image/jpeg");
        assert_eq!(image.bytes.len(), 3);
        Ok(())
    }
}
