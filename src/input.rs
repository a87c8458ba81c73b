//! User-supplied input: the selected document, model and page selector.
//!
//! A [`Document`] holds its payload in a reference-counted [`Bytes`] buffer,
//! so the controller, the upload and the preview all share one copy of the
//! file instead of duplicating it per consumer. A file larger than the
//! configured limit is never read: its document records the on-disk size
//! and carries no payload.

use crate::error::Ocr2MdError;
use bytes::Bytes;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Media type of the only previewable format.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// A document selected for conversion.
#[derive(Clone, PartialEq, Eq)]
pub struct Document {
    name: String,
    media_type: String,
    size: u64,
    payload: Bytes,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("size", &self.size())
            .finish()
    }
}

impl Document {
    pub fn new(
        name: impl Into<String>,
        media_type: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        let payload = payload.into();
        Self {
            name: name.into(),
            media_type: media_type.into(),
            size: payload.len() as u64,
            payload,
        }
    }

    /// Read a document from disk, deriving its name, size and media type.
    ///
    /// Files larger than `max_bytes` are not read; the returned document
    /// keeps their size so validation rejects it with `DocumentTooLarge`.
    pub async fn from_path(path: impl AsRef<Path>, max_bytes: u64) -> Result<Self, Ocr2MdError> {
        let path = path.as_ref();
        let read_error = |e: std::io::Error| match e.kind() {
            std::io::ErrorKind::NotFound => Ocr2MdError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => Ocr2MdError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Ocr2MdError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            },
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let size = tokio::fs::metadata(path).await.map_err(read_error)?.len();

        if size > max_bytes {
            // Only the header is needed to tell the media type.
            let mut header = Vec::with_capacity(MAGIC_LEN);
            tokio::fs::File::open(path)
                .await
                .map_err(read_error)?
                .take(MAGIC_LEN as u64)
                .read_to_end(&mut header)
                .await
                .map_err(read_error)?;
            let media_type = sniff_media_type(&name, &header);
            debug!(
                "Document '{}' is {} bytes, over the {} byte limit; payload not read",
                name, size, max_bytes
            );
            return Ok(Self {
                name,
                media_type,
                size,
                payload: Bytes::new(),
            });
        }

        let payload = tokio::fs::read(path).await.map_err(read_error)?;
        let media_type = sniff_media_type(&name, &payload);
        debug!(
            "Loaded document '{}' ({} bytes, {})",
            name,
            payload.len(),
            media_type
        );

        Ok(Self::new(name, media_type, payload))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// The payload. Cloning the returned handle does not copy the bytes.
    /// Empty when the file was too large to load.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Whether the whole file is held in memory.
    pub fn is_loaded(&self) -> bool {
        self.payload.len() as u64 == self.size
    }

    /// Whether the page preview can render this document.
    pub fn is_previewable(&self) -> bool {
        self.media_type == PDF_MEDIA_TYPE && self.is_loaded()
    }

    /// The name up to its first `.`, used to name exported artifacts.
    pub fn base_name(&self) -> &str {
        base_name(&self.name)
    }
}

/// `report.final.pdf` → `report`; falls back to `document` for dot-files.
pub(crate) fn base_name(name: &str) -> &str {
    match name.split('.').next() {
        Some(stem) if !stem.is_empty() => stem,
        _ => "document",
    }
}

/// `<base>_converted.<ext>`
pub fn converted_file_name(document_name: &str, extension: &str) -> String {
    format!("{}_converted.{}", base_name(document_name), extension)
}

/// Bytes of header inspected by [`sniff_media_type`].
const MAGIC_LEN: usize = 4;

/// Determine the media type from magic bytes, then extension.
fn sniff_media_type(name: &str, payload: &[u8]) -> String {
    if payload.starts_with(b"%PDF") {
        return PDF_MEDIA_TYPE.to_string();
    }

    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let media_type = match ext.as_str() {
        "pdf" => PDF_MEDIA_TYPE,
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "odt" => "application/vnd.oasis.opendocument.text",
        "rtf" => "application/rtf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    };
    media_type.to_string()
}

/// Mutable, user-supplied input.
///
/// An empty `model_id` means no model is selected; an empty `page_selector`
/// means all pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputState {
    pub document: Option<Document>,
    pub model_id: String,
    pub page_selector: String,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The page selector to send, `None` when it selects all pages.
    pub fn pages(&self) -> Option<&str> {
        if self.page_selector.is_empty() {
            None
        } else {
            Some(&self.page_selector)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_stops_at_first_dot() {
        assert_eq!(base_name("report.final.pdf"), "report");
        assert_eq!(base_name("scan.pdf"), "scan");
        assert_eq!(base_name("noext"), "noext");
        assert_eq!(base_name(".hidden"), "document");
    }

    #[test]
    fn converted_name() {
        assert_eq!(converted_file_name("paper.pdf", "md"), "paper_converted.md");
        assert_eq!(converted_file_name("paper.pdf", "doc"), "paper_converted.doc");
    }

    #[test]
    fn sniff_prefers_magic_bytes() {
        assert_eq!(sniff_media_type("upload.bin", b"%PDF-1.7"), PDF_MEDIA_TYPE);
        assert_eq!(sniff_media_type("photo.JPG", b"\xff\xd8"), "image/jpeg");
        assert_eq!(sniff_media_type("data", b"xyz"), "application/octet-stream");
    }

    #[test]
    fn only_pdf_is_previewable() {
        assert!(Document::new("a.pdf", PDF_MEDIA_TYPE, &b"%PDF"[..]).is_previewable());
        assert!(!Document::new("a.png", "image/png", &b"x"[..]).is_previewable());
    }

    #[test]
    fn clone_shares_payload() {
        let doc = Document::new("a.pdf", PDF_MEDIA_TYPE, vec![1u8; 1024]);
        let copy = doc.clone();
        assert_eq!(doc.payload().as_ptr(), copy.payload().as_ptr());
    }

    #[test]
    fn empty_selector_means_all_pages() {
        let mut input = InputState::new();
        assert_eq!(input.pages(), None);
        input.page_selector = "1-3".into();
        assert_eq!(input.pages(), Some("1-3"));
    }

    #[tokio::test]
    async fn from_path_reads_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.pdf");
        std::fs::write(&path, b"%PDF-1.4 test").unwrap();

        let doc = Document::from_path(&path, 1024).await.unwrap();
        assert_eq!(doc.name(), "sample.pdf");
        assert_eq!(doc.size(), 13);
        assert!(doc.is_loaded());
        assert!(doc.is_previewable());
    }

    #[tokio::test]
    async fn oversized_file_is_not_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.bin");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(300 * 1024 * 1024).unwrap();
        drop(file);

        let limit = 100 * 1024 * 1024;
        let doc = Document::from_path(&path, limit).await.unwrap();
        assert_eq!(doc.size(), 300 * 1024 * 1024);
        assert!(doc.payload().is_empty());
        assert!(!doc.is_loaded());
        assert!(!doc.is_previewable());

        let input = InputState {
            document: Some(doc),
            model_id: "m1".into(),
            page_selector: String::new(),
        };
        let v = crate::validation::validate(&input, limit);
        assert!(matches!(
            v.document,
            Some(crate::error::ValidationError::DocumentTooLarge { size, .. }) if size == 300 * 1024 * 1024
        ));
    }

    #[tokio::test]
    async fn oversized_pdf_keeps_media_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan");
        std::fs::write(&path, b"%PDF-1.7 and then some more bytes").unwrap();

        let doc = Document::from_path(&path, 8).await.unwrap();
        assert_eq!(doc.media_type(), PDF_MEDIA_TYPE);
        assert_eq!(doc.size(), 33);
        assert!(doc.payload().is_empty());
    }

    #[tokio::test]
    async fn from_path_missing_file() {
        let err = Document::from_path("/definitely/not/here.pdf", u64::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, Ocr2MdError::FileNotFound { .. }), "got: {err:?}");
    }
}
