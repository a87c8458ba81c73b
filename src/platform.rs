//! Platform integration: saving artifacts and writing the clipboard.
//!
//! [`FileService`] is the seam the controller and the export coordinator use
//! for every side effect that leaves the process. [`DownloadsFileService`]
//! saves into the user's downloads directory; tests use an in-memory fake.

use bytes::Bytes;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Give up after this many `name (n).ext` candidates are all taken.
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// Host file and clipboard services.
pub trait FileService: Send + Sync {
    /// Save `contents` under `filename` and return where it landed.
    fn save(
        &self,
        contents: Bytes,
        filename: &str,
    ) -> impl Future<Output = io::Result<PathBuf>> + Send;

    /// Place `text` on the system clipboard.
    fn write_clipboard(&self, text: &str) -> impl Future<Output = io::Result<()>> + Send;
}

/// Saves into a fixed directory, the user's downloads folder by default.
#[derive(Debug, Clone)]
pub struct DownloadsFileService {
    dir: PathBuf,
}

impl DownloadsFileService {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The platform downloads directory, falling back to `~/Downloads` and
    /// then the working directory.
    pub fn user_downloads() -> Self {
        let dir = dirs::download_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FileService for DownloadsFileService {
    fn save(
        &self,
        contents: Bytes,
        filename: &str,
    ) -> impl Future<Output = io::Result<PathBuf>> + Send {
        let dir = self.dir.clone();
        let filename = sanitize_file_name(filename);
        async move {
            tokio::task::spawn_blocking(move || save_new_file(&dir, &contents, &filename))
                .await
                .map_err(io::Error::other)?
        }
    }

    fn write_clipboard(&self, text: &str) -> impl Future<Output = io::Result<()>> + Send {
        let text = text.to_string();
        async move { set_clipboard_text(text).await }
    }
}

#[cfg(feature = "clipboard")]
async fn set_clipboard_text(text: String) -> io::Result<()> {
    tokio::task::spawn_blocking(move || {
        let mut clipboard = arboard::Clipboard::new().map_err(io::Error::other)?;
        clipboard.set_text(text).map_err(io::Error::other)
    })
    .await
    .map_err(io::Error::other)?
}

#[cfg(not(feature = "clipboard"))]
async fn set_clipboard_text(_text: String) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "built without clipboard support",
    ))
}

/// Strip path separators and control characters from a suggested filename.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.');
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Stage `contents` in an anonymous temp file inside `dir`, then link it to
/// the first free name. Existing files are never replaced.
fn save_new_file(dir: &Path, contents: &[u8], filename: &str) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(contents)?;

    for path in candidate_paths(dir, filename) {
        match staged.persist_noclobber(&path) {
            Ok(_) => {
                debug!("Saved {} bytes to {}", contents.len(), path.display());
                return Ok(path);
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => staged = e.file,
            Err(e) => return Err(e.error),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for '{filename}'"),
    ))
}

/// `name.md`, then `name (1).md`, `name (2).md`, ...
fn candidate_paths<'a>(dir: &'a Path, filename: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (filename, None),
    };
    std::iter::once(dir.join(filename)).chain((1..MAX_NAME_ATTEMPTS).map(move |n| match ext {
        Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
        None => dir.join(format!("{stem} ({n})")),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_separators() {
        assert_eq!(sanitize_file_name("a/b\\c.md"), "a_b_c.md");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_name("..."), "download");
        assert_eq!(sanitize_file_name("report_converted.md"), "report_converted.md");
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn saves_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let files = DownloadsFileService::new(dir.path());
        let path = files
            .save(Bytes::from_static(b"# Hello"), "paper_converted.md")
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("paper_converted.md"));
        assert_eq!(std::fs::read(&path).unwrap(), b"# Hello");
        assert_eq!(entries(dir.path()), vec!["paper_converted.md"]);
    }

    #[tokio::test]
    async fn does_not_overwrite_existing_download() {
        let dir = tempfile::tempdir().unwrap();
        let files = DownloadsFileService::new(dir.path());
        let first = files.save(Bytes::from_static(b"one"), "paper_converted.md").await.unwrap();
        let second = files.save(Bytes::from_static(b"two"), "paper_converted.md").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(second, dir.path().join("paper_converted (1).md"));
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
    }

    #[tokio::test]
    async fn unrelated_files_survive_a_save() {
        let dir = tempfile::tempdir().unwrap();
        let user_file = dir.path().join("paper_converted.part");
        std::fs::write(&user_file, b"USER DATA").unwrap();

        let files = DownloadsFileService::new(dir.path());
        files.save(Bytes::from_static(b"# md"), "paper_converted.md").await.unwrap();
        files.save(Bytes::from_static(b"<html>"), "paper_converted.doc").await.unwrap();

        assert_eq!(std::fs::read(&user_file).unwrap(), b"USER DATA");
        assert_eq!(
            entries(dir.path()),
            vec!["paper_converted.doc", "paper_converted.md", "paper_converted.part"]
        );
    }

    #[tokio::test]
    async fn concurrent_saves_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let files = DownloadsFileService::new(dir.path());

        let saves = (0..8u8).map(|i| {
            let files = files.clone();
            tokio::spawn(async move { files.save(Bytes::from(vec![i]), "same.md").await })
        });
        let mut paths = Vec::new();
        for save in saves.collect::<Vec<_>>() {
            paths.push(save.await.unwrap().unwrap());
        }
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8);

        let mut contents: Vec<u8> = paths
            .iter()
            .map(|p| std::fs::read(p).unwrap()[0])
            .collect();
        contents.sort();
        assert_eq!(contents, (0..8u8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let files = DownloadsFileService::new(&nested);
        files.save(Bytes::from_static(b"x"), "x.md").await.unwrap();
        assert!(nested.join("x.md").exists());
    }
}
