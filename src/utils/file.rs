//! File utilities for directory-backed projects.

use std::fs;
use std::io::Read;
use std::path::Path;

/// Check if a file looks like a plain-text document.
pub fn is_text_document(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        let ext = ext.to_string_lossy().to_lowercase();
        if is_document_extension(&ext) {
            return true;
        }
        if is_binary_extension(&ext) {
            return false;
        }
    }

    // Sniff the first bytes for NUL, the usual binary marker
    if let Ok(file) = fs::File::open(path) {
        let mut buffer = [0u8; 512];
        let mut reader = std::io::BufReader::new(file);
        if let Ok(n) = reader.read(&mut buffer) {
            return !buffer[..n].contains(&0);
        }
    }

    false
}

/// Read file content with size limit.
pub fn read_file_content(path: &Path, max_size: u64) -> std::io::Result<String> {
    let metadata = fs::metadata(path)?;

    if metadata.len() > max_size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "file exceeds maximum size: {} > {}",
                metadata.len(),
                max_size
            ),
        ));
    }

    fs::read_to_string(path)
}

/// Path of `path` relative to `base`, with `/` separators.
pub fn relative_path(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn is_binary_extension(ext: &str) -> bool {
    matches!(
        ext,
        "exe"
            | "dll"
            | "so"
            | "dylib"
            | "o"
            | "png"
            | "jpg"
            | "jpeg"
            | "gif"
            | "webp"
            | "mp3"
            | "mp4"
            | "wav"
            | "zip"
            | "tar"
            | "gz"
            | "xz"
            | "7z"
            | "pdf"
            | "doc"
            | "docx"
            | "xls"
            | "xlsx"
            | "ppt"
            | "pptx"
            | "woff"
            | "woff2"
            | "ttf"
            | "db"
            | "sqlite"
            | "sqlite3"
            | "bin"
    )
}

fn is_document_extension(ext: &str) -> bool {
    matches!(
        ext,
        "md" | "markdown" | "rst" | "txt" | "text" | "adoc" | "asciidoc" | "org" | "tex" | "html"
            | "htm"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_document_extensions() {
        assert!(is_text_document(&PathBuf::from("notes.md")));
        assert!(is_text_document(&PathBuf::from("README.TXT")));
        assert!(!is_text_document(&PathBuf::from("diagram.png")));
    }

    #[test]
    fn test_sniffs_unknown_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("notes.log");
        let binary = dir.path().join("blob.raw");
        fs::write(&text, "plain words").unwrap();
        fs::write(&binary, [0u8, 159, 146, 150]).unwrap();

        assert!(is_text_document(&text));
        assert!(!is_text_document(&binary));
    }

    #[test]
    fn test_read_file_content_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        fs::write(&path, "x".repeat(64)).unwrap();

        assert!(read_file_content(&path, 10).is_err());
        assert_eq!(read_file_content(&path, 100).unwrap().len(), 64);
    }

    #[test]
    fn test_relative_path() {
        let base = Path::new("/projects/p1");
        assert_eq!(
            relative_path(base, Path::new("/projects/p1/docs/a.md")),
            Some("docs/a.md".to_string())
        );
        assert_eq!(relative_path(base, Path::new("/elsewhere/a.md")), None);
    }
}
