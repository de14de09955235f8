//! Knowledge document discovery and text extraction.

use crate::types::Document;
use panelkb_core::{AppError, AppResult};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    PlainText,
    Markdown,
}

impl ContentType {
    /// Detect content type from file extension. Unsupported files yield `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" => Some(Self::PlainText),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "text",
            Self::Markdown => "markdown",
        }
    }
}

/// Load every supported document directly inside `dir`, ordered by file name.
///
/// Files that cannot be decoded are logged and skipped.
///
/// # Errors
/// * `AppError::Config` - The directory is missing, holds no supported files,
///   or none of them could be decoded
pub fn load_documents(dir: &Path) -> AppResult<Vec<Document>> {
    if !dir.is_dir() {
        return Err(AppError::Config(format!(
            "Knowledge directory not found: {:?}",
            dir
        )));
    }

    let mut candidates = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {:?}: {}", dir, e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        if let Some(content_type) = ContentType::from_path(entry.path()) {
            candidates.push((entry.into_path(), content_type));
        }
    }

    if candidates.is_empty() {
        return Err(AppError::Config(format!(
            "No knowledge documents (*.txt, *.md) found in {:?}",
            dir
        )));
    }

    let mut documents = Vec::with_capacity(candidates.len());
    for (path, content_type) in &candidates {
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        match parse_file(path, *content_type) {
            Ok(text) => {
                debug!("Loaded {} ({}, {} bytes)", source, content_type.as_str(), text.len());
                documents.push(Document::new(text, source));
            }
            Err(e) => warn!("Skipping malformed document {}: {}", source, e),
        }
    }

    if documents.is_empty() {
        return Err(AppError::Config(format!(
            "None of the {} documents in {:?} could be read",
            candidates.len(),
            dir
        )));
    }

    Ok(documents)
}

/// Read a single file and extract its text.
pub fn parse_file(path: &Path, content_type: ContentType) -> AppResult<String> {
    let bytes = fs::read(path)?;

    match content_type {
        ContentType::PlainText | ContentType::Markdown => decode_text(&bytes),
    }
}

fn decode_text(bytes: &[u8]) -> AppResult<String> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| AppError::Other(format!("Not valid UTF-8: {}", e)))?;

    if text.contains('\0') {
        return Err(AppError::Other("Contains NUL bytes, likely binary".to_string()));
    }

    Ok(text.trim_start_matches('\u{feff}').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_content_type_from_path() {
        assert_eq!(ContentType::from_path(Path::new("a.txt")), Some(ContentType::PlainText));
        assert_eq!(ContentType::from_path(Path::new("A.TXT")), Some(ContentType::PlainText));
        assert_eq!(ContentType::from_path(Path::new("notes.md")), Some(ContentType::Markdown));
        assert_eq!(ContentType::from_path(Path::new("sop.pdf")), None);
        assert_eq!(ContentType::from_path(Path::new("image.png")), None);
        assert_eq!(ContentType::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_load_documents_sorted_by_name() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.txt"), "second").unwrap();
        fs::write(temp.path().join("a.txt"), "first").unwrap();
        fs::write(temp.path().join("c.md"), "# third").unwrap();
        fs::write(temp.path().join("ignored.png"), [0x89, 0x50]).unwrap();

        let docs = load_documents(temp.path()).unwrap();
        let sources: Vec<&str> = docs.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["a.txt", "b.txt", "c.md"]);
        assert_eq!(docs[0].text, "first");
    }

    #[test]
    fn test_subdirectories_not_walked() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("top.txt"), "top").unwrap();
        fs::create_dir(temp.path().join("nested")).unwrap();
        fs::write(temp.path().join("nested").join("deep.txt"), "deep").unwrap();

        let docs = load_documents(temp.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "top.txt");
    }

    #[test]
    fn test_missing_dir_is_config_error() {
        let temp = TempDir::new().unwrap();
        let result = load_documents(&temp.path().join("nope"));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_no_documents_is_config_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("photo.jpg"), [0xff, 0xd8]).unwrap();

        let result = load_documents(temp.path());
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_malformed_document_skipped() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("bad.txt"), [0xff, 0xfe, 0x00, 0x41]).unwrap();
        fs::write(temp.path().join("good.txt"), "Clean with deionised water.").unwrap();

        let docs = load_documents(temp.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "good.txt");
    }

    #[test]
    fn test_all_malformed_is_config_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("bad.txt"), [0xff, 0xfe]).unwrap();
        fs::write(temp.path().join("nul.txt"), b"abc\0def").unwrap();

        let result = load_documents(temp.path());
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_bom_stripped() {
        let text = decode_text("\u{feff}Isolate the string.".as_bytes()).unwrap();
        assert_eq!(text, "Isolate the string.");
    }

    #[test]
    fn test_pdf_files_ignored() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("datasheet.pdf"), b"%PDF-1.4\n%%EOF\n").unwrap();
        fs::write(temp.path().join("sop.txt"), "Replace cracked modules.").unwrap();

        let docs = load_documents(temp.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "sop.txt");
    }

    #[test]
    fn test_only_pdf_files_is_config_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("datasheet.pdf"), b"%PDF-1.4\n%%EOF\n").unwrap();

        let result = load_documents(temp.path());
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
