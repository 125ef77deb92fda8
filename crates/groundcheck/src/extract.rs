//! Text extraction for binary documents.
//!
//! Ingestion reads text formats directly; this module turns the binary
//! formats it recognizes (currently PDF) into plain UTF-8 text. Extraction
//! never panics: failures are returned and the ingest walk skips the file.

/// File extensions routed through [`extract_text`].
pub const BINARY_EXTENSIONS: &[&str] = &["pdf"];

#[derive(Debug)]
pub enum ExtractError {
    UnsupportedExtension(String),
    Pdf(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedExtension(ext) => {
                write!(f, "unsupported file type: .{}", ext)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Whether files with `extension` need [`extract_text`] instead of a
/// UTF-8 read.
pub fn is_binary(extension: &str) -> bool {
    BINARY_EXTENSIONS
        .iter()
        .any(|e| e.eq_ignore_ascii_case(extension))
}

/// Extract plain text from `bytes` of a file with the given extension.
pub fn extract_text(bytes: &[u8], extension: &str) -> Result<String, ExtractError> {
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => extract_pdf(bytes),
        other => Err(ExtractError::UnsupportedExtension(other.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}
