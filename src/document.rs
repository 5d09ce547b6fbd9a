//! Text extraction for the document directory.
//!
//! The format is resolved once per file from its extension. Plain-text
//! files are read lossily as UTF-8; `.docx` bodies come out of
//! `word/document.xml` and `.pdf` text out of `pdf-extract`. Extraction
//! never panics: failures come back as [`DocumentError`] and the pipeline
//! skips the file.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

/// Maximum decompressed bytes read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// `.txt`, `.md` and `.rst`.
    PlainText,
    Docx,
    Pdf,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "md" | "rst" => Some(DocumentFormat::PlainText),
            "docx" => Some(DocumentFormat::Docx),
            "pdf" => Some(DocumentFormat::Pdf),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("unsupported document type: {0}")]
    Unsupported(PathBuf),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Ooxml(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A document's extracted text plus the timestamp used for its milestones.
#[derive(Debug, Clone)]
pub struct DocumentText {
    pub source_id: String,
    pub text: String,
    /// File modification time, seconds since the epoch.
    pub modified: f64,
}

/// Supported documents directly inside `dir`, sorted by path.
pub fn list_document_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| DocumentFormat::from_path(p).is_some())
        .collect();
    files.sort();
    files
}

pub fn read_document(path: &Path) -> Result<DocumentText, DocumentError> {
    let format =
        DocumentFormat::from_path(path).ok_or_else(|| DocumentError::Unsupported(path.to_path_buf()))?;

    let io_err = |source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    };
    let bytes = std::fs::read(path).map_err(io_err)?;
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(io_err)?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);

    Ok(DocumentText {
        source_id: path.display().to_string(),
        text: extract_text(&bytes, format)?,
        modified,
    })
}

pub fn extract_text(bytes: &[u8], format: DocumentFormat) -> Result<String, DocumentError> {
    match format {
        DocumentFormat::PlainText => Ok(String::from_utf8_lossy(bytes).into_owned()),
        DocumentFormat::Docx => extract_docx(bytes),
        DocumentFormat::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| DocumentError::Pdf(e.to_string()))
        }
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, DocumentError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| DocumentError::Ooxml(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| DocumentError::Ooxml(e.to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| DocumentError::Ooxml(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(DocumentError::Ooxml(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    paragraphs_text(&xml)
}

/// Concatenate `<w:t>` runs, one line per `<w:p>` paragraph. Keeping the
/// paragraph breaks matters: milestone patterns never match across lines.
fn paragraphs_text(xml: &[u8]) -> Result<String, DocumentError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(t)) if in_text => {
                out.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(DocumentError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
