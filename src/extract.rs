//! File-format text extraction.
//!
//! [`FileExtractor`] implements [`TextExtractor`] for the upload formats
//! docsift accepts:
//!
//! | Content type | Engine |
//! |--------------|--------|
//! | `application/pdf` | `pdf-extract`, on a blocking thread |
//! | DOCX | `zip` + `quick-xml` over `word/document.xml` |
//! | `text/plain`, `text/markdown`, `text/csv` | UTF-8 decode (lossy) |
//! | `image/png`, `image/jpeg`, `image/tiff` | external OCR command |
//!
//! Images need `[extraction].ocr_command`; the command is run as
//! `<cmd> stdin stdout [ocr_args...]` with the image bytes on stdin, which
//! matches the `tesseract` CLI.

use std::io::Read;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use quick_xml::events::Event;
use tokio::io::AsyncWriteExt;

use docsift_core::error::ExtractionError;
use docsift_core::extract::TextExtractor;

use crate::config::ExtractionConfig;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_CSV: &str = "text/csv";
pub const MIME_PNG: &str = "image/png";
pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_TIFF: &str = "image/tiff";
pub const MIME_OCTET: &str = "application/octet-stream";

/// Zip-bomb guard for `word/document.xml`.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Content type for a file name, by extension. Unknown extensions map to
/// `application/octet-stream`, which extraction rejects.
pub fn content_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => MIME_PDF,
        "docx" => MIME_DOCX,
        "txt" | "text" | "log" => MIME_TEXT,
        "md" | "markdown" => MIME_MARKDOWN,
        "csv" => MIME_CSV,
        "png" => MIME_PNG,
        "jpg" | "jpeg" => MIME_JPEG,
        "tif" | "tiff" => MIME_TIFF,
        _ => MIME_OCTET,
    }
}

/// Drop MIME parameters (`text/plain; charset=utf-8` → `text/plain`).
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub struct FileExtractor {
    ocr_command: Option<String>,
    ocr_args: Vec<String>,
}

impl FileExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            ocr_command: config.ocr_command.clone().filter(|c| !c.trim().is_empty()),
            ocr_args: config.ocr_args.clone(),
        }
    }

    async fn ocr(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let Some(command) = &self.ocr_command else {
            return Err(ExtractionError::UnsupportedContentType(
                "image upload without [extraction].ocr_command".to_string(),
            ));
        };

        let mut child = tokio::process::Command::new(command)
            .arg("stdin")
            .arg("stdout")
            .args(&self.ocr_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExtractionError::Engine(format!("failed to run {}: {}", command, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(bytes)
                .await
                .map_err(|e| ExtractionError::Engine(format!("OCR stdin: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExtractionError::Engine(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::Engine(format!(
                "{} exited with {}: {}",
                command,
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TextExtractor for FileExtractor {
    async fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractionError> {
        match essence(content_type).as_str() {
            MIME_PDF => {
                let owned = bytes.to_vec();
                tokio::task::spawn_blocking(move || extract_pdf(&owned))
                    .await
                    .map_err(|e| ExtractionError::Unreadable(format!("PDF task failed: {}", e)))?
            }
            MIME_DOCX => extract_docx(bytes),
            MIME_TEXT | MIME_MARKDOWN | MIME_CSV => Ok(String::from_utf8_lossy(bytes).into_owned()),
            MIME_PNG | MIME_JPEG | MIME_TIFF => self.ocr(bytes).await,
            other => Err(ExtractionError::UnsupportedContentType(other.to_string())),
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractionError::Unreadable(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractionError> {
    let unreadable = |e: &dyn std::fmt::Display| ExtractionError::Unreadable(e.to_string());

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| unreadable(&e))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractionError::Unreadable("word/document.xml not found".to_string()))?;
    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| unreadable(&e))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractionError::Unreadable(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    docx_paragraphs(&xml)
}

/// Text of `<w:t>` runs, one line per `<w:p>` paragraph.
fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractionError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"p" => out.push('\n'),
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractionError::Unreadable(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractionError::Unreadable(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
