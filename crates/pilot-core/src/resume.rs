//! Résumé digest: the text context sent with every answer request.
//!
//! `.txt`, `.docx` and `.pdf` files are accepted; anything else is rejected.

use crate::error::{ApiError, ApiResult};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

/// Résumé file formats, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeFormat {
    Text,
    Docx,
    Pdf,
}

impl ResumeFormat {
    /// Format for `path`; case-insensitive on the extension.
    pub fn from_path(path: &Path) -> ApiResult<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" => Ok(ResumeFormat::Text),
            "docx" => Ok(ResumeFormat::Docx),
            "pdf" => Ok(ResumeFormat::Pdf),
            other => Err(ApiError::Config(format!(
                "Unsupported file format: .{} ({})",
                other,
                path.display()
            ))),
        }
    }
}

/// Read a résumé and build its digest.
pub fn load_resume_digest(path: &Path, max_chars: usize) -> ApiResult<String> {
    let raw = extract_text(path)?;
    let digest = resume_digest(&raw, max_chars);
    if digest.is_empty() {
        return Err(ApiError::Config(format!("résumé {} is empty", path.display())));
    }
    Ok(digest)
}

/// Full text of a résumé file.
pub fn extract_text(path: &Path) -> ApiResult<String> {
    let unreadable = |e: &dyn std::fmt::Display| {
        ApiError::Config(format!("cannot read résumé {}: {}", path.display(), e))
    };
    match ResumeFormat::from_path(path)? {
        ResumeFormat::Text => std::fs::read_to_string(path).map_err(|e| unreadable(&e)),
        ResumeFormat::Docx => {
            let file = File::open(path).map_err(|e| unreadable(&e))?;
            docx_text(file)
        }
        ResumeFormat::Pdf => pdf_extract::extract_text(path).map_err(|e| unreadable(&e)),
    }
}

/// Paragraph text of a Word document, one line per paragraph.
pub fn docx_text<R: Read + Seek>(reader: R) -> ApiResult<String> {
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| ApiError::Config(format!("not a .docx archive: {}", e)))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ApiError::Config(format!(".docx has no document body: {}", e)))?
        .read_to_string(&mut xml)
        .map_err(|e| ApiError::Config(format!(".docx body unreadable: {}", e)))?;

    let mut reader = Reader::from_str(&xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" => current.push('\n'),
                b"w:p" => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| ApiError::Config(format!(".docx body malformed: {}", e)))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ApiError::Config(format!(".docx body malformed: {}", e))),
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}

/// Collapse runs of blank space inside each line, drop empty lines, cap at `max_chars` characters.
pub fn resume_digest(raw: &str, max_chars: usize) -> String {
    let normalized = raw
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    match normalized.char_indices().nth(max_chars) {
        Some((cut, _)) => normalized[..cut].to_string(),
        None => normalized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn docx(body: &str) -> Cursor<Vec<u8>> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(body.as_bytes()).unwrap();
        let mut cursor = writer.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    #[test]
    fn normalizes_whitespace() {
        let raw = "  Jane   Doe \n\n\tSenior  Engineer\n   \n";
        assert_eq!(resume_digest(raw, 100), "Jane Doe\nSenior Engineer");
    }

    #[test]
    fn caps_on_char_boundary() {
        let raw = "简历内容很长";
        assert_eq!(resume_digest(raw, 2), "简历");
        assert_eq!(resume_digest("abc", 10), "abc");
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(ResumeFormat::from_path(Path::new("cv.txt")).unwrap(), ResumeFormat::Text);
        assert_eq!(ResumeFormat::from_path(Path::new("CV.DOCX")).unwrap(), ResumeFormat::Docx);
        assert_eq!(ResumeFormat::from_path(Path::new("/tmp/cv.Pdf")).unwrap(), ResumeFormat::Pdf);
    }

    #[test]
    fn unsupported_extensions_are_rejected() {
        for name in ["cv.odt", "cv.doc", "cv"] {
            match load_resume_digest(Path::new(name), 100) {
                Err(ApiError::Config(msg)) => assert!(msg.contains("Unsupported file format"), "{}", msg),
                other => panic!("{}: unexpected {:?}", name, other),
            }
        }
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t>Jane</w:t></w:r><w:r><w:t xml:space="preserve"> Doe</w:t></w:r></w:p>
<w:p/>
<w:p><w:r><w:t>Rust &amp; Go</w:t><w:tab/><w:t>8 years</w:t></w:r></w:p>
</w:body></w:document>"#;
        let text = docx_text(docx(body)).unwrap();
        assert_eq!(text, "Jane Doe\n\nRust & Go\t8 years");
        assert_eq!(resume_digest(&text, 100), "Jane Doe\nRust & Go 8 years");
    }

    #[test]
    fn docx_without_body_is_config_error() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("README", zip::write::FileOptions::default())
            .unwrap();
        let mut cursor = writer.finish().unwrap();
        cursor.set_position(0);
        assert!(matches!(docx_text(cursor), Err(ApiError::Config(_))));
        assert!(matches!(docx_text(Cursor::new(b"plain".to_vec())), Err(ApiError::Config(_))));
    }

    #[test]
    fn text_resume_is_loaded() {
        let path = std::env::temp_dir().join(format!("pilot-resume-{}.txt", std::process::id()));
        std::fs::write(&path, "Jane  Doe\n\nRust").unwrap();
        let digest = load_resume_digest(&path, 100);
        let _ = std::fs::remove_file(&path);
        assert_eq!(digest.unwrap(), "Jane Doe\nRust");
    }
}
