//! Word documents: OOXML (.docx) and legacy .doc uploads.

use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use log::debug;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::ExtractError;
use crate::extract::{doc_binary, TextExtractor, UploadedFile};

pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const DOC_MIME: &str = "application/msword";

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub struct WordExtractor {
    max_size: u64,
}

impl WordExtractor {
    pub fn new(max_size: u64) -> Self {
        Self { max_size }
    }
}

impl TextExtractor for WordExtractor {
    fn name(&self) -> &'static str {
        "word"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &[DOCX_MIME, DOC_MIME]
    }

    fn max_size(&self) -> u64 {
        self.max_size
    }

    fn decode(&self, file: &UploadedFile) -> Result<String, ExtractError> {
        let legacy = file.content_type == DOC_MIME;
        with_staged_file(&file.bytes, |path| {
            if legacy {
                extract_legacy_doc(path)
            } else {
                extract_docx(path)
            }
        })
    }
}

/// Writes `bytes` to a temporary file and runs `f` on its path.
///
/// The file is removed when this returns, whether `f` succeeded or not.
pub fn with_staged_file<T>(
    bytes: &[u8],
    f: impl FnOnce(&Path) -> Result<T, ExtractError>,
) -> Result<T, ExtractError> {
    let mut staged = tempfile::Builder::new()
        .prefix("docsum-upload-")
        .tempfile()
        .map_err(ExtractError::TempFile)?;
    staged.write_all(bytes).map_err(ExtractError::TempFile)?;
    staged.flush().map_err(ExtractError::TempFile)?;

    debug!("Staged {} bytes at {}", bytes.len(), staged.path().display());
    f(staged.path())
}

fn open_archive(path: &Path) -> Result<zip::ZipArchive<File>, ExtractError> {
    let file = File::open(path).map_err(ExtractError::TempFile)?;
    zip::ZipArchive::new(file).map_err(|e| ExtractError::Docx(format!("Failed to open DOCX: {}", e)))
}

fn extract_docx(path: &Path) -> Result<String, ExtractError> {
    let mut archive = open_archive(path)?;
    read_part(&mut archive, "word/document.xml")
}

/// Legacy `.doc` dispatch on the file signature.
fn extract_legacy_doc(path: &Path) -> Result<String, ExtractError> {
    let mut magic = [0u8; 8];
    let read = File::open(path)
        .and_then(|mut f| f.read(&mut magic))
        .map_err(ExtractError::TempFile)?;
    let magic = &magic[..read];

    if magic.starts_with(ZIP_MAGIC) {
        debug!("Legacy upload is an OOXML package");
        return extract_ooxml_all_parts(path);
    }
    if magic.starts_with(OLE_MAGIC) {
        return doc_binary::extract_text(path);
    }

    Err(ExtractError::Doc(
        "not a Word 97-2003 or OOXML document".to_string(),
    ))
}

/// Headers, body, footnotes and footers of an OOXML package, in that order.
fn extract_ooxml_all_parts(path: &Path) -> Result<String, ExtractError> {
    let mut archive = open_archive(path)?;

    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    let matching = |prefix: &str| -> Vec<String> {
        names
            .iter()
            .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
            .cloned()
            .collect()
    };

    let mut parts = matching("word/header");
    parts.push("word/document.xml".to_string());
    parts.extend(matching("word/footnotes"));
    parts.extend(matching("word/footer"));

    let mut sections = Vec::new();
    for part in parts {
        match read_part(&mut archive, &part) {
            Ok(text) if !text.trim().is_empty() => sections.push(text),
            Ok(_) => {}
            // only the body is mandatory
            Err(e) if part != "word/document.xml" => debug!("Skipping {}: {}", part, e),
            Err(e) => return Err(e),
        }
    }

    Ok(sections.join("\n"))
}

fn read_part<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<String, ExtractError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Docx(format!("Failed to find {}: {}", name, e)))?;

    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::Docx(format!("Failed to read {}: {}", name, e)))?;

    parse_wordprocessing_xml(&xml)
}

/// Collects `w:t` runs; paragraph ends and `w:br` become newlines, `w:tab` a tab.
fn parse_wordprocessing_xml(xml: &str) -> Result<String, ExtractError> {
    let mut reader = Reader::from_str(xml);

    let mut text = String::new();
    let mut in_text_element = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_element = true;
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" | b"cr" | b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_element {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_text_element {
                    let name = String::from_utf8_lossy(&e);
                    match resolve_entity(&name) {
                        Some(c) => text.push(c),
                        None => debug!("Unknown entity &{};", name),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractError::Docx(format!("XML parsing error: {}", e)));
            }
            _ => {}
        }
    }

    Ok(text)
}

fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}
