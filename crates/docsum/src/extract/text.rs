use encoding_rs::{Encoding, IBM866, UTF_8, WINDOWS_1251};

use crate::error::ExtractError;
use crate::extract::{TextExtractor, UploadedFile};

/// Strict decodings tried in order before falling back to lossy UTF-8.
pub const CANDIDATE_ENCODINGS: &[&Encoding] = &[UTF_8, WINDOWS_1251, IBM866];

pub struct PlainTextExtractor {
    max_size: u64,
}

impl PlainTextExtractor {
    pub fn new(max_size: u64) -> Self {
        Self { max_size }
    }
}

impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &["text/plain", "text/markdown"]
    }

    fn max_size(&self) -> u64 {
        self.max_size
    }

    fn decode(&self, file: &UploadedFile) -> Result<String, ExtractError> {
        Ok(decode_with(&file.bytes, CANDIDATE_ENCODINGS))
    }
}

/// Decodes `bytes` with the first encoding that accepts them without errors.
///
/// When every candidate rejects the input, undecodable sequences are replaced
/// with U+FFFD. A leading UTF-8 byte order mark is dropped.
pub fn decode_with(bytes: &[u8], candidates: &[&'static Encoding]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    for encoding in candidates {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            if *encoding != UTF_8 {
                log::debug!("Decoded text upload as {}", encoding.name());
            }
            return text.into_owned();
        }
    }

    String::from_utf8_lossy(bytes).into_owned()
}
