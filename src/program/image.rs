//! Program image files.
//!
//! Two formats are understood:
//! - text: one word per line, `0x`-prefixed hex or plain decimal,
//!   `_` digit separators allowed, `;` starts a comment, blank lines ignored
//! - binary (`.bin`): consecutive little-endian 8-byte words

use crate::cpu::Word;
use crate::program::disasm::disassemble_word;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Size of one word in the binary format.
pub const WORD_BYTES: usize = std::mem::size_of::<Word>();

/// A loaded program image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramImage {
    /// The program words, in load order.
    pub words: Vec<Word>,
    /// Source text of each word (for listings).
    pub source_lines: Vec<String>,
}

impl ProgramImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap bare words, rendering each as its hex text.
    pub fn from_words(words: Vec<Word>) -> Self {
        let source_lines = words.iter().map(|w| format!("{:#018x}", w)).collect();
        Self { words, source_lines }
    }

    pub fn push(&mut self, word: Word, source: &str) {
        self.words.push(word);
        self.source_lines.push(source.to_string());
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Encode as the binary format.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}

/// Parse the text format.
pub fn parse_image(text: &str) -> Result<ProgramImage, ImageError> {
    let mut image = ProgramImage::new();

    for (line_num, line) in text.lines().enumerate() {
        let code = line.split(';').next().unwrap_or("").trim();
        if code.is_empty() {
            continue;
        }

        let word = parse_word(code).map_err(|message| ImageError::ParseError {
            line: line_num + 1,
            message,
        })?;
        image.push(word, line.trim());
    }

    Ok(image)
}

fn parse_word(token: &str) -> Result<Word, String> {
    if token.split_whitespace().count() != 1 {
        return Err(format!("expected one word per line, found `{}`", token));
    }

    let digits: String = token.chars().filter(|&c| c != '_').collect();
    let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => Word::from_str_radix(hex, 16),
        None => digits.parse::<Word>(),
    };
    parsed.map_err(|e| format!("invalid word `{}`: {}", token, e))
}

/// Parse the binary format.
pub fn image_from_bytes(bytes: &[u8]) -> Result<ProgramImage, ImageError> {
    if bytes.len() % WORD_BYTES != 0 {
        return Err(ImageError::TruncatedWord { len: bytes.len() });
    }

    let words = bytes
        .chunks_exact(WORD_BYTES)
        .map(|chunk| {
            let mut buf = [0u8; WORD_BYTES];
            buf.copy_from_slice(chunk);
            Word::from_le_bytes(buf)
        })
        .collect();
    Ok(ProgramImage::from_words(words))
}

fn is_binary(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("bin"))
}

/// Load an image from disk, choosing the format by extension.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ProgramImage, ImageError> {
    let path = path.as_ref();
    if is_binary(path) {
        let bytes = std::fs::read(path).map_err(|e| ImageError::IoError(e.to_string()))?;
        image_from_bytes(&bytes)
    } else {
        let text = std::fs::read_to_string(path).map_err(|e| ImageError::IoError(e.to_string()))?;
        parse_image(&text)
    }
}

/// Render the text format, with a disassembly comment on every word.
pub fn render_image(image: &ProgramImage) -> String {
    let mut out = String::new();
    out.push_str("; regvm program image\n");
    out.push_str(&format!("; {} words\n\n", image.len()));
    for (addr, &word) in image.words.iter().enumerate() {
        out.push_str(&format!("{:#018x} ; {:04} {}\n", word, addr, disassemble_word(word)));
    }
    out
}

/// Save an image to disk, choosing the format by extension.
pub fn save_image<P: AsRef<Path>>(path: P, image: &ProgramImage) -> Result<(), ImageError> {
    let path = path.as_ref();
    let mut file = std::fs::File::create(path).map_err(|e| ImageError::IoError(e.to_string()))?;

    let bytes = if is_binary(path) {
        image.to_bytes()
    } else {
        render_image(image).into_bytes()
    };
    file.write_all(&bytes)
        .map_err(|e| ImageError::IoError(e.to_string()))
}

/// Errors that can occur while reading or writing images.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("binary image length {len} is not a multiple of 8 bytes")]
    TruncatedWord { len: usize },
}
