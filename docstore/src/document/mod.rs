//! Documents and their keys.
//!
//! A [`Document`] is created once on ingest and afterwards only changes its
//! last-use stamp and its memoized rendering. Everything the search index
//! needs (the word counts) is computed up front.

mod render;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::text::{normalize, word_counts};

pub use render::{RenderError, Renderer, SinglePageRenderer};

/// Globally unique, URI-like document identifier.
///
/// # Invariants
///
/// - Non-empty after trimming.
/// - Contains no whitespace or control characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentKey(String);

impl DocumentKey {
    /// Validate and wrap a key.
    pub fn new(key: impl Into<String>) -> Result<Self, DocumentError> {
        let key = key.into();
        if key.is_empty() {
            return Err(DocumentError::InvalidKey("key must not be empty".to_string()));
        }
        if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(DocumentError::InvalidKey(format!(
                "'{}' contains whitespace or control characters",
                key.escape_debug()
            )));
        }
        Ok(Self(key))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DocumentKey {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Format of the bytes handed to the store on ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// UTF-8 text.
    PlainText,
    /// A PDF whose text is extracted by the store's [`Renderer`].
    Pdf,
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    key: DocumentKey,
    text: String,
    text_hash: u32,
    word_counts: BTreeMap<String, u32>,
    rendering: Option<Vec<u8>>,
    last_use: u64,
}

impl Document {
    /// Create a document from its text.
    #[must_use]
    pub fn from_text(key: DocumentKey, text: String, last_use: u64) -> Self {
        let word_counts = word_counts(&text);
        Self {
            key,
            text_hash: text_hash(&text),
            text,
            word_counts,
            rendering: None,
            last_use,
        }
    }

    /// Build a document from ingested bytes.
    ///
    /// Plain text must be valid UTF-8. For PDFs the text is extracted with
    /// `renderer` and trimmed, and the original bytes become the rendering.
    pub fn ingest(
        key: DocumentKey,
        bytes: &[u8],
        format: DocumentFormat,
        renderer: &dyn Renderer,
        last_use: u64,
    ) -> Result<Self, DocumentError> {
        match format {
            DocumentFormat::PlainText => {
                let text = String::from_utf8(bytes.to_vec())?;
                Ok(Self::from_text(key, text, last_use))
            }
            DocumentFormat::Pdf => {
                let text = renderer.extract_text(bytes)?.trim().to_string();
                let mut document = Self::from_text(key, text, last_use);
                document.rendering = Some(bytes.to_vec());
                Ok(document)
            }
        }
    }

    /// Rebuild a document from a persisted record.
    ///
    /// The word counts are taken as stored rather than recomputed.
    #[must_use]
    pub(crate) const fn from_parts(
        key: DocumentKey,
        text: String,
        text_hash: u32,
        word_counts: BTreeMap<String, u32>,
        last_use: u64,
    ) -> Self {
        Self {
            key,
            text,
            text_hash,
            word_counts,
            rendering: None,
            last_use,
        }
    }

    #[must_use]
    pub const fn key(&self) -> &DocumentKey {
        &self.key
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// CRC32 of the text.
    #[must_use]
    pub const fn text_hash(&self) -> u32 {
        self.text_hash
    }

    /// Occurrences of each normalized word.
    #[must_use]
    pub const fn word_counts(&self) -> &BTreeMap<String, u32> {
        &self.word_counts
    }

    /// The distinct normalized words of the document.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.word_counts.keys().map(String::as_str)
    }

    /// How many times `word` occurs, after normalization.
    #[must_use]
    pub fn word_count(&self, word: &str) -> u32 {
        self.word_counts.get(&normalize(word)).copied().unwrap_or(0)
    }

    /// Total occurrences of every word that starts with `prefix`, after
    /// normalization. An empty prefix matches nothing.
    #[must_use]
    pub fn prefix_count(&self, prefix: &str) -> u32 {
        let prefix = normalize(prefix);
        if prefix.is_empty() {
            return 0;
        }
        self.word_counts
            .range(prefix.clone()..)
            .take_while(|(word, _)| word.starts_with(&prefix))
            .map(|(_, count)| count)
            .sum()
    }

    /// Time of last use in nanoseconds.
    #[must_use]
    pub const fn last_use(&self) -> u64 {
        self.last_use
    }

    pub const fn set_last_use(&mut self, now: u64) {
        self.last_use = now;
    }

    /// The memoized rendering, if one has been produced.
    #[must_use]
    pub fn rendering(&self) -> Option<&[u8]> {
        self.rendering.as_deref()
    }

    /// The rendering, producing and memoizing it with `renderer` on first
    /// use.
    pub fn render_with(&mut self, renderer: &dyn Renderer) -> Result<&[u8], RenderError> {
        if self.rendering.is_none() {
            self.rendering = Some(renderer.render(&self.text)?);
        }
        Ok(self.rendering.as_deref().unwrap_or_default())
    }

    /// Forget the memoized rendering.
    pub fn drop_rendering(&mut self) {
        self.rendering = None;
    }

    /// Bytes this document occupies in memory: its text plus its rendering.
    #[must_use]
    pub fn footprint(&self) -> usize {
        self.text.len() + self.rendering.as_ref().map_or(0, Vec::len)
    }
}

/// CRC32 of `text`, as returned by the store for replaced documents.
#[must_use]
pub fn text_hash(text: &str) -> u32 {
    crc32fast::hash(text.as_bytes())
}

/// Errors that can occur while building a document.
#[derive(Debug)]
pub enum DocumentError {
    /// The key is empty or malformed.
    InvalidKey(String),
    /// Plain-text input is not valid UTF-8.
    InvalidUtf8(std::string::FromUtf8Error),
    /// PDF input could not be read.
    Render(RenderError),
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidKey(msg) => write!(f, "invalid document key: {msg}"),
            Self::InvalidUtf8(e) => write!(f, "text is not valid UTF-8: {e}"),
            Self::Render(e) => write!(f, "render error: {e}"),
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidKey(_) => None,
            Self::InvalidUtf8(e) => Some(e),
            Self::Render(e) => Some(e),
        }
    }
}

impl From<std::string::FromUtf8Error> for DocumentError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Self::InvalidUtf8(e)
    }
}

impl From<RenderError> for DocumentError {
    fn from(e: RenderError) -> Self {
        Self::Render(e)
    }
}
