//! Document collaborator: load a source text and split it into words.

pub mod pdf;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::position::WordSpan;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pdf error in {path}: {reason}")]
    Pdf { path: PathBuf, reason: String },

    #[error("document contains no words")]
    Empty,

    #[error("could not detect chapter headings; pass the chapter count explicitly")]
    ChapterCountUnknown,
}

/// An immutable loaded document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    text: String,
    words: Vec<String>,
    chapter_count: u32,
}

impl Document {
    /// Build from raw text. `chapter_count` of `None` triggers heading
    /// detection.
    pub fn from_text(text: impl Into<String>, chapter_count: Option<u32>) -> Result<Self, DocumentError> {
        let text = text.into();
        let words: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        if words.is_empty() {
            return Err(DocumentError::Empty);
        }

        let chapter_count = match chapter_count.filter(|n| *n > 0) {
            Some(n) => n,
            None => match detect_chapter_count(&text) {
                0 => return Err(DocumentError::ChapterCountUnknown),
                n => n,
            },
        };

        Ok(Self {
            text,
            words,
            chapter_count,
        })
    }

    /// Load from disk. `.pdf` files go through the PDF extractor; anything
    /// else is read as UTF-8 text.
    pub fn load(path: impl AsRef<Path>, chapter_count: Option<u32>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

        let text = if is_pdf {
            pdf::extract_text(path)?
        } else {
            std::fs::read_to_string(path).map_err(|source| DocumentError::Read {
                path: path.to_path_buf(),
                source,
            })?
        };

        let doc = Self::from_text(text, chapter_count)?;
        info!(
            path = %path.display(),
            words = doc.word_count(),
            chapters = doc.chapter_count(),
            "document loaded"
        );
        Ok(doc)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn chapter_count(&self) -> u32 {
        self.chapter_count
    }

    /// Words in `span`, joined by single spaces. Out-of-range bounds clamp.
    pub fn slice_words(&self, span: WordSpan) -> String {
        let end = span.end.min(self.words.len());
        let start = span.start.min(end);
        self.words[start..end].join(" ")
    }

    /// Hex SHA-256 of the document text.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.text.as_bytes()))
    }
}

fn heading_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^[ \t]*chapter[ \t]+([0-9]+|[a-z]+(?:-[a-z]+)?)\b").ok())
        .as_ref()
}

fn roman_value(token: &str) -> Option<u32> {
    let digit = |c: char| match c {
        'i' => Some(1),
        'v' => Some(5),
        'x' => Some(10),
        'l' => Some(50),
        'c' => Some(100),
        _ => None,
    };
    let values: Vec<u32> = token.chars().map(digit).collect::<Option<_>>()?;
    let mut total = 0;
    for (i, v) in values.iter().enumerate() {
        match values.get(i + 1) {
            Some(next) if next > v => total -= *v as i64,
            _ => total += *v as i64,
        }
    }
    u32::try_from(total).ok().filter(|n| *n > 0)
}

fn word_value(token: &str) -> Option<u32> {
    const UNITS: [&str; 20] = [
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
        "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen",
        "eighteen", "nineteen",
    ];
    const TENS: [&str; 10] = [
        "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
    ];
    let unit = |w: &str| UNITS.iter().position(|u| *u == w).map(|n| n as u32);
    let tens = |w: &str| {
        TENS.iter()
            .position(|t| !t.is_empty() && *t == w)
            .map(|n| n as u32 * 10)
    };

    match token.split_once('-') {
        Some((t, u)) => Some(tens(t)? + unit(u).filter(|n| (1..10).contains(n))?),
        None => unit(token).or_else(|| tens(token)).filter(|n| *n > 0),
    }
}

fn heading_number(token: &str) -> Option<u32> {
    let token = token.to_ascii_lowercase();
    token
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .or_else(|| word_value(&token))
        .or_else(|| roman_value(&token))
}

/// Count distinct chapter headings ("Chapter 12", "CHAPTER TWELVE",
/// "Chapter XII"). A table of contents repeating the headings does not
/// inflate the count. Returns 0 when none are found.
pub fn detect_chapter_count(text: &str) -> u32 {
    let Some(re) = heading_regex() else {
        return 0;
    };
    let numbers: BTreeSet<u32> = re
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| heading_number(m.as_str()))
        .collect();
    numbers.len() as u32
}
