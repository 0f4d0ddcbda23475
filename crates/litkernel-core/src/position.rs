//! Position mapper.
//!
//! Pure conversions between the three position vocabularies the stages use:
//! chapter-range strings, chapter indices and approximate word offsets.
//! Chapters are assumed to split the document uniformly by word count.

use serde::{Deserialize, Serialize};

use crate::domain::error::PositionError;
use crate::domain::range::ChapterRange;

/// Half-open word offset span `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordSpan {
    pub start: usize,
    pub end: usize,
}

impl WordSpan {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

const RANGE_PREFIXES: [&str; 4] = ["chapters", "chapter", "ch.", "ch"];
const RANGE_SEPARATORS: [char; 3] = ['-', '\u{2013}', '\u{2014}'];

fn strip_chapter_prefix(s: &str) -> &str {
    let s = s.trim();
    for prefix in RANGE_PREFIXES {
        if s.len() >= prefix.len()
            && s.is_char_boundary(prefix.len())
            && s[..prefix.len()].eq_ignore_ascii_case(prefix)
        {
            return s[prefix.len()..].trim();
        }
    }
    s
}

fn parse_chapter_number(part: &str, input: &str) -> Result<u32, PositionError> {
    let part = part.trim();
    match part.parse::<u32>() {
        Ok(0) => Err(PositionError::MalformedRange {
            input: input.to_string(),
            reason: "chapters are numbered from 1".into(),
        }),
        Ok(n) => Ok(n),
        Err(_) => Err(PositionError::MalformedRange {
            input: input.to_string(),
            reason: format!("{part:?} is not a chapter number"),
        }),
    }
}

/// Parse `"N"` or `"A-B"` into a typed range.
///
/// Surrounding whitespace, `Chapter`/`Chapters`/`Ch.` prefixes and en/em
/// dash separators are tolerated. Anything else is `MalformedRange`.
pub fn parse_chapter_range(s: &str) -> Result<ChapterRange, PositionError> {
    let body = strip_chapter_prefix(s);
    if body.is_empty() {
        return Err(PositionError::MalformedRange {
            input: s.to_string(),
            reason: "empty".into(),
        });
    }

    let parts: Vec<&str> = body.split(RANGE_SEPARATORS).collect();
    let (start, end) = match parts.as_slice() {
        [single] => {
            let n = parse_chapter_number(single, s)?;
            (n, n)
        }
        [a, b] => (parse_chapter_number(a, s)?, parse_chapter_number(b, s)?),
        _ => {
            return Err(PositionError::MalformedRange {
                input: s.to_string(),
                reason: "expected N or A-B".into(),
            })
        }
    };

    if end < start {
        return Err(PositionError::MalformedRange {
            input: s.to_string(),
            reason: format!("range is reversed ({start} > {end})"),
        });
    }
    ChapterRange::new(start, end)
}

/// Parse a range string into the list of chapters it covers.
///
/// Allocates one entry per chapter; service output goes through
/// [`parse_chapter_range`] instead.
pub fn parse_range(s: &str) -> Result<Vec<u32>, PositionError> {
    Ok(parse_chapter_range(s)?.chapters().collect())
}

/// Parse a single chapter reference ("7", "Chapter 7", "ch. 7").
pub fn parse_chapter(s: &str) -> Result<u32, PositionError> {
    let range = parse_chapter_range(s)?;
    if range.len() != 1 {
        return Err(PositionError::MalformedRange {
            input: s.to_string(),
            reason: "expected a single chapter".into(),
        });
    }
    Ok(range.start())
}

/// Best-effort chapter from loose service text: the start of a parseable
/// range, else the first number in the string (`"pages 12-14"` gives 12).
pub fn leading_chapter(s: &str) -> Option<u32> {
    if let Ok(range) = parse_chapter_range(s) {
        return Some(range.start());
    }
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok().filter(|n| *n > 0)
}

/// Canonical inverse of [`parse_range`] for a contiguous increasing list.
pub fn format_range(chapters: &[u32]) -> Result<String, PositionError> {
    let (first, last) = match (chapters.first(), chapters.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(PositionError::EmptyRange),
    };
    let contiguous = chapters.windows(2).all(|w| w[1] == w[0] + 1);
    if first == 0 || !contiguous {
        return Err(PositionError::NonContiguous {
            chapters: chapters.to_vec(),
        });
    }
    Ok(ChapterRange::new(first, last)?.to_string())
}

fn check_geometry(
    chapter: u32,
    total_chapters: u32,
    total_words: usize,
) -> Result<(), PositionError> {
    if total_chapters == 0 || total_words == 0 {
        return Err(PositionError::EmptyDocument {
            total_chapters,
            total_words,
        });
    }
    if chapter == 0 || chapter > total_chapters {
        return Err(PositionError::ChapterOutOfRange {
            chapter,
            total_chapters,
        });
    }
    Ok(())
}

fn boundary(chapter_index: u64, total_chapters: u32, total_words: usize) -> usize {
    // u64 keeps (index * words) from overflowing on 32-bit targets.
    (chapter_index * total_words as u64 / u64::from(total_chapters)) as usize
}

/// Word span of `chapter` under a uniform partition of the document.
pub fn chapter_to_word_span(
    chapter: u32,
    total_chapters: u32,
    total_words: usize,
) -> Result<WordSpan, PositionError> {
    check_geometry(chapter, total_chapters, total_words)?;
    let start = boundary(u64::from(chapter - 1), total_chapters, total_words);
    let end = boundary(u64::from(chapter), total_chapters, total_words);
    Ok(WordSpan {
        start: start.min(total_words),
        end: end.min(total_words),
    })
}

/// Chapter containing word `offset`. Offsets past the end map to the last
/// chapter.
pub fn chapter_of_word(
    offset: usize,
    total_chapters: u32,
    total_words: usize,
) -> Result<u32, PositionError> {
    check_geometry(1, total_chapters, total_words)?;
    let offset = offset.min(total_words - 1);

    let guess = (offset as u64 * u64::from(total_chapters) / total_words as u64) as u32 + 1;
    let mut chapter = guess.clamp(1, total_chapters);
    while chapter < total_chapters
        && offset >= boundary(u64::from(chapter), total_chapters, total_words)
    {
        chapter += 1;
    }
    while chapter > 1 && offset < boundary(u64::from(chapter - 1), total_chapters, total_words) {
        chapter -= 1;
    }
    Ok(chapter)
}

/// A window of `window_size` words centred on the midpoint of
/// `primary_chapter`.
///
/// Near either end of the document the window is shifted so that it still
/// covers `window_size` words; it is only shorter when the whole document is.
pub fn sample_window(
    primary_chapter: u32,
    total_chapters: u32,
    total_words: usize,
    window_size: usize,
) -> Result<WordSpan, PositionError> {
    let span = chapter_to_word_span(primary_chapter, total_chapters, total_words)?;
    if window_size >= total_words {
        return Ok(WordSpan {
            start: 0,
            end: total_words,
        });
    }

    let mid = span.start + span.len() / 2;
    let mut start = mid.saturating_sub(window_size / 2);
    let mut end = start + window_size;
    if end > total_words {
        end = total_words;
        start = total_words - window_size;
    }
    Ok(WordSpan { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_and_span() {
        assert_eq!(parse_range("15").unwrap(), vec![15]);
        assert_eq!(parse_range("1-3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_range(" 4 - 6 ").unwrap(), vec![4, 5, 6]);
    }

    #[test]
    fn parse_strips_prefixes() {
        assert_eq!(parse_range("Chapter 7").unwrap(), vec![7]);
        assert_eq!(parse_range("Chapters 16-18").unwrap(), vec![16, 17, 18]);
        assert_eq!(parse_range("ch. 2\u{2013}3").unwrap(), vec![2, 3]);
        assert_eq!(parse_range("CHAPTERS 1-2").unwrap(), vec![1, 2]);
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["", "Chapter", "four", "1-2-3", "5-3", "0", "0-4", "1,2", "1 to 3"] {
            assert!(
                matches!(parse_range(bad), Err(PositionError::MalformedRange { .. })),
                "expected MalformedRange for {bad:?}"
            );
        }
    }

    #[test]
    fn parse_chapter_requires_single() {
        assert_eq!(parse_chapter("Chapter 12").unwrap(), 12);
        assert!(parse_chapter("3-4").is_err());
    }

    #[test]
    fn leading_chapter_is_lenient() {
        assert_eq!(leading_chapter("Chapter 12"), Some(12));
        assert_eq!(leading_chapter("3-4"), Some(3));
        assert_eq!(leading_chapter("pages 12-14"), Some(12));
        assert_eq!(leading_chapter("near the end"), None);
        assert_eq!(leading_chapter("0"), None);
    }

    #[test]
    fn format_is_canonical() {
        assert_eq!(format_range(&[15]).unwrap(), "15");
        assert_eq!(format_range(&[4, 5, 6, 7]).unwrap(), "4-7");
        assert_eq!(format_range(&[]), Err(PositionError::EmptyRange));
        assert!(matches!(
            format_range(&[1, 3]),
            Err(PositionError::NonContiguous { .. })
        ));
        assert!(format_range(&[3, 2]).is_err());
    }

    #[test]
    fn format_then_parse_reproduces_list() {
        for start in 1..20u32 {
            for len in 1..8u32 {
                let chapters: Vec<u32> = (start..start + len).collect();
                let text = format_range(&chapters).unwrap();
                assert_eq!(parse_range(&text).unwrap(), chapters);
            }
        }
    }

    #[test]
    fn parse_then_format_is_canonical() {
        assert_eq!(format_range(&parse_range("Chapters 4 - 4").unwrap()).unwrap(), "4");
        assert_eq!(format_range(&parse_range("ch. 9\u{2013}11").unwrap()).unwrap(), "9-11");
    }

    #[test]
    fn spans_partition_the_document() {
        let (chapters, words) = (31u32, 100_003usize);
        let mut expected_start = 0;
        for chapter in 1..=chapters {
            let span = chapter_to_word_span(chapter, chapters, words).unwrap();
            assert_eq!(span.start, expected_start);
            assert!(span.end <= words);
            expected_start = span.end;
        }
        assert_eq!(expected_start, words);
    }

    #[test]
    fn span_rejects_bad_chapter() {
        assert!(matches!(
            chapter_to_word_span(0, 10, 1000),
            Err(PositionError::ChapterOutOfRange { .. })
        ));
        assert!(chapter_to_word_span(11, 10, 1000).is_err());
        assert!(matches!(
            chapter_to_word_span(1, 0, 1000),
            Err(PositionError::EmptyDocument { .. })
        ));
    }

    #[test]
    fn chapter_of_word_inverts_spans() {
        let (chapters, words) = (3u32, 10usize);
        for chapter in 1..=chapters {
            let span = chapter_to_word_span(chapter, chapters, words).unwrap();
            for offset in span.start..span.end {
                assert_eq!(chapter_of_word(offset, chapters, words).unwrap(), chapter);
            }
        }
        assert_eq!(chapter_of_word(10_000, chapters, words).unwrap(), 3);
    }

    #[test]
    fn window_is_centred_in_the_middle() {
        // 10 chapters of 1000 words; chapter 5 spans 4000..5000, midpoint 4500.
        let window = sample_window(5, 10, 10_000, 2000).unwrap();
        assert_eq!(window, WordSpan { start: 3500, end: 5500 });
    }

    #[test]
    fn window_shifts_at_the_edges() {
        let first = sample_window(1, 10, 10_000, 3000).unwrap();
        assert_eq!(first, WordSpan { start: 0, end: 3000 });

        let last = sample_window(10, 10, 10_000, 3000).unwrap();
        assert_eq!(last, WordSpan { start: 7000, end: 10_000 });
    }

    #[test]
    fn window_larger_than_document() {
        let window = sample_window(2, 3, 500, 9000).unwrap();
        assert_eq!(window, WordSpan { start: 0, end: 500 });
    }
}
