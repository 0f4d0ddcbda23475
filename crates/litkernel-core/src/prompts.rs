//! Instruction text sent to the generative service.
//!
//! Each builder states the exact JSON shape the matching stage parser
//! expects.

use crate::devices::taxonomy;
use crate::domain::alignment::ChapterAlignment;
use crate::domain::segment::SegmentKind;

pub const SYSTEM_PROMPT: &str = "You are a literary analyst preparing teaching material. \
Answer with a single JSON document and nothing else: no prose, no commentary.";

/// Book identity shared by every prompt.
#[derive(Debug, Clone, Copy)]
pub struct BookInfo<'a> {
    pub title: &'a str,
    pub author: &'a str,
    pub total_chapters: u32,
}

/// One stage-0 excerpt, centred on a conventional primary chapter.
#[derive(Debug, Clone)]
pub struct SampleExcerpt {
    pub segment: SegmentKind,
    pub around_chapter: u32,
    pub text: String,
}

pub fn structure_prompt(book: BookInfo<'_>, samples: &[SampleExcerpt]) -> String {
    let mut prompt = format!(
        "Identify the five-part dramatic structure of \"{}\" by {}.\n\
         The book has {} chapters. Assign every chapter from 1 to {} to exactly one of \
         exposition, rising_action, climax, falling_action, resolution, in order, \
         with no gaps and no overlaps. The climax covers at most 3 chapters.\n\n",
        book.title, book.author, book.total_chapters, book.total_chapters
    );

    for sample in samples {
        prompt.push_str(&format!(
            "--- Excerpt near chapter {} (conventionally {}) ---\n{}\n\n",
            sample.around_chapter, sample.segment, sample.text
        ));
    }

    prompt.push_str(
        "Return JSON of the form:\n\
         {\n\
           \"text_structure\": {\"total_chapters_estimate\": <int>},\n\
           \"exposition\": {\"chapter_range\": \"1-3\", \"primary_chapter\": 2,\n\
                            \"description\": \"...\", \"key_events\": [\"...\"]},\n\
           \"rising_action\": {...}, \"climax\": {...},\n\
           \"falling_action\": {...}, \"resolution\": {...}\n\
         }\n",
    );
    prompt
}

pub fn extraction_prompt(
    book: BookInfo<'_>,
    segment: SegmentKind,
    alignment: &ChapterAlignment,
    excerpt: &str,
) -> String {
    let seg = alignment.get(segment);
    format!(
        "From \"{}\" by {}, extract one focused passage of 500-800 words that best \
         represents the {} (chapters {}, centred on chapter {}).\n\
         Quote the passage verbatim from the excerpt below.\n\n\
         --- Excerpt ---\n{}\n\n\
         Return JSON: {{\"passage\": \"...\", \"rationale\": \"...\", \"word_count\": <int>}}\n",
        book.title,
        book.author,
        segment,
        seg.chapter_range,
        seg.primary_chapter,
        excerpt
    )
}

fn passages_block(alignment: &ChapterAlignment) -> String {
    let mut block = String::new();
    for seg in alignment.iter() {
        block.push_str(&format!(
            "--- {} (chapters {}) ---\n{}\n\n",
            seg.kind,
            seg.chapter_range,
            seg.passage.as_deref().unwrap_or("")
        ));
    }
    block
}

pub fn macro_prompt(book: BookInfo<'_>, alignment: &ChapterAlignment) -> String {
    format!(
        "Tag the narrative and rhetorical profile of \"{}\" by {} from these passages.\n\n{}\
         Return JSON with objects \"narrative\", \"rhetoric\", \"alignment\" and \
         \"device_mediation\". \"narrative.pov\" must be one of FIRST, SECOND, \
         THIRD_LIMITED, THIRD_OMNI.\n",
        book.title,
        book.author,
        passages_block(alignment)
    )
}

pub fn device_prompt(book: BookInfo<'_>, alignment: &ChapterAlignment, pov_code: Option<&str>) -> String {
    let names: Vec<&str> = taxonomy::all_names().collect();
    format!(
        "Identify literary devices in \"{}\" by {} ({} chapters). Narrative point of view: {}.\n\
         Use only these device names: {}.\n\n{}\
         Return a JSON array: [{{\"name\": \"...\", \"definition\": \"...\", \
         \"examples\": [{{\"text\": \"...\", \"chapter\": <int>, \"scene\": \"...\", \
         \"narrative_position\": \"exposition|rising_action|climax|falling_action|resolution\"}}]}}]\n",
        book.title,
        book.author,
        book.total_chapters,
        pov_code.unwrap_or("unknown"),
        names.join(", "),
        passages_block(alignment)
    )
}
