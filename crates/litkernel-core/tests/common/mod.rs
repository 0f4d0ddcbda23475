//! Shared fixtures for the pipeline integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use litkernel_core::assemble::BookMetadata;
use litkernel_core::fakes::ScriptedService;
use litkernel_core::{Document, PipelineConfig, PipelineController, SegmentKind};
use litkernel_store::CheckpointStore;
use serde_json::{json, Value};

pub const TITLE: &str = "The Long Valley";

/// A document of `chapters` headed chapters, `words_per_chapter` words each.
pub fn book_text(chapters: u32, words_per_chapter: usize) -> String {
    let mut text = String::new();
    for ch in 1..=chapters {
        text.push_str(&format!("Chapter {ch}\n"));
        for w in 0..words_per_chapter {
            text.push_str(&format!("c{ch}w{w} "));
        }
        text.push('\n');
    }
    text
}

pub fn document(chapters: u32) -> Document {
    Document::from_text(book_text(chapters, 400), None).unwrap()
}

/// Stage-0 answer for 31 chapters, wrapped in a markdown fence.
pub fn structure_31() -> String {
    let body = json!({
        "text_structure": { "total_chapters_estimate": 31 },
        "exposition": { "chapter_range": "Chapters 1-4", "primary_chapter": 2,
                        "description": "the valley and its families" },
        "rising_action": { "chapter_range": "5-15", "primary_chapter": 10 },
        "climax": { "chapter_start": 16, "chapter_end": 18, "primary_chapter": 17,
                    "key_events": ["the flood"] },
        "falling_action": { "chapter_range": "19-27", "primary_chapter": 23 },
        "resolution": { "chapter_range": "28-31", "primary_chapter": 30 }
    });
    format!("```json\n{body:#}\n```")
}

pub fn extract(kind: SegmentKind) -> String {
    json!({
        "passage": format!("The {} passage, quoted at length from the valley chapters.", kind.as_str()),
        "rationale": format!("Shows the {} turning", kind.as_str()),
        "word_count": 9
    })
    .to_string()
}

pub fn macro_profile(pov: &str) -> String {
    json!({
        "narrative": { "pov": pov, "tense": "past" },
        "rhetoric": { "register": "plain" },
        "alignment": { "theme_to_structure": "strong" },
        "device_mediation": { "primary": "imagery" }
    })
    .to_string()
}

fn example(quote: &str, chapter: u32, segment: Option<&str>) -> Value {
    match segment {
        Some(s) => json!({ "text": quote, "chapter": chapter, "narrative_position": s }),
        None => json!({ "text": quote, "chapter": chapter }),
    }
}

/// A raw 20-device answer with three pervasive-voice devices placed in
/// exposition and climax, one duplicate pair and one off-voice device.
pub fn twenty_devices() -> Value {
    let entry = |name: &str, section: &str, chapter: u32| {
        json!({
            "name": name,
            "definition": format!("{name} as used here"),
            "assigned_section": section,
            "examples": [example(&format!("{name} quote"), chapter, Some(section))]
        })
    };
    json!([
        entry("Imagery", "exposition", 2),
        entry("Simile", "exposition", 3),
        entry("Third-Person Limited", "exposition", 1),
        entry("Personification", "exposition", 4),
        entry("Foreshadowing", "rising_action", 6),
        entry("Flashback", "rising_action", 8),
        entry("Repetition", "rising_action", 11),
        entry("Parallelism", "rising_action", 13),
        entry("Metaphor", "climax", 16),
        entry("Symbolism", "climax", 17),
        entry("Free Indirect Discourse", "climax", 17),
        entry("Motif", "climax", 18),
        entry("Stream of Consciousness", "climax", 18),
        entry("Dramatic Irony", "falling_action", 20),
        entry("Situational Irony", "falling_action", 22),
        entry("Foil", "falling_action", 25),
        entry("simile", "climax", 16),
        entry("Understatement", "falling_action", 26),
        entry("Allusion", "climax", 17),
        entry("Paradox", "falling_action", 24),
    ])
}

/// A service scripted for one complete run over the 31-chapter fixture.
pub fn scripted_full_run(pov: &str) -> ScriptedService {
    let mut service = ScriptedService::new().respond("stage0", structure_31());
    for kind in SegmentKind::ALL {
        service = service.respond(&format!("stage1:{}", kind.as_str()), extract(kind));
    }
    service
        .respond("stage2a", macro_profile(pov))
        .respond("stage2b", twenty_devices().to_string())
}

pub fn config(records_dir: &std::path::Path) -> PipelineConfig {
    PipelineConfig::default()
        .with_cooldown(Duration::ZERO)
        .with_records_dir(records_dir)
}

pub fn controller(
    records_dir: &std::path::Path,
    service: Arc<ScriptedService>,
    store: Arc<dyn CheckpointStore>,
) -> PipelineController {
    PipelineController::new(
        config(records_dir),
        BookMetadata::new(TITLE, "J. Steinbeck", "1938"),
        document(31),
        service,
        store,
    )
}
