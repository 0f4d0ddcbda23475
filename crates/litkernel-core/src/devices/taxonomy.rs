//! Closed device taxonomy: names, tiers and point-of-view groups.

use serde::{Deserialize, Serialize};

use crate::domain::segment::SegmentKind;

/// Tier assigned to names outside the taxonomy.
pub const UNKNOWN_TIER: u8 = 0;

/// Tier of the pervasive-voice devices, always taught in the resolution.
pub const PERVASIVE_VOICE_TIER: u8 = 5;

/// `(canonical name, tier)`.
///
/// 1 concrete/sensory, 2 structural/pattern, 3 abstract/symbolic,
/// 4 authorial intent/irony, 5 narrative frame/voice.
const TAXONOMY: &[(&str, u8)] = &[
    ("Imagery", 1),
    ("Simile", 1),
    ("Personification", 1),
    ("Hyperbole", 1),
    ("Onomatopoeia", 1),
    ("Alliteration", 1),
    ("Assonance", 1),
    ("Consonance", 1),
    ("Sensory Detail", 1),
    ("Foreshadowing", 2),
    ("Flashback", 2),
    ("Repetition", 2),
    ("Parallelism", 2),
    ("Juxtaposition", 2),
    ("Anaphora", 2),
    ("Epistrophe", 2),
    ("Cliffhanger", 2),
    ("Dialogue", 2),
    ("Contrast", 2),
    ("Metaphor", 3),
    ("Extended Metaphor", 3),
    ("Symbolism", 3),
    ("Motif", 3),
    ("Allegory", 3),
    ("Allusion", 3),
    ("Archetype", 3),
    ("Pathetic Fallacy", 3),
    ("Dramatic Irony", 4),
    ("Situational Irony", 4),
    ("Verbal Irony", 4),
    ("Satire", 4),
    ("Understatement", 4),
    ("Paradox", 4),
    ("Oxymoron", 4),
    ("Foil", 4),
    ("Rhetorical Question", 4),
    ("First-Person Narration", 5),
    ("First-Person Point of View", 5),
    ("Second-Person Narration", 5),
    ("Third-Person Limited", 5),
    ("Third-Person Omniscient", 5),
    ("Omniscient Narration", 5),
    ("Unreliable Narrator", 5),
    ("Frame Narrative", 5),
    ("Stream of Consciousness", 5),
    ("Free Indirect Discourse", 5),
    ("Point of View", 5),
];

/// Mutually exclusive narrative points of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PovGroup {
    FirstPerson,
    SecondPerson,
    ThirdLimited,
    ThirdOmniscient,
}

const POV_MEMBERS: &[(&str, PovGroup)] = &[
    ("First-Person Narration", PovGroup::FirstPerson),
    ("First-Person Point of View", PovGroup::FirstPerson),
    ("Second-Person Narration", PovGroup::SecondPerson),
    ("Third-Person Limited", PovGroup::ThirdLimited),
    ("Third-Person Omniscient", PovGroup::ThirdOmniscient),
    ("Omniscient Narration", PovGroup::ThirdOmniscient),
];

impl PovGroup {
    /// Map a macro-profile point-of-view code to its group.
    ///
    /// Known codes: `FP`/`FIRST`, `SP`/`SECOND`, `TPL`/`THIRD_LIMITED`,
    /// `TPO`/`THIRD_OMNI`. Case and separators are ignored.
    pub fn from_code(code: &str) -> Option<Self> {
        let key: String = code
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        match key.as_str() {
            "FP" | "FIRST" | "FIRSTPERSON" => Some(PovGroup::FirstPerson),
            "SP" | "SECOND" | "SECONDPERSON" => Some(PovGroup::SecondPerson),
            "TPL" | "TL" | "THIRDLIMITED" | "THIRDPERSONLIMITED" => Some(PovGroup::ThirdLimited),
            "TPO" | "TO" | "THIRDOMNI" | "THIRDOMNISCIENT" | "THIRDPERSONOMNISCIENT"
            | "OMNISCIENT" => Some(PovGroup::ThirdOmniscient),
            _ => None,
        }
    }

    /// Canonical device names belonging to this group.
    pub fn members(self) -> impl Iterator<Item = &'static str> {
        POV_MEMBERS
            .iter()
            .filter(move |(_, g)| *g == self)
            .map(|(name, _)| *name)
    }
}

/// Matching key: lowercase ASCII alphanumerics only.
pub fn name_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Taxonomy spelling of `name`, matched ignoring case, spaces and hyphens.
pub fn canonical_name(name: &str) -> Option<&'static str> {
    let key = name_key(name);
    TAXONOMY
        .iter()
        .find(|(canonical, _)| name_key(canonical) == key)
        .map(|(canonical, _)| *canonical)
}

/// Tier of `name`, or [`UNKNOWN_TIER`].
pub fn tier_of(name: &str) -> u8 {
    canonical_name(name)
        .and_then(|c| TAXONOMY.iter().find(|(n, _)| *n == c))
        .map(|(_, tier)| *tier)
        .unwrap_or(UNKNOWN_TIER)
}

/// Teaching segment for a tier; `None` for unknown tiers.
pub fn canonical_segment(tier: u8) -> Option<SegmentKind> {
    match tier {
        1 => Some(SegmentKind::Exposition),
        2 => Some(SegmentKind::RisingAction),
        3 => Some(SegmentKind::Climax),
        4 => Some(SegmentKind::FallingAction),
        5 => Some(SegmentKind::Resolution),
        _ => None,
    }
}

pub fn is_pervasive_voice(name: &str) -> bool {
    tier_of(name) == PERVASIVE_VOICE_TIER
}

/// Exclusive point-of-view group of `name`, if it has one.
pub fn pov_group(name: &str) -> Option<PovGroup> {
    let canonical = canonical_name(name)?;
    POV_MEMBERS
        .iter()
        .find(|(n, _)| *n == canonical)
        .map(|(_, group)| *group)
}

/// Every canonical name, in tier order.
pub fn all_names() -> impl Iterator<Item = &'static str> {
    TAXONOMY.iter().map(|(name, _)| *name)
}
