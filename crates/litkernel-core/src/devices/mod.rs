//! Literary-device taxonomy and the consistency engine that repairs
//! service-produced device lists.

pub mod engine;
pub mod taxonomy;

pub use engine::{
    check_placement, locate_examples, ConsistencyEngine, ConsistencyReport, ExclusivityViolation,
    PlacementProblem, PlacementViolation, RemovedDuplicate,
};
pub use taxonomy::{canonical_name, canonical_segment, is_pervasive_voice, pov_group, tier_of, PovGroup};
