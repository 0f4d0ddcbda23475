//! Macro narrative/rhetoric profile produced by stage 2A.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::devices::taxonomy::PovGroup;

/// Categorical codes describing narrative voice, structure and rhetoric.
///
/// Passed through as the service produced it; only the point-of-view code is
/// interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacroProfile(pub Map<String, Value>);

impl MacroProfile {
    /// Wrap a JSON value; `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Point-of-view code, looked up at `narrative.pov`,
    /// `narrative.voice.pov`, then top-level `pov`.
    pub fn pov_code(&self) -> Option<&str> {
        let narrative = self.0.get("narrative");
        narrative
            .and_then(|n| n.get("pov"))
            .or_else(|| narrative.and_then(|n| n.get("voice")).and_then(|v| v.get("pov")))
            .or_else(|| self.0.get("pov"))
            .and_then(Value::as_str)
    }

    /// Exclusive point-of-view group, when the code is recognised.
    pub fn pov_group(&self) -> Option<PovGroup> {
        self.pov_code().and_then(PovGroup::from_code)
    }
}
