// THEORY:
// The `actuator_selector` is the last, and simplest, stage of the loop: a threshold
// rule that turns the continuous correction vector into the on/off state of the
// four glove actuators.
//
// Only the column (medial/lateral) component drives feedback:
// - negative: the load must move toward the thumb side, so thumb and wrist buzz;
// - positive: the load must move toward the pinky side, so index and pinky buzz;
// - within the dead band (exactly zero by default): nothing buzzes.
// The row component has no actuator of its own and is ignored here.

use crate::core_modules::posture_analyzer::CorrectionVector;
use serde::{Deserialize, Serialize};
use std::fmt;

/// On/off state of the glove actuators for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActuatorFlags {
    pub index: bool,
    pub pinky: bool,
    pub wrist: bool,
    pub thumb: bool,
}

impl ActuatorFlags {
    /// All actuators off.
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::neutral()
    }

    pub fn active_names(&self) -> Vec<&'static str> {
        [
            (self.index, "index"),
            (self.pinky, "pinky"),
            (self.wrist, "wrist"),
            (self.thumb, "thumb"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }
}

impl fmt::Display for ActuatorFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.active_names();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("+"))
        }
    }
}

/// Sets flags on `actuators` from the column component of `vector`. Flags that
/// are already set stay set; start from `ActuatorFlags::neutral()` for a fresh
/// selection.
pub fn select_actuators(vector: &CorrectionVector, actuators: &mut ActuatorFlags, dead_band: f64) {
    if vector.d_column < -dead_band {
        actuators.thumb = true;
        actuators.wrist = true;
    } else if vector.d_column > dead_band {
        actuators.index = true;
        actuators.pinky = true;
    }
}

/// Fresh selection for one vector.
pub fn actuators_for(vector: &CorrectionVector, dead_band: f64) -> ActuatorFlags {
    let mut actuators = ActuatorFlags::neutral();
    select_actuators(vector, &mut actuators, dead_band);
    actuators
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(d_row: f64, d_column: f64) -> CorrectionVector {
        CorrectionVector { d_row, d_column }
    }

    #[test]
    fn new_flags_are_all_off() {
        let flags = ActuatorFlags::neutral();
        assert!(!flags.index && !flags.pinky && !flags.wrist && !flags.thumb);
        assert!(flags.is_neutral());
        assert_eq!(flags.to_string(), "none");
    }

    #[test]
    fn shift_toward_thumb() {
        let flags = actuators_for(&vector(0.0, -1.0 / 3.0), 0.0);
        assert_eq!(
            flags,
            ActuatorFlags { index: false, pinky: false, wrist: true, thumb: true }
        );
        assert_eq!(flags.to_string(), "wrist+thumb");
    }

    #[test]
    fn shift_toward_pinky() {
        let flags = actuators_for(&vector(0.0, 0.25), 0.0);
        assert_eq!(
            flags,
            ActuatorFlags { index: true, pinky: true, wrist: false, thumb: false }
        );
    }

    #[test]
    fn zero_vector_sets_nothing() {
        assert!(actuators_for(&vector(0.0, 0.0), 0.0).is_neutral());
    }

    #[test]
    fn row_component_is_ignored() {
        assert!(actuators_for(&vector(5.0, 0.0), 0.0).is_neutral());
        assert!(actuators_for(&vector(-5.0, 0.0), 0.0).is_neutral());
    }

    #[test]
    fn dead_band_suppresses_small_corrections() {
        assert!(actuators_for(&vector(0.0, -0.2), 0.5).is_neutral());
        assert!(actuators_for(&vector(0.0, 0.5), 0.5).is_neutral());
        assert!(actuators_for(&vector(0.0, 0.6), 0.5).pinky);
    }

    #[test]
    fn selection_only_adds_flags() {
        let mut flags = ActuatorFlags { index: true, ..ActuatorFlags::neutral() };
        select_actuators(&vector(0.0, -1.0), &mut flags, 0.0);
        assert!(flags.index && flags.thumb && flags.wrist);
    }
}
