use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::MatchError;

pub const WEIGHT_MIN: f64 = 0.1;
pub const WEIGHT_MAX: f64 = 3.0;

/// Coefficients applied to RUS, DRS and distance factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightTriple {
    pub rus_weight: f64,
    pub drs_weight: f64,
    pub distance_weight: f64,
}

impl WeightTriple {
    pub const fn new(rus_weight: f64, drs_weight: f64, distance_weight: f64) -> Self {
        Self {
            rus_weight,
            drs_weight,
            distance_weight,
        }
    }

    /// Check every component against [WEIGHT_MIN, WEIGHT_MAX].
    ///
    /// Reports the first offending component in field order.
    pub fn validate(&self) -> Result<(), MatchError> {
        for (name, value) in [
            ("rus_weight", self.rus_weight),
            ("drs_weight", self.drs_weight),
            ("distance_weight", self.distance_weight),
        ] {
            if !(WEIGHT_MIN..=WEIGHT_MAX).contains(&value) {
                return Err(MatchError::WeightOutOfBounds {
                    name,
                    value,
                    min: WEIGHT_MIN,
                    max: WEIGHT_MAX,
                });
            }
        }
        Ok(())
    }
}

impl Default for WeightTriple {
    fn default() -> Self {
        Preset::Balanced.weights()
    }
}

impl fmt::Display for WeightTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rus={:.2} drs={:.2} distance={:.2}",
            self.rus_weight, self.drs_weight, self.distance_weight
        )
    }
}

/// Named weight presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Preset {
    Balanced,
    UrgencyFocused,
    DonorFocused,
    ProximityFocused,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::Balanced,
        Preset::UrgencyFocused,
        Preset::DonorFocused,
        Preset::ProximityFocused,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Balanced => "balanced",
            Preset::UrgencyFocused => "urgencyFocused",
            Preset::DonorFocused => "donorFocused",
            Preset::ProximityFocused => "proximityFocused",
        }
    }

    pub fn weights(self) -> WeightTriple {
        match self {
            Preset::Balanced => WeightTriple::new(1.5, 1.2, 0.8),
            Preset::UrgencyFocused => WeightTriple::new(2.0, 1.0, 0.5),
            Preset::DonorFocused => WeightTriple::new(1.0, 2.0, 0.5),
            Preset::ProximityFocused => WeightTriple::new(1.0, 1.0, 1.5),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Preset::Balanced => "default mix of urgency, readiness and proximity",
            Preset::UrgencyFocused => "favor the most urgent requests",
            Preset::DonorFocused => "favor the most ready donors",
            Preset::ProximityFocused => "favor donors closest to the request",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = MatchError;

    /// Accepts camelCase (`urgencyFocused`) and snake_case (`urgency_focused`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "balanced" => Ok(Preset::Balanced),
            "urgencyFocused" | "urgency_focused" => Ok(Preset::UrgencyFocused),
            "donorFocused" | "donor_focused" => Ok(Preset::DonorFocused),
            "proximityFocused" | "proximity_focused" => Ok(Preset::ProximityFocused),
            other => Err(MatchError::UnknownPreset(other.to_string())),
        }
    }
}
