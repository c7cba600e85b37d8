use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::MatchError;

/// ABO/Rh blood group as carried on requests and donors.
///
/// Labels outside the eight known groups are kept verbatim in
/// `Unrecognized` so that a record round-trips without losing data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BloodType {
    ONeg,
    OPos,
    ANeg,
    APos,
    BNeg,
    BPos,
    AbNeg,
    AbPos,
    Unrecognized(String),
}

impl BloodType {
    pub const ALL: [BloodType; 8] = [
        BloodType::ONeg,
        BloodType::OPos,
        BloodType::ANeg,
        BloodType::APos,
        BloodType::BNeg,
        BloodType::BPos,
        BloodType::AbNeg,
        BloodType::AbPos,
    ];

    pub fn label(&self) -> &str {
        match self {
            BloodType::ONeg => "O-",
            BloodType::OPos => "O+",
            BloodType::ANeg => "A-",
            BloodType::APos => "A+",
            BloodType::BNeg => "B-",
            BloodType::BPos => "B+",
            BloodType::AbNeg => "AB-",
            BloodType::AbPos => "AB+",
            BloodType::Unrecognized(raw) => raw,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, BloodType::Unrecognized(_))
    }

    /// Red-cell compatibility: can a donor of `self` give to `recipient`?
    ///
    /// Unrecognized groups on either side are never compatible.
    pub fn can_donate_to(&self, recipient: &BloodType) -> bool {
        let (Some((donor_abo, donor_rh)), Some((recv_abo, recv_rh))) =
            (self.components(), recipient.components())
        else {
            return false;
        };
        let abo_ok = match donor_abo {
            Abo::O => true,
            Abo::A => matches!(recv_abo, Abo::A | Abo::Ab),
            Abo::B => matches!(recv_abo, Abo::B | Abo::Ab),
            Abo::Ab => recv_abo == Abo::Ab,
        };
        let rh_ok = !donor_rh || recv_rh;
        abo_ok && rh_ok
    }

    fn components(&self) -> Option<(Abo, bool)> {
        let parts = match self {
            BloodType::ONeg => (Abo::O, false),
            BloodType::OPos => (Abo::O, true),
            BloodType::ANeg => (Abo::A, false),
            BloodType::APos => (Abo::A, true),
            BloodType::BNeg => (Abo::B, false),
            BloodType::BPos => (Abo::B, true),
            BloodType::AbNeg => (Abo::Ab, false),
            BloodType::AbPos => (Abo::Ab, true),
            BloodType::Unrecognized(_) => return None,
        };
        Some(parts)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Abo {
    O,
    A,
    B,
    Ab,
}

impl From<String> for BloodType {
    fn from(raw: String) -> Self {
        match raw.trim() {
            "O-" => BloodType::ONeg,
            "O+" => BloodType::OPos,
            "A-" => BloodType::ANeg,
            "A+" => BloodType::APos,
            "B-" => BloodType::BNeg,
            "B+" => BloodType::BPos,
            "AB-" => BloodType::AbNeg,
            "AB+" => BloodType::AbPos,
            _ => BloodType::Unrecognized(raw),
        }
    }
}

impl From<BloodType> for String {
    fn from(bt: BloodType) -> Self {
        match bt {
            BloodType::Unrecognized(raw) => raw,
            other => other.label().to_string(),
        }
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Declared urgency tier of a request.
///
/// Only the exact lowercase keys `standard`, `urgent` and `critical` map to a
/// tier. Any other label (including UI labels such as `High`) is carried in
/// `Other` and scores with the default multiplier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UrgencyLevel {
    Standard,
    Urgent,
    Critical,
    Other(String),
}

impl UrgencyLevel {
    pub fn label(&self) -> &str {
        match self {
            UrgencyLevel::Standard => "standard",
            UrgencyLevel::Urgent => "urgent",
            UrgencyLevel::Critical => "critical",
            UrgencyLevel::Other(raw) => raw,
        }
    }
}

impl From<String> for UrgencyLevel {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "standard" => UrgencyLevel::Standard,
            "urgent" => UrgencyLevel::Urgent,
            "critical" => UrgencyLevel::Critical,
            _ => UrgencyLevel::Other(raw),
        }
    }
}

impl From<UrgencyLevel> for String {
    fn from(level: UrgencyLevel) -> Self {
        match level {
            UrgencyLevel::Other(raw) => raw,
            other => other.label().to_string(),
        }
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle of a scored match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Pending,
    Successful,
    Unsuccessful,
}

impl Outcome {
    pub fn is_completed(self) -> bool {
        !matches!(self, Outcome::Pending)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Pending => "pending",
            Outcome::Successful => "successful",
            Outcome::Unsuccessful => "unsuccessful",
        };
        f.write_str(s)
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Outcome::Pending),
            "successful" | "success" => Ok(Outcome::Successful),
            "unsuccessful" | "failure" | "failed" => Ok(Outcome::Unsuccessful),
            other => Err(format!(
                "unknown outcome '{other}' (expected successful or unsuccessful)"
            )),
        }
    }
}

/// A point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Reject coordinates outside [-90, 90] x [-180, 180]. Never clamps.
    pub fn validate(&self) -> Result<(), MatchError> {
        let lat_ok = self.lat.is_finite() && (-90.0..=90.0).contains(&self.lat);
        let lon_ok = self.lon.is_finite() && (-180.0..=180.0).contains(&self.lon);
        if lat_ok && lon_ok {
            Ok(())
        } else {
            Err(MatchError::InvalidCoordinate {
                lat: self.lat,
                lon: self.lon,
            })
        }
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lat, self.lon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blood_type_serde_keeps_labels() {
        let json = serde_json::to_string(&BloodType::AbNeg).unwrap();
        assert_eq!(json, "\"AB-\"");
        let parsed: BloodType = serde_json::from_str("\"O+\"").unwrap();
        assert_eq!(parsed, BloodType::OPos);
    }

    #[test]
    fn unknown_blood_type_round_trips_verbatim() {
        let parsed: BloodType = serde_json::from_str("\"Bombay\"").unwrap();
        assert_eq!(parsed, BloodType::Unrecognized("Bombay".into()));
        assert!(!parsed.is_recognized());
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"Bombay\"");
    }

    #[test]
    fn urgency_keys_are_exact() {
        let critical: UrgencyLevel = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(critical, UrgencyLevel::Critical);
        // UI label "High" has no tier of its own
        let high: UrgencyLevel = serde_json::from_str("\"High\"").unwrap();
        assert_eq!(high, UrgencyLevel::Other("High".into()));
        let capitalized: UrgencyLevel = serde_json::from_str("\"Urgent\"").unwrap();
        assert_eq!(capitalized, UrgencyLevel::Other("Urgent".into()));
    }

    #[test]
    fn universal_donor_and_recipient() {
        for recipient in BloodType::ALL {
            assert!(BloodType::ONeg.can_donate_to(&recipient));
        }
        for donor in BloodType::ALL {
            assert!(donor.can_donate_to(&BloodType::AbPos));
        }
    }

    #[test]
    fn rh_positive_cannot_give_to_negative() {
        assert!(!BloodType::OPos.can_donate_to(&BloodType::ONeg));
        assert!(!BloodType::APos.can_donate_to(&BloodType::AbNeg));
        assert!(BloodType::ANeg.can_donate_to(&BloodType::APos));
        assert!(!BloodType::BNeg.can_donate_to(&BloodType::ANeg));
    }

    #[test]
    fn unrecognized_never_compatible() {
        let odd = BloodType::Unrecognized("rare".into());
        assert!(!odd.can_donate_to(&BloodType::AbPos));
        assert!(!BloodType::ONeg.can_donate_to(&odd));
    }

    #[test]
    fn outcome_parses_cli_spellings() {
        assert_eq!("successful".parse::<Outcome>().unwrap(), Outcome::Successful);
        assert_eq!("FAILED".parse::<Outcome>().unwrap(), Outcome::Unsuccessful);
        assert!("maybe".parse::<Outcome>().is_err());
    }

    #[test]
    fn geo_point_bounds() {
        assert!(GeoPoint::new(90.0, -180.0).validate().is_ok());
        assert!(GeoPoint::new(90.1, 0.0).validate().is_err());
        assert!(GeoPoint::new(0.0, 180.5).validate().is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).validate().is_err());
    }
}
