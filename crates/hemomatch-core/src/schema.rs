use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jsonschema::Validator;
use serde_json::Value;

use crate::errors::{CheckIssue, CheckReport};
use crate::types::{BloodType, UrgencyLevel};

const SCHEMA_REQUEST: &str = include_str!("../schema/request.schema.json");
const SCHEMA_DONORS: &str = include_str!("../schema/donors.schema.json");

/// Kind of input document accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Request,
    Donors,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Request => "request",
            DocumentKind::Donors => "donors",
        }
    }
}

/// A top-level array is a donor list; anything else is treated as a request.
pub fn detect_kind(data: &Value) -> DocumentKind {
    if data.is_array() {
        DocumentKind::Donors
    } else {
        DocumentKind::Request
    }
}

pub fn validator_for(kind: DocumentKind) -> Result<Validator> {
    let schema_str = match kind {
        DocumentKind::Request => SCHEMA_REQUEST,
        DocumentKind::Donors => SCHEMA_DONORS,
    };
    let schema: Value =
        serde_json::from_str(schema_str).context("embedded schema is invalid JSON")?;
    Validator::new(&schema).map_err(|e| anyhow::anyhow!("schema compilation failed: {e}"))
}

/// Full check producing a structured report (for `hmatch check --json`).
pub fn check(data: &Value, file: &str, strict: bool, now: DateTime<Utc>) -> CheckReport {
    let kind = detect_kind(data);
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    match validator_for(kind) {
        Ok(v) => {
            for error in v.iter_errors(data) {
                let path = error.instance_path.to_string();
                errors.push(CheckIssue {
                    code: "E001".to_string(),
                    check: "schema".to_string(),
                    message: error.to_string(),
                    path: Some(if path.is_empty() {
                        "$(root)".to_string()
                    } else {
                        format!("${path}")
                    }),
                });
            }
        }
        Err(e) => errors.push(CheckIssue {
            code: "E000".to_string(),
            check: "schema".to_string(),
            message: e.to_string(),
            path: None,
        }),
    }

    match kind {
        DocumentKind::Request => lint_request(data, "$", now, &mut warnings),
        DocumentKind::Donors => lint_donors(data, &mut errors, &mut warnings),
    }

    let pass = errors.is_empty() && (!strict || warnings.is_empty());
    CheckReport {
        file: file.to_string(),
        kind: kind.as_str().to_string(),
        pass,
        errors,
        warnings,
    }
}

fn lint_request(data: &Value, prefix: &str, now: DateTime<Utc>, warnings: &mut Vec<CheckIssue>) {
    // W001: label that falls through to the default multiplier
    if let Some(label) = data.get("urgency_level").and_then(Value::as_str) {
        if let UrgencyLevel::Other(raw) = UrgencyLevel::from(label.to_string()) {
            warnings.push(CheckIssue {
                code: "W001".to_string(),
                check: "lint".to_string(),
                message: format!(
                    "urgency level '{raw}' is not one of standard/urgent/critical; scored as standard"
                ),
                path: Some(format!("{prefix}.urgency_level")),
            });
        }
    }

    lint_blood_type(data, prefix, warnings);

    // W003: future-dated request scores as age 0
    if let Some(ts) = data.get("created_at").and_then(Value::as_str) {
        if let Ok(created) = DateTime::parse_from_rfc3339(ts) {
            if created.with_timezone(&Utc) > now {
                warnings.push(CheckIssue {
                    code: "W003".to_string(),
                    check: "lint".to_string(),
                    message: "created_at is in the future; age will be scored as 0".to_string(),
                    path: Some(format!("{prefix}.created_at")),
                });
            }
        }
    }
}

fn lint_blood_type(data: &Value, prefix: &str, warnings: &mut Vec<CheckIssue>) {
    // W002: unknown blood type earns no rarity bonus
    if let Some(label) = data.get("blood_type").and_then(Value::as_str) {
        if !BloodType::from(label.to_string()).is_recognized() {
            warnings.push(CheckIssue {
                code: "W002".to_string(),
                check: "lint".to_string(),
                message: format!("unrecognized blood type '{label}'"),
                path: Some(format!("{prefix}.blood_type")),
            });
        }
    }
}

fn lint_donors(data: &Value, errors: &mut Vec<CheckIssue>, warnings: &mut Vec<CheckIssue>) {
    let Some(donors) = data.as_array() else {
        return;
    };
    let mut seen = HashSet::new();
    for (i, donor) in donors.iter().enumerate() {
        let prefix = format!("$[{i}]");
        if let Some(id) = donor.get("id").and_then(Value::as_str) {
            // E010: ranking ties are broken by id, so ids must be unique
            if !seen.insert(id.to_string()) {
                errors.push(CheckIssue {
                    code: "E010".to_string(),
                    check: "donor_ids".to_string(),
                    message: format!("duplicate donor id '{id}'"),
                    path: Some(format!("{prefix}.id")),
                });
            }
        }
        lint_blood_type(donor, &prefix, warnings);
        // W004: no embedded readiness; ranking needs another port
        if donor.get("readiness_score").is_none() {
            warnings.push(CheckIssue {
                code: "W004".to_string(),
                check: "lint".to_string(),
                message: "donor has no readiness_score".to_string(),
                path: Some(prefix),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> Value {
        json!({
            "id": "req-1",
            "blood_type": "O-",
            "urgency_level": "critical",
            "created_at": "2026-01-01T00:00:00Z",
            "location": {"lat": 40.7, "lon": -74.0}
        })
    }

    #[test]
    fn valid_request_passes_strict() {
        let report = check(&request(), "req.json", true, Utc::now());
        assert!(report.pass, "{:?}", report.errors);
        assert_eq!(report.kind, "request");
    }

    #[test]
    fn out_of_range_latitude_is_schema_error() {
        let mut req = request();
        req["location"]["lat"] = json!(91.0);
        let report = check(&req, "req.json", false, Utc::now());
        assert!(!report.pass);
        assert!(report.errors.iter().any(|e| e.code == "E001"));
    }

    #[test]
    fn ui_urgency_label_warns() {
        let mut req = request();
        req["urgency_level"] = json!("High");
        let report = check(&req, "req.json", false, Utc::now());
        assert!(report.pass);
        assert!(report.warnings.iter().any(|w| w.code == "W001"));

        let strict = check(&req, "req.json", true, Utc::now());
        assert!(!strict.pass);
    }

    #[test]
    fn future_request_warns() {
        let mut req = request();
        req["created_at"] = json!("2999-01-01T00:00:00Z");
        let report = check(&req, "req.json", false, Utc::now());
        assert!(report.warnings.iter().any(|w| w.code == "W003"));
    }

    #[test]
    fn duplicate_donor_ids_fail() {
        let donors = json!([
            {"id": "d1", "blood_type": "O-", "location": {"lat": 0, "lon": 0}, "readiness_score": 50},
            {"id": "d1", "blood_type": "A+", "location": {"lat": 1, "lon": 1}, "readiness_score": 60}
        ]);
        let report = check(&donors, "donors.json", false, Utc::now());
        assert_eq!(report.kind, "donors");
        assert!(!report.pass);
        assert!(report.errors.iter().any(|e| e.code == "E010"));
    }

    #[test]
    fn donor_readiness_above_100_rejected_by_schema() {
        let donors = json!([
            {"id": "d1", "blood_type": "O-", "location": {"lat": 0, "lon": 0}, "readiness_score": 101}
        ]);
        let report = check(&donors, "donors.json", false, Utc::now());
        assert!(!report.pass);
        assert!(report.errors.iter().any(|e| e.code == "E001"));
    }
}
