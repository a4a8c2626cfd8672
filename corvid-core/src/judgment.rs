//! Post-run success assessment.

use serde::{Deserialize, Serialize};

/// How confident the judge is in its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// The verdict is well supported by the trajectory.
    High,
    /// The verdict is plausible but the evidence is partial.
    Medium,
    /// The verdict is a guess (including the parse-failure default).
    Low,
}

/// The judge's verdict for one trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    /// Whether the run answered the query.
    pub is_success: bool,
    /// A short reason for the verdict.
    pub reason: String,
    /// Confidence in the verdict.
    pub confidence: Confidence,
    /// Tags for information the run lacked.
    #[serde(default)]
    pub missing: Vec<String>,
}

impl Judgment {
    /// The conservative default used when the judge's response cannot
    /// be parsed.
    pub fn parse_failed() -> Self {
        Self {
            is_success: false,
            reason: "judgment-parse-failed".into(),
            confidence: Confidence::Low,
            missing: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_serde() {
        assert_eq!(
            serde_json::to_string(&Confidence::High).unwrap(),
            "\"high\""
        );
        let back: Confidence = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(back, Confidence::Low);
    }

    #[test]
    fn parse_failed_default_is_conservative() {
        let j = Judgment::parse_failed();
        assert!(!j.is_success);
        assert_eq!(j.confidence, Confidence::Low);
        assert!(j.missing.is_empty());
    }

    #[test]
    fn missing_defaults_to_empty() {
        let j: Judgment = serde_json::from_str(
            r#"{"is_success": true, "reason": "found it", "confidence": "high"}"#,
        )
        .unwrap();
        assert!(j.missing.is_empty());
    }
}
