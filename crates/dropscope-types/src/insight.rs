//! Rendered root-cause insight handed to the persistence layer.

use serde::{Deserialize, Serialize};

/// Scratch key under which the insight step publishes its result.
pub const FINAL_INSIGHT_KEY: &str = "final_insight";

/// Scratch key under which a branch breakdown rule records its match.
pub const MATCHED_BREAKDOWN_KEY: &str = "matched_breakdown";

/// Lower bound of the confidence heuristic (also the no-evidence value).
pub const MIN_CONFIDENCE: f64 = 0.3;

/// Upper bound of the confidence heuristic.
pub const MAX_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub summary: String,
    #[serde(default)]
    pub details: Vec<String>,
    /// Always within `[MIN_CONFIDENCE, MAX_CONFIDENCE]`.
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insight_json_roundtrip() {
        let insight = Insight {
            summary: "CVR fell 12.50%".to_string(),
            details: vec!["Top segment: google".to_string()],
            confidence: 0.42,
        };
        let json = serde_json::to_string(&insight).unwrap();
        let parsed: Insight = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, insight);
    }
}
