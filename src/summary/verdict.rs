//! Verdict tiers derived from heuristic scores

use serde::{Deserialize, Serialize};
use std::fmt;

/// Score thresholds separating the tiers
const INFO_MIN_SCORE: i64 = 0;
const SUSPICIOUS_MIN_SCORE: i64 = 300;
const MALICIOUS_MIN_SCORE: i64 = 1000;

/// Verdict tier of a heuristic, tag or attack pattern observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Safe,
    Info,
    Suspicious,
    Malicious,
}

impl Verdict {
    /// Derive a tier from a heuristic score
    pub fn from_score(score: i64) -> Self {
        if score < INFO_MIN_SCORE {
            Verdict::Safe
        } else if score < SUSPICIOUS_MIN_SCORE {
            Verdict::Info
        } else if score < MALICIOUS_MIN_SCORE {
            Verdict::Suspicious
        } else {
            Verdict::Malicious
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Safe => "safe",
            Verdict::Info => "info",
            Verdict::Suspicious => "suspicious",
            Verdict::Malicious => "malicious",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
