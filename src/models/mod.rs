//! Data models module
//!
//! Defines the wire structures exchanged with the analysis platform:
//! - Submission: the record a watch is scoped to
//! - ResultPayload / ErrorPayload: per-file-per-service outcomes
//! - MultipleKeysRequest / MultipleKeysResponse: batched outcome fetch
//! - LiveStatus: client-local liveness classification

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::constants::FILE_HASH_LEN;

/// Server-side lifecycle of a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionState {
    Submitted,
    Queued,
    Completed,
    #[serde(other)]
    Unknown,
}

impl Default for SubmissionState {
    fn default() -> Self {
        SubmissionState::Submitted
    }
}

/// One constituent file of a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionFile {
    pub sha256: String,
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Users that flagged the submission either way
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictSets {
    #[serde(default)]
    pub malicious: Vec<String>,
    #[serde(default)]
    pub non_malicious: Vec<String>,
}

/// Full submission record as returned by the submission endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Submission {
    pub sid: String,
    #[serde(default)]
    pub state: SubmissionState,
    #[serde(default)]
    pub files: Vec<SubmissionFile>,
    /// Error keys recorded by the server
    #[serde(default)]
    pub errors: Vec<String>,
    /// Result keys recorded by the server
    #[serde(default)]
    pub results: Vec<String>,
    #[serde(default)]
    pub verdict: VerdictSets,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub max_score: Option<i64>,
}

impl Submission {
    pub fn is_completed(&self) -> bool {
        self.state == SubmissionState::Completed
    }

    /// Original filename of a base file, if the hash belongs to this submission
    pub fn file_name(&self, sha256: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.sha256 == sha256)
            .map(|f| f.name.as_str())
    }
}

/// Client-local liveness classification, layered on top of the server state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveStatus {
    Queued,
    Processing,
    Rescheduled,
    Completed,
}

impl fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LiveStatus::Queued => "queued",
            LiveStatus::Processing => "processing",
            LiveStatus::Rescheduled => "rescheduled",
            LiveStatus::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Snapshot of services still working on a submission.
/// `None` means the server lost track of outstanding work (rescheduled).
pub type OutstandingServices = Option<BTreeMap<String, u64>>;

/// Map an outstanding-services snapshot to the liveness it implies
pub fn classify_outstanding(outstanding: &OutstandingServices) -> LiveStatus {
    match outstanding {
        None => LiveStatus::Rescheduled,
        Some(services) if services.is_empty() => LiveStatus::Queued,
        Some(_) => LiveStatus::Processing,
    }
}

/// Content hash prefix of a result or error key
pub fn file_hash(key: &str) -> &str {
    match key.char_indices().nth(FILE_HASH_LEN) {
        Some((idx, _)) => &key[..idx],
        None => key,
    }
}

/// A per-file-per-service result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultPayload {
    #[serde(default)]
    pub result: ResultBody,
    #[serde(default)]
    pub response: ResponseBody,
    /// File type as identified by the platform
    #[serde(rename = "type", default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultBody {
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub sections: Vec<ResultSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultSection {
    #[serde(default)]
    pub heuristic: Option<Heuristic>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heuristic {
    pub heur_id: String,
    pub name: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub attack: Vec<AttackEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackEntry {
    pub attack_id: String,
    pub pattern: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "type")]
    pub tag_type: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseBody {
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub extracted: Vec<ExtractedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFile {
    pub sha256: String,
    pub name: String,
}

/// A per-file-per-service failure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub sha256: String,
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub response: ErrorResponse,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

/// Body of the batched outcome fetch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipleKeysRequest {
    pub result: Vec<String>,
    pub error: Vec<String>,
}

impl MultipleKeysRequest {
    pub fn is_empty(&self) -> bool {
        self.result.is_empty() && self.error.is_empty()
    }

    /// All requested keys, results first
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.result.iter().chain(self.error.iter())
    }
}

/// Payloads keyed by the requested keys
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultipleKeysResponse {
    #[serde(default)]
    pub result: HashMap<String, ResultPayload>,
    #[serde(default)]
    pub error: HashMap<String, ErrorPayload>,
}

/// Watch queue allocation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchQueue {
    pub wq_id: String,
}
