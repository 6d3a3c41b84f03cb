#![allow(dead_code)]

//! In-memory stand-ins for the platform and its live channel

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

use subwatch::api::{ApiError, SubmissionApi};
use subwatch::config::WatchConfiguration;
use subwatch::live::{ChannelCommand, LiveChannel, LiveConnector, LiveError, LiveEvent};
use subwatch::logging::LogLevel;
use subwatch::models::{
    ErrorPayload, MultipleKeysRequest, MultipleKeysResponse, OutstandingServices, ResultPayload, Submission,
    WatchQueue,
};
use subwatch::summary::SummaryReport;
use subwatch::tree::TreeReport;

pub fn hash(c: char) -> String {
    c.to_string().repeat(64)
}

pub fn test_config() -> WatchConfiguration {
    let mut config = WatchConfiguration::default();
    config.logging.level = LogLevel::Error;
    config
}

/// Submission with one base file, still being processed
pub fn processing_submission(sid: &str, sha256: &str) -> Submission {
    serde_json::from_value(json!({
        "sid": sid,
        "state": "submitted",
        "files": [{"sha256": sha256, "name": "sample.exe", "size": 1024}],
    }))
    .unwrap()
}

pub fn completed_submission(sid: &str, sha256: &str, errors: &[&str]) -> Submission {
    serde_json::from_value(json!({
        "sid": sid,
        "state": "completed",
        "files": [{"sha256": sha256, "name": "sample.exe"}],
        "errors": errors,
        "max_score": 1000,
    }))
    .unwrap()
}

/// Result with one malicious heuristic, one attack pattern and one IOC tag
pub fn result_payload(service: &str, score: i64) -> ResultPayload {
    serde_json::from_value(json!({
        "result": {
            "score": score,
            "sections": [{
                "heuristic": {
                    "heur_id": format!("{}.1", service),
                    "name": "Suspicious behaviour",
                    "score": score,
                    "attack": [{"attack_id": "T1059", "pattern": "Command and Scripting Interpreter", "categories": ["execution"]}],
                },
                "tags": [{"type": "network.static.ip", "value": "10.0.0.1"}],
            }],
        },
        "response": {"service_name": service, "extracted": []},
        "type": "executable/windows/pe32",
    }))
    .unwrap()
}

pub fn error_payload(service: &str, message: &str) -> ErrorPayload {
    serde_json::from_value(json!({
        "sha256": hash('a'),
        "type": "EXCEPTION",
        "response": {"service_name": service, "message": message, "status": "FAIL_NONRECOVERABLE"},
    }))
    .unwrap()
}

pub fn authoritative_summary() -> SummaryReport {
    serde_json::from_value(json!({
        "tags": {"ioc": {"network.static.ip": [["10.0.0.1", "malicious", false, "unknown"]]}},
        "heuristics": {"malicious": [["Svc.1", "Suspicious behaviour"]]},
        "attack_matrix": {"execution": [["T1059", "Command and Scripting Interpreter", "malicious"]]},
        "map": {},
        "heuristic_sections": {},
        "filtered": false,
        "partial": false,
    }))
    .unwrap()
}

pub fn authoritative_tree(sha256: &str) -> TreeReport {
    serde_json::from_value(json!({
        "tree": {
            sha256: {"children": {}, "name": ["sample.exe"], "score": 1000, "sha256": sha256, "type": "executable/windows/pe32"}
        },
        "filtered": false,
        "partial": false,
    }))
    .unwrap()
}

fn not_found(what: &str) -> ApiError {
    ApiError::Status {
        code: 404,
        message: format!("{} not found", what),
    }
}

/// Scripted platform. Submission and outstanding-services answers are served
/// in order; the last one repeats.
#[derive(Default)]
pub struct FakeApi {
    submissions: Mutex<HashMap<String, VecDeque<Submission>>>,
    outstanding: Mutex<VecDeque<OutstandingServices>>,
    results: Mutex<HashMap<String, ResultPayload>>,
    errors: Mutex<HashMap<String, ErrorPayload>>,
    requests: Mutex<Vec<MultipleKeysRequest>>,
    pub fail_watch_queue: AtomicBool,
    pub fail_multiple_keys: AtomicUsize,
    pub submission_fetches: AtomicUsize,
    pub watch_queue_setups: AtomicUsize,
    pub outstanding_checks: AtomicUsize,
    pub summary_fetches: AtomicUsize,
    pub tree_fetches: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_submissions(self, sid: &str, answers: Vec<Submission>) -> Self {
        self.submissions.lock().unwrap().insert(sid.to_string(), answers.into());
        self
    }

    pub fn with_outstanding(self, answers: Vec<OutstandingServices>) -> Self {
        *self.outstanding.lock().unwrap() = answers.into();
        self
    }

    pub fn with_result(self, key: &str, payload: ResultPayload) -> Self {
        self.results.lock().unwrap().insert(key.to_string(), payload);
        self
    }

    pub fn with_error(self, key: &str, payload: ErrorPayload) -> Self {
        self.errors.lock().unwrap().insert(key.to_string(), payload);
        self
    }

    pub fn requests(&self) -> Vec<MultipleKeysRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

fn next_answer<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[async_trait]
impl SubmissionApi for FakeApi {
    async fn get_submission(&self, sid: &str) -> Result<Submission, ApiError> {
        self.submission_fetches.fetch_add(1, Ordering::SeqCst);
        let mut submissions = self.submissions.lock().unwrap();
        submissions
            .get_mut(sid)
            .and_then(next_answer)
            .ok_or_else(|| not_found("submission"))
    }

    async fn get_summary(&self, _sid: &str) -> Result<SummaryReport, ApiError> {
        self.summary_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(authoritative_summary())
    }

    async fn get_tree(&self, _sid: &str) -> Result<TreeReport, ApiError> {
        self.tree_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(authoritative_tree(&hash('a')))
    }

    async fn setup_watch_queue(&self, sid: &str) -> Result<WatchQueue, ApiError> {
        let n = self.watch_queue_setups.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_watch_queue.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                code: 503,
                message: "dispatcher unavailable".to_string(),
            });
        }
        Ok(WatchQueue {
            wq_id: format!("wq-{}-{}", sid, n),
        })
    }

    async fn outstanding_services(&self, _sid: &str) -> Result<OutstandingServices, ApiError> {
        self.outstanding_checks.fetch_add(1, Ordering::SeqCst);
        let mut outstanding = self.outstanding.lock().unwrap();
        Ok(next_answer(&mut outstanding).unwrap_or_else(|| Some([("Extract".to_string(), 1)].into())))
    }

    async fn multiple_keys(&self, request: &MultipleKeysRequest) -> Result<MultipleKeysResponse, ApiError> {
        self.requests.lock().unwrap().push(request.clone());

        let remaining = self.fail_multiple_keys.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_multiple_keys.store(remaining - 1, Ordering::SeqCst);
            return Err(ApiError::Status {
                code: 500,
                message: "datastore timeout".to_string(),
            });
        }

        let results = self.results.lock().unwrap();
        let errors = self.errors.lock().unwrap();
        Ok(MultipleKeysResponse {
            result: request
                .result
                .iter()
                .filter_map(|k| results.get(k).map(|p| (k.clone(), p.clone())))
                .collect(),
            error: request
                .error
                .iter()
                .filter_map(|k| errors.get(k).map(|p| (k.clone(), p.clone())))
                .collect(),
        })
    }
}

/// Test side of a fake live channel
pub struct ChannelHandle {
    pub events: mpsc::Sender<LiveEvent>,
    pub commands: mpsc::Receiver<ChannelCommand>,
}

impl ChannelHandle {
    /// Commands the controller has sent so far
    pub fn drain_commands(&mut self) -> Vec<ChannelCommand> {
        let mut out = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            out.push(command);
        }
        out
    }
}

pub fn channel_pair() -> (LiveChannel, ChannelHandle) {
    let (event_tx, event_rx) = mpsc::channel(32);
    let (command_tx, command_rx) = mpsc::channel(32);
    (
        LiveChannel::new(event_rx, command_tx, None),
        ChannelHandle {
            events: event_tx,
            commands: command_rx,
        },
    )
}

/// Hands out prepared channels, then refuses to connect
#[derive(Default)]
pub struct FakeConnector {
    channels: Mutex<VecDeque<LiveChannel>>,
    pub connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(channels: Vec<LiveChannel>) -> Self {
        Self {
            channels: Mutex::new(channels.into()),
            connects: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LiveConnector for FakeConnector {
    async fn connect(&self, _sid: &str) -> Result<LiveChannel, LiveError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.channels
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LiveError::Connect("connection refused".to_string()))
    }
}
