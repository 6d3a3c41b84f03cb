//! Mutable state of one watched submission

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::{ErrorPayload, LiveStatus, Submission};
use crate::pipeline::{KeyBuffer, ProcessedKeySet, Reconciler};
use crate::summary::{SummaryAggregator, SummaryTagTypes};
use crate::tree::FileTree;

/// One failed service run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Errors seen so far, in arrival order, one record per key
#[derive(Debug, Clone, Default)]
pub struct LiveErrors {
    records: Vec<ErrorRecord>,
    seen: HashSet<String>,
}

impl LiveErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record fetched error payloads. Returns how many keys were new.
    pub fn record(&mut self, errors: &HashMap<String, ErrorPayload>) -> usize {
        let mut keys: Vec<&String> = errors.keys().collect();
        keys.sort();

        let mut added = 0;
        for key in keys {
            if !self.seen.insert(key.clone()) {
                continue;
            }
            let payload = &errors[key];
            self.records.push(ErrorRecord {
                key: key.clone(),
                service: non_empty(&payload.response.service_name),
                message: non_empty(&payload.response.message),
            });
            added += 1;
        }
        added
    }

    /// Replace everything with the server's error keys
    pub fn adopt_keys(&mut self, keys: &[String]) {
        self.clear();
        for key in keys {
            if self.seen.insert(key.clone()) {
                self.records.push(ErrorRecord {
                    key: key.clone(),
                    service: None,
                    message: None,
                });
            }
        }
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.seen.clear();
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Everything the controller accumulates for the submission it watches
#[derive(Debug, Clone)]
pub struct LiveState {
    pub(crate) status: LiveStatus,
    pub(crate) submission: Submission,
    pub(crate) watch_queue: Option<String>,
    pub(crate) results: KeyBuffer,
    pub(crate) errors: KeyBuffer,
    pub(crate) processed: ProcessedKeySet,
    pub(crate) reconciler: Reconciler,
    pub(crate) aggregator: SummaryAggregator,
    pub(crate) tree: FileTree,
    pub(crate) live_errors: LiveErrors,
}

impl LiveState {
    pub fn new(tag_types: SummaryTagTypes, stall_ticks: u64) -> Self {
        Self {
            status: LiveStatus::Queued,
            submission: Submission::default(),
            watch_queue: None,
            results: KeyBuffer::new(),
            errors: KeyBuffer::new(),
            processed: ProcessedKeySet::new(),
            reconciler: Reconciler::new(stall_ticks),
            aggregator: SummaryAggregator::new(tag_types),
            tree: FileTree::new(),
            live_errors: LiveErrors::new(),
        }
    }

    /// Forget everything about the previous submission
    pub fn reset(&mut self) {
        self.status = LiveStatus::Queued;
        self.submission = Submission::default();
        self.watch_queue = None;
        self.results.clear();
        self.errors.clear();
        self.processed.clear();
        self.reconciler.reset();
        self.aggregator.reset();
        self.tree = FileTree::new();
        self.live_errors.clear();
    }

    pub fn status(&self) -> LiveStatus {
        self.status
    }

    pub fn submission(&self) -> &Submission {
        &self.submission
    }

    pub fn watch_queue(&self) -> Option<&str> {
        self.watch_queue.as_deref()
    }

    pub fn result_keys(&self) -> &KeyBuffer {
        &self.results
    }

    pub fn error_keys(&self) -> &KeyBuffer {
        &self.errors
    }

    pub fn processed(&self) -> &ProcessedKeySet {
        &self.processed
    }

    pub fn load_trigger(&self) -> u64 {
        self.reconciler.load_trigger()
    }

    pub fn aggregator(&self) -> &SummaryAggregator {
        &self.aggregator
    }

    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    pub fn live_errors(&self) -> &LiveErrors {
        &self.live_errors
    }
}
