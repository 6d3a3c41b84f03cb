//! Polling reconciler
//!
//! Decides, on every tick of the polling timer, whether buffered keys must be
//! fetched or whether the submission should be checked for stalls.

use crate::models::MultipleKeysRequest;
use crate::pipeline::buffer::{KeyBuffer, ProcessedKeySet};

/// Action the controller must take for one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickPlan {
    /// Fetch exactly these keys in one batch
    Fetch(MultipleKeysRequest),
    /// Ask the server which services are still outstanding
    CheckOutstanding,
    /// Nothing to do this tick
    Idle,
}

/// Load-trigger bookkeeping of the polling loop
#[derive(Debug, Clone)]
pub struct Reconciler {
    load_trigger: u64,
    last_success: u64,
    stall_ticks: u64,
}

impl Reconciler {
    /// `stall_ticks` is both the number of empty ticks before the first
    /// outstanding-services check and the cadence of later checks.
    pub fn new(stall_ticks: u64) -> Self {
        Self {
            load_trigger: 0,
            last_success: 0,
            stall_ticks: stall_ticks.max(1),
        }
    }

    pub fn load_trigger(&self) -> u64 {
        self.load_trigger
    }

    pub fn last_success(&self) -> u64 {
        self.last_success
    }

    /// Advance the counter and plan the tick
    pub fn tick(
        &mut self,
        results: &KeyBuffer,
        errors: &KeyBuffer,
        processed: &ProcessedKeySet,
    ) -> TickPlan {
        self.load_trigger += 1;

        let request = MultipleKeysRequest {
            result: results.unprocessed(processed),
            error: errors.unprocessed(processed),
        };
        if !request.is_empty() {
            return TickPlan::Fetch(request);
        }

        if self.is_stalled() {
            TickPlan::CheckOutstanding
        } else {
            TickPlan::Idle
        }
    }

    fn is_stalled(&self) -> bool {
        self.load_trigger - self.last_success >= self.stall_ticks
            && self.load_trigger % self.stall_ticks == 0
    }

    /// Record that the fetch planned by the current tick succeeded
    pub fn record_success(&mut self) {
        self.last_success = self.load_trigger;
    }

    pub fn reset(&mut self) {
        self.load_trigger = 0;
        self.last_success = 0;
    }
}
