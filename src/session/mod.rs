//! Watch controller for one submission
//!
//! Drives the live pipeline from the first submission fetch until the
//! submission completes or the caller shuts the watch down. Channel events,
//! poll ticks, deferred timers and shutdown are multiplexed in a single task,
//! and every HTTP request is awaited in that task, so at most one batched
//! fetch is ever in flight.

pub mod events;
pub mod state;

pub use events::{EventBus, WatchEvent};
pub use state::{ErrorRecord, LiveErrors, LiveState};

use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::api::{ApiError, SubmissionApi};
use crate::config::{LiveSettings, WatchConfiguration};
use crate::constants::WATCH_EVENT_CAPACITY;
use crate::live::{Backoff, LiveChannel, LiveConnector, LiveEvent};
use crate::logging::WatchLogger;
use crate::models::{classify_outstanding, LiveStatus, Submission};
use crate::pipeline::TickPlan;
use crate::summary::{Summary, TagMap};
use crate::tree::{FileTree, TreeNodeWire};

/// Where the data of a [`WatchReport`] comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSource {
    /// Fetched from the server after completion
    Authoritative,
    /// Accumulated from live results before the watch was interrupted
    Live,
}

/// Final view of a watched submission
#[derive(Debug, Clone, Serialize)]
pub struct WatchReport {
    pub submission: Submission,
    pub status: LiveStatus,
    pub source: ReportSource,
    pub summary: Summary,
    pub tag_map: TagMap,
    pub tree: BTreeMap<String, TreeNodeWire>,
    pub errors: Vec<ErrorRecord>,
}

/// Timers the controller arms and later reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    FetchTrigger,
    StopCheck,
    Reregister,
    Reconnect,
}

/// Outcome of handling one input
enum Step {
    Continue,
    Complete(Submission),
}

/// Background resources of an open live pipeline
struct Pipeline {
    channel: Option<LiveChannel>,
    ticker: Option<Interval>,
    deferred: JoinSet<Deferred>,
    backoff: Backoff,
    reregister_pending: bool,
    reconnect_pending: bool,
}

impl Pipeline {
    fn new(settings: &LiveSettings) -> Self {
        Self {
            channel: None,
            ticker: Some(poll_interval(settings.poll_interval())),
            deferred: JoinSet::new(),
            backoff: Backoff::new(settings.reconnect_min(), settings.reconnect_max()),
            reregister_pending: false,
            reconnect_pending: false,
        }
    }

    fn schedule(&mut self, delay: Duration, what: Deferred) {
        self.deferred.spawn(async move {
            tokio::time::sleep(delay).await;
            what
        });
    }

    /// Release the channel and every timer
    async fn shutdown(&mut self) {
        self.ticker = None;
        self.deferred.abort_all();
        if let Some(channel) = self.channel.take() {
            channel.close().await;
        }
    }
}

/// Polling timer whose first tick fires one full period from now
fn poll_interval(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn next_live_event(channel: &mut Option<LiveChannel>) -> Option<LiveEvent> {
    match channel {
        Some(channel) => channel.next_event().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Follows submissions through the live pipeline
pub struct SubmissionWatcher {
    api: Arc<dyn SubmissionApi>,
    connector: Arc<dyn LiveConnector>,
    settings: LiveSettings,
    logger: WatchLogger,
    bus: EventBus,
    state: LiveState,
}

impl SubmissionWatcher {
    pub fn new(
        api: Arc<dyn SubmissionApi>,
        connector: Arc<dyn LiveConnector>,
        config: &WatchConfiguration,
    ) -> Self {
        Self {
            api,
            connector,
            settings: config.live.clone(),
            logger: WatchLogger::new(config.logging.level),
            bus: EventBus::new(WATCH_EVENT_CAPACITY),
            state: LiveState::new(config.summary.clone(), config.live.stall_ticks),
        }
    }

    /// Receive controller notifications
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.bus.subscribe()
    }

    pub fn state(&self) -> &LiveState {
        &self.state
    }

    /// Watch `sid` until it completes or `shutdown` resolves.
    ///
    /// Every call starts from a fully reset pipeline. Only the initial
    /// submission fetch and the authoritative summary/tree fetches fail the
    /// watch; background errors are logged and retried by later ticks.
    pub async fn watch<F>(&mut self, sid: &str, shutdown: F) -> Result<WatchReport, ApiError>
    where
        F: Future<Output = ()>,
    {
        self.state.reset();

        let submission = self.api.get_submission(sid).await?;
        self.state.submission = submission.clone();

        if submission.is_completed() {
            self.logger.log_watch_started(sid, false);
            return self.complete(sid, submission).await;
        }

        self.logger.log_watch_started(sid, true);
        self.set_status(sid, LiveStatus::Processing);

        let mut pipeline = Pipeline::new(&self.settings);
        match self.connector.connect(sid).await {
            Ok(channel) => {
                pipeline.channel = Some(channel);
                self.register(sid, &mut pipeline).await;
            }
            Err(e) => {
                self.report_channel_error(sid, &e.to_string());
                self.schedule_reconnect(&mut pipeline);
            }
        }

        tokio::pin!(shutdown);
        let completed = loop {
            let step = tokio::select! {
                _ = &mut shutdown => break None,
                event = next_live_event(&mut pipeline.channel) => match event {
                    Some(event) => self.on_live_event(sid, event, &mut pipeline),
                    None => {
                        pipeline.channel = None;
                        self.report_channel_error(sid, "live channel closed");
                        self.schedule_reconnect(&mut pipeline);
                        Step::Continue
                    }
                },
                _ = next_tick(&mut pipeline.ticker) => self.on_tick(sid, &mut pipeline).await,
                Some(fired) = pipeline.deferred.join_next(), if !pipeline.deferred.is_empty() => match fired {
                    Ok(what) => self.on_deferred(sid, what, &mut pipeline).await,
                    Err(e) => {
                        log::debug!("Deferred timer did not finish: {}", e);
                        Step::Continue
                    }
                },
            };

            if let Step::Complete(submission) = step {
                break Some(submission);
            }
        };

        pipeline.shutdown().await;
        match completed {
            Some(submission) => self.complete(sid, submission).await,
            None => Ok(self.live_report()),
        }
    }

    fn on_live_event(&mut self, sid: &str, event: LiveEvent, pipeline: &mut Pipeline) -> Step {
        // Only a channel that delivers traffic counts as healthy
        if !matches!(event, LiveEvent::Error(_)) {
            pipeline.backoff.reset();
        }

        match event {
            LiveEvent::Start(msg) => {
                log::debug!("start: {}", msg);
                pipeline.schedule(self.settings.start_delay(), Deferred::FetchTrigger);
            }
            LiveEvent::Stop(msg) => {
                log::debug!("stop: {}", msg);
                pipeline.schedule(self.settings.stop_delay(), Deferred::StopCheck);
            }
            LiveEvent::CacheKey(key) => self.state.results.apply(key.as_ref().map(std::slice::from_ref)),
            LiveEvent::CacheKeyErr(key) => self.state.errors.apply(key.as_ref().map(std::slice::from_ref)),
            LiveEvent::Error(msg) => {
                self.report_channel_error(sid, &msg);
                if !pipeline.reregister_pending {
                    pipeline.reregister_pending = true;
                    let delay = pipeline.backoff.next_delay();
                    pipeline.schedule(delay, Deferred::Reregister);
                }
            }
        }
        Step::Continue
    }

    async fn on_deferred(&mut self, sid: &str, what: Deferred, pipeline: &mut Pipeline) -> Step {
        match what {
            Deferred::FetchTrigger => self.on_tick(sid, pipeline).await,
            Deferred::StopCheck => {
                pipeline.ticker = None;
                match self.api.get_submission(sid).await {
                    Ok(submission) if submission.is_completed() => return Step::Complete(submission),
                    Ok(submission) => self.state.submission = submission,
                    Err(e) => self.logger.log_error(&e.to_string(), Some("submission refresh")),
                }
                // Partial stop: keep polling
                pipeline.ticker = Some(poll_interval(self.settings.poll_interval()));
                Step::Continue
            }
            Deferred::Reregister => {
                pipeline.reregister_pending = false;
                if pipeline.channel.is_some() {
                    self.register(sid, pipeline).await;
                }
                Step::Continue
            }
            Deferred::Reconnect => {
                pipeline.reconnect_pending = false;
                match self.connector.connect(sid).await {
                    Ok(channel) => {
                        pipeline.channel = Some(channel);
                        self.register(sid, pipeline).await;
                    }
                    Err(e) => {
                        self.report_channel_error(sid, &e.to_string());
                        self.schedule_reconnect(pipeline);
                    }
                }
                Step::Continue
            }
        }
    }

    async fn on_tick(&mut self, sid: &str, pipeline: &mut Pipeline) -> Step {
        let state = &mut self.state;
        let plan = state.reconciler.tick(&state.results, &state.errors, &state.processed);

        match plan {
            TickPlan::Idle => Step::Continue,
            TickPlan::Fetch(request) => {
                let response = match self.api.multiple_keys(&request).await {
                    Ok(response) => response,
                    Err(e) => {
                        // Keys stay unprocessed and are fetched again next tick
                        self.logger.log_error(&e.to_string(), Some("multiple_keys"));
                        return Step::Continue;
                    }
                };

                let state = &mut self.state;
                state.processed.extend(request.keys());
                state.reconciler.record_success();
                state.aggregator.merge_results(&response.result);
                state.tree.merge_results(&response.result, &state.submission);
                state.live_errors.record(&response.error);

                self.logger.log_results_merged(
                    sid,
                    response.result.len(),
                    response.error.len(),
                    self.state.load_trigger(),
                );
                self.bus.publish(WatchEvent::ResultsMerged {
                    results: response.result.len(),
                    errors: response.error.len(),
                });
                Step::Continue
            }
            TickPlan::CheckOutstanding => {
                let outstanding = match self.api.outstanding_services(sid).await {
                    Ok(outstanding) => outstanding,
                    Err(e) => {
                        self.logger.log_error(&e.to_string(), Some("outstanding_services"));
                        return Step::Continue;
                    }
                };
                self.logger.log_outstanding(sid, &outstanding);
                self.bus.publish(WatchEvent::OutstandingServices {
                    services: outstanding.clone(),
                });

                let before = self.state.status;
                let after = classify_outstanding(&outstanding);
                self.set_status(sid, after);

                if after == LiveStatus::Processing {
                    if before != LiveStatus::Processing {
                        self.register(sid, pipeline).await;
                    }
                    return Step::Continue;
                }

                // Completion may have happened between ticks
                match self.api.get_submission(sid).await {
                    Ok(submission) if submission.is_completed() => Step::Complete(submission),
                    Ok(submission) => {
                        self.state.submission = submission;
                        Step::Continue
                    }
                    Err(e) => {
                        self.logger.log_error(&e.to_string(), Some("submission refresh"));
                        Step::Continue
                    }
                }
            }
        }
    }

    /// Allocate a watch queue and subscribe the channel to it
    async fn register(&mut self, sid: &str, pipeline: &mut Pipeline) {
        let queue = match self.api.setup_watch_queue(sid).await {
            Ok(queue) => queue,
            Err(e) => {
                self.logger.log_error(&e.to_string(), Some("setup_watch_queue"));
                self.set_status(sid, LiveStatus::Queued);
                return;
            }
        };

        self.logger.log_watch_queue(sid, &queue.wq_id);
        if let Some(channel) = &pipeline.channel {
            if let Err(e) = channel.listen(&queue.wq_id).await {
                self.report_channel_error(sid, &e.to_string());
            }
        }
        self.state.watch_queue = Some(queue.wq_id);
    }

    fn schedule_reconnect(&mut self, pipeline: &mut Pipeline) {
        if pipeline.reconnect_pending {
            return;
        }
        pipeline.reconnect_pending = true;
        self.state.watch_queue = None;
        let delay = pipeline.backoff.next_delay();
        pipeline.schedule(delay, Deferred::Reconnect);
    }

    fn report_channel_error(&self, sid: &str, message: &str) {
        self.logger.log_channel_error(sid, message);
        self.bus.publish(WatchEvent::ChannelError {
            message: message.to_string(),
        });
    }

    fn set_status(&mut self, sid: &str, status: LiveStatus) {
        let from = self.state.status;
        if from == status {
            return;
        }
        self.state.status = status;
        self.logger.log_status_change(sid, from, status);
        self.bus.publish(WatchEvent::StatusChanged { from, to: status });
    }

    /// Adopt the server's view; live aggregates are discarded, not merged
    async fn complete(&mut self, sid: &str, submission: Submission) -> Result<WatchReport, ApiError> {
        let summary = self.api.get_summary(sid).await?;
        let tree = self.api.get_tree(sid).await?;

        self.state.aggregator.reset();
        self.state.tree = FileTree::from_wire(&tree.tree);
        self.state.live_errors.adopt_keys(&submission.errors);
        self.state.watch_queue = None;
        self.state.submission = submission;
        self.set_status(sid, LiveStatus::Completed);

        self.logger.log_completed(sid, self.state.load_trigger());
        self.bus.publish(WatchEvent::Completed { sid: sid.to_string() });

        Ok(WatchReport {
            submission: self.state.submission.clone(),
            status: self.state.status,
            source: ReportSource::Authoritative,
            summary: summary.summary,
            tag_map: summary.map,
            tree: tree.tree,
            errors: self.state.live_errors.records().to_vec(),
        })
    }

    fn live_report(&self) -> WatchReport {
        WatchReport {
            submission: self.state.submission.clone(),
            status: self.state.status,
            source: ReportSource::Live,
            summary: self.state.aggregator.summary().clone(),
            tag_map: self.state.aggregator.tag_map().clone(),
            tree: self.state.tree.to_wire(),
            errors: self.state.live_errors.records().to_vec(),
        }
    }
}
