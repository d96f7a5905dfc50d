use std::collections::HashMap;

use crate::config::CoordinatorConfig;
use crate::events::{EventKind, FrameId, LifecycleEvent};
use crate::retry::RetryBudget;

/// What the coordinator should do in response to one lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// A settle window opened: bootstrap, then run.
    Start,
    /// Invoke the run step directly.
    Resume,
    /// A frame is about to be replaced; its readiness was revoked.
    Invalidated(FrameId),
    Ignore(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A run is already pursuing the same goal.
    AlreadyStarting,
    UntrackedFrame,
    MissingFrame,
}

/// One iteration of the readiness loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessStep {
    /// Another run decorated the tile while this one was suspended.
    Settled,
    /// The target frame is marked loaded; look the target up.
    Resolve,
    /// Events have settled without the frame being confirmed; one check was
    /// paid for out of the retry budget.
    Check,
    /// The budget ran out. It has been reset and the window closed.
    Exhausted,
    /// More events are still arriving, or no window is open.
    Waiting,
}

/// Flags and counters shared by every event handler and the run loop. All
/// transitions are plain methods so they can be exercised without a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorState {
    pub initial_load: bool,
    pub starting: bool,
    pub event_stream_busy: bool,
    pub settled: bool,
    pub todays_count: Option<u32>,
    retry_budget: RetryBudget,
    frame_ready: HashMap<FrameId, bool>,
}

impl CoordinatorState {
    pub fn new(max_retries: u32) -> Self {
        Self {
            initial_load: true,
            starting: false,
            event_stream_busy: false,
            settled: false,
            todays_count: None,
            retry_budget: RetryBudget::new(max_retries),
            frame_ready: HashMap::new(),
        }
    }

    pub fn retry_budget(&self) -> RetryBudget {
        self.retry_budget
    }

    pub fn is_frame_ready(&self, frame: &FrameId) -> bool {
        self.frame_ready.get(frame).copied().unwrap_or(false)
    }

    pub fn mark_frame_ready(&mut self, frame: &FrameId) {
        self.frame_ready.insert(frame.clone(), true);
    }

    fn open_window(&mut self, target_frame: &FrameId) {
        self.initial_load = true;
        self.starting = true;
        self.settled = false;
        self.frame_ready.insert(target_frame.clone(), false);
    }

    pub fn apply(&mut self, event: &LifecycleEvent, config: &CoordinatorConfig) -> Directive {
        match event.kind {
            EventKind::NavigateLoad => {
                self.event_stream_busy = true;
                if self.starting {
                    return Directive::Ignore(IgnoreReason::AlreadyStarting);
                }
                self.open_window(&config.target_frame);
                Directive::Start
            }
            EventKind::BeforeFrameRender => {
                self.event_stream_busy = true;
                if self.initial_load && !self.starting {
                    self.open_window(&config.target_frame);
                    return Directive::Start;
                }
                match &event.frame_id {
                    None => Directive::Ignore(IgnoreReason::MissingFrame),
                    Some(frame) if config.is_tracked(frame) => {
                        self.frame_ready.insert(frame.clone(), false);
                        Directive::Invalidated(frame.clone())
                    }
                    Some(_) => Directive::Ignore(IgnoreReason::UntrackedFrame),
                }
            }
            EventKind::FrameLoad => match &event.frame_id {
                None => Directive::Ignore(IgnoreReason::MissingFrame),
                Some(frame) if config.is_tracked(frame) => {
                    self.mark_frame_ready(frame);
                    if self.starting {
                        Directive::Resume
                    } else {
                        // Frame content can land before the page-level event.
                        self.starting = true;
                        self.settled = false;
                        Directive::Start
                    }
                }
                Some(_) => Directive::Ignore(IgnoreReason::UntrackedFrame),
            },
            EventKind::SettingsSaved => {
                self.settled = false;
                Directive::Resume
            }
        }
    }

    /// Called once the handling of `kind` has finished, including any run it
    /// triggered.
    pub fn finish_delivery(&mut self, kind: EventKind) {
        if matches!(kind, EventKind::NavigateLoad | EventKind::FrameLoad) {
            self.event_stream_busy = false;
        }
    }

    /// A previous run of this window already decorated the target and nothing
    /// has reopened it since.
    pub fn is_settled_idle(&self) -> bool {
        !self.starting && self.settled
    }

    pub fn next_readiness_step(&mut self, target_frame: &FrameId) -> ReadinessStep {
        if self.is_settled_idle() {
            return ReadinessStep::Settled;
        }
        if self.is_frame_ready(target_frame) {
            return ReadinessStep::Resolve;
        }
        if self.starting && !self.event_stream_busy && self.retry_budget.try_consume() {
            return ReadinessStep::Check;
        }
        if self.retry_budget.is_exhausted() {
            self.retry_budget.reset();
            self.starting = false;
            return ReadinessStep::Exhausted;
        }
        ReadinessStep::Waiting
    }

    /// The target was read for the first time in this window. Only the
    /// leading digits count, so "42+" reads as 42.
    pub fn capture_todays_count(&mut self, raw: &str) {
        if self.initial_load {
            let digits: String = raw
                .trim_start()
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            self.todays_count = digits.parse().ok();
            self.initial_load = false;
        }
    }

    pub fn record_success(&mut self) {
        self.starting = false;
        self.settled = true;
        self.retry_budget.reset();
    }
}

impl Default for CoordinatorState {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_RETRIES)
    }
}
