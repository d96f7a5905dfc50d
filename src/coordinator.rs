//! Initialization coordinator for the lessons tile decoration.
//!
//! Everything runs on one thread inside a [`tokio::task::LocalSet`]. The only
//! suspension points are the settings load, the summary fetch, the deferred
//! start delay and the pause between checks. Any event can arrive during one
//! of those, so every read of [`CoordinatorState`] and the write that depends
//! on it happen inside a single borrow, and the render target is looked up
//! again after every suspension instead of being held across it.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::debug_log::DebugLog;
use crate::dom::{element_children, Page};
use crate::events::{
    EventError, EventKind, LifecycleEvent, LifecycleSource, SubscribeOptions,
};
use crate::menu::{MenuRegistry, ScriptLink, SettingsDialog};
use crate::render::{
    ensure_stylesheet, DisplayMode, RenderError, RenderMutator, TileValues, COUNT_BUBBLE_SELECTOR,
    COUNT_TEXT_SELECTOR,
};
use crate::settings::{Settings, SettingsError, SettingsStore};
use crate::source::{DataSource, SourceError};
use crate::state::{CoordinatorState, Directive, ReadinessStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    Mutated,
    AlreadySettled,
    TargetAbsentRetrying,
    TargetAbsentExhausted,
    AwaitingSettings,
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("data fetch failed: {0}")]
    DataFetch(#[from] SourceError),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("event rejected: {0}")]
    Event(#[from] EventError),
}

/// External collaborators the coordinator drives.
pub struct Collaborators {
    pub source: Rc<dyn DataSource>,
    pub store: Rc<dyn SettingsStore>,
    pub menu: Rc<dyn MenuRegistry>,
    pub dialog: Option<Rc<dyn SettingsDialog>>,
}

struct Core {
    state: CoordinatorState,
    log: DebugLog,
    settings: Option<Settings>,
    menu_inserted: bool,
    mutations: usize,
}

impl Core {
    fn debugging(&self) -> bool {
        self.settings
            .as_ref()
            .map(|settings| settings.enable_debugging)
            .unwrap_or(false)
    }

    fn flush_if_debugging(&mut self) {
        if self.debugging() {
            self.log.flush(false);
        }
    }
}

struct Shared {
    config: CoordinatorConfig,
    page: Page,
    collaborators: Collaborators,
    mutator: RenderMutator,
    core: RefCell<Core>,
}

/// Decides for each lifecycle event whether to start, resume or ignore a run,
/// and applies the tile decoration at most once per settle window.
///
/// Cloning is cheap and every clone drives the same state. The
/// fire-and-forget entry points spawn onto the current `LocalSet`.
#[derive(Clone)]
pub struct InitializationCoordinator {
    shared: Rc<Shared>,
}

impl InitializationCoordinator {
    pub fn new(config: CoordinatorConfig, page: Page, collaborators: Collaborators) -> Self {
        let core = Core {
            state: CoordinatorState::new(config.max_retries),
            log: DebugLog::new(config.script_name.clone(), config.debug_log_capacity),
            settings: None,
            menu_inserted: false,
            mutations: 0,
        };
        Self {
            shared: Rc::new(Shared {
                config,
                page,
                collaborators,
                mutator: RenderMutator,
                core: RefCell::new(core),
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.shared.config
    }

    pub fn page(&self) -> &Page {
        &self.shared.page
    }

    /// Snapshot of the current state flags.
    pub fn state(&self) -> CoordinatorState {
        self.shared.core.borrow().state.clone()
    }

    pub fn settings(&self) -> Option<Settings> {
        self.shared.core.borrow().settings.clone()
    }

    /// Number of times the tile decoration has been applied.
    pub fn mutation_count(&self) -> usize {
        self.shared.core.borrow().mutations
    }

    /// Emit the debug log regardless of whether it was already emitted in
    /// this window.
    pub fn flush_debug_log(&self) -> Option<String> {
        self.shared.core.borrow_mut().log.flush(true)
    }

    fn record(&self, message: impl Into<String>) {
        self.shared.core.borrow_mut().log.record(message);
    }

    /// Subscribe to the page-level lifecycle events on the configured pages.
    pub fn register(&self, source: &dyn LifecycleSource) {
        for kind in [
            EventKind::NavigateLoad,
            EventKind::BeforeFrameRender,
            EventKind::FrameLoad,
        ] {
            let coordinator = self.clone();
            source.subscribe(
                kind,
                SubscribeOptions {
                    urls: self.shared.config.locations.clone(),
                    passive: true,
                },
                Rc::new(move |event| coordinator.on_lifecycle_event(event)),
            );
        }
        self.record("All lifecycle callbacks have been registered");
    }

    /// Fire-and-forget handling of one event. Failures are logged.
    pub fn on_lifecycle_event(&self, event: LifecycleEvent) {
        let coordinator = self.clone();
        let task: Pin<Box<dyn Future<Output = ()>>> = Box::pin(async move {
            let kind = event.kind;
            if let Err(err) = coordinator.handle_event(event).await {
                warn!(target = "coordinator", %kind, error = %err, "lifecycle event handling failed");
            }
        });
        tokio::task::spawn_local(task);
    }

    /// Parse and dispatch an event delivered by name. Unrecognised kinds are
    /// logged and rejected.
    pub fn on_raw_event(&self, kind: &str, frame_id: Option<&str>) -> Result<(), CoordinatorError> {
        match LifecycleEvent::parse(kind, frame_id) {
            Ok(event) => {
                self.on_lifecycle_event(event);
                Ok(())
            }
            Err(err) => {
                self.record(format!("Rejected lifecycle event: {err}"));
                warn!(target = "coordinator", error = %err, "rejected lifecycle event");
                Err(err.into())
            }
        }
    }

    /// Handle one event to completion. Returns the result of the run it
    /// triggered, if any.
    pub async fn handle_event(
        &self,
        event: LifecycleEvent,
    ) -> Result<Option<RunResult>, CoordinatorError> {
        let source = describe(&event);
        let directive = {
            let mut core = self.shared.core.borrow_mut();
            core.log.record(format!("{source} has fired"));
            let directive = core.state.apply(&event, &self.shared.config);
            if directive == Directive::Start {
                core.log.rearm();
            }
            directive
        };
        debug!(target = "coordinator", %source, ?directive, "lifecycle event");

        let outcome = match directive {
            Directive::Start => {
                self.record(format!("SOURCE = \"{source}\" | Starting a new settle window"));
                self.start(&source).await.map(Some)
            }
            Directive::Resume => self.run(&source).await.map(Some),
            Directive::Invalidated(frame) => {
                self.record(format!("{frame} is about to re-render, marked not ready"));
                Ok(None)
            }
            Directive::Ignore(reason) => {
                self.record(format!("SOURCE = \"{source}\" | Ignored ({reason:?})"));
                Ok(None)
            }
        };

        self.shared
            .core
            .borrow_mut()
            .state
            .finish_delivery(event.kind);
        outcome
    }

    /// Record saved settings from the dialog, persist them and re-render.
    pub async fn settings_saved(
        &self,
        settings: Settings,
    ) -> Result<Option<RunResult>, CoordinatorError> {
        {
            let mut core = self.shared.core.borrow_mut();
            core.settings = Some(settings.clone());
            core.log.rearm();
            core.log
                .record("Save button was clicked on settings, running with new settings...");
        }

        let key = &self.shared.config.script_id;
        if let Err(err) = self.shared.collaborators.store.save(key, &settings).await {
            warn!(target = "coordinator", error = %err, "failed to persist settings");
            self.record(format!("Persisting settings failed: {err}"));
        }

        self.handle_event(LifecycleEvent::settings_saved()).await
    }

    /// Fire-and-forget form of [`Self::settings_saved`].
    pub fn on_settings_saved(&self, settings: Settings) {
        let coordinator = self.clone();
        let task: Pin<Box<dyn Future<Output = ()>>> = Box::pin(async move {
            if let Err(err) = coordinator.settings_saved(settings).await {
                warn!(target = "coordinator", error = %err, "settings re-render failed");
            }
        });
        tokio::task::spawn_local(task);
    }

    async fn start(&self, source: &str) -> Result<RunResult, CoordinatorError> {
        self.record("Starting...");
        if let Err(err) = self.ensure_settings().await {
            warn!(target = "coordinator", error = %err, "settings unavailable, deferring start");
            self.schedule_deferred_start();
            return Ok(RunResult::AwaitingSettings);
        }
        self.bootstrap();
        self.run(source).await
    }

    async fn ensure_settings(&self) -> Result<(), CoordinatorError> {
        if self.shared.core.borrow().settings.is_some() {
            return Ok(());
        }

        self.record("Loading settings...");
        let defaults = Settings::default();
        let loaded = self
            .shared
            .collaborators
            .store
            .load(&self.shared.config.script_id, &defaults)
            .await;

        let mut core = self.shared.core.borrow_mut();
        match loaded {
            Ok(settings) => {
                // A save may have landed while the load was suspended.
                if core.settings.is_none() {
                    core.settings = Some(settings);
                }
                Ok(())
            }
            Err(err) => {
                core.log.record(format!("Loading settings failed: {err}"));
                Err(err.into())
            }
        }
    }

    fn bootstrap(&self) {
        let insert_menu = {
            let mut core = self.shared.core.borrow_mut();
            let insert = !core.menu_inserted;
            core.menu_inserted = true;
            insert
        };
        if insert_menu {
            self.record("Inserting menu...");
            self.shared
                .collaborators
                .menu
                .insert_script_link(self.script_link());
        }

        match ensure_stylesheet(&self.shared.page) {
            Ok(true) => self.record("Inserted stylesheet"),
            Ok(false) => {}
            Err(err) => {
                warn!(target = "coordinator", error = %err, "failed to insert stylesheet");
                self.record(format!("Inserting stylesheet failed: {err}"));
            }
        }
    }

    fn script_link(&self) -> ScriptLink {
        let weak: Weak<Shared> = Rc::downgrade(&self.shared);
        ScriptLink {
            name: self.shared.config.script_id.clone(),
            submenu: "Settings".to_string(),
            title: self.shared.config.script_name.clone(),
            on_click: Rc::new(move || {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                let Some(dialog) = shared.collaborators.dialog.as_ref() else {
                    debug!(target = "coordinator", "no settings dialog configured");
                    return;
                };
                let current = shared
                    .core
                    .borrow()
                    .settings
                    .clone()
                    .unwrap_or_default();
                dialog.open(
                    &shared.config.script_id,
                    &shared.config.script_name,
                    &current,
                );
            }),
        }
    }

    fn schedule_deferred_start(&self) {
        let coordinator = self.clone();
        let delay = self.shared.config.settings_retry_delay;
        let task: Pin<Box<dyn Future<Output = ()>>> = Box::pin(async move {
            sleep(delay).await;
            // A start that still finds no settings schedules the next one.
            match coordinator.start("deferred start").await {
                Ok(result) => {
                    debug!(target = "coordinator", ?result, "deferred start finished");
                }
                Err(err) => {
                    warn!(target = "coordinator", error = %err, "deferred start failed");
                }
            }
        });
        tokio::task::spawn_local(task);
    }

    /// The run step. Safe to enter while another invocation is suspended.
    pub async fn run(&self, source: &str) -> Result<RunResult, CoordinatorError> {
        let schedule_start = {
            let mut core = self.shared.core.borrow_mut();
            core.log
                .record(format!("Run step is executing... source = [{source}]"));
            if core.settings.is_some() {
                None
            } else if core.state.starting {
                core.log
                    .record("No settings yet; a start is already in flight, not deferring");
                Some(false)
            } else {
                core.log.record("No settings yet, deferring a start");
                Some(true)
            }
        };
        if let Some(schedule) = schedule_start {
            if schedule {
                self.schedule_deferred_start();
            }
            return Ok(RunResult::AwaitingSettings);
        }

        self.record("Retrieving summary data...");
        let summary = match self.shared.collaborators.source.fetch_summary().await {
            Ok(summary) => summary,
            Err(err) => {
                let mut core = self.shared.core.borrow_mut();
                core.log.record(format!("Summary retrieval failed: {err}"));
                core.flush_if_debugging();
                return Err(err.into());
            }
        };

        self.record("Summary data has been retrieved");

        // Every pass re-reads the state: another run may have decorated the
        // tile while this one was fetching or pausing between checks.
        let total = summary.total_lessons();
        loop {
            if let Some(result) = self.readiness_step(total)? {
                return Ok(result);
            }
            self.pause_between_checks().await;
        }
    }

    /// One pass of the readiness loop, done entirely inside one borrow.
    /// `None` means a check was made and the loop should go round again.
    fn readiness_step(&self, total: usize) -> Result<Option<RunResult>, CoordinatorError> {
        let target_frame = &self.shared.config.target_frame;
        let mut core = self.shared.core.borrow_mut();

        match core.state.next_readiness_step(target_frame) {
            ReadinessStep::Settled => {
                core.log
                    .record("Run already completed for this window, preventing repeat execution");
                core.flush_if_debugging();
                Ok(Some(RunResult::AlreadySettled))
            }
            ReadinessStep::Check => {
                core.log
                    .record("Events have settled but frames are unverified, checking the page...");
                let found = self
                    .shared
                    .page
                    .query(COUNT_TEXT_SELECTOR)
                    .map(|count_text| !element_children(&count_text).is_empty())
                    .unwrap_or(false);
                if found {
                    core.state.mark_frame_ready(target_frame);
                }
                let remaining = core.state.retry_budget().remaining();
                core.log.record(format!(
                    "Page check completed (found = {found}), {remaining} retries left"
                ));
                Ok(None)
            }
            ReadinessStep::Exhausted => {
                core.log.record(
                    "Unable to verify the frame on the page; giving up until the next event series",
                );
                core.flush_if_debugging();
                info!(target = "coordinator", "render target never appeared, retries exhausted");
                Ok(Some(RunResult::TargetAbsentExhausted))
            }
            ReadinessStep::Waiting => {
                let busy = core.state.event_stream_busy;
                core.log
                    .record(format!("Frame not ready (stream busy = {busy}), waiting for events"));
                Ok(Some(RunResult::TargetAbsentRetrying))
            }
            ReadinessStep::Resolve => {
                let Some(target) = self.shared.page.query_visible(COUNT_BUBBLE_SELECTOR) else {
                    core.log.record("Count container is absent");
                    return Ok(Some(RunResult::TargetAbsentRetrying));
                };

                core.state.capture_todays_count(&target.text_contents());
                core.state.record_success();
                let values = TileValues {
                    today: core.state.todays_count.unwrap_or(0),
                    total,
                };
                let settings = core.settings.clone().unwrap_or_default();

                let patch = match self
                    .shared
                    .mutator
                    .apply(&target, &values, DisplayMode::from(&settings))
                {
                    Ok(patch) => patch,
                    Err(err) => {
                        core.log.record(format!("Decorating the tile failed: {err}"));
                        core.flush_if_debugging();
                        return Err(err.into());
                    }
                };
                core.mutations += 1;
                core.log.record(format!(
                    "Decorated the tile ({} operations), today = {}, total = {}",
                    patch.len(),
                    values.today,
                    values.total
                ));
                core.flush_if_debugging();
                info!(
                    target = "coordinator",
                    today = values.today,
                    total = values.total,
                    "lessons tile decorated"
                );
                Ok(Some(RunResult::Mutated))
            }
        }
    }

    async fn pause_between_checks(&self) {
        let delay = self.shared.config.check_delay;
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            sleep(delay).await;
        }
    }
}

fn describe(event: &LifecycleEvent) -> String {
    match &event.frame_id {
        Some(frame) => format!("{} for \"{frame}\"", event.kind),
        None => event.kind.to_string(),
    }
}
