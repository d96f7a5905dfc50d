use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

/// Identifier of an independently rendered page region.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameId(String);

impl FrameId {
    pub const TODAYS_LESSONS: &'static str = "todays-lessons-frame";
    pub const LESSON_AND_REVIEW_COUNT: &'static str = "lesson-and-review-count-frame";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn todays_lessons() -> Self {
        Self::new(Self::TODAYS_LESSONS)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NavigateLoad,
    BeforeFrameRender,
    FrameLoad,
    SettingsSaved,
}

impl EventKind {
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::NavigateLoad => "turbo:load",
            Self::BeforeFrameRender => "turbo:before-frame-render",
            Self::FrameLoad => "turbo:frame-load",
            Self::SettingsSaved => "settings:saved",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("unrecognised lifecycle event kind: {0}")]
    UnknownKind(String),
    #[error("{0} requires a frame id")]
    MissingFrame(EventKind),
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "turbo:load" => Ok(Self::NavigateLoad),
            "turbo:before-frame-render" => Ok(Self::BeforeFrameRender),
            "turbo:frame-load" => Ok(Self::FrameLoad),
            "settings:saved" => Ok(Self::SettingsSaved),
            other => Err(EventError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    pub frame_id: Option<FrameId>,
    pub timestamp: DateTime<Utc>,
    pub url: Option<Url>,
}

impl LifecycleEvent {
    pub fn new(kind: EventKind, frame_id: Option<FrameId>) -> Self {
        Self {
            kind,
            frame_id,
            timestamp: Utc::now(),
            url: None,
        }
    }

    pub fn navigate_load() -> Self {
        Self::new(EventKind::NavigateLoad, None)
    }

    pub fn before_frame_render(frame: impl Into<String>) -> Self {
        Self::new(EventKind::BeforeFrameRender, Some(FrameId::new(frame)))
    }

    pub fn frame_load(frame: impl Into<String>) -> Self {
        Self::new(EventKind::FrameLoad, Some(FrameId::new(frame)))
    }

    pub fn settings_saved() -> Self {
        Self::new(EventKind::SettingsSaved, None)
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Build an event from the names an external bus delivers. Frame events
    /// without a frame id are rejected rather than guessed at.
    pub fn parse(kind: &str, frame_id: Option<&str>) -> Result<Self, EventError> {
        let kind = kind.parse::<EventKind>()?;
        let frame_id = frame_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(FrameId::new);
        if matches!(kind, EventKind::BeforeFrameRender | EventKind::FrameLoad) && frame_id.is_none()
        {
            return Err(EventError::MissingFrame(kind));
        }
        Ok(Self::new(kind, frame_id))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Pages the handler wants events for. Empty means every page.
    pub urls: Vec<Url>,
    /// The handler never cancels the event it receives.
    pub passive: bool,
}

impl SubscribeOptions {
    pub fn matches(&self, url: Option<&Url>) -> bool {
        let Some(url) = url else {
            return true;
        };
        self.urls.is_empty() || self.urls.iter().any(|location| same_location(location, url))
    }
}

fn same_location(location: &Url, url: &Url) -> bool {
    location.scheme() == url.scheme()
        && location.host_str() == url.host_str()
        && location.port_or_known_default() == url.port_or_known_default()
        && location.path().trim_end_matches('/') == url.path().trim_end_matches('/')
}

pub type EventHandler = Rc<dyn Fn(LifecycleEvent)>;

/// The external source of lifecycle notifications. Delivery order and
/// uniqueness are not guaranteed.
pub trait LifecycleSource {
    fn subscribe(&self, kind: EventKind, options: SubscribeOptions, handler: EventHandler);
}

struct Subscription {
    kind: EventKind,
    options: SubscribeOptions,
    handler: EventHandler,
}

/// In-process event source. Handlers are invoked synchronously in
/// subscription order.
#[derive(Default)]
pub struct LocalEventBus {
    subscriptions: RefCell<Vec<Subscription>>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscriptions
            .borrow()
            .iter()
            .filter(|sub| sub.kind == kind)
            .count()
    }

    /// Deliver `event` to every matching handler and return how many ran.
    pub fn dispatch(&self, event: LifecycleEvent) -> usize {
        let handlers: Vec<EventHandler> = self
            .subscriptions
            .borrow()
            .iter()
            .filter(|sub| sub.kind == event.kind && sub.options.matches(event.url.as_ref()))
            .map(|sub| Rc::clone(&sub.handler))
            .collect();

        for handler in &handlers {
            handler(event.clone());
        }
        handlers.len()
    }
}

impl LifecycleSource for LocalEventBus {
    fn subscribe(&self, kind: EventKind, options: SubscribeOptions, handler: EventHandler) {
        tracing::debug!(
            target = "events",
            %kind,
            locations = options.urls.len(),
            passive = options.passive,
            "handler subscribed"
        );
        self.subscriptions.borrow_mut().push(Subscription {
            kind,
            options,
            handler,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn parses_wire_names() {
        assert_eq!("turbo:load".parse::<EventKind>(), Ok(EventKind::NavigateLoad));
        assert_eq!(
            "turbo:frame-load".parse::<EventKind>(),
            Ok(EventKind::FrameLoad)
        );
        assert_eq!(
            EventKind::BeforeFrameRender.wire_name(),
            "turbo:before-frame-render"
        );
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = LifecycleEvent::parse("turbo:visit", None).unwrap_err();
        assert_eq!(err, EventError::UnknownKind("turbo:visit".into()));
    }

    #[test]
    fn frame_events_need_a_frame() {
        let err = LifecycleEvent::parse("turbo:frame-load", Some("  ")).unwrap_err();
        assert_eq!(err, EventError::MissingFrame(EventKind::FrameLoad));

        let event = LifecycleEvent::parse("turbo:frame-load", Some("todays-lessons-frame")).unwrap();
        assert_eq!(event.frame_id, Some(FrameId::todays_lessons()));
    }

    #[test]
    fn bus_filters_by_kind_and_location() {
        let bus = LocalEventBus::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        bus.subscribe(
            EventKind::NavigateLoad,
            SubscribeOptions {
                urls: vec![Url::parse("https://www.wanikani.com/dashboard").unwrap()],
                passive: true,
            },
            Rc::new(move |_| counter.set(counter.get() + 1)),
        );

        let dashboard = Url::parse("https://www.wanikani.com/dashboard/").unwrap();
        let settings = Url::parse("https://www.wanikani.com/settings").unwrap();

        assert_eq!(bus.dispatch(LifecycleEvent::navigate_load().with_url(dashboard)), 1);
        assert_eq!(bus.dispatch(LifecycleEvent::navigate_load().with_url(settings)), 0);
        assert_eq!(bus.dispatch(LifecycleEvent::frame_load("todays-lessons-frame")), 0);
        assert_eq!(bus.dispatch(LifecycleEvent::navigate_load()), 1);
        assert_eq!(hits.get(), 2);
    }
}
