//! Decoration of the "Today's Lessons" tile.
//!
//! [`plan`] turns an observed tile into a [`PatchPlan`] without touching the
//! tree; [`apply_plan`] is the thin adapter that executes it on live nodes.

mod apply;
mod plan;
mod stylesheet;

use kuchiki::NodeRef;
use thiserror::Error;

use crate::dom::has_class;
use crate::settings::Settings;

pub use apply::apply_plan;
pub use plan::{observe, plan, ObservedTile, PatchOp, PatchPlan, TileLayout};
pub use stylesheet::{ensure_stylesheet, STYLESHEET_ID};

pub(crate) const COUNT_BUBBLE_SELECTOR: &str = ".todays-lessons-widget__count-text .count-bubble";
pub(crate) const COUNT_TEXT_SELECTOR: &str = ".todays-lessons-widget__count-text";
pub(crate) const TITLE_CONTAINER_CLASS: &str = "todays-lessons-widget__title-container";
pub(crate) const TITLE_CLASS: &str = "todays-lessons-widget__title";
pub(crate) const TITLE_TEXT_CLASS: &str = "todays-lessons-widget__title-text";
pub(crate) const SUBTITLE_CLASS: &str = "todays-lessons-widget__subtitle";
pub(crate) const TITLE_GROUP_CLASS: &str = "todays-lessons-widget__title-group-container";
pub(crate) const TEXT_WRAPPER_CLASS: &str = "todays-lessons-widget__text-wrapper";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("tile structure is missing {0}")]
    UnexpectedStructure(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Replace the tile's count with the total.
    TotalOnly,
    /// Keep today's count and add the total beside it.
    TodayAndTotal,
}

impl From<&Settings> for DisplayMode {
    fn from(settings: &Settings) -> Self {
        if settings.show_total_only {
            Self::TotalOnly
        } else {
            Self::TodayAndTotal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileValues {
    pub today: u32,
    pub total: usize,
}

/// Applies the tile decoration. A tile decorated by an earlier call is
/// brought up to date in place; the coordinator still invokes it at most once
/// per settle.
#[derive(Debug, Default, Clone, Copy)]
pub struct RenderMutator;

impl RenderMutator {
    pub fn apply(
        &self,
        target: &NodeRef,
        values: &TileValues,
        mode: DisplayMode,
    ) -> Result<PatchPlan, RenderError> {
        let observed = observe(target)?;
        let patch = plan(&observed, values, mode);
        apply_plan(target, &patch)?;
        Ok(patch)
    }
}

/// The container holding the tile's title and subtitle. Looked up by class
/// rather than depth so an already decorated tile resolves to the same node.
pub(crate) fn title_container(target: &NodeRef) -> Result<NodeRef, RenderError> {
    target
        .ancestors()
        .find(|node| has_class(node, TITLE_CONTAINER_CLASS))
        .ok_or(RenderError::UnexpectedStructure("title container"))
}
