use super::RenderError;
use crate::dom::{create_element, set_attr, set_text, Page};

pub const STYLESHEET_ID: &str = "total-lesson-count-style";

const TILE_CSS: &str = r#"
.todays-lessons-widget__title-container:has(.todays-lessons-widget__title-group-container) {
  display: inline-flex;
  gap: var(--spacing-normal);
  justify-content: space-evenly;
}

.todays-lessons-widget__title-group-container {
  display: flex;
  flex-direction: column;
}

.todays-lessons-widget__title-group-container .todays-lessons-widget__subtitle {
  margin-top: 2px;
}

.todays-lessons-widget__title-container:has(.todays-lessons-widget__title-group-container) + .todays-lessons-widget__text {
  align-self: center;
}

.todays-lessons-widget__title:has(.todays-lessons-widget__text-wrapper) {
  flex-direction: column;
}

.todays-lessons-widget__text-wrapper {
  display: flex;
  gap: var(--spacing-tight);
  align-items: center;
}
"#;

/// Insert the tile stylesheet into `<head>` unless it is already there.
/// Returns whether a new element was inserted.
pub fn ensure_stylesheet(page: &Page) -> Result<bool, RenderError> {
    if page.query(&format!("#{STYLESHEET_ID}")).is_some() {
        return Ok(false);
    }
    let head = page
        .head()
        .ok_or(RenderError::UnexpectedStructure("document head"))?;

    let style = create_element("style", None);
    set_attr(&style, "id", STYLESHEET_ID);
    set_text(&style, TILE_CSS);
    head.append(style);
    Ok(true)
}
