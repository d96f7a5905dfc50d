use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::settings::Settings;

/// Entry point added to the host's menu for opening the settings dialog.
#[derive(Clone)]
pub struct ScriptLink {
    pub name: String,
    pub submenu: String,
    pub title: String,
    pub on_click: Rc<dyn Fn()>,
}

impl fmt::Debug for ScriptLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptLink")
            .field("name", &self.name)
            .field("submenu", &self.submenu)
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

pub trait MenuRegistry {
    fn insert_script_link(&self, link: ScriptLink);
}

/// Dialog the host shows when the settings link is clicked. On save the host
/// reports the new record through `InitializationCoordinator::settings_saved`.
pub trait SettingsDialog {
    fn open(&self, script_id: &str, title: &str, current: &Settings);
}

/// In-process menu keeping one link per name; re-inserting a name replaces it.
#[derive(Default)]
pub struct MenuBar {
    links: RefCell<Vec<ScriptLink>>,
}

impl MenuBar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn links(&self) -> Vec<ScriptLink> {
        self.links.borrow().clone()
    }

    /// Invoke the `on_click` of the link named `name`. Returns `false` when no
    /// such link exists.
    pub fn click(&self, name: &str) -> bool {
        let handler = self
            .links
            .borrow()
            .iter()
            .find(|link| link.name == name)
            .map(|link| Rc::clone(&link.on_click));
        match handler {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }
}

impl MenuRegistry for MenuBar {
    fn insert_script_link(&self, link: ScriptLink) {
        let mut links = self.links.borrow_mut();
        links.retain(|existing| existing.name != link.name);
        links.push(link);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn link(name: &str, clicks: &Rc<Cell<u32>>) -> ScriptLink {
        let clicks = Rc::clone(clicks);
        ScriptLink {
            name: name.into(),
            submenu: "Settings".into(),
            title: "Show Total Lesson Count".into(),
            on_click: Rc::new(move || clicks.set(clicks.get() + 1)),
        }
    }

    #[test]
    fn reinsert_replaces_by_name() {
        let menu = MenuBar::new();
        let clicks = Rc::new(Cell::new(0));
        menu.insert_script_link(link("a", &clicks));
        menu.insert_script_link(link("a", &clicks));
        menu.insert_script_link(link("b", &clicks));
        assert_eq!(menu.links().len(), 2);
    }

    #[test]
    fn click_runs_handler() {
        let menu = MenuBar::new();
        let clicks = Rc::new(Cell::new(0));
        menu.insert_script_link(link("a", &clicks));
        assert!(menu.click("a"));
        assert!(!menu.click("missing"));
        assert_eq!(clicks.get(), 1);
    }
}
