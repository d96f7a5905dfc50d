// Library exports for the binary and integration tests

pub mod config;
pub mod coordinator;
pub mod debug_log;
pub mod dom;
pub mod events;
pub mod menu;
pub mod render;
pub mod retry;
pub mod settings;
pub mod source;
pub mod state;
pub mod storage;

// Re-export commonly used types for tests
pub use config::CoordinatorConfig;
pub use coordinator::{Collaborators, CoordinatorError, InitializationCoordinator, RunResult};
pub use dom::Page;
pub use events::{EventKind, FrameId, LifecycleEvent, LocalEventBus};
pub use settings::{MemorySettingsStore, Settings, SettingsStore};
pub use source::{DataSource, StaticDataSource, Summary};
pub use storage::SqliteSettingsStore;
