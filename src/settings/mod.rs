// Grabber settings: serde types and JSON persistence.

pub mod store;
pub mod types;

pub use store::{SettingsError, SettingsStore};
pub use types::GrabberSettings;
