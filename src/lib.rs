// Library surface for the terminal front end, headless tests and reuse.
// Keep this lean: rendering lives with the binary in main.rs.
pub mod app_dirs;
pub mod catalog;
pub mod config;
pub mod countdown;
pub mod engine;
pub mod history;
pub mod level;
pub mod runtime;
pub mod session;
pub mod store;

pub use catalog::LevelCatalog;
pub use engine::{EngineState, GameEngine, GameEvent};
pub use level::{Level, MAX_LEVEL};
pub use session::{FinishingReason, GameSession};
