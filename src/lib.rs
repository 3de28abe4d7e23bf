pub mod cli;
pub mod config;
pub mod dependency;
pub mod error;
pub mod file_registry;
pub mod indexing;
pub mod location;
pub mod logging;
pub mod project;
pub mod query;
pub mod storage;
pub mod types;
pub mod watcher;

pub use config::Settings;
pub use error::{IndexError, IndexResult};
pub use location::Location;
pub use project::Project;
pub use types::FileId;