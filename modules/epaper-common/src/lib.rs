pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, FetchSettings, RetentionPolicy};
pub use error::{EpaperError, Result};
pub use types::*;
