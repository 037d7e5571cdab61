pub mod config;
pub mod error;
pub mod logging;

pub use config::AppConfig;
pub use error::{AppError, Result};
