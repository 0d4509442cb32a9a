pub mod config;
pub mod models;
pub mod notifier;
pub mod pipeline;
pub mod plugins;
pub mod policy;
pub mod scheduler;
pub mod scraper;
pub mod session;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
