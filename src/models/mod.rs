pub mod decision;
pub mod price_reading;
pub mod scrape_outcome;

// Re-exports for convenience
pub use decision::*;
pub use price_reading::*;
pub use scrape_outcome::*;
