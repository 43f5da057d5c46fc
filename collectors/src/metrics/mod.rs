pub mod descriptor;
pub mod gauge_set;
pub mod snapshot;

// Re-export the main types for easy access
pub use descriptor::*;
pub use gauge_set::*;
pub use snapshot::*;
