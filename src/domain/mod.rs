pub mod job;
pub mod registry;
pub mod stats;
pub mod types;

pub use job::*;
pub use registry::*;
pub use stats::*;
pub use types::*;
