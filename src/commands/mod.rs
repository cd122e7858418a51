pub mod conflicts;
pub mod lock;
pub mod plan;
pub mod snapshot;
