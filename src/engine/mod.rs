//! Plan and apply pipeline for preflight
//!
//! 1. Loading - Settings, layers and the lockfile
//! 2. Planning - Compile the merged layers and diff against the machine
//! 3. Applying - Confirm, run with snapshots, record the lockfile

pub mod display;
pub mod pipeline;

pub use pipeline::{Workspace, apply, confirm_proceed, verify_lock};
