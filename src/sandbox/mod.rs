//! Sandbox primitives: path containment and directory snapshots.
//!
//! [`SandboxGuard`] keeps every file operation inside the workspace root and
//! [`Snapshot`] records what a run left behind.

mod guard;
mod snapshot;

pub use guard::SandboxGuard;
pub use snapshot::{epoch_seconds, Snapshot};
