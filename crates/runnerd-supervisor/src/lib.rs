//! Process supervision core: the registry that owns all managed
//! processes, the per-process start/stop state machine, the timing-rule
//! store, and the deferred-launch scheduler.
//!
//! All mutation goes through [`ProcessRegistry`], which serializes every
//! structural and lifecycle operation behind one exclusive lock. State is
//! persisted per entity as JSON files so bookkeeping survives restarts.

pub mod record;
pub mod registry;
pub mod schedule;
pub mod store;

pub use record::{LaunchMode, ProcessRecord, ProcessSnapshot, RunState};
pub use registry::ProcessRegistry;
pub use schedule::TimingRule;
pub use store::StateStore;
