//! Target registry, per-target polling tasks and access control.
pub mod access;
pub mod models;
pub mod registry;
pub mod service;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use access::{AccessGuard, AdminSet, NativeRoleCheck};
pub use models::{AddTarget, OperatorId, ProbeOutcome, ProbeStatus, Target, TargetId, TaskState};
pub use registry::{RegistryConfig, TargetRegistry};
pub use service::{MonitorService, ScopePolicy};
pub use task::MonitorTask;
