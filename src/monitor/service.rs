use serde::Deserialize;
use std::time::Duration;
use tracing::info;

use super::access::AccessGuard;
use super::models::{AddTarget, OperatorId, ProbeOutcome, Target, TargetId};
use super::registry::TargetRegistry;
use super::task::probe_once;
use crate::error::MonitorError;

/// Whether removal and listing act on every target or only the caller's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopePolicy {
    #[default]
    Global,
    Owner,
}

impl std::str::FromStr for ScopePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(ScopePolicy::Global),
            "owner" => Ok(ScopePolicy::Owner),
            other => Err(format!("unknown scope policy: {other}")),
        }
    }
}

/// Caller-facing entry point: applies the access guard and the scope
/// policy, then delegates to the registry.
pub struct MonitorService {
    registry: TargetRegistry,
    guard: AccessGuard,
    scope: ScopePolicy,
}

impl MonitorService {
    pub fn new(registry: TargetRegistry, guard: AccessGuard, scope: ScopePolicy) -> Self {
        Self {
            registry,
            guard,
            scope,
        }
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }

    pub fn scope(&self) -> ScopePolicy {
        self.scope
    }

    pub async fn add_target(
        &self,
        caller: &OperatorId,
        address: &str,
        interval_secs: i64,
    ) -> Result<Target, MonitorError> {
        self.guard.authorize(caller)?;
        let request = AddTarget::from_secs(address, interval_secs, caller.clone())?;
        self.registry.add(request).await
    }

    pub async fn remove_target(
        &self,
        caller: &OperatorId,
        id: &TargetId,
    ) -> Result<Target, MonitorError> {
        self.guard.authorize(caller)?;
        match self.scope {
            ScopePolicy::Global => self.registry.remove(id).await,
            ScopePolicy::Owner => {
                let native = self.guard.has_native_role(caller);
                self.registry
                    .remove_if(id, |target| {
                        if native || &target.owner == caller {
                            Ok(())
                        } else {
                            Err(MonitorError::Unauthorized(format!(
                                "{id} belongs to {}",
                                target.owner
                            )))
                        }
                    })
                    .await
            }
        }
    }

    /// Stops monitoring: everything under the global scope, the caller's own
    /// targets under the owner scope.
    pub async fn stop_monitoring(&self, caller: &OperatorId) -> Result<Vec<Target>, MonitorError> {
        self.guard.authorize(caller)?;
        let removed = match self.scope {
            ScopePolicy::Global => self.registry.remove_all().await,
            ScopePolicy::Owner => self.registry.remove_owned_by(caller).await,
        };
        info!(caller = %caller, count = removed.len(), "Stop monitoring requested.");
        Ok(removed)
    }

    pub fn list_targets(&self, caller: &OperatorId) -> Vec<Target> {
        let targets = self.registry.list();
        match self.scope {
            ScopePolicy::Global => targets,
            ScopePolicy::Owner => targets
                .into_iter()
                .filter(|target| &target.owner == caller)
                .collect(),
        }
    }

    pub fn get_target(&self, id: &TargetId) -> Result<Target, MonitorError> {
        self.registry.get(id)
    }

    /// Probes an address once, outside the registry.
    pub async fn check_now(&self, address: &str) -> ProbeOutcome {
        self.check_now_with_timeout(address, self.registry.config().probe_timeout)
            .await
    }

    pub async fn check_now_with_timeout(&self, address: &str, timeout: Duration) -> ProbeOutcome {
        probe_once(self.registry.probe(), address.trim(), timeout).await
    }

    pub fn is_authorized(&self, caller: &OperatorId) -> bool {
        self.guard.is_authorized(caller)
    }

    pub fn add_admin(&self, caller: &OperatorId, member: OperatorId) -> Result<(), MonitorError> {
        self.guard.add_admin(caller, member)
    }

    pub fn remove_admin(
        &self,
        caller: &OperatorId,
        member: &OperatorId,
    ) -> Result<(), MonitorError> {
        self.guard.remove_admin(caller, member)
    }

    pub fn list_admins(&self, caller: &OperatorId) -> Result<Vec<OperatorId>, MonitorError> {
        self.guard.list_admins(caller)
    }

    /// Stops every task; call before process exit.
    pub async fn shutdown(&self) {
        let removed = self.registry.remove_all().await;
        info!(count = removed.len(), "Monitor service shut down.");
    }
}
