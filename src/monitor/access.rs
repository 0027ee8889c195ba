use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

use super::models::OperatorId;
use crate::error::MonitorError;

/// Platform-side check for the native elevated role (a server administrator).
pub trait NativeRoleCheck: Send + Sync {
    fn has_native_elevated_role(&self, caller: &OperatorId) -> bool;
}

impl<F> NativeRoleCheck for F
where
    F: Fn(&OperatorId) -> bool + Send + Sync,
{
    fn has_native_elevated_role(&self, caller: &OperatorId) -> bool {
        self(caller)
    }
}

/// Operators granted bot-admin rights on top of the native role, in the
/// order they were added.
#[derive(Debug, Default)]
pub struct AdminSet {
    members: RwLock<Vec<OperatorId>>,
}

impl AdminSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_members(members: impl IntoIterator<Item = OperatorId>) -> Self {
        let set = Self::new();
        for member in members {
            // Duplicates in the seed list collapse to one entry.
            let _ = set.add(member);
        }
        set
    }

    pub fn add(&self, member: OperatorId) -> Result<(), MonitorError> {
        let mut members = self.members.write();
        if members.contains(&member) {
            return Err(MonitorError::AlreadyPresent(member));
        }
        members.push(member);
        Ok(())
    }

    pub fn remove(&self, member: &OperatorId) -> Result<(), MonitorError> {
        let mut members = self.members.write();
        let position = members
            .iter()
            .position(|m| m == member)
            .ok_or_else(|| MonitorError::NotPresent(member.clone()))?;
        members.remove(position);
        Ok(())
    }

    pub fn contains(&self, member: &OperatorId) -> bool {
        self.members.read().contains(member)
    }

    pub fn list(&self) -> Vec<OperatorId> {
        self.members.read().clone()
    }
}

/// Decides who may manage targets ("bot admins") and who may manage the
/// bot-admin list (native role holders only).
pub struct AccessGuard {
    admins: AdminSet,
    native_role: Arc<dyn NativeRoleCheck>,
}

impl AccessGuard {
    pub fn new(admins: AdminSet, native_role: Arc<dyn NativeRoleCheck>) -> Self {
        Self {
            admins,
            native_role,
        }
    }

    pub fn is_authorized(&self, caller: &OperatorId) -> bool {
        self.admins.contains(caller) || self.native_role.has_native_elevated_role(caller)
    }

    pub fn has_native_role(&self, caller: &OperatorId) -> bool {
        self.native_role.has_native_elevated_role(caller)
    }

    /// `Unauthorized` unless `caller` may manage targets.
    pub fn authorize(&self, caller: &OperatorId) -> Result<(), MonitorError> {
        if self.is_authorized(caller) {
            Ok(())
        } else {
            Err(MonitorError::Unauthorized(format!(
                "{caller} does not have bot admin permission"
            )))
        }
    }

    fn authorize_native(&self, caller: &OperatorId) -> Result<(), MonitorError> {
        if self.has_native_role(caller) {
            Ok(())
        } else {
            Err(MonitorError::Unauthorized(format!(
                "only server admins can manage bot admins, {caller} is not one"
            )))
        }
    }

    pub fn add_admin(&self, caller: &OperatorId, member: OperatorId) -> Result<(), MonitorError> {
        self.authorize_native(caller)?;
        self.admins.add(member.clone())?;
        info!(caller = %caller, member = %member, "Bot admin added.");
        Ok(())
    }

    pub fn remove_admin(
        &self,
        caller: &OperatorId,
        member: &OperatorId,
    ) -> Result<(), MonitorError> {
        self.authorize_native(caller)?;
        self.admins.remove(member)?;
        info!(caller = %caller, member = %member, "Bot admin removed.");
        Ok(())
    }

    pub fn list_admins(&self, caller: &OperatorId) -> Result<Vec<OperatorId>, MonitorError> {
        self.authorize(caller)?;
        Ok(self.admins.list())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> AccessGuard {
        let native = |caller: &OperatorId| caller.as_str() == "owner";
        AccessGuard::new(AdminSet::new(), Arc::new(native))
    }

    #[test]
    fn test_admin_membership_grants_authorization() {
        let guard = guard();
        let owner = OperatorId::new("owner");
        let user = OperatorId::new("u");

        assert!(guard.is_authorized(&owner));
        assert!(!guard.is_authorized(&user));

        guard.add_admin(&owner, user.clone()).unwrap();
        assert!(guard.is_authorized(&user));

        guard.remove_admin(&owner, &user).unwrap();
        assert!(!guard.is_authorized(&user));
    }

    #[test]
    fn test_duplicate_and_missing_members() {
        let guard = guard();
        let owner = OperatorId::new("owner");
        let user = OperatorId::new("u");

        guard.add_admin(&owner, user.clone()).unwrap();
        assert_eq!(
            guard.add_admin(&owner, user.clone()),
            Err(MonitorError::AlreadyPresent(user.clone()))
        );
        guard.remove_admin(&owner, &user).unwrap();
        assert_eq!(
            guard.remove_admin(&owner, &user),
            Err(MonitorError::NotPresent(user))
        );
    }

    #[test]
    fn test_bot_admins_cannot_manage_admins() {
        let guard = guard();
        let owner = OperatorId::new("owner");
        let admin = OperatorId::new("admin");
        guard.add_admin(&owner, admin.clone()).unwrap();

        let err = guard.add_admin(&admin, OperatorId::new("other")).unwrap_err();
        assert!(matches!(err, MonitorError::Unauthorized(_)));
        assert!(guard.remove_admin(&admin, &admin).is_err());
        // ...but they can still see the list.
        assert_eq!(guard.list_admins(&admin).unwrap(), vec![admin]);
        assert!(guard.list_admins(&OperatorId::new("stranger")).is_err());
    }

    #[test]
    fn test_seeded_members_dedupe() {
        let set = AdminSet::with_members(["a", "b", "a"].map(OperatorId::from));
        assert_eq!(set.list(), vec![OperatorId::new("a"), OperatorId::new("b")]);
    }
}
