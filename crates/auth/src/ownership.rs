use eproc_core::UserId;

use crate::{AuthzError, RoleIdentity, UserIdentity};

/// What a caller is trying to do to another user's record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OwnershipAction {
    AlterData,
    AlterPassword,
    Delete,
}

impl OwnershipAction {
    pub fn denial(&self) -> &'static str {
        match self {
            Self::AlterData => "unable to alter another user's data",
            Self::AlterPassword => "unable to alter another user's password",
            Self::Delete => "unable to delete another user",
        }
    }
}

impl core::fmt::Display for OwnershipAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.denial())
    }
}

/// Self-or-admin rule: a user may act on their own record; acting on anyone
/// else's needs an administrative role.
pub fn ensure_self_or_admin(
    user: &UserIdentity,
    role: &RoleIdentity,
    target: UserId,
    action: OwnershipAction,
) -> Result<(), AuthzError> {
    if user.id == target || role.is_administrative {
        Ok(())
    } else {
        Err(AuthzError::NotOwner(action))
    }
}
