//! The caller identity every core operation runs on behalf of.

use crate::host::GroupId;
use serde::{Deserialize, Serialize};

pub type UserId = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    #[default]
    User,
    Admin,
    SuperAdmin,
}

/// Host-group right granted to a user. Ordered by strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Deny,
    Read,
    ReadWrite,
}

/// Requested access level for a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Read,
    Write,
}

impl Access {
    pub fn required(self) -> Permission {
        match self {
            Access::Read => Permission::Read,
            Access::Write => Permission::ReadWrite,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRight {
    pub groupid: GroupId,
    pub permission: Permission,
}

/// User record with its effective host-group rights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub userid: UserId,
    pub alias: String,
    #[serde(default, rename = "type")]
    pub user_type: UserType,
    #[serde(default)]
    pub rights: Vec<GroupRight>,
}

impl User {
    pub fn right_on(&self, groupid: GroupId) -> Option<Permission> {
        self.rights
            .iter()
            .filter(|right| right.groupid == groupid)
            .map(|right| right.permission)
            .min()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub userid: UserId,
    pub user_type: UserType,
}

impl Principal {
    pub fn new(userid: UserId, user_type: UserType) -> Self {
        Self { userid, user_type }
    }

    /// Internal callers that bypass permission checks.
    pub fn super_admin() -> Self {
        Self::new(0, UserType::SuperAdmin)
    }

    pub fn is_super_admin(&self) -> bool {
        self.user_type == UserType::SuperAdmin
    }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self::new(user.userid, user.user_type)
    }
}
