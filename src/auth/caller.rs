//! The authenticated identity handlers act on behalf of.

use crate::{
    Error,
    auth::{Role, UserID},
};

/// The user making a request, inserted into the request extensions by
/// [crate::auth::auth_guard].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserID,
    pub role: Role,
}

/// Which records a query may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only records owned by this user.
    Own(UserID),
    /// Every record.
    All,
}

impl Scope {
    /// The owner to filter on, or `None` for no filter.
    ///
    /// Queries bind this to `:owner` and test `(:owner IS NULL OR user_id = :owner)`.
    pub fn owner(self) -> Option<UserID> {
        match self {
            Scope::Own(user_id) => Some(user_id),
            Scope::All => None,
        }
    }
}

impl Caller {
    /// Admins see every record, everyone else only their own.
    pub fn scope(&self) -> Scope {
        match self.role {
            Role::Admin => Scope::All,
            Role::Hr | Role::User => Scope::Own(self.user_id),
        }
    }

    /// Check that the caller may process payroll files and submit remittances.
    ///
    /// # Errors
    ///
    /// Returns [Error::Forbidden] for the `user` role.
    pub fn require_staff(&self) -> Result<(), Error> {
        match self.role {
            Role::Admin | Role::Hr => Ok(()),
            Role::User => Err(Error::Forbidden(
                "You do not have permission to perform this action".to_owned(),
            )),
        }
    }

    /// Check that the caller may manage other users.
    ///
    /// # Errors
    ///
    /// Returns [Error::Forbidden] for every role except `admin`.
    pub fn require_admin(&self) -> Result<(), Error> {
        match self.role {
            Role::Admin => Ok(()),
            Role::Hr | Role::User => Err(Error::Forbidden(
                "You do not have permission to perform this action".to_owned(),
            )),
        }
    }

    /// Whether the caller may download a record owned by `owner`.
    ///
    /// Only the `user` role is limited to its own records.
    pub fn can_download(&self, owner: UserID) -> bool {
        self.role != Role::User || self.user_id == owner
    }
}
