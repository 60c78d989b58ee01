//! Operation permission table
//!
//! Maps every mutating or privileged operation to the roles allowed to
//! perform it. Denials carry a detailed reason for the logs; the public
//! response is always the generic permission-denied message.

use crate::auth::{Principal, Role};
use crate::types::{CodexError, Result};
use std::fmt;

/// Privileged operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Propose a correction to a canonical record
    SubmitCorrection,
    /// Read a correction submitted by someone else
    ViewAnyCorrection,
    /// Approve or reject a pending correction
    ReviewCorrection,
    /// Re-run the merge of an approved correction that failed to apply
    ReapplyCorrection,
    /// Read dashboard counters
    ViewStats,
    /// List and read user records
    ViewUsers,
    /// Edit user records
    UpdateUser,
    /// Retire or restore schema enum options
    ManageSchema,
}

impl Operation {
    /// Roles allowed to perform this operation
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Operation::SubmitCorrection => &[Role::User, Role::Moderator, Role::Admin],

            Operation::ViewAnyCorrection
            | Operation::ReviewCorrection
            | Operation::ReapplyCorrection
            | Operation::ViewStats => &[Role::Moderator, Role::Admin],

            Operation::ViewUsers | Operation::UpdateUser | Operation::ManageSchema => {
                &[Role::Admin]
            }
        }
    }

    /// Human-readable description for logging
    pub fn description(&self) -> &'static str {
        match self {
            Operation::SubmitCorrection => "Submit correction",
            Operation::ViewAnyCorrection => "View correction",
            Operation::ReviewCorrection => "Review correction",
            Operation::ReapplyCorrection => "Reapply correction",
            Operation::ViewStats => "View statistics",
            Operation::ViewUsers => "View users",
            Operation::UpdateUser => "Update user",
            Operation::ManageSchema => "Manage schema options",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Check if the principal may perform an operation
pub fn is_operation_allowed(operation: Operation, principal: &Principal) -> bool {
    operation
        .allowed_roles()
        .iter()
        .any(|role| principal.has_role(*role))
}

/// Fail with `Authorization` unless the principal may perform the operation
pub fn ensure_allowed(operation: Operation, principal: &Principal) -> Result<()> {
    if is_operation_allowed(operation, principal) {
        Ok(())
    } else {
        Err(CodexError::Authorization(format!(
            "{} lacks role for '{}' (has {:?})",
            principal, operation, principal.roles
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(roles: &[Role]) -> Principal {
        Principal::new("id", "name", roles.iter().copied())
    }

    #[test]
    fn test_user_operations() {
        let user = principal(&[Role::User]);
        assert!(is_operation_allowed(Operation::SubmitCorrection, &user));
        assert!(!is_operation_allowed(Operation::ReviewCorrection, &user));
        assert!(!is_operation_allowed(Operation::UpdateUser, &user));
    }

    #[test]
    fn test_moderator_operations() {
        let moderator = principal(&[Role::User, Role::Moderator]);
        assert!(is_operation_allowed(Operation::ReviewCorrection, &moderator));
        assert!(is_operation_allowed(Operation::ReapplyCorrection, &moderator));
        assert!(!is_operation_allowed(Operation::UpdateUser, &moderator));
        assert!(!is_operation_allowed(Operation::ManageSchema, &moderator));
    }

    #[test]
    fn test_admin_operations() {
        let admin = principal(&[Role::Admin]);
        assert!(is_operation_allowed(Operation::ReviewCorrection, &admin));
        assert!(is_operation_allowed(Operation::UpdateUser, &admin));
        assert!(is_operation_allowed(Operation::ManageSchema, &admin));
    }

    #[test]
    fn test_no_roles_blocked() {
        let nobody = principal(&[]);
        let err = ensure_allowed(Operation::SubmitCorrection, &nobody).unwrap_err();
        assert!(matches!(err, CodexError::Authorization(_)));
    }
}
