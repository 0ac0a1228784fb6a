//! Authorization seam
//!
//! The pipeline asks an [`Authorizer`] before every operation that writes:
//! loads, truncations and transform runs. Policy itself lives outside this
//! crate; [`AllowAll`] is the default and [`ReadOnly`] refuses all writes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operation being authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Load,
    Truncate,
    Transform,
    Read,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Load => write!(f, "load"),
            Action::Truncate => write!(f, "truncate"),
            Action::Transform => write!(f, "transform"),
            Action::Read => write!(f, "read"),
        }
    }
}

/// Access control collaborator
pub trait Authorizer: Send + Sync {
    /// Whether `principal` may perform `action` on `resource` (a table or view name)
    fn check_permission(&self, principal: &str, action: Action, resource: &str) -> bool;
}

/// Permits everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn check_permission(&self, _principal: &str, _action: Action, _resource: &str) -> bool {
        true
    }
}

/// Permits reads only
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnly;

impl Authorizer for ReadOnly {
    fn check_permission(&self, _principal: &str, action: Action, _resource: &str) -> bool {
        action == Action::Read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_refuses_writes() {
        assert!(AllowAll.check_permission("etl", Action::Truncate, "trips"));
        assert!(ReadOnly.check_permission("analyst", Action::Read, "trips"));
        assert!(!ReadOnly.check_permission("analyst", Action::Load, "trips"));
        assert_eq!(Action::Transform.to_string(), "transform");
    }
}
