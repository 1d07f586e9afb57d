//! Access policy
//!
//! Guests browse read-only. Editing needs an authenticated user, and anything
//! that touches reference data or removes rows needs the `Admin` group or a
//! superuser.

use serde::Serialize;

use crate::schema::EntityKind;

/// Group that grants admin rights.
pub const ADMIN_GROUP: &str = "Admin";

/// Who is making a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub username: Option<String>,
    pub groups: Vec<String>,
    pub superuser: bool,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    pub fn superuser(mut self) -> Self {
        self.superuser = true;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    pub fn is_admin(&self) -> bool {
        self.is_authenticated() && (self.superuser || self.groups.iter().any(|g| g == ADMIN_GROUP))
    }
}

/// Operations subject to the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Detail,
    Report,
    Images,
    Export,
    Create,
    Edit,
    Delete,
    Import,
    BulkDelete,
}

impl Action {
    fn is_read_only(self) -> bool {
        matches!(self, Self::List | Self::Detail | Self::Report | Self::Images)
    }
}

/// Outcome of a policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    /// Nobody is logged in; send them to the login page.
    LoginRequired,
    /// Logged in, but not allowed.
    Denied,
}

/// Decide whether `principal` may perform `action` on `kind`.
///
/// `guest_mode` is the session's read-only guest flag.
pub fn authorize(principal: &Principal, guest_mode: bool, action: Action, kind: Option<EntityKind>) -> Decision {
    let needs_admin = match action {
        Action::Delete | Action::Import | Action::BulkDelete => true,
        Action::Create | Action::Edit => kind.is_some_and(|k| k.is_reference_data()),
        _ => false,
    };

    if principal.is_authenticated() {
        return if !needs_admin || principal.is_admin() {
            Decision::Allowed
        } else {
            Decision::Denied
        };
    }

    if guest_mode && action.is_read_only() {
        return Decision::Allowed;
    }
    if guest_mode {
        tracing::debug!(?action, "guest session attempted a write");
    }
    Decision::LoginRequired
}
