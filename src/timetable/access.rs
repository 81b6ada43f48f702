//! Explicit capability checks and tenant scoping.
//!
//! Every engine call takes a [`TenantScope`], and the only way to obtain one is
//! [`AccessContext::authorize`]. There is no ambient "current school".

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::TimetableError;
use super::model::SchoolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Scheduler,
    Teacher,
    Viewer,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "scheduler" => Some(Self::Scheduler),
            "teacher" => Some(Self::Teacher),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Scheduler => "scheduler",
            Self::Teacher => "teacher",
            Self::Viewer => "viewer",
        }
    }

    pub fn grants(self, capability: Capability) -> bool {
        match capability {
            Capability::ViewTimetable => true,
            Capability::ManageTimetable => matches!(self, Self::Admin | Self::Scheduler),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    ViewTimetable,
    ManageTimetable,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ViewTimetable => f.write_str("viewTimetable"),
            Self::ManageTimetable => f.write_str("manageTimetable"),
        }
    }
}

/// Caller identity for one request, as asserted by the invoking layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
    pub school_id: SchoolId,
    pub role: Role,
}

impl AccessContext {
    pub fn new(school_id: impl Into<SchoolId>, role: Role) -> Self {
        Self {
            school_id: school_id.into(),
            role,
        }
    }

    pub fn authorize(&self, capability: Capability) -> Result<TenantScope, TimetableError> {
        if !self.role.grants(capability) {
            return Err(TimetableError::Forbidden {
                role: self.role.as_str().to_string(),
                capability,
            });
        }
        Ok(TenantScope {
            school_id: self.school_id.clone(),
            capability,
        })
    }
}

/// Proof that a capability check passed for one school.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    school_id: SchoolId,
    capability: Capability,
}

impl TenantScope {
    pub fn school_id(&self) -> &SchoolId {
        &self.school_id
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_cannot_manage() {
        let ctx = AccessContext::new("s1", Role::Viewer);
        assert!(ctx.authorize(Capability::ViewTimetable).is_ok());
        let e = ctx.authorize(Capability::ManageTimetable).unwrap_err();
        assert_eq!(e.code(), "forbidden");
    }

    #[test]
    fn scope_carries_school_id() {
        let ctx = AccessContext::new("s1", Role::Scheduler);
        let scope = ctx.authorize(Capability::ManageTimetable).unwrap();
        assert_eq!(scope.school_id().as_str(), "s1");
        assert_eq!(scope.capability(), Capability::ManageTimetable);
    }

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!(Role::parse("Admin"), Some(Role::Admin));
        assert_eq!(Role::parse("janitor"), None);
    }
}
