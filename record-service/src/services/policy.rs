//! Authorization policies evaluated once per request, before any field
//! level filtering.
//!
//! A policy is a plain value tree. Evaluation only reads the
//! [`AuthContext`], so the same tree can be evaluated any number of times.

use thiserror::Error;

use crate::models::{AuthContext, Principal};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    RequireMasterKey,
    RequireAuthenticated,
    RequireRole(String),
    RequireAnyRole(Vec<String>),
    RequireAllRoles(Vec<String>),
    /// Every child must allow. Short-circuits on the first deny.
    AllOf(Vec<Policy>),
    /// Some child must allow. Short-circuits on the first allow.
    AnyOf(Vec<Policy>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DenyReason {
    #[error("master key is required")]
    MasterKeyRequired,
    #[error("authentication is required")]
    NotAuthenticated,
    #[error("principal lacks a required role")]
    MissingRole,
    #[error("no policy allows this operation")]
    NoPolicySatisfied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> Result<(), DenyReason> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(reason),
        }
    }
}

impl Policy {
    pub fn all_of(policies: impl IntoIterator<Item = Policy>) -> Self {
        Policy::AllOf(policies.into_iter().collect())
    }

    pub fn any_of(policies: impl IntoIterator<Item = Policy>) -> Self {
        Policy::AnyOf(policies.into_iter().collect())
    }

    pub fn require_role(role: impl Into<String>) -> Self {
        Policy::RequireRole(role.into())
    }

    pub fn evaluate(&self, ctx: &AuthContext) -> Decision {
        match self {
            Policy::RequireMasterKey => {
                if ctx.master_key {
                    Decision::Allow
                } else {
                    Decision::Deny(DenyReason::MasterKeyRequired)
                }
            }
            Policy::RequireAuthenticated => match ctx.principal {
                Some(_) => Decision::Allow,
                None => Decision::Deny(DenyReason::NotAuthenticated),
            },
            Policy::RequireRole(role) => role_decision(ctx, |p| p.has_role(role)),
            Policy::RequireAnyRole(roles) => {
                role_decision(ctx, |p| roles.iter().any(|r| p.has_role(r)))
            }
            Policy::RequireAllRoles(roles) => {
                role_decision(ctx, |p| roles.iter().all(|r| p.has_role(r)))
            }
            Policy::AllOf(policies) => policies
                .iter()
                .map(|p| p.evaluate(ctx))
                .find(|d| !d.is_allow())
                .unwrap_or(Decision::Allow),
            Policy::AnyOf(policies) => {
                let mut last_deny = DenyReason::NoPolicySatisfied;
                for policy in policies {
                    match policy.evaluate(ctx) {
                        Decision::Allow => return Decision::Allow,
                        Decision::Deny(reason) => last_deny = reason,
                    }
                }
                Decision::Deny(last_deny)
            }
        }
    }
}

fn role_decision(ctx: &AuthContext, check: impl Fn(&Principal) -> bool) -> Decision {
    match &ctx.principal {
        None => Decision::Deny(DenyReason::NotAuthenticated),
        Some(p) if check(p) => Decision::Allow,
        Some(_) => Decision::Deny(DenyReason::MissingRole),
    }
}
