//! HTTP handlers for the record service.
//!
//! Each handler evaluates its route policy against the request's
//! [`AuthContext`](crate::models::AuthContext) before calling a service.

pub mod auth;
pub mod field_access;
pub mod records;

use crate::models::AuthContext;
use crate::services::{Policy, ServiceError};

pub(crate) fn authorize(policy: &Policy, ctx: &AuthContext) -> Result<(), ServiceError> {
    policy.evaluate(ctx).into_result().map_err(|reason| {
        tracing::debug!(reason = %reason, "Request denied by policy");
        ServiceError::PermissionDenied(reason)
    })
}
