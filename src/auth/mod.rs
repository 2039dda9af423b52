//! # Auth Module
//!
//! Role-based authorization of operations.
//!
//! ## Overview
//!
//! Two seams are pluggable:
//!
//! - [`PrincipalResolver`] extracts the caller (roles + token issue time) from
//!   the request. [`JwtPrincipalResolver`] reads an HS256 token from the
//!   `Authorization: Bearer` header or the `identityToken` cookie.
//! - [`AuthPolicy`] decides whether that caller satisfies an operation's
//!   [`RoleRequirement`]. [`RoleAuthPolicy`] is the default.
//!
//! ## Role semantics
//!
//! | Group   | Passes when                                         |
//! |---------|-----------------------------------------------------|
//! | `oneOf` | exactly one listed role is held                     |
//! | `anyOf` | at least one listed role is held                    |
//! | `allOf` | the caller's role set equals the listed set exactly |
//!
//! Present groups are AND-ed. Token freshness is checked before any group;
//! evaluation stops at the first failure. A requirement with no group set
//! always authorizes.

mod jwt;

pub use jwt::{JwtPrincipalResolver, DEFAULT_COOKIE_NAME};

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::spec::RoleRequirement;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Default token lifetime: 30 minutes.
pub const DEFAULT_TOKEN_EXPIRATION: Duration = Duration::from_millis(1_800_000);

/// The authenticated caller of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Principal {
    pub subject: Option<String>,
    pub roles: Vec<String>,
    /// When the credential was issued; `None` is treated as expired
    pub issued_at: Option<SystemTime>,
    /// Raw claims, for handlers that need more than roles
    pub claims: Value,
}

impl Principal {
    pub fn new<I, S>(roles: I, issued_at: SystemTime) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subject: None,
            roles: roles.into_iter().map(Into::into).collect(),
            issued_at: Some(issued_at),
            claims: Value::Null,
        }
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Extracts the caller from a request.
///
/// `Ok(None)` means "no credentials presented"; `Err` means credentials were
/// presented but are unusable.
pub trait PrincipalResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Option<Principal>, ApiError>>;
}

/// Resolver for deployments without authentication.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrincipal;

impl PrincipalResolver for NoPrincipal {
    fn resolve<'a>(
        &'a self,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Option<Principal>, ApiError>> {
        Box::pin(async { Ok(None) })
    }
}

/// Decides whether a caller satisfies a role requirement.
pub trait AuthPolicy: Send + Sync {
    fn authorize(
        &self,
        requirement: &RoleRequirement,
        caller_roles: &[String],
        token_issued_at: Option<SystemTime>,
    ) -> Result<(), ApiError>;
}

/// Freshness check followed by `oneOf`/`anyOf`/`allOf` evaluation.
#[derive(Debug, Clone, Copy)]
pub struct RoleAuthPolicy {
    expiration: Duration,
}

impl Default for RoleAuthPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_EXPIRATION)
    }
}

impl RoleAuthPolicy {
    #[must_use]
    pub fn new(expiration: Duration) -> Self {
        Self { expiration }
    }

    #[must_use]
    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    fn is_expired(&self, issued_at: Option<SystemTime>) -> bool {
        let Some(issued_at) = issued_at else {
            return true;
        };
        // A clock running behind the issuer yields an error here; treat as fresh.
        SystemTime::now()
            .duration_since(issued_at)
            .map(|age| age > self.expiration)
            .unwrap_or(false)
    }
}

fn held<'a>(required: &'a BTreeSet<String>, caller: &'a [String]) -> impl Iterator<Item = &'a String> {
    required.iter().filter(move |r| caller.contains(r))
}

impl AuthPolicy for RoleAuthPolicy {
    fn authorize(
        &self,
        requirement: &RoleRequirement,
        caller_roles: &[String],
        token_issued_at: Option<SystemTime>,
    ) -> Result<(), ApiError> {
        if requirement.is_empty() {
            return Ok(());
        }
        if self.is_expired(token_issued_at) {
            debug!("Authorization failed: token expired");
            return Err(ApiError::authorization("Token expired"));
        }
        if let Some(one_of) = &requirement.one_of {
            if held(one_of, caller_roles).count() != 1 {
                debug!(group = "oneOf", "Authorization failed");
                return Err(ApiError::authorization("Not authorized").with_detail("oneOf"));
            }
        }
        if let Some(any_of) = &requirement.any_of {
            if held(any_of, caller_roles).next().is_none() {
                debug!(group = "anyOf", "Authorization failed");
                return Err(ApiError::authorization("Not authorized").with_detail("anyOf"));
            }
        }
        if let Some(all_of) = &requirement.all_of {
            let caller: BTreeSet<&str> = caller_roles.iter().map(String::as_str).collect();
            let required: BTreeSet<&str> = all_of.iter().map(String::as_str).collect();
            if caller != required {
                debug!(group = "allOf", "Authorization failed");
                return Err(ApiError::authorization("Not authorized").with_detail("allOf"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(r: &[&str]) -> Vec<String> {
        r.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_missing_issue_time_is_expired() {
        let policy = RoleAuthPolicy::default();
        let err = policy
            .authorize(&RoleRequirement::any_of(["ADMIN"]), &roles(&["ADMIN"]), None)
            .unwrap_err();
        assert_eq!(err.status(), http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_future_issue_time_is_fresh() {
        let policy = RoleAuthPolicy::default();
        let later = SystemTime::now() + Duration::from_secs(60);
        assert!(policy
            .authorize(&RoleRequirement::any_of(["ADMIN"]), &roles(&["ADMIN"]), Some(later))
            .is_ok());
    }

    #[test]
    fn test_empty_requirement_skips_freshness() {
        let policy = RoleAuthPolicy::default();
        assert!(policy
            .authorize(&RoleRequirement::default(), &[], None)
            .is_ok());
    }
}
