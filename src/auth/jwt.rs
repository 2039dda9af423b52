use super::{Principal, PrincipalResolver};
use crate::context::RequestContext;
use crate::error::ApiError;
use futures::future::BoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Default cookie that may carry the identity token.
pub const DEFAULT_COOKIE_NAME: &str = "identityToken";

/// HS256 identity-token resolver.
///
/// The token is read from `Authorization: Bearer <token>` or, failing that,
/// from the identity cookie. Roles come from the `roles` claim. The issue
/// time is `created` (epoch millis) when present, else `iat` (epoch seconds).
/// Expiry is not checked here; freshness belongs to the
/// [`AuthPolicy`](super::AuthPolicy).
pub struct JwtPrincipalResolver {
    encoding: EncodingKey,
    decoding: DecodingKey,
    cookie_name: String,
}

impl JwtPrincipalResolver {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
        }
    }

    /// Configure the cookie name used to read the token.
    #[must_use]
    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Mint a token for `claims`, stamping `created` with the current time.
    pub fn generate_token(&self, claims: Map<String, Value>) -> Result<String, ApiError> {
        let mut claims = claims;
        claims.insert("created".to_string(), Value::from(now_millis()));
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::internal("Failed to sign token").with_source(e))
    }

    fn extract_token<'a>(&self, ctx: &'a RequestContext) -> Option<&'a str> {
        ctx.header("authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or_else(|| ctx.cookie(&self.cookie_name).filter(|t| !t.is_empty()))
    }

    /// Verify the signature and turn the claims into a [`Principal`].
    pub fn decode_token(&self, token: &str) -> Result<Principal, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        let data = decode::<Value>(token, &self.decoding, &validation).map_err(|e| {
            warn!(error = %e, "Identity token rejected");
            ApiError::authorization("Invalid token")
        })?;
        Ok(principal_from_claims(data.claims))
    }
}

impl PrincipalResolver for JwtPrincipalResolver {
    fn resolve<'a>(
        &'a self,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Option<Principal>, ApiError>> {
        Box::pin(async move {
            let Some(token) = self.extract_token(ctx) else {
                debug!(request_id = %ctx.request_id(), "No identity token presented");
                return Ok(None);
            };
            self.decode_token(token).map(Some)
        })
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn principal_from_claims(claims: Value) -> Principal {
    let roles = claims
        .get("roles")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let issued_at = claims
        .get("created")
        .and_then(Value::as_u64)
        .map(Duration::from_millis)
        .or_else(|| {
            claims
                .get("iat")
                .and_then(Value::as_u64)
                .map(Duration::from_secs)
        })
        .and_then(|d| UNIX_EPOCH.checked_add(d));
    let subject = claims
        .get("sub")
        .and_then(Value::as_str)
        .map(str::to_string);
    Principal {
        subject,
        roles,
        issued_at,
        claims,
    }
}
