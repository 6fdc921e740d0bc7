//! Caller identity.
//!
//! Authentication itself is owned by the auth gateway in front of this
//! service; it terminates the bearer token and forwards the verified
//! principal in three headers. This extractor is the whole contract:
//!
//! - `x-auth-user`    — username
//! - `x-auth-role`    — `dispatcher` | `vendor` | `admin`
//! - `x-auth-vencode` — vendor code, present for vendor accounts
//!
//! A missing or malformed identity, or a role an endpoint does not permit,
//! is a `403 forbidden`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use fdk_schemas::Role;

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct Identity {
    pub username: String,
    pub role: Role,
    pub vencode: Option<String>,
}

impl Identity {
    /// Dispatchers and admins only; returns the acting username.
    pub fn require_dispatcher(&self) -> Result<&str, ApiError> {
        if self.role.is_dispatcher() {
            Ok(&self.username)
        } else {
            Err(ApiError::forbidden("dispatcher role required"))
        }
    }

    /// Vendor accounts only; returns the vendor code.
    pub fn require_vendor(&self) -> Result<&str, ApiError> {
        if self.role != Role::Vendor {
            return Err(ApiError::forbidden("vendor role required"));
        }
        self.vencode
            .as_deref()
            .ok_or_else(|| ApiError::forbidden("vendor account has no vendor code"))
    }
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let username = header("x-auth-user")
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ApiError::forbidden("missing identity"))?;
        let role = header("x-auth-role")
            .as_deref()
            .map(Role::parse)
            .transpose()
            .map_err(|e| ApiError::forbidden(e.to_string()))?
            .ok_or_else(|| ApiError::forbidden("missing identity"))?;

        Ok(Identity {
            username,
            role,
            vencode: header("x-auth-vencode").filter(|v| !v.is_empty()),
        })
    }
}
