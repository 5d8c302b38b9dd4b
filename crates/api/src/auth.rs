//! Caller identity from the upstream auth gateway's headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use checkout::{Actor, Role};
use common::UserId;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller. Rejects with 401 when the identity is missing
/// or malformed.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let Some(raw_id) = header(USER_ID_HEADER) else {
            tracing::debug!(uri = %parts.uri, "request without caller identity");
            return Err(ApiError::Unauthenticated("missing user identity".to_string()));
        };
        let user_id: UserId = raw_id
            .parse()
            .map_err(|_| ApiError::Unauthenticated("invalid user identity".to_string()))?;

        let role = match header(USER_ROLE_HEADER) {
            None => Role::default(),
            Some(raw) => raw
                .parse()
                .map_err(|_| ApiError::Unauthenticated("invalid user role".to_string()))?,
        };

        Ok(Caller(Actor { user_id, role }))
    }
}
