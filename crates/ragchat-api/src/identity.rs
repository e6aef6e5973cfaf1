use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use ragchat_types::CallerIdentity;

use crate::error::ApiError;

/// Header carrying the principal authenticated by the hosting platform
pub const PRINCIPAL_HEADER: &str = "x-ms-client-principal-name";

/// Caller identity taken from the platform auth header; requests without it are rejected
#[derive(Debug, Clone)]
pub struct Caller(pub CallerIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts
            .headers
            .get(PRINCIPAL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        Ok(Caller(CallerIdentity::new(principal)))
    }
}
