//! Request extractors.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::warn;

use crate::response::ApiError;
use crate::state::AppState;

/// Proof that the request carried an acceptable `Authorization` header.
#[derive(Debug, Clone)]
pub struct Authorized;

#[async_trait]
impl FromRequestParts<AppState> for Authorized {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|h| !h.is_empty());

        let Some(provided) = provided else {
            warn!("Request missing Authorization header");
            return Err(ApiError::unauthorized("Missing Authorization header"));
        };

        match state.auth_token.as_deref() {
            Some(expected) if expected != provided => {
                warn!("Request with invalid Authorization header");
                Err(ApiError::unauthorized("Invalid Authorization header"))
            }
            _ => Ok(Authorized),
        }
    }
}
