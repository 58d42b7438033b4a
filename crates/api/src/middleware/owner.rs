//! Caller identity extraction.
//!
//! Authentication is handled upstream (reverse proxy or gateway); by the
//! time a request reaches this service the caller identity, if any,
//! arrives as a trusted `X-Owner-Id` header. The extractor never rejects:
//! anonymous requests simply carry no owner.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// Header carrying the authenticated caller identity.
pub const OWNER_HEADER: &str = "x-owner-id";

/// The caller identity for the current request, if one was supplied.
#[derive(Debug, Clone)]
pub struct Owner(pub Option<String>);

impl Owner {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(Owner(owner))
    }
}
