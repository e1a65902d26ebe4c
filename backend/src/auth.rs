//! Caller identity extractors.
//!
//! Session validation happens at the platform gateway; by the time a request
//! reaches this service the authenticated user id travels in a trusted
//! header. Handlers never read the header themselves.

use std::convert::Infallible;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::ServiceError;

/// Header the gateway sets after validating the session.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller. Rejects the request with 401 when the gateway did
/// not forward a usable user id.
pub struct CurrentUser(pub i64);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_id_from_parts(parts)
            .map(CurrentUser)
            .ok_or(ServiceError::Unauthorized)
    }
}

/// Possibly-anonymous caller, for public read endpoints that still
/// personalize their response when a session exists.
pub struct Viewer(pub Option<i64>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Viewer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Viewer(user_id_from_parts(parts)))
    }
}

fn user_id_from_parts(parts: &Parts) -> Option<i64> {
    parts
        .headers
        .get(USER_ID_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::{user_id_from_parts, USER_ID_HEADER};

    fn parts_with(value: Option<&str>) -> axum::http::request::Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = value {
            builder = builder.header(USER_ID_HEADER, value);
        }
        builder.body(()).expect("request").into_parts().0
    }

    #[test]
    fn parses_forwarded_user_id() {
        assert_eq!(user_id_from_parts(&parts_with(Some("42"))), Some(42));
        assert_eq!(user_id_from_parts(&parts_with(Some(" 7 "))), Some(7));
    }

    #[test]
    fn rejects_missing_or_garbage_ids() {
        assert_eq!(user_id_from_parts(&parts_with(None)), None);
        assert_eq!(user_id_from_parts(&parts_with(Some(""))), None);
        assert_eq!(user_id_from_parts(&parts_with(Some("abc"))), None);
        assert_eq!(user_id_from_parts(&parts_with(Some("0"))), None);
        assert_eq!(user_id_from_parts(&parts_with(Some("-3"))), None);
    }
}
