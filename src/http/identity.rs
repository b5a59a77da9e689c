//! Caller identity extraction.
//!
//! Authentication and session handling live in the upstream proxy; by the
//! time a request reaches this service it carries the authenticated user id
//! in the `x-user-id` header. This extractor parses that header and rejects
//! requests without a usable identity.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::error::AppError;
use crate::api::UserId;

/// Header carrying the authenticated user id, set by the upstream proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

impl CurrentUser {
    pub fn id(&self) -> UserId {
        self.0
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts.headers.get(USER_ID_HEADER).ok_or_else(|| {
            AppError::Unauthorized(format!("Missing {} header", USER_ID_HEADER))
        })?;

        let user_id = raw
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(format!("Invalid {} header", USER_ID_HEADER))
            })?;

        Ok(CurrentUser(UserId::new(user_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<CurrentUser, AppError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        CurrentUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_parses_valid_header() {
        let user = extract(Some("42")).await.unwrap();
        assert_eq!(user.id(), UserId::new(42));
    }

    #[tokio::test]
    async fn test_missing_header_rejected() {
        assert!(matches!(
            extract(None).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_garbage_header_rejected() {
        assert!(matches!(
            extract(Some("not-a-number")).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
