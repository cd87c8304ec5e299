use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};

use crate::model::UserContext;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// Administrator identity from request headers.
///
/// Authentication happens in front of this service; the headers are trusted as
/// given. Without an `X-User-Id` the development user is assumed.
#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_from_headers(&parts.headers)
    }
}

fn user_from_headers(headers: &HeaderMap) -> Result<UserContext, StatusCode> {
    match header_value(headers, USER_ID_HEADER)? {
        Some(user_id) => Ok(UserContext::with_details(
            user_id,
            header_value(headers, USER_EMAIL_HEADER)?,
            header_value(headers, USER_NAME_HEADER)?,
        )),
        None => Ok(UserContext::default_user()),
    }
}

/// Blank values count as absent; values that are not visible ASCII are rejected
fn header_value(headers: &HeaderMap, name: &str) -> Result<Option<String>, StatusCode> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => {
            let text = value.to_str().map_err(|_| StatusCode::BAD_REQUEST)?.trim();
            Ok((!text.is_empty()).then(|| text.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_user_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("admin-7"));
        headers.insert(USER_EMAIL_HEADER, HeaderValue::from_static("ops@example.com"));

        let user = user_from_headers(&headers).unwrap();
        assert_eq!(user.user_id, "admin-7");
        assert_eq!(user.user_email.as_deref(), Some("ops@example.com"));
        assert_eq!(user.user_name, None);
    }

    #[test]
    fn test_missing_or_blank_id_falls_back_to_default_user() {
        let mut headers = HeaderMap::new();
        assert_eq!(user_from_headers(&headers).unwrap().user_id, UserContext::default_user().user_id);

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("   "));
        assert_eq!(user_from_headers(&headers).unwrap().user_id, UserContext::default_user().user_id);
    }

    #[test]
    fn test_non_ascii_header_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_bytes(b"caf\xe9").unwrap());
        assert_eq!(user_from_headers(&headers).unwrap_err(), StatusCode::BAD_REQUEST);
    }
}
