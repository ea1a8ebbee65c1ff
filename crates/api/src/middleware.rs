use axum::{
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use trellis_auth::TokenRejection;

use crate::context::RequestId;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tag the request with a fresh [`RequestId`] and echo it in the response.
pub async fn request_id_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let request_id = RequestId::new();
    req.extensions_mut().insert(request_id);

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, TokenRejection> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(TokenRejection::Missing)?;

    let header = header.to_str().map_err(|_| TokenRejection::Malformed)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(TokenRejection::Malformed)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(TokenRejection::Missing);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def")), Ok("abc.def"));
    }

    #[test]
    fn missing_or_malformed_headers_are_rejected() {
        assert_eq!(extract_bearer(&HeaderMap::new()), Err(TokenRejection::Missing));
        assert_eq!(extract_bearer(&headers("Bearer   ")), Err(TokenRejection::Missing));
        assert_eq!(extract_bearer(&headers("Basic abc")), Err(TokenRejection::Malformed));
    }
}
