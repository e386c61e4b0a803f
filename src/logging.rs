//! Middleware for logging requests and responses.

use axum::{
    body::Body,
    extract::Request,
    http::{
        HeaderMap, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Bodies longer than this many bytes are truncated at the `info` level.
pub const LOG_BODY_LENGTH_LIMIT: usize = 64;

/// Log the request and response for each request.
///
/// Both the request and response are logged at the `info` level.
/// If a body is longer than [LOG_BODY_LENGTH_LIMIT] bytes, it is truncated and
/// logged in full at the `debug` level. Password fields in form bodies are redacted.
/// Multipart uploads and file downloads are never logged, only their size.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let request = if is_multipart(request.headers()) {
        tracing::info!(
            "Received request: {:?} {}\nbody: <multipart, {} bytes>",
            request.method(),
            request.uri(),
            content_length(request.headers())
        );
        request
    } else {
        let (parts, body_text) = match extract_header_and_body_text_from_request(request).await {
            Ok(parts_and_body) => parts_and_body,
            Err(response) => return response,
        };

        if is_form(&parts.headers) {
            let display_text = redact_passwords(&body_text);
            log_request(&parts, &display_text);
        } else {
            log_request(&parts, &body_text);
        }

        Request::from_parts(parts, body_text.into())
    };

    let response = next.run(request).await;

    if response.headers().contains_key(CONTENT_DISPOSITION) {
        tracing::info!(
            "Sending response: {}\nbody: <attachment, {} bytes>",
            response.status(),
            content_length(response.headers())
        );
        return response;
    }

    let (parts, body_bytes) = match extract_header_and_body_from_response(response).await {
        Ok(parts_and_body) => parts_and_body,
        Err(response) => return response,
    };
    log_response(&parts, &String::from_utf8_lossy(&body_bytes));

    Response::from_parts(parts, Body::from(body_bytes))
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.starts_with("multipart/"))
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.starts_with("application/x-www-form-urlencoded"))
}

fn content_length(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_owned()
}

/// Mask the value of every form field whose name ends in "password".
fn redact_passwords(form_text: &str) -> String {
    form_text
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if name.ends_with("password") => format!("{name}=********"),
            _ => pair.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

async fn extract_header_and_body_text_from_request(
    request: Request,
) -> Result<(axum::http::request::Parts, String), Response> {
    let (parts, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|error| {
            tracing::error!("could not read request body: {error}");
            (StatusCode::BAD_REQUEST, "Could not read request body").into_response()
        })?;

    Ok((parts, String::from_utf8_lossy(&body_bytes).to_string()))
}

async fn extract_header_and_body_from_response(
    response: Response,
) -> Result<(axum::http::response::Parts, axum::body::Bytes), Response> {
    let (parts, body) = response.into_parts();
    let body_bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|error| {
            tracing::error!("could not read response body: {error}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })?;

    Ok((parts, body_bytes))
}

fn truncate(body: &str) -> &str {
    let mut end = LOG_BODY_LENGTH_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }

    &body[..end]
}

fn log_request(parts: &axum::http::request::Parts, body: &str) {
    if body.len() > LOG_BODY_LENGTH_LIMIT {
        tracing::info!(
            "Received request: {parts:#?}\nbody: {:}...",
            truncate(body)
        );
        tracing::debug!("Full request body: {body:?}");
    } else {
        tracing::info!("Received request: {parts:#?}\nbody: {body:?}");
    }
}

fn log_response(parts: &axum::http::response::Parts, body: &str) {
    if body.len() > LOG_BODY_LENGTH_LIMIT {
        tracing::info!(
            "Sending response: {parts:#?}\nbody: {:}...",
            truncate(body)
        );
        tracing::debug!("Full response body: {body:?}");
    } else {
        tracing::info!("Sending response: {parts:#?}\nbody: {body:?}");
    }
}
