//! Backend role handlers answering from local storage.
//!
//! Short links are built on the gateway's forwarded base when the request
//! came through it, otherwise on our own `Host`. A forwarded resolve gets
//! JSON back so the gateway can issue the redirect itself.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use linkgate_core::{
    InfoResponse, RedirectResponse, ShortenRequest, ShortenResponse, ShortenerError,
};

use super::{backend_base, forwarded_base, ApiError, BackendState};

const EMPTY_REQUEST: &str = "Empty request, cannot shortify the emptiness";

/// `POST /` with `{ "URL": ... }`.
pub async fn backend_shorten_handler(
    State(state): State<BackendState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ShortenResponse>, ApiError> {
    let request = parse_shorten(&body)?;
    let record = state.shortener.shortify(&request.url).await?;
    Ok(Json(ShortenResponse {
        short_url: record.short_url(&backend_base(&headers)),
        url: record.long_url,
    }))
}

/// `GET /{short_code}`: counts a visit, then redirects (or answers JSON to
/// the gateway).
pub async fn backend_resolve_handler(
    State(state): State<BackendState>,
    Path(short_code): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let record = state.shortener.resolve(&short_code).await?;
    if forwarded_base(&headers).is_some() {
        return Ok(Json(RedirectResponse {
            url: record.long_url,
        })
        .into_response());
    }
    Ok((StatusCode::PERMANENT_REDIRECT, [(LOCATION, record.long_url)]).into_response())
}

/// `GET /info/{short_code}`: no visit is counted.
pub async fn backend_info_handler(
    State(state): State<BackendState>,
    Path(short_code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<InfoResponse>, ApiError> {
    let record = state.shortener.get_info(&short_code).await?;
    Ok(Json(InfoResponse {
        short_url: record.short_url(&backend_base(&headers)),
        url: record.long_url,
        visits_count: record.visit_count,
    }))
}

/// Decodes a shorten body without insisting on a content type.
pub(super) fn parse_shorten(body: &[u8]) -> Result<ShortenRequest, ShortenerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ShortenerError::malformed(EMPTY_REQUEST));
    }
    let request: ShortenRequest =
        serde_json::from_slice(body).map_err(|e| ShortenerError::malformed(e.to_string()))?;
    if request.url.trim().is_empty() {
        return Err(ShortenerError::malformed(EMPTY_REQUEST));
    }
    Ok(request)
}
