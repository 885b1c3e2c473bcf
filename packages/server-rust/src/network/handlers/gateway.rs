//! Gateway role handlers: decode, dispatch through the pipeline, encode.
//!
//! Status mapping: success 200 (resolve 308 + `Location`), soft fallback
//! 503 with the fallback body, everything else through [`ApiError`].

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tower::ServiceExt;

use super::backend::parse_shorten;
use super::{gateway_context, ApiError, GatewayState};
use crate::dispatch::{BreakerSnapshot, Call, DispatchRequest, DispatchResponse};

/// `POST /`
pub async fn gateway_shorten_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = parse_shorten(&body)?;
    dispatch(
        &state,
        &headers,
        Call::Shorten {
            long_url: request.url,
        },
    )
    .await
}

/// `GET /{short_code}`
pub async fn gateway_resolve_handler(
    State(state): State<GatewayState>,
    Path(short_code): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    dispatch(&state, &headers, Call::Resolve { short_code }).await
}

/// `GET /info/{short_code}`
pub async fn gateway_info_handler(
    State(state): State<GatewayState>,
    Path(short_code): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    dispatch(&state, &headers, Call::Info { short_code }).await
}

/// `GET /debug/breakers`
pub async fn breakers_handler(State(state): State<GatewayState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.gateway.breaker_snapshots())
}

async fn dispatch(
    state: &GatewayState,
    headers: &HeaderMap,
    call: Call,
) -> Result<Response, ApiError> {
    let ctx = gateway_context(headers, &state.app.config);
    let request = DispatchRequest::new(call, ctx);
    let response = state.pipeline.clone().oneshot(request).await?;
    Ok(encode(response))
}

fn encode(response: DispatchResponse) -> Response {
    match response {
        DispatchResponse::Resolved(redirect) => {
            (StatusCode::PERMANENT_REDIRECT, [(LOCATION, redirect.url)]).into_response()
        }
        DispatchResponse::Info(info) => Json(info).into_response(),
        DispatchResponse::Shortened(shortened) => Json(shortened).into_response(),
        DispatchResponse::Fallback(fallback) => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(fallback)).into_response()
        }
    }
}
