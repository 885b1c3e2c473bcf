//! Endpoint factory: turns one discovered address plus an action into a
//! callable endpoint.
//!
//! Discovery is not trusted to report the right port, so the factory keeps
//! only the host and dials the role's well-known exposed port. Every call
//! carries the caller's externally visible base URL in `X-Forwarded-Host`
//! and the trace id in `X-Request-Id`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use linkgate_core::{
    Action, ErrorBody, InfoResponse, RedirectResponse, RequestContext, ShortenRequest,
    ShortenResponse,
};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;

use super::error::{DispatchError, UNAVAILABLE_MESSAGE};
use super::request::{Call, DispatchResponse};

/// Header carrying the edge-facing base URL to downstream hops.
pub const FORWARDED_HOST_HEADER: &str = "x-forwarded-host";

/// Header carrying the trace id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// ---------------------------------------------------------------------------
// Invoker / Endpoint
// ---------------------------------------------------------------------------

/// Performs one call against one backend instance.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(
        &self,
        call: &Call,
        ctx: &RequestContext,
    ) -> Result<DispatchResponse, DispatchError>;
}

/// One reachable backend instance for one action. Cheap to clone.
#[derive(Clone)]
pub struct Endpoint {
    address: Arc<str>,
    action: Action,
    invoker: Arc<dyn Invoker>,
}

impl Endpoint {
    #[must_use]
    pub fn new(address: &str, action: Action, invoker: Arc<dyn Invoker>) -> Self {
        Self {
            address: Arc::from(address),
            action,
            invoker,
        }
    }

    /// Address as reported by discovery.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    /// Invokes the endpoint.
    ///
    /// # Errors
    ///
    /// `Internal` if `call` belongs to another action, otherwise whatever the
    /// invoker reports.
    pub async fn invoke(
        &self,
        call: &Call,
        ctx: &RequestContext,
    ) -> Result<DispatchResponse, DispatchError> {
        if call.action() != self.action {
            return Err(DispatchError::Internal(format!(
                "{} call routed to {} endpoint {}",
                call.action(),
                self.action,
                self.address
            )));
        }
        self.invoker.invoke(call, ctx).await
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("address", &self.address)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EndpointFactory
// ---------------------------------------------------------------------------

/// Builds endpoints from discovered addresses.
pub trait EndpointFactory: Send + Sync {
    /// # Errors
    ///
    /// `InvalidAddress` (terminal) when `address` is malformed.
    fn make(&self, address: &str, action: Action) -> Result<Endpoint, DispatchError>;
}

/// Builds HTTP endpoints on a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpEndpointFactory {
    client: reqwest::Client,
    exposed_port: u16,
}

impl HttpEndpointFactory {
    /// Builds a factory with its own client. Redirects are never followed:
    /// a resolve answer is data for the gateway, not a hop.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(exposed_port: u16, connect_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self::with_client(client, exposed_port))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, exposed_port: u16) -> Self {
        Self {
            client,
            exposed_port,
        }
    }
}

impl EndpointFactory for HttpEndpointFactory {
    fn make(&self, address: &str, action: Action) -> Result<Endpoint, DispatchError> {
        let host = host_of(address)?;
        let base = Url::parse(&format!("http://{host}:{}/", self.exposed_port)).map_err(|e| {
            DispatchError::InvalidAddress {
                address: address.to_string(),
                reason: e.to_string(),
            }
        })?;
        let invoker = HttpInvoker {
            client: self.client.clone(),
            base,
            route: Route::for_action(action),
        };
        Ok(Endpoint::new(address, action, Arc::new(invoker)))
    }
}

/// Extracts the host from `host`, `host:port`, or `[v6]:port`.
///
/// More than one unbracketed colon, an empty host, or a non-numeric port
/// make the address malformed.
fn host_of(address: &str) -> Result<String, DispatchError> {
    let invalid = |reason: &str| DispatchError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = address.trim();
    let (host, port) = if let Some(rest) = trimmed.strip_prefix('[') {
        let (inner, tail) = rest
            .split_once(']')
            .ok_or_else(|| invalid("unterminated IPv6 bracket"))?;
        let port = match tail {
            "" => None,
            t => Some(t.strip_prefix(':').ok_or_else(|| invalid("garbage after IPv6 bracket"))?),
        };
        (format!("[{inner}]"), port)
    } else {
        let parts: Vec<&str> = trimmed.split(':').collect();
        match parts.as_slice() {
            [host] => ((*host).to_string(), None),
            [host, port] => ((*host).to_string(), Some(*port)),
            _ => return Err(invalid("got wrong address from service discovery")),
        }
    };

    if host.is_empty() || host == "[]" {
        return Err(invalid("empty host"));
    }
    if let Some(port) = port {
        port.parse::<u16>().map_err(|_| invalid("port is not a number"))?;
    }
    Ok(host)
}

// ---------------------------------------------------------------------------
// HttpInvoker
// ---------------------------------------------------------------------------

/// Wire shape of one action on a backend role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// `GET /{code}`, answered with `{"URL"}` when forwarded.
    Redirect,
    /// `GET /info/{code}`
    Info,
    /// `POST /` with `{"URL"}`
    Shorten,
}

impl Route {
    fn for_action(action: Action) -> Self {
        match action {
            Action::Resolve => Route::Redirect,
            Action::Info => Route::Info,
            Action::Shorten => Route::Shorten,
        }
    }
}

struct HttpInvoker {
    client: reqwest::Client,
    base: Url,
    route: Route,
}

impl HttpInvoker {
    fn url_with(&self, segments: &[&str]) -> Result<Url, DispatchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| DispatchError::Internal(format!("{} cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, builder: reqwest::RequestBuilder, ctx: &RequestContext) -> reqwest::RequestBuilder {
        let mut builder = builder.header(REQUEST_ID_HEADER, &ctx.trace_id);
        if !ctx.forwarded_base.is_empty() {
            builder = builder.header(FORWARDED_HOST_HEADER, &ctx.forwarded_base);
        }
        builder
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    async fn invoke(
        &self,
        call: &Call,
        ctx: &RequestContext,
    ) -> Result<DispatchResponse, DispatchError> {
        match (self.route, call) {
            (Route::Redirect, Call::Resolve { short_code }) => {
                let url = self.url_with(&[short_code.as_str()])?;
                let resp = self
                    .request(self.client.get(url), ctx)
                    .send()
                    .await
                    .map_err(transport_err)?;
                // A backend that was not told it is behind a gateway redirects instead.
                if resp.status().is_redirection() {
                    if let Some(location) = resp
                        .headers()
                        .get(reqwest::header::LOCATION)
                        .and_then(|v| v.to_str().ok())
                    {
                        return Ok(DispatchResponse::Resolved(RedirectResponse {
                            url: location.to_string(),
                        }));
                    }
                }
                decode::<RedirectResponse>(resp).await.map(DispatchResponse::Resolved)
            }
            (Route::Info, Call::Info { short_code }) => {
                let url = self.url_with(&["info", short_code.as_str()])?;
                let resp = self
                    .request(self.client.get(url), ctx)
                    .send()
                    .await
                    .map_err(transport_err)?;
                decode::<InfoResponse>(resp).await.map(DispatchResponse::Info)
            }
            (Route::Shorten, Call::Shorten { long_url }) => {
                let body = ShortenRequest {
                    url: long_url.clone(),
                };
                let resp = self
                    .request(self.client.post(self.base.clone()), ctx)
                    .json(&body)
                    .send()
                    .await
                    .map_err(transport_err)?;
                decode::<ShortenResponse>(resp).await.map(DispatchResponse::Shortened)
            }
            (route, call) => Err(DispatchError::Internal(format!(
                "{route:?} route cannot carry a {} call",
                call.action()
            ))),
        }
    }
}

fn transport_err(err: reqwest::Error) -> DispatchError {
    if err.is_timeout() {
        DispatchError::Transport(format!("timed out: {err}"))
    } else {
        DispatchError::Transport(err.to_string())
    }
}

/// Maps a backend response to a payload or a classified error.
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, DispatchError> {
    let status = resp.status();
    if status.is_success() {
        return resp
            .json::<T>()
            .await
            .map_err(|e| DispatchError::Transport(format!("invalid response body: {e}")));
    }

    let body = resp
        .text()
        .await
        .map_err(|e| DispatchError::Transport(format!("unreadable error body ({status}): {e}")))?;
    let message = serde_json::from_str::<ErrorBody>(&body).map_or(body, |b| b.error);
    Err(match status {
        StatusCode::BAD_REQUEST => DispatchError::MalformedInput(message),
        StatusCode::NOT_FOUND => DispatchError::NotFound(message),
        // A downstream gateway with nothing to dispatch to.
        StatusCode::GATEWAY_TIMEOUT => DispatchError::NoEndpointsAvailable,
        _ if message == UNAVAILABLE_MESSAGE => DispatchError::NoEndpointsAvailable,
        _ => DispatchError::Upstream(format!("{status}: {message}")),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
