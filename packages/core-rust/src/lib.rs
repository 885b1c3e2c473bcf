//! `linkgate` core: short-code codec, record and wire types, and request context.

pub mod codec;
pub mod context;
pub mod error;
pub mod types;

pub use codec::{decode, encode, CodecError};
pub use context::RequestContext;
pub use error::ShortenerError;
pub use types::{
    Action, ErrorBody, FallbackResponse, HealthResponse, InfoResponse, RedirectResponse,
    ShortUrlRecord, ShortenRequest, ShortenResponse,
};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
