//! Building a request [`Context`] from transport headers.

use apollo_gateway::Context;
use axum::http::HeaderMap;

/// Turns the headers of an HTTP request (or of a WebSocket upgrade request)
/// into the context handed to resolvers.
///
/// Implemented for closures:
///
/// ```
/// use apollo_gateway::Context;
/// use apollo_gateway_server::ContextExtractor;
/// use axum::http::HeaderMap;
///
/// struct Locale(String);
///
/// let extractor = |headers: &HeaderMap| {
///     let locale = headers
///         .get("accept-language")
///         .and_then(|value| value.to_str().ok())
///         .unwrap_or("en");
///     Context::new().with(Locale(locale.to_owned()))
/// };
/// let context = extractor.extract(&HeaderMap::new());
/// assert_eq!(context.get::<Locale>().unwrap().0, "en");
/// ```
pub trait ContextExtractor: Send + Sync + 'static {
    fn extract(&self, headers: &HeaderMap) -> Context;
}

impl<F> ContextExtractor for F
where
    F: Fn(&HeaderMap) -> Context + Send + Sync + 'static,
{
    fn extract(&self, headers: &HeaderMap) -> Context {
        self(headers)
    }
}

/// Stores the raw headers and nothing else
#[derive(Debug, Clone, Copy, Default)]
pub struct RawHeaders;

impl ContextExtractor for RawHeaders {
    fn extract(&self, headers: &HeaderMap) -> Context {
        Context::new().with(headers.clone())
    }
}
