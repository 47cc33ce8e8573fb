//! Axum extractor for the per-request [`RequestContext`].

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use http::request::Parts;
use svctmpl_core::RequestContext;

/// The request's context as installed by the correlation middleware.
///
/// Never rejects: a request that bypassed the middleware yields an empty
/// context, and loggers derived from it simply carry no request fields.
#[derive(Debug, Clone, Default)]
pub struct Ctx(pub RequestContext);

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<RequestContext>()
                .cloned()
                .unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use svctmpl_core::CorrelationId;

    use super::*;

    #[tokio::test]
    async fn reads_installed_context() {
        let ctx = RequestContext::new().with_correlation_id(CorrelationId::new("abc-123").unwrap());
        let (mut parts, ()) = http::Request::builder()
            .extension(ctx)
            .body(())
            .unwrap()
            .into_parts();

        let Ctx(seen) = Ctx::from_request_parts(&mut parts, &()).await.unwrap();

        assert_eq!(seen.correlation_id().unwrap().as_str(), "abc-123");
    }

    #[tokio::test]
    async fn missing_context_yields_empty_one() {
        let (mut parts, ()) = http::Request::new(()).into_parts();

        let Ctx(seen) = Ctx::from_request_parts(&mut parts, &()).await.unwrap();

        assert!(seen.correlation_id().is_none());
        assert!(seen.fields().is_empty());
    }
}
