//! Response middleware that runs the token render pass over outgoing HTML.
//!
//! A [`CsrfScope`] is created per request and inserted into the request
//! extensions before the handler runs, so form builders and the render pass
//! share one page name. After the handler returns, `text/html` bodies are
//! buffered and rewritten; everything else passes through untouched.

use crate::csrf::lifecycle::{CsrfEngine, CsrfScope};
use crate::session::SessionHandle;
use axum::{body::Body, extract::Request, response::Response};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Layer for the token render pass.
///
/// Requires [`crate::middleware::SessionLayer`] to be applied first.
#[derive(Clone, Debug)]
pub struct CsrfInjectLayer {
    engine: CsrfEngine,
}

impl CsrfInjectLayer {
    /// Create the layer from a configured engine.
    #[must_use]
    pub const fn new(engine: CsrfEngine) -> Self {
        Self { engine }
    }
}

impl<S> Layer<S> for CsrfInjectLayer {
    type Service = CsrfInjectMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CsrfInjectMiddleware {
            inner,
            engine: self.engine.clone(),
        }
    }
}

/// Middleware that injects tokens into outgoing HTML responses.
#[derive(Clone, Debug)]
pub struct CsrfInjectMiddleware<S> {
    inner: S,
    engine: CsrfEngine,
}

impl<S> Service<Request> for CsrfInjectMiddleware<S>
where
    S: Service<Request, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let mut inner = self.inner.clone();

        let Some(session) = req.extensions().get::<SessionHandle>().cloned() else {
            tracing::warn!("token injection requires SessionLayer to be applied first");
            return Box::pin(inner.call(req));
        };

        let scope = Arc::new(self.engine.scope(session));
        req.extensions_mut().insert(Arc::clone(&scope));

        Box::pin(async move {
            let response = inner.call(req).await?;

            if !is_html(&response) {
                return Ok(response);
            }

            let (mut parts, body) = response.into_parts();
            let bytes = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(error) => {
                    // The body stream already failed mid-flight; there is
                    // nothing left to rewrite or forward.
                    tracing::warn!(%error, "failed to buffer html response body");
                    parts.headers.remove(CONTENT_LENGTH);
                    return Ok(Response::from_parts(parts, Body::empty()));
                }
            };

            match String::from_utf8(bytes.to_vec()) {
                Ok(html) => {
                    let rewritten = scope.inject(&html);
                    parts.headers.remove(CONTENT_LENGTH);
                    Ok(Response::from_parts(parts, Body::from(rewritten)))
                }
                // Mislabeled non-utf8 payload: forward unchanged.
                Err(_) => Ok(Response::from_parts(parts, Body::from(bytes))),
            }
        })
    }
}

/// Alias for the per-request scope as stored in the request extensions.
pub type SharedCsrfScope = Arc<CsrfScope>;

fn is_html(response: &Response<Body>) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.starts_with("text/html"))
}
