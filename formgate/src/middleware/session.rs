//! Session middleware for automatic session establishment.
//!
//! Extracts the session cookie, resolves (or creates) the session's
//! [`SessionHandle`] from the shared [`SessionStore`], and inserts both the
//! [`SessionId`] and the handle into the request extensions for downstream
//! layers and handlers. New sessions get a `Set-Cookie` on the way out.

use crate::config::SessionSettings;
use crate::session::{SessionHandle, SessionId, SessionStore};
use axum::{
    body::Body,
    extract::Request,
    http::header::{COOKIE, SET_COOKIE},
    http::HeaderValue,
    response::Response,
};
use std::str::FromStr;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Layer that establishes a session for every request.
#[derive(Clone, Debug)]
pub struct SessionLayer {
    settings: SessionSettings,
    store: SessionStore,
}

impl SessionLayer {
    /// Create a session layer with default settings.
    #[must_use]
    pub fn new(store: SessionStore) -> Self {
        Self {
            settings: SessionSettings::default(),
            store,
        }
    }

    /// Create a session layer with custom settings.
    #[must_use]
    pub const fn with_settings(store: SessionStore, settings: SessionSettings) -> Self {
        Self { settings, store }
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionMiddleware {
            inner,
            settings: self.settings.clone(),
            store: self.store.clone(),
        }
    }
}

/// Middleware that resolves the session handle for each request.
#[derive(Clone, Debug)]
pub struct SessionMiddleware<S> {
    inner: S,
    settings: SessionSettings,
    store: SessionStore,
}

impl<S> Service<Request> for SessionMiddleware<S>
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
        let settings = self.settings.clone();
        let mut inner = self.inner.clone();

        let existing = req
            .headers()
            .get(COOKIE)
            .and_then(|header| header.to_str().ok())
            .and_then(|cookies| cookie_value(cookies, &settings.cookie_name))
            .and_then(|raw| SessionId::from_str(raw).ok());

        let is_new = existing.is_none();
        let session_id = existing.unwrap_or_else(SessionId::generate);
        let handle: SessionHandle = self.store.handle(&session_id);

        req.extensions_mut().insert(session_id.clone());
        req.extensions_mut().insert(handle);

        Box::pin(async move {
            let mut response = inner.call(req).await?;

            if is_new {
                let cookie = format!(
                    "{}={}; Path=/; Max-Age={}; SameSite=Lax{}{}",
                    settings.cookie_name,
                    session_id,
                    settings.max_age_secs,
                    if settings.http_only { "; HttpOnly" } else { "" },
                    if settings.secure { "; Secure" } else { "" },
                );
                if let Ok(value) = HeaderValue::from_str(&cookie) {
                    response.headers_mut().append(SET_COOKIE, value);
                }
            }

            Ok(response)
        })
    }
}

fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').map(str::trim).find_map(|pair| {
        pair.split_once('=')
            .and_then(|(key, value)| (key == name).then_some(value))
    })
}
