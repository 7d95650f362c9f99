//! HTTP endpoints backing the client-side token machinery.

use crate::csrf::lifecycle::CsrfEngine;
use crate::session::SessionHandle;
use axum::extract::{Extension, Form, Path};
use serde::Deserialize;

/// Sentinel body that tells the client-side keep-alive timer to stop.
pub const KEEP_ALIVE_STOP: &str = "false";

/// Body of a keep-alive ping.
#[derive(Debug, Deserialize)]
pub struct KeepAliveForm {
    /// The current keep-alive token.
    pub token: String,
}

/// Keep-alive endpoint.
///
/// Mount it under the configured keep-alive path with a trailing page-name
/// segment (e.g. `/csrf/keepalive/{page}`), behind the session layer, with
/// the [`CsrfEngine`] available as an extension. Returns the next keep-alive
/// token as a bare string, or the literal `"false"` on failure so the
/// client-side script stops retrying.
pub async fn keep_alive(
    Path(page_name): Path<String>,
    Extension(engine): Extension<CsrfEngine>,
    Extension(session): Extension<SessionHandle>,
    Form(form): Form<KeepAliveForm>,
) -> String {
    let scope = engine.scope(session);
    match scope.keep_alive(&page_name, &form.token) {
        Ok(token) => token.to_string(),
        Err(error) => {
            tracing::warn!(%error, page = %page_name, "keep-alive rejected");
            KEEP_ALIVE_STOP.to_owned()
        }
    }
}
