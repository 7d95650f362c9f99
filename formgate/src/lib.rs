//! formgate: CSRF-protected form lifecycle for server-rendered HTML applications
//!
//! formgate owns everything between rendering a form and trusting its
//! submission:
//!
//! - **Signed single-use tokens** - every page with forms gets one grant,
//!   injected into each `<form>` as a hidden field during a render pass
//! - **Keep-alive refresh** - a client-side timer extends the grant with its
//!   own chain of single-use tokens, so long-lived pages keep working
//! - **Session-scoped form registry** - submissions are validated against
//!   the field set that was actually rendered, never the browser's claims
//! - **Fused validation and coercion** - field rules check and retype values
//!   in one pass, with group-level rules for radio buttons and selects
//!
//! Grants are strictly single-use: any submission attempt - valid, forged,
//! or expired - spends the page grant, and the form must be re-rendered
//! under a fresh one.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use axum::{routing::{get, post}, Extension, Router};
//! use formgate::config::FormgateConfig;
//! use formgate::csrf::CsrfEngine;
//! use formgate::middleware::{CsrfInjectLayer, SessionLayer};
//! use formgate::session::SessionStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = FormgateConfig::load()?;
//!     let engine = CsrfEngine::new(&config.csrf);
//!     let sessions = SessionStore::new();
//!
//!     let app = Router::new()
//!         .route("/", get(index))
//!         .route("/csrf/keepalive/{page}", post(formgate::handlers::keep_alive))
//!         .layer(CsrfInjectLayer::new(engine.clone()))
//!         .layer(SessionLayer::with_settings(sessions, config.session.clone()))
//!         .layer(Extension(engine));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//!
//! async fn index() -> axum::response::Html<&'static str> {
//!     axum::response::Html(
//!         "<html><body><form method=\"post\" action=\"/\">\
//!          <input type=\"text\" name=\"note\" /></form></body></html>",
//!     )
//! }
//! ```
//!
//! The render pass rewrites the response, adding a hidden `csrf_token` field
//! to the form and a keep-alive script before `</body>`. Validating the
//! submission later is one call against the same session:
//!
//! ```rust
//! use formgate::config::CsrfSettings;
//! use formgate::csrf::CsrfEngine;
//! use formgate::session::SessionHandle;
//!
//! let engine = CsrfEngine::new(&CsrfSettings {
//!     secret: "a-long-confidential-value".into(),
//!     ..CsrfSettings::default()
//! });
//! let session = SessionHandle::new();
//!
//! let scope = engine.scope(session.clone());
//! let html = scope.inject("<body><form action=\"/save\">...</form></body>");
//! assert!(html.contains("name=\"csrf_token\""));
//! ```

// Public modules (exported in public API)
pub mod clock;
pub mod config;
pub mod csrf;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod middleware;
pub mod session;

pub mod prelude {
    //! Convenience re-exports for common types and traits
    //!
    //! ```rust
    //! use formgate::prelude::*;
    //! ```

    // Token lifecycle
    pub use crate::csrf::{CsrfEngine, CsrfScope, SignedToken, TokenCodec, KEEP_ALIVE_PREFIX};

    // Form handling
    pub use crate::forms::{
        FieldBuilder, FieldConstraints, FieldDefinition, FieldFlags, FieldKind, FormBuilder,
        FormDefinition, FormMethod, FormRef, SelectOption, ValidationOutcome,
    };

    // Session plumbing
    pub use crate::session::{SessionHandle, SessionId, SessionStore};

    // Middleware
    pub use crate::middleware::{CsrfInjectLayer, SessionLayer};

    // Configuration
    pub use crate::config::{CsrfSettings, FormgateConfig, SessionSettings};

    // Error types
    pub use crate::error::{CsrfError, FormError};

    // Time sources
    pub use crate::clock::{Clock, ManualClock, SystemClock};
}
