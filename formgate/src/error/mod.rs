//! Error types for token and form processing.
//!
//! Token failures never abort a request: they are recovered locally into a
//! validation outcome, and the caller re-renders the form under a fresh
//! grant. The one variant callers may want to special-case is
//! [`CsrfError::MissingCsrfField`], which signals a form rendered without a
//! token field (a developer error) rather than a bad token (a user or attack
//! scenario).

use thiserror::Error;

/// Token lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsrfError {
    /// Token string does not have the `name-nonce-signature` shape.
    #[error("malformed token")]
    MalformedToken,

    /// Signature did not verify against the configured secret.
    #[error("token signature mismatch")]
    BadSignature,

    /// No live grant exists for the page the token names.
    #[error("unknown or expired form grant")]
    UnknownOrExpiredGrant,

    /// A submission required a token but carried no token field at all.
    #[error("no CSRF form field was found")]
    MissingCsrfField,

    /// Keep-alive token was invalid or carried the wrong name prefix.
    #[error("keep-alive token rejected")]
    KeepAliveRejected,
}

/// Form registry and dispatch failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    /// No registered definition exists for the submitted page and form id.
    #[error("form definition {page}.{form_id} was not found")]
    UnknownForm {
        /// Page name the submission claimed.
        page: String,
        /// Form id the submission claimed.
        form_id: String,
    },
}
