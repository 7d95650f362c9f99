//! Token lifecycle: signed tokens, the per-session grant store, and the
//! render-pass / keep-alive / validation orchestration on top of them.

pub mod lifecycle;
pub mod store;
pub mod token;

pub use lifecycle::{CsrfEngine, CsrfScope, KEEP_ALIVE_PREFIX};
pub use store::{GrantEntry, TokenStore};
pub use token::{SignedToken, TokenCodec};
