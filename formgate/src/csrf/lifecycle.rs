//! Grant lifecycle: render-pass injection, keep-alive refresh, and
//! single-use submission validation.
//!
//! Each page-name grant moves through `Unissued -> Issued -> Consumed |
//! Expired`. A keep-alive ping refreshes an issued grant in place, paid for
//! with its own chain of single-use keep-alive tokens. Consumption is
//! unconditional: a submission attempt spends the grant whether or not the
//! token checks out, so a forger gets exactly one guess per grant.

use crate::clock::{Clock, SystemClock};
use crate::config::CsrfSettings;
use crate::csrf::token::{SignedToken, TokenCodec};
use crate::error::{CsrfError, FormError};
use crate::forms::registry::FormDefinition;
use crate::forms::validate::{validate_fields, ValidationOutcome};
use crate::session::{SessionHandle, SessionState};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// Name prefix that scopes keep-alive tokens away from page grants.
pub const KEEP_ALIVE_PREFIX: &str = "keepalive_";

static FORM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<form([^>]*)>(.*?)</form>").expect("form pattern"));
static BODY_CLOSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</body>").expect("body pattern"));

/// Attribute that opts a form out of token injection.
const OPT_OUT_ATTR: &str = "data-no-csrf";

/// Long-lived grant engine built from configuration.
#[derive(Clone)]
pub struct CsrfEngine {
    codec: TokenCodec,
    timeout: Duration,
    form_field: String,
    form_ref_field: String,
    keep_alive_path: String,
    clock: Arc<dyn Clock>,
    existing_field_re: Regex,
}

impl std::fmt::Debug for CsrfEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfEngine")
            .field("codec", &self.codec)
            .field("timeout", &self.timeout)
            .field("form_field", &self.form_field)
            .field("form_ref_field", &self.form_ref_field)
            .field("keep_alive_path", &self.keep_alive_path)
            .finish_non_exhaustive()
    }
}

impl CsrfEngine {
    /// Create an engine over the wall clock.
    #[must_use]
    pub fn new(settings: &CsrfSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    /// Create an engine over an explicit clock.
    #[must_use]
    pub fn with_clock(settings: &CsrfSettings, clock: Arc<dyn Clock>) -> Self {
        let existing_field_re = Regex::new(&format!(
            r#"(?is)<input[^>]*name\s*=\s*["']{}["'][^>]*>"#,
            regex::escape(&settings.form_field)
        ))
        .expect("token field pattern");

        Self {
            codec: TokenCodec::new(settings.secret.as_bytes().to_vec()),
            timeout: Duration::seconds(
                i64::try_from(settings.token_timeout_secs).unwrap_or(i64::MAX),
            ),
            form_field: settings.form_field.clone(),
            form_ref_field: settings.form_ref_field.clone(),
            keep_alive_path: settings.keep_alive_path.clone(),
            clock,
            existing_field_re,
        }
    }

    /// Begin a request-scoped view over one session.
    #[must_use]
    pub fn scope(&self, session: SessionHandle) -> CsrfScope {
        CsrfScope {
            engine: self.clone(),
            session,
            page_name: OnceLock::new(),
            swept: AtomicBool::new(false),
            next_form_index: AtomicUsize::new(0),
        }
    }
}

/// Request-scoped orchestration over one session's grants and forms.
///
/// One scope corresponds to one request: the expired-grant sweep runs at
/// most once per scope, and every form rendered through the scope shares a
/// single page name — and therefore a single grant. Submitting any form on
/// the page spends that grant for all of its siblings.
pub struct CsrfScope {
    engine: CsrfEngine,
    session: SessionHandle,
    page_name: OnceLock<String>,
    swept: AtomicBool,
    next_form_index: AtomicUsize,
}

impl std::fmt::Debug for CsrfScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfScope")
            .field("page_name", &self.page_name.get())
            .finish_non_exhaustive()
    }
}

impl CsrfScope {
    /// Session this scope operates on.
    #[must_use]
    pub const fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Shared grant name for every form rendered through this scope.
    #[must_use]
    pub fn page_name(&self) -> String {
        self.page_name
            .get_or_init(|| format!("csrf_{}", Uuid::new_v4().simple()))
            .clone()
    }

    /// Name of the hidden input carrying the page/form reference.
    #[must_use]
    pub fn form_ref_field(&self) -> &str {
        &self.engine.form_ref_field
    }

    /// Name of the hidden input carrying the token.
    #[must_use]
    pub fn form_field(&self) -> &str {
        &self.engine.form_field
    }

    pub(crate) fn next_form_id(&self) -> String {
        format!(
            "form_{}",
            self.next_form_index.fetch_add(1, Ordering::Relaxed)
        )
    }

    pub(crate) fn register(&self, definition: FormDefinition) {
        self.session.lock().forms.register(definition);
    }

    /// Rewrite an outgoing HTML document: every `<form>` lacking the
    /// `data-no-csrf` marker and lacking a pre-existing token field gets a
    /// hidden token input, all sharing one page grant. When at least one
    /// token was injected, a keep-alive script carrying its own single-use
    /// token is added before `</body>`.
    #[must_use]
    pub fn inject(&self, html: &str) -> String {
        let mut state = self.session.lock();
        self.sweep(&mut state);
        let now = self.engine.clock.now();
        let page = self.page_name();

        let mut out = String::with_capacity(html.len() + 256);
        let mut last = 0;
        let mut page_token: Option<SignedToken> = None;

        for captures in FORM_RE.captures_iter(html) {
            let whole = captures.get(0).expect("whole match");
            let attrs = captures.get(1).map_or("", |m| m.as_str());
            let body = captures.get(2).map_or("", |m| m.as_str());

            out.push_str(&html[last..whole.start()]);
            last = whole.end();

            if attrs.to_ascii_lowercase().contains(OPT_OUT_ATTR)
                || self.engine.existing_field_re.is_match(body)
            {
                out.push_str(whole.as_str());
                continue;
            }

            // One grant per page, one token value shared by every form.
            let token = page_token.get_or_insert_with(|| {
                state.grants.put(&page, now, self.engine.timeout);
                tracing::debug!(page = %page, "page grant issued");
                self.engine.codec.issue(&page)
            });

            out.push_str("<form");
            out.push_str(attrs);
            out.push('>');
            out.push_str(&format!(
                "<input type=\"hidden\" name=\"{}\" value=\"{token}\" />",
                self.engine.form_field
            ));
            out.push_str(body);
            out.push_str("</form>");
        }
        out.push_str(&html[last..]);

        if page_token.is_some() {
            if let Some(at) = BODY_CLOSE_RE.find(&out).map(|m| m.start()) {
                let keep_alive = self.grant_keep_alive(&mut state, now);
                let script = self.keep_alive_script(&page, &keep_alive);
                out.insert_str(at, &script);
            }
        }

        out
    }

    /// Extend the page grant from a keep-alive ping.
    ///
    /// The presented token must verify, carry the keep-alive name prefix and
    /// name a live grant; it is spent either way. On success the page grant
    /// is extended to `now + timeout` — never further — and a fresh
    /// keep-alive token is returned for the next ping.
    ///
    /// # Errors
    ///
    /// [`CsrfError::KeepAliveRejected`] when the token is invalid, and
    /// [`CsrfError::UnknownOrExpiredGrant`] when the page grant is gone.
    pub fn keep_alive(&self, page_name: &str, token: &str) -> Result<SignedToken, CsrfError> {
        let mut state = self.session.lock();
        self.sweep(&mut state);
        let now = self.engine.clock.now();

        let name = self.engine.codec.verify(token).map_err(|error| {
            tracing::warn!(%error, "keep-alive token failed verification");
            CsrfError::KeepAliveRejected
        })?;
        if !name.starts_with(KEEP_ALIVE_PREFIX) {
            tracing::warn!(name = %name, "keep-alive token named a non-keep-alive grant");
            return Err(CsrfError::KeepAliveRejected);
        }
        if !state.grants.is_live(&name, now) {
            return Err(CsrfError::KeepAliveRejected);
        }
        state.grants.consume(&name);

        if !state.grants.touch(page_name, now, self.engine.timeout) {
            tracing::warn!(page = %page_name, "keep-alive for a page with no live grant");
            return Err(CsrfError::UnknownOrExpiredGrant);
        }
        tracing::debug!(page = %page_name, "page grant extended by keep-alive");
        Ok(self.grant_keep_alive(&mut state, now))
    }

    /// Check a submission's token against the page grant.
    ///
    /// Single-use regardless of outcome: the page grant and its form
    /// definitions are cleared on every attempt, so a grant cannot be used
    /// to brute-force signatures.
    ///
    /// # Errors
    ///
    /// [`CsrfError::MissingCsrfField`] when no token field is present at
    /// all — distinguishing a form rendered without a token (a developer
    /// error) from a bad token, which fails closed as `Ok(false)`.
    pub fn validate_token(
        &self,
        page_name: &str,
        values: &mut Map<String, Value>,
    ) -> Result<bool, CsrfError> {
        let mut state = self.session.lock();
        self.sweep(&mut state);
        self.check_token(&mut state, page_name, values)
    }

    /// Validate a submission end to end: token check (when the form requires
    /// one) followed by field validation against the registered definition.
    ///
    /// A failed token check is reported as a validation error in the
    /// outcome, alongside field errors; it never aborts the request.
    ///
    /// # Errors
    ///
    /// [`FormError::UnknownForm`] when no definition is registered for
    /// `(page_name, form_id)` — including after the page grant was already
    /// consumed.
    pub fn validate_submission(
        &self,
        page_name: &str,
        form_id: &str,
        values: &mut Map<String, Value>,
    ) -> Result<ValidationOutcome, FormError> {
        values.remove(&self.engine.form_ref_field);

        let mut outcome = ValidationOutcome::default();
        let definition = {
            let mut state = self.session.lock();
            self.sweep(&mut state);

            let Some(definition) = state.forms.lookup(page_name, form_id).cloned() else {
                return Err(FormError::UnknownForm {
                    page: page_name.to_owned(),
                    form_id: form_id.to_owned(),
                });
            };

            if definition.csrf_checked() {
                match self.check_token(&mut state, page_name, values) {
                    Ok(true) => {}
                    Ok(false) => outcome.fail("Form failed CSRF validation."),
                    Err(error) => outcome.fail(error.to_string()),
                }
            }
            definition
        };

        if outcome.is_valid() {
            validate_fields(&definition, values, &mut outcome);
        }
        Ok(outcome)
    }

    fn check_token(
        &self,
        state: &mut SessionState,
        page_name: &str,
        values: &mut Map<String, Value>,
    ) -> Result<bool, CsrfError> {
        let now = self.engine.clock.now();

        let raw = values
            .get(&self.engine.form_field)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(CsrfError::MissingCsrfField)?;
        values.remove(&self.engine.form_field);

        let verified = self.engine.codec.verify(&raw);
        let passed = match &verified {
            Ok(name) => name == page_name && state.grants.is_live(name, now),
            Err(_) => false,
        };

        state.grants.consume(page_name);
        state.forms.clear(page_name);

        match verified {
            Err(error) => tracing::warn!(%error, page = %page_name, "rejected form token"),
            Ok(_) if !passed => {
                tracing::warn!(page = %page_name, "form token named an unknown or expired grant");
            }
            Ok(_) => {}
        }
        Ok(passed)
    }

    fn sweep(&self, state: &mut SessionState) {
        if self.swept.swap(true, Ordering::Relaxed) {
            return;
        }
        let now = self.engine.clock.now();
        for name in state.grants.sweep_expired(now) {
            state.forms.clear(&name);
            tracing::debug!(grant = %name, "expired grant removed");
        }
    }

    fn grant_keep_alive(&self, state: &mut SessionState, now: DateTime<Utc>) -> SignedToken {
        let name = format!("{KEEP_ALIVE_PREFIX}{}", Uuid::new_v4().simple());
        state.grants.put(&name, now, self.engine.timeout);
        self.engine.codec.issue(&name)
    }

    fn keep_alive_script(&self, page: &str, token: &SignedToken) -> String {
        // Ping 30 seconds ahead of expiry so a healthy client never lapses.
        let interval_ms = (self.engine.timeout.num_seconds() - 30).max(1) * 1000;
        let url = format!("{}/{page}", self.engine.keep_alive_path);
        format!(
            "<script>(function(){{\
var u=\"{url}\",t=\"{token}\",d={interval_ms};\
function ping(){{\
var r=new XMLHttpRequest();\
r.open(\"POST\",u,true);\
r.setRequestHeader(\"Content-Type\",\"application/x-www-form-urlencoded\");\
r.onload=function(){{\
var x=r.responseText;\
if(x&&x!==\"false\"){{t=x;setTimeout(ping,d);}}\
}};\
r.send(\"token=\"+encodeURIComponent(t));\
}}\
setTimeout(ping,d);\
}})();</script>"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> CsrfEngine {
        CsrfEngine::new(&CsrfSettings {
            secret: "lifecycle-test-secret".to_string(),
            ..CsrfSettings::default()
        })
    }

    fn token_from(html: &str, field: &str) -> String {
        let pattern = format!(r#"name="{field}" value="([^"]+)""#);
        Regex::new(&pattern)
            .unwrap()
            .captures(html)
            .expect("injected token")[1]
            .to_string()
    }

    #[test]
    fn inject_adds_hidden_field_and_script() {
        let scope = engine().scope(SessionHandle::new());
        let html = scope.inject("<html><body><form action=\"/a\">x</form></body></html>");

        assert!(html.contains("name=\"csrf_token\""));
        assert!(html.contains("<script>"));
        assert!(html.contains(&format!("/csrf/keepalive/{}", scope.page_name())));
        // Script lands before the closing body tag.
        assert!(html.find("<script>").unwrap() < html.find("</body>").unwrap());
    }

    #[test]
    fn inject_shares_one_token_across_forms() {
        let scope = engine().scope(SessionHandle::new());
        let html = scope.inject(
            "<body><form action=\"/a\">x</form><form action=\"/b\">y</form></body>",
        );

        let token = token_from(&html, "csrf_token");
        assert_eq!(html.matches(&token).count(), 2);
        assert_eq!(scope.session().lock().grants.len(), 2); // page + keep-alive
    }

    #[test]
    fn inject_skips_opted_out_and_already_tokened_forms() {
        let scope = engine().scope(SessionHandle::new());
        let html = scope.inject(
            "<form data-no-csrf>x</form>\
             <form><input type=\"hidden\" name=\"csrf_token\" value=\"mine\" />y</form>",
        );

        assert!(html.contains("value=\"mine\""));
        // Neither form took a grant, so no page grant exists.
        assert!(scope.session().lock().grants.is_empty());
    }

    #[test]
    fn formless_documents_are_untouched() {
        let scope = engine().scope(SessionHandle::new());
        let html = "<html><body><p>No forms here.</p></body></html>";
        assert_eq!(scope.inject(html), html);
    }

    #[test]
    fn validate_token_is_single_use_even_on_failure() {
        let engine = engine();
        let session = SessionHandle::new();
        let render = engine.scope(session.clone());
        let html = render.inject("<body><form>x</form></body>");
        let page = render.page_name();

        // A forged token spends the grant...
        let submit = engine.scope(session.clone());
        let mut values = Map::new();
        values.insert("csrf_token".to_string(), json!("page-somenonce-deadbeef"));
        assert_eq!(submit.validate_token(&page, &mut values), Ok(false));

        // ...so the genuine token no longer validates.
        let token = token_from(&html, "csrf_token");
        let retry = engine.scope(session);
        let mut values = Map::new();
        values.insert("csrf_token".to_string(), json!(token));
        assert_eq!(retry.validate_token(&page, &mut values), Ok(false));
    }

    #[test]
    fn missing_token_field_is_a_distinct_error() {
        let engine = engine();
        let session = SessionHandle::new();
        let render = engine.scope(session.clone());
        let _ = render.inject("<body><form>x</form></body>");
        let page = render.page_name();

        let submit = engine.scope(session.clone());
        let mut values = Map::new();
        assert_eq!(
            submit.validate_token(&page, &mut values),
            Err(CsrfError::MissingCsrfField)
        );

        // Nothing token-shaped was attempted, so the grant survives.
        assert!(!session.lock().grants.is_empty());
    }

    #[test]
    fn keep_alive_rejects_page_tokens() {
        let engine = engine();
        let session = SessionHandle::new();
        let render = engine.scope(session.clone());
        let html = render.inject("<body><form>x</form></body>");
        let page = render.page_name();

        // A page token has a valid signature but the wrong name prefix.
        let page_token = token_from(&html, "csrf_token");
        let ping = engine.scope(session);
        assert_eq!(
            ping.keep_alive(&page, &page_token),
            Err(CsrfError::KeepAliveRejected)
        );
    }
}
