//! Form builder API with fluent interface.
//!
//! Builds the HTML for a form and, in the same step, records its
//! [`FormDefinition`] in the session registry so a later submission is
//! validated against what was actually rendered. The hidden form-ref field
//! ties the submission back to that record; the token field itself is added
//! by the render pass, not here.

use crate::csrf::lifecycle::CsrfScope;
use crate::forms::field::{FieldConstraints, FieldDefinition, FieldFlags, FieldKind, SelectOption};
use crate::forms::registry::{FormDefinition, FormMethod, FormRef};

/// Builder for a single form.
///
/// # Examples
///
/// ```rust,no_run
/// use formgate::forms::{FieldKind, FormBuilder, FormMethod};
/// # use formgate::config::CsrfSettings;
/// # use formgate::csrf::CsrfEngine;
/// # use formgate::session::SessionHandle;
///
/// # let engine = CsrfEngine::new(&CsrfSettings { secret: "secret".into(), ..Default::default() });
/// # let scope = engine.scope(SessionHandle::new());
/// let html = FormBuilder::new("/contact", FormMethod::Post)
///     .handler("contact::submit")
///     .field("email", FieldKind::Email)
///         .label("Email Address")
///         .required()
///         .done()
///     .field("message", FieldKind::Textarea)
///         .required()
///         .done()
///     .submit("Send")
///     .build(&scope);
/// ```
#[derive(Debug, Clone)]
pub struct FormBuilder {
    action: String,
    method: FormMethod,
    id: Option<String>,
    class: Option<String>,
    handler: String,
    requires_csrf: bool,
    fields: Vec<FieldDefinition>,
    submit_text: Option<String>,
}

impl FormBuilder {
    /// Create a new form builder with action and method.
    #[must_use]
    pub fn new(action: impl Into<String>, method: FormMethod) -> Self {
        Self {
            action: action.into(),
            method,
            id: None,
            class: None,
            handler: String::new(),
            requires_csrf: true,
            fields: Vec::new(),
            submit_text: None,
        }
    }

    /// Set the form id. A `form_<n>` id is generated when unset.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the form CSS class.
    #[must_use]
    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// Name the handler that processes submissions of this form.
    #[must_use]
    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = handler.into();
        self
    }

    /// Opt this form out of the token requirement.
    #[must_use]
    pub const fn no_csrf(mut self) -> Self {
        self.requires_csrf = false;
        self
    }

    /// Set the submit button text.
    #[must_use]
    pub fn submit(mut self, text: impl Into<String>) -> Self {
        self.submit_text = Some(text.into());
        self
    }

    /// Add a field of the given kind and return its builder.
    #[must_use]
    pub fn field(self, name: impl Into<String>, kind: FieldKind) -> FieldBuilder {
        FieldBuilder::new(self, FieldDefinition::new(name, kind))
    }

    /// Add a select list with a declared option set.
    #[must_use]
    pub fn select(self, name: impl Into<String>, options: Vec<SelectOption>) -> FieldBuilder {
        self.field(
            name,
            FieldKind::Select {
                options,
                multiple: false,
                placeholder: None,
            },
        )
    }

    /// Add one radio button; buttons sharing a name form a group.
    #[must_use]
    pub fn radio(self, name: impl Into<String>, value: impl Into<String>) -> FieldBuilder {
        self.field(
            name,
            FieldKind::Radio {
                value: value.into(),
            },
        )
    }

    /// Add a checkbox.
    #[must_use]
    pub fn checkbox(self, name: impl Into<String>) -> FieldBuilder {
        self.field(name, FieldKind::Checkbox { value: None })
    }

    /// Add a hidden input. Its validation is left to the handler.
    #[must_use]
    pub fn hidden(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut field = FieldDefinition::new(name, FieldKind::Hidden);
        field.value = Some(value.into());
        self.fields.push(field);
        self
    }

    /// Carry a server-held value that never reaches the browser. It is
    /// injected into the submitted values before validation.
    #[must_use]
    pub fn session_value(
        mut self,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.fields
            .push(FieldDefinition::new(name, FieldKind::SessionValue { value }));
        self
    }

    /// Render the form and record its definition in the session registry.
    #[must_use]
    pub fn build(self, scope: &CsrfScope) -> String {
        let page_name = scope.page_name();
        let form_id = self
            .id
            .clone()
            .unwrap_or_else(|| scope.next_form_id());
        let reference = FormRef::new(page_name.clone(), form_id.clone());

        let mut html = String::with_capacity(256);
        html.push_str("<form method=\"");
        html.push_str(self.method.as_str());
        html.push_str("\" action=\"");
        html.push_str(&escape_attr(&self.action));
        html.push_str("\" id=\"");
        html.push_str(&escape_attr(&form_id));
        html.push('"');
        if let Some(class) = &self.class {
            html.push_str(" class=\"");
            html.push_str(&escape_attr(class));
            html.push('"');
        }
        html.push('>');
        html.push_str(&format!(
            "<input type=\"hidden\" name=\"{}\" value=\"{}\" />",
            escape_attr(scope.form_ref_field()),
            escape_attr(&reference.to_string())
        ));

        for field in &self.fields {
            render_field(field, &mut html);
        }
        if let Some(text) = &self.submit_text {
            html.push_str(&format!(
                "<button type=\"submit\">{}</button>",
                escape_text(text)
            ));
        }
        html.push_str("</form>");

        scope.register(FormDefinition {
            form_id,
            page_name,
            method: self.method,
            handler: self.handler,
            fields: self.fields,
            requires_csrf: self.requires_csrf,
        });

        html
    }
}

/// Builder for one field, returned by [`FormBuilder::field`].
#[derive(Debug, Clone)]
pub struct FieldBuilder {
    form: FormBuilder,
    field: FieldDefinition,
}

impl FieldBuilder {
    fn new(form: FormBuilder, field: FieldDefinition) -> Self {
        Self { form, field }
    }

    /// Set the label text.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.field.label = Some(label.into());
        self
    }

    /// Set the rendered value.
    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.field.value = Some(value.into());
        self
    }

    /// Set the placeholder text.
    #[must_use]
    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.field.placeholder = Some(placeholder.into());
        self
    }

    /// Set a custom element id.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.field.id = Some(id.into());
        self
    }

    /// Mark the field required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.field.flags.required = true;
        self
    }

    /// Mark the field disabled.
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.field.flags.disabled = true;
        self
    }

    /// Set the minimum character length.
    #[must_use]
    pub const fn min_length(mut self, min: usize) -> Self {
        self.field.constraints.min_length = Some(min);
        self
    }

    /// Set the maximum character length.
    #[must_use]
    pub const fn max_length(mut self, max: usize) -> Self {
        self.field.constraints.max_length = Some(max);
        self
    }

    /// Require the whole value to match an anchored pattern.
    #[must_use]
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.field.constraints.pattern = Some(pattern.into());
        self
    }

    /// Set the minimum value (number or ISO date, per kind).
    #[must_use]
    pub fn min(mut self, min: impl Into<String>) -> Self {
        self.field.constraints.min = Some(min.into());
        self
    }

    /// Set the maximum value (number or ISO date, per kind).
    #[must_use]
    pub fn max(mut self, max: impl Into<String>) -> Self {
        self.field.constraints.max = Some(max.into());
        self
    }

    /// Accept integers only (numeric kinds).
    #[must_use]
    pub const fn integer_only(mut self) -> Self {
        self.field.constraints.integer_only = true;
        self
    }

    /// Accept values not declared at render time (scripted option lists).
    #[must_use]
    pub const fn allow_change(mut self) -> Self {
        self.field.constraints.allow_change = true;
        self
    }

    /// Accept a comma-separated list of addresses (email kind).
    #[must_use]
    pub const fn multiple(mut self) -> Self {
        self.field.constraints.multiple = true;
        self
    }

    /// Finish the field and return to the form builder.
    #[must_use]
    pub fn done(mut self) -> FormBuilder {
        self.form.fields.push(self.field);
        self.form
    }
}

fn render_field(field: &FieldDefinition, html: &mut String) {
    if matches!(field.kind, FieldKind::SessionValue { .. }) {
        return;
    }

    if let Some(label) = &field.label {
        html.push_str(&format!(
            "<label for=\"{}\">{}</label>",
            escape_attr(field.effective_id()),
            escape_text(label)
        ));
    }

    match &field.kind {
        FieldKind::Textarea => {
            html.push_str(&format!(
                "<textarea id=\"{}\" name=\"{}\"{}>{}</textarea>",
                escape_attr(field.effective_id()),
                escape_attr(&field.name),
                common_attrs(field),
                escape_text(field.value.as_deref().unwrap_or_default())
            ));
        }
        FieldKind::Select {
            options, multiple, ..
        } => {
            html.push_str(&format!(
                "<select id=\"{}\" name=\"{}\"{}{}>",
                escape_attr(field.effective_id()),
                escape_attr(&field.name),
                if *multiple { " multiple" } else { "" },
                common_attrs(field)
            ));
            for option in options {
                let selected = field.value.as_deref() == Some(option.value.as_str());
                html.push_str(&format!(
                    "<option value=\"{}\"{}{}>{}</option>",
                    escape_attr(&option.value),
                    if option.disabled { " disabled" } else { "" },
                    if selected { " selected" } else { "" },
                    escape_text(&option.label)
                ));
            }
            html.push_str("</select>");
        }
        FieldKind::Submit | FieldKind::Reset | FieldKind::Button => {
            let button_type = match field.kind {
                FieldKind::Reset => "reset",
                FieldKind::Button => "button",
                _ => "submit",
            };
            html.push_str(&format!(
                "<button type=\"{button_type}\" name=\"{}\">{}</button>",
                escape_attr(&field.name),
                escape_text(field.value.as_deref().unwrap_or("Submit"))
            ));
        }
        kind => {
            let input_type = kind.input_type().unwrap_or("text");
            let declared_value = match kind {
                FieldKind::Radio { value } => Some(value.as_str()),
                FieldKind::Checkbox { value } => value.as_deref(),
                _ => field.value.as_deref(),
            };
            html.push_str(&format!(
                "<input type=\"{input_type}\" id=\"{}\" name=\"{}\"{}{} />",
                escape_attr(field.effective_id()),
                escape_attr(&field.name),
                declared_value.map_or_else(String::new, |value| {
                    format!(" value=\"{}\"", escape_attr(value))
                }),
                common_attrs(field)
            ));
        }
    }
}

fn common_attrs(field: &FieldDefinition) -> String {
    let mut attrs = String::new();
    if let Some(placeholder) = &field.placeholder {
        attrs.push_str(&format!(
            " placeholder=\"{}\"",
            escape_attr(placeholder)
        ));
    }
    let constraints = &field.constraints;
    if let Some(min) = constraints.min_length {
        attrs.push_str(&format!(" minlength=\"{min}\""));
    }
    if let Some(max) = constraints.max_length {
        attrs.push_str(&format!(" maxlength=\"{max}\""));
    }
    if let Some(pattern) = &constraints.pattern {
        attrs.push_str(&format!(" pattern=\"{}\"", escape_attr(pattern)));
    }
    if let Some(min) = &constraints.min {
        attrs.push_str(&format!(" min=\"{}\"", escape_attr(min)));
    }
    if let Some(max) = &constraints.max {
        attrs.push_str(&format!(" max=\"{}\"", escape_attr(max)));
    }
    if let Some(step) = &constraints.step {
        attrs.push_str(&format!(" step=\"{}\"", escape_attr(step)));
    }
    if field.flags.required {
        attrs.push_str(" required");
    }
    if field.flags.disabled {
        attrs.push_str(" disabled");
    }
    if field.flags.readonly {
        attrs.push_str(" readonly");
    }
    if field.flags.autofocus {
        attrs.push_str(" autofocus");
    }
    attrs
}

fn escape_attr(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn escape_text(raw: &str) -> String {
    escape_attr(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CsrfSettings;
    use crate::csrf::lifecycle::CsrfEngine;
    use crate::session::SessionHandle;

    fn scope_for(session: &SessionHandle) -> CsrfScope {
        let settings = CsrfSettings {
            secret: "builder-test-secret".to_string(),
            ..CsrfSettings::default()
        };
        CsrfEngine::new(&settings).scope(session.clone())
    }

    #[test]
    fn build_renders_and_registers() {
        let session = SessionHandle::new();
        let scope = scope_for(&session);

        let html = FormBuilder::new("/contact", FormMethod::Post)
            .handler("contact::submit")
            .field("email", FieldKind::Email)
            .label("Email Address")
            .required()
            .done()
            .submit("Send")
            .build(&scope);

        let page = scope.page_name();
        assert!(html.starts_with("<form method=\"post\" action=\"/contact\""));
        assert!(html.contains(&format!("value=\"{page}.form_0\"")));
        assert!(html.contains("type=\"email\""));
        assert!(html.contains(" required"));
        assert!(html.contains("<button type=\"submit\">Send</button>"));

        let state = session.lock();
        let definition = state.forms.lookup(&page, "form_0").unwrap();
        assert!(definition.requires_csrf);
        assert_eq!(definition.handler, "contact::submit");
        assert_eq!(definition.fields.len(), 1);
    }

    #[test]
    fn form_ids_increment_per_scope() {
        let session = SessionHandle::new();
        let scope = scope_for(&session);

        let _ = FormBuilder::new("/a", FormMethod::Post)
            .handler("a::submit")
            .build(&scope);
        let _ = FormBuilder::new("/b", FormMethod::Post)
            .handler("b::submit")
            .build(&scope);

        let page = scope.page_name();
        let state = session.lock();
        assert!(state.forms.lookup(&page, "form_0").is_some());
        assert!(state.forms.lookup(&page, "form_1").is_some());
    }

    #[test]
    fn no_csrf_is_recorded() {
        let session = SessionHandle::new();
        let scope = scope_for(&session);

        let _ = FormBuilder::new("/ping", FormMethod::Post)
            .id("ping")
            .handler("ping::submit")
            .no_csrf()
            .build(&scope);

        let state = session.lock();
        let definition = state.forms.lookup(&scope.page_name(), "ping").unwrap();
        assert!(!definition.requires_csrf);
    }

    #[test]
    fn select_renders_options_and_selection() {
        let session = SessionHandle::new();
        let scope = scope_for(&session);

        let html = FormBuilder::new("/prefs", FormMethod::Post)
            .handler("prefs::submit")
            .select(
                "country",
                vec![
                    SelectOption::new("us", "United States"),
                    SelectOption::new("ca", "Canada"),
                ],
            )
            .value("ca")
            .done()
            .build(&scope);

        assert!(html.contains("<option value=\"us\">United States</option>"));
        assert!(html.contains("<option value=\"ca\" selected>Canada</option>"));
    }

    #[test]
    fn attribute_values_are_escaped() {
        let session = SessionHandle::new();
        let scope = scope_for(&session);

        let html = FormBuilder::new("/save?a=1&b=2", FormMethod::Post)
            .handler("save::submit")
            .field("note", FieldKind::Text)
            .value("\"quoted\" <text>")
            .done()
            .build(&scope);

        assert!(html.contains("action=\"/save?a=1&amp;b=2\""));
        assert!(html.contains("value=\"&quot;quoted&quot; &lt;text&gt;\""));
    }
}
