//! Session-scoped registry of rendered form definitions.
//!
//! A submission is validated against the definition that was recorded when
//! the form was rendered, never against what the browser claims. Definitions
//! are grouped by page name so that consuming a page's grant invalidates
//! every sibling form in one step.

use crate::forms::field::FieldDefinition;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Submission method a form was declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormMethod {
    /// Query-string submission; skips the token check.
    Get,
    /// Body submission; token-checked unless opted out.
    Post,
}

impl FormMethod {
    /// HTML `method` attribute value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
        }
    }
}

/// Durable record of a form as it was rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDefinition {
    /// Form id, unique within its page.
    pub form_id: String,
    /// Page name grouping this form with its siblings.
    pub page_name: String,
    /// Declared submission method.
    pub method: FormMethod,
    /// Opaque key naming the handler that processes this form.
    pub handler: String,
    /// Declared fields, in rendering order.
    pub fields: Vec<FieldDefinition>,
    /// Whether submissions must carry a valid token.
    pub requires_csrf: bool,
}

impl FormDefinition {
    /// Whether the token check applies to a submission of this form.
    #[must_use]
    pub const fn csrf_checked(&self) -> bool {
        self.requires_csrf && matches!(self.method, FormMethod::Post)
    }
}

/// Registered definitions for one session, keyed by page then form id.
#[derive(Debug, Default)]
pub struct FormRegistry {
    pages: HashMap<String, HashMap<String, FormDefinition>>,
}

impl FormRegistry {
    /// Store (or overwrite) a definition under its page and form id.
    pub fn register(&mut self, definition: FormDefinition) {
        self.pages
            .entry(definition.page_name.clone())
            .or_default()
            .insert(definition.form_id.clone(), definition);
    }

    /// Look up the definition for `(page_name, form_id)`.
    #[must_use]
    pub fn lookup(&self, page_name: &str, form_id: &str) -> Option<&FormDefinition> {
        self.pages.get(page_name)?.get(form_id)
    }

    /// Remove every definition under `page_name`.
    pub fn clear(&mut self, page_name: &str) {
        self.pages.remove(page_name);
    }

    /// Number of registered definitions across all pages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.values().map(HashMap::len).sum()
    }

    /// Whether no definitions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Reference carried by the hidden form-ref field: `<page>.<form id>`.
///
/// Lets a dispatcher identify which registered form a submission targets
/// before any validation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormRef {
    /// Page name segment.
    pub page_name: String,
    /// Form id segment.
    pub form_id: String,
}

impl FormRef {
    /// Build a reference for a registered definition.
    #[must_use]
    pub fn new(page_name: impl Into<String>, form_id: impl Into<String>) -> Self {
        Self {
            page_name: page_name.into(),
            form_id: form_id.into(),
        }
    }

    /// Parse the serialized `<page>.<form id>` shape.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (page_name, form_id) = raw.split_once('.')?;
        if page_name.is_empty() || form_id.is_empty() {
            return None;
        }
        Some(Self::new(page_name, form_id))
    }

    /// Pull the reference out of a submitted value map, given the configured
    /// form-ref field name.
    #[must_use]
    pub fn from_values(values: &Map<String, Value>, field: &str) -> Option<Self> {
        values.get(field).and_then(Value::as_str).and_then(Self::parse)
    }
}

impl std::fmt::Display for FormRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.page_name, self.form_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::field::FieldKind;

    fn definition(page: &str, id: &str) -> FormDefinition {
        FormDefinition {
            form_id: id.to_string(),
            page_name: page.to_string(),
            method: FormMethod::Post,
            handler: "contact::submit".to_string(),
            fields: vec![FieldDefinition::new("email", FieldKind::Email)],
            requires_csrf: true,
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = FormRegistry::default();
        registry.register(definition("page_a", "form_0"));

        assert!(registry.lookup("page_a", "form_0").is_some());
        assert!(registry.lookup("page_a", "form_1").is_none());
        assert!(registry.lookup("page_b", "form_0").is_none());
    }

    #[test]
    fn clear_removes_all_sibling_forms() {
        let mut registry = FormRegistry::default();
        registry.register(definition("page_a", "form_0"));
        registry.register(definition("page_a", "form_1"));
        registry.register(definition("page_b", "form_0"));

        registry.clear("page_a");

        assert!(registry.lookup("page_a", "form_0").is_none());
        assert!(registry.lookup("page_a", "form_1").is_none());
        assert!(registry.lookup("page_b", "form_0").is_some());
    }

    #[test]
    fn get_forms_are_not_csrf_checked() {
        let mut form = definition("page_a", "form_0");
        assert!(form.csrf_checked());

        form.method = FormMethod::Get;
        assert!(!form.csrf_checked());

        form.method = FormMethod::Post;
        form.requires_csrf = false;
        assert!(!form.csrf_checked());
    }

    #[test]
    fn form_ref_round_trips() {
        let reference = FormRef::new("csrf_ab12", "form_0");
        let parsed = FormRef::parse(&reference.to_string()).unwrap();
        assert_eq!(parsed, reference);
    }

    #[test]
    fn form_ref_rejects_bad_shapes() {
        assert!(FormRef::parse("no-separator").is_none());
        assert!(FormRef::parse(".form_0").is_none());
        assert!(FormRef::parse("page.").is_none());
    }

    #[test]
    fn form_ref_from_values() {
        let mut values = Map::new();
        values.insert(
            "form_ref".to_string(),
            Value::String("csrf_ab12.form_0".to_string()),
        );
        let reference = FormRef::from_values(&values, "form_ref").unwrap();
        assert_eq!(reference.page_name, "csrf_ab12");
        assert_eq!(reference.form_id, "form_0");
    }
}
