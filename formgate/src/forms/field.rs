//! Form field definitions.
//!
//! Field kinds are a closed enum: every kind carries its own payload and the
//! validation engine dispatches over them with an exhaustive `match`, so an
//! unknown kind is a compile error rather than a runtime lookup failure.

use serde::{Deserialize, Serialize};

/// Option in a select list or radio group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Value attribute.
    pub value: String,
    /// Display text.
    pub label: String,
    /// Whether this option is disabled.
    pub disabled: bool,
}

impl SelectOption {
    /// Create a new select option.
    #[must_use]
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            disabled: false,
        }
    }

    /// Create a disabled option (useful for a placeholder row).
    #[must_use]
    pub fn disabled(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            disabled: true,
        }
    }
}

/// Field attribute flags grouped for better ergonomics.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFlags {
    /// Whether the field is required.
    pub required: bool,
    /// Whether the field is disabled.
    pub disabled: bool,
    /// Whether the field is read-only.
    pub readonly: bool,
    /// Autofocus this field.
    pub autofocus: bool,
}

/// Validation constraints attached to a field.
///
/// Which entries apply depends on the kind: length and pattern bound
/// text-likes, `min`/`max` are parsed as numbers or dates depending on the
/// kind they sit on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConstraints {
    /// Minimum character length.
    pub min_length: Option<usize>,
    /// Maximum character length.
    pub max_length: Option<usize>,
    /// Anchored regular expression the whole value must match.
    pub pattern: Option<String>,
    /// Minimum value, interpreted per kind (number or ISO date).
    pub min: Option<String>,
    /// Maximum value, interpreted per kind.
    pub max: Option<String>,
    /// Step for numeric inputs.
    pub step: Option<String>,
    /// Accept integers only (numeric kinds).
    pub integer_only: bool,
    /// Accept values that were not declared when the field was rendered,
    /// for option lists rewritten by client-side script.
    pub allow_change: bool,
    /// Accept a comma-separated list of addresses (email kind).
    pub multiple: bool,
}

/// Closed set of field kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Single-line text input.
    Text,
    /// Search input.
    Search,
    /// Password input (masked, value never echoed back).
    Password,
    /// Multi-line text area.
    Textarea,
    /// Email address input.
    Email,
    /// URL input.
    Url,
    /// Telephone input.
    Tel,
    /// Numeric input.
    Number,
    /// Range slider.
    Range,
    /// Date input (`YYYY-MM-DD`).
    Date,
    /// Time input (`HH:MM[:SS]`).
    Time,
    /// Combined date and time input.
    DateTimeLocal,
    /// Month input (`YYYY-MM`).
    Month,
    /// Week input (`YYYY-Www`).
    Week,
    /// Color picker (`#rrggbb`).
    Color,
    /// Checkbox.
    Checkbox {
        /// Value submitted when checked.
        value: Option<String>,
    },
    /// One button of a radio group; buttons sharing a name form the group.
    Radio {
        /// Value this button submits.
        value: String,
    },
    /// Select list with a declared option set.
    Select {
        /// Available options.
        options: Vec<SelectOption>,
        /// Allow multiple selections.
        multiple: bool,
        /// Placeholder value that counts as "no selection".
        placeholder: Option<String>,
    },
    /// File upload.
    File {
        /// Accept attribute (comma-separated MIME types or extensions).
        accept: Option<String>,
    },
    /// Hidden input; validation is left to the handler.
    Hidden,
    /// Server-held value that never reaches the browser. It is re-injected
    /// into the submitted values before validation runs.
    SessionValue {
        /// The carried value.
        value: serde_json::Value,
    },
    /// Submit button.
    Submit,
    /// Reset button.
    Reset,
    /// Plain button.
    Button,
    /// Image submit button.
    Image,
}

impl FieldKind {
    /// HTML `type` attribute, when the kind renders as an `<input>`.
    #[must_use]
    pub const fn input_type(&self) -> Option<&'static str> {
        match self {
            Self::Text => Some("text"),
            Self::Search => Some("search"),
            Self::Password => Some("password"),
            Self::Email => Some("email"),
            Self::Url => Some("url"),
            Self::Tel => Some("tel"),
            Self::Number => Some("number"),
            Self::Range => Some("range"),
            Self::Date => Some("date"),
            Self::Time => Some("time"),
            Self::DateTimeLocal => Some("datetime-local"),
            Self::Month => Some("month"),
            Self::Week => Some("week"),
            Self::Color => Some("color"),
            Self::Checkbox { .. } => Some("checkbox"),
            Self::Radio { .. } => Some("radio"),
            Self::File { .. } => Some("file"),
            Self::Hidden => Some("hidden"),
            Self::Image => Some("image"),
            Self::Textarea
            | Self::Select { .. }
            | Self::SessionValue { .. }
            | Self::Submit
            | Self::Reset
            | Self::Button => None,
        }
    }

    /// Whether submitted values are checked for this kind. Buttons, hidden
    /// inputs and server-held values are not.
    #[must_use]
    pub const fn validates(&self) -> bool {
        !matches!(
            self,
            Self::Hidden
                | Self::SessionValue { .. }
                | Self::Submit
                | Self::Reset
                | Self::Button
                | Self::Image
        )
    }
}

/// A declared form field as it was rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name (used for form submission; may address a nested value,
    /// e.g. `address[city]`).
    pub name: String,
    /// Field kind.
    pub kind: FieldKind,
    /// Label text.
    pub label: Option<String>,
    /// Value rendered into the field.
    pub value: Option<String>,
    /// Placeholder text.
    pub placeholder: Option<String>,
    /// Attribute flags.
    pub flags: FieldFlags,
    /// Validation constraints.
    #[serde(default)]
    pub constraints: FieldConstraints,
    /// Element id (defaults to the name if not set).
    pub id: Option<String>,
}

impl FieldDefinition {
    /// Create a field of the given kind with everything else unset.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            label: None,
            value: None,
            placeholder: None,
            flags: FieldFlags::default(),
            constraints: FieldConstraints::default(),
            id: None,
        }
    }

    /// Get the effective id (custom id or field name).
    #[must_use]
    pub fn effective_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    /// Label to use in user-facing messages.
    #[must_use]
    pub fn message_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Whether the field is required.
    #[must_use]
    pub const fn required(&self) -> bool {
        self.flags.required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_type_covers_inputs_only() {
        assert_eq!(FieldKind::Email.input_type(), Some("email"));
        assert_eq!(FieldKind::DateTimeLocal.input_type(), Some("datetime-local"));
        assert_eq!(FieldKind::Textarea.input_type(), None);
        assert_eq!(
            FieldKind::Select {
                options: vec![],
                multiple: false,
                placeholder: None
            }
            .input_type(),
            None
        );
    }

    #[test]
    fn buttons_and_carried_values_skip_validation() {
        assert!(!FieldKind::Submit.validates());
        assert!(!FieldKind::Hidden.validates());
        assert!(!FieldKind::SessionValue {
            value: serde_json::Value::Null
        }
        .validates());
        assert!(FieldKind::Text.validates());
        assert!(FieldKind::Radio {
            value: "a".to_string()
        }
        .validates());
    }

    #[test]
    fn effective_id_falls_back_to_name() {
        let mut field = FieldDefinition::new("email", FieldKind::Email);
        assert_eq!(field.effective_id(), "email");

        field.id = Some("custom-email-id".into());
        assert_eq!(field.effective_id(), "custom-email-id");
    }

    #[test]
    fn select_option_constructors() {
        let option = SelectOption::new("us", "United States");
        assert!(!option.disabled);

        let placeholder = SelectOption::disabled("", "Select a country...");
        assert!(placeholder.disabled);
    }
}
