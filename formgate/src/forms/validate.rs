//! Submission validation against a registered form definition.
//!
//! Fields are walked in declaration order; each value is extracted by its
//! (possibly nested) name path and checked by the kind-specific rule.
//! Validation and coercion are fused: a rule may rewrite the value in place
//! (a number becomes a JSON number, a date its canonical form), so handlers
//! downstream consume already-typed values.
//!
//! Radio groups are validated once per name at group level — required-ness
//! and the acceptable value set are properties of the whole group, so the
//! rule reads every sibling sharing the name, not just one button.

use crate::forms::field::{FieldDefinition, FieldKind, SelectOption};
use crate::forms::registry::FormDefinition;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern"));
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://\S+$").expect("url pattern"));
static COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("color pattern"));
static MONTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-(0[1-9]|1[0-2])$").expect("month pattern"));
static WEEK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-W(0[1-9]|[1-4]\d|5[0-3])$").expect("week pattern"));

/// Outcome of validating one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// Ordered user-facing messages.
    pub errors: Vec<String>,
    /// Effective ids of the fields that failed.
    pub field_errors: Vec<String>,
}

impl ValidationOutcome {
    /// Whether the submission passed every check.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether the field with `id` failed.
    #[must_use]
    pub fn has_field_error(&self, id: &str) -> bool {
        self.field_errors.iter().any(|failed| failed == id)
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub(crate) fn fail_field(&mut self, field: &FieldDefinition, message: String) {
        self.errors.push(message);
        self.field_errors.push(field.effective_id().to_owned());
    }
}

/// Validate `values` against `definition`, coercing values in place.
pub fn validate_fields(
    definition: &FormDefinition,
    values: &mut Map<String, Value>,
    outcome: &mut ValidationOutcome,
) {
    // Server-held values are injected before anything is checked, exactly as
    // if the browser had submitted them.
    for field in &definition.fields {
        if let FieldKind::SessionValue { value } = &field.kind {
            set_value(values, &field_path(&field.name), value.clone());
        }
    }

    let mut validated_groups: HashSet<String> = HashSet::new();
    for field in &definition.fields {
        if !field.kind.validates() {
            continue;
        }

        let path = field_path(&field.name);
        let value = value_at(values, &path).cloned();

        let result = if matches!(field.kind, FieldKind::Radio { .. }) {
            if !validated_groups.insert(field.name.clone()) {
                continue;
            }
            validate_radio_group(field, &definition.fields, value.as_ref())
        } else {
            validate_field(field, value.as_ref())
        };

        match result {
            Ok(Some(coerced)) => set_value(values, &path, coerced),
            Ok(None) => {}
            Err(message) => outcome.fail_field(field, message),
        }
    }
}

fn validate_field(
    field: &FieldDefinition,
    value: Option<&Value>,
) -> Result<Option<Value>, String> {
    match &field.kind {
        FieldKind::Text
        | FieldKind::Search
        | FieldKind::Password
        | FieldKind::Textarea
        | FieldKind::Tel => validate_text(field, value),
        FieldKind::Email => validate_email(field, value),
        FieldKind::Url => validate_url(field, value),
        FieldKind::Number | FieldKind::Range => validate_number(field, value),
        FieldKind::Date => validate_date(field, value),
        FieldKind::Time => validate_time(field, value),
        FieldKind::DateTimeLocal => validate_datetime(field, value),
        FieldKind::Month => validate_shape(field, value, &MONTH_RE, "month", "YYYY-MM"),
        FieldKind::Week => validate_shape(field, value, &WEEK_RE, "week", "YYYY-Www"),
        FieldKind::Color => validate_color(field, value),
        FieldKind::Checkbox { .. } => validate_checkbox(field, value),
        FieldKind::Select {
            options,
            multiple,
            placeholder,
        } => validate_select(field, options, *multiple, placeholder.as_deref(), value),
        FieldKind::File { .. } => validate_file(field, value),
        // Radio groups are handled at group level by the caller; the rest
        // never validate.
        FieldKind::Radio { .. }
        | FieldKind::Hidden
        | FieldKind::SessionValue { .. }
        | FieldKind::Submit
        | FieldKind::Reset
        | FieldKind::Button
        | FieldKind::Image => Ok(None),
    }
}

fn required_message(field: &FieldDefinition) -> String {
    format!("\"{}\" is a required field.", field.message_label())
}

fn check_required(field: &FieldDefinition, text: Option<&String>) -> Result<(), String> {
    if field.required() && text.is_none() {
        return Err(required_message(field));
    }
    Ok(())
}

fn validate_text(
    field: &FieldDefinition,
    value: Option<&Value>,
) -> Result<Option<Value>, String> {
    let text = present_text(value);
    check_required(field, text.as_ref())?;
    let Some(text) = text else { return Ok(None) };

    let label = field.message_label();
    let constraints = &field.constraints;
    let length = text.chars().count();

    if let Some(min) = constraints.min_length {
        if length < min {
            return Err(format!(
                "\"{label}\" has too few characters - the minimum length is {min}."
            ));
        }
    }
    if let Some(max) = constraints.max_length {
        if length > max {
            return Err(format!(
                "\"{label}\" has too many characters - the maximum length is {max}."
            ));
        }
    }
    if let Some(pattern) = &constraints.pattern {
        // Anchored like the HTML pattern attribute: the whole value matches.
        let Ok(anchored) = Regex::new(&format!("^(?:{pattern})$")) else {
            return Err(format!(
                "\"{label}\" has a pattern that could not be evaluated."
            ));
        };
        if !anchored.is_match(&text) {
            return Err(format!(
                "\"{label}\" does not match the pattern defined for it."
            ));
        }
    }

    Ok(None)
}

fn validate_email(
    field: &FieldDefinition,
    value: Option<&Value>,
) -> Result<Option<Value>, String> {
    validate_text(field, value)?;
    let Some(text) = present_text(value) else {
        return Ok(None);
    };

    let addresses: Vec<&str> = if field.constraints.multiple {
        text.split(',').map(str::trim).collect()
    } else {
        vec![text.as_str()]
    };

    if addresses
        .iter()
        .any(|address| !EMAIL_RE.is_match(address))
    {
        return Err(format!(
            "\"{}\" has an invalid email address.",
            field.message_label()
        ));
    }
    Ok(None)
}

fn validate_url(field: &FieldDefinition, value: Option<&Value>) -> Result<Option<Value>, String> {
    validate_text(field, value)?;
    let Some(text) = present_text(value) else {
        return Ok(None);
    };
    if !URL_RE.is_match(&text) {
        return Err(format!("\"{}\" is not a valid URL.", field.message_label()));
    }
    Ok(None)
}

fn validate_number(
    field: &FieldDefinition,
    value: Option<&Value>,
) -> Result<Option<Value>, String> {
    let text = present_text(value);
    check_required(field, text.as_ref())?;
    let Some(text) = text else { return Ok(None) };

    let label = field.message_label();
    let constraints = &field.constraints;

    let (parsed, coerced) = if constraints.integer_only {
        let integer: i64 = text
            .parse()
            .map_err(|_| format!("\"{label}\" is not a valid integer."))?;
        #[allow(clippy::cast_precision_loss)]
        let as_float = integer as f64;
        (as_float, Value::from(integer))
    } else {
        let float: f64 = text
            .parse()
            .map_err(|_| format!("\"{label}\" is not a valid number."))?;
        let coerced = serde_json::Number::from_f64(float)
            .map_or_else(|| Value::String(text.clone()), Value::Number);
        (float, coerced)
    };

    if let Some(min) = bound(constraints.min.as_deref()) {
        if parsed < min {
            return Err(format!(
                "\"{label}\" is not allowed to be less than {min}."
            ));
        }
    }
    if let Some(max) = bound(constraints.max.as_deref()) {
        if parsed > max {
            return Err(format!(
                "\"{label}\" is not allowed to be greater than {max}."
            ));
        }
    }

    Ok(Some(coerced))
}

fn bound(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|value| value.parse().ok())
}

fn validate_date(
    field: &FieldDefinition,
    value: Option<&Value>,
) -> Result<Option<Value>, String> {
    let text = present_text(value);
    check_required(field, text.as_ref())?;
    let Some(text) = text else { return Ok(None) };

    let label = field.message_label();
    let date = NaiveDate::parse_from_str(&text, "%Y-%m-%d").map_err(|_| {
        format!("\"{label}\" does not have a valid date. Dates must be in the format YYYY-MM-DD.")
    })?;

    if let Some(min) = field
        .constraints
        .min
        .as_deref()
        .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
    {
        if date < min {
            return Err(format!("\"{label}\" cannot be before \"{min}\"."));
        }
    }
    if let Some(max) = field
        .constraints
        .max
        .as_deref()
        .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
    {
        if date > max {
            return Err(format!("\"{label}\" cannot be after \"{max}\"."));
        }
    }

    Ok(Some(Value::String(date.to_string())))
}

fn validate_time(
    field: &FieldDefinition,
    value: Option<&Value>,
) -> Result<Option<Value>, String> {
    let text = present_text(value);
    check_required(field, text.as_ref())?;
    let Some(text) = text else { return Ok(None) };

    let time = NaiveTime::parse_from_str(&text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(&text, "%H:%M"))
        .map_err(|_| {
            format!(
                "\"{}\" does not have a valid time.",
                field.message_label()
            )
        })?;

    Ok(Some(Value::String(time.format("%H:%M:%S").to_string())))
}

fn validate_datetime(
    field: &FieldDefinition,
    value: Option<&Value>,
) -> Result<Option<Value>, String> {
    let text = present_text(value);
    check_required(field, text.as_ref())?;
    let Some(text) = text else { return Ok(None) };

    let parsed = NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M"))
        .map_err(|_| {
            format!(
                "\"{}\" does not have a valid date and time.",
                field.message_label()
            )
        })?;

    Ok(Some(Value::String(
        parsed.format("%Y-%m-%dT%H:%M:%S").to_string(),
    )))
}

fn validate_shape(
    field: &FieldDefinition,
    value: Option<&Value>,
    shape: &Regex,
    noun: &str,
    example: &str,
) -> Result<Option<Value>, String> {
    let text = present_text(value);
    check_required(field, text.as_ref())?;
    let Some(text) = text else { return Ok(None) };

    if !shape.is_match(&text) {
        return Err(format!(
            "\"{}\" does not have a valid {noun}. Expected the format {example}.",
            field.message_label()
        ));
    }
    Ok(None)
}

fn validate_color(
    field: &FieldDefinition,
    value: Option<&Value>,
) -> Result<Option<Value>, String> {
    let text = present_text(value);
    check_required(field, text.as_ref())?;
    let Some(text) = text else { return Ok(None) };

    if !COLOR_RE.is_match(&text) {
        return Err(format!(
            "\"{}\" is not a valid color. Colors must be in the format #rrggbb.",
            field.message_label()
        ));
    }
    Ok(Some(Value::String(text.to_ascii_lowercase())))
}

fn validate_checkbox(
    field: &FieldDefinition,
    value: Option<&Value>,
) -> Result<Option<Value>, String> {
    // Browsers omit unchecked boxes entirely, so required means present.
    if field.required() && value.is_none_or(Value::is_null) {
        return Err(required_message(field));
    }
    Ok(None)
}

fn validate_select(
    field: &FieldDefinition,
    options: &[SelectOption],
    multiple: bool,
    placeholder: Option<&str>,
    value: Option<&Value>,
) -> Result<Option<Value>, String> {
    let allowed: Vec<&str> = options
        .iter()
        .filter(|option| !option.disabled)
        .map(|option| option.value.as_str())
        .collect();
    let is_blank = |text: &str| text.is_empty() || placeholder == Some(text);

    let selections: Vec<String> = match value {
        Some(Value::Array(items)) if multiple => items
            .iter()
            .filter_map(as_text)
            .filter(|text| !is_blank(text))
            .collect(),
        other => present_text(other)
            .into_iter()
            .filter(|text| !is_blank(text))
            .collect(),
    };

    if field.required() && selections.is_empty() {
        return Err(required_message(field));
    }

    if !field.constraints.allow_change {
        for selection in &selections {
            if !allowed.contains(&selection.as_str()) {
                return Err(format!(
                    "\"{selection}\" is not a valid value for \"{}\" - please choose from the list.",
                    field.message_label()
                ));
            }
        }
    }

    Ok(None)
}

fn validate_file(
    field: &FieldDefinition,
    value: Option<&Value>,
) -> Result<Option<Value>, String> {
    // Uploads arrive as objects shaped { name, size, error } after multipart
    // normalization; error code 0 is success, 4 means nothing was selected.
    let upload = value.and_then(Value::as_object);
    let error_code = upload
        .and_then(|object| object.get("error"))
        .and_then(Value::as_i64)
        .unwrap_or(4);

    if field.required() && (upload.is_none() || error_code == 4) {
        return Err(required_message(field));
    }

    match error_code {
        0 | 4 => Ok(None),
        1 | 2 => Err(format!(
            "The file uploaded for \"{}\" exceeds the maximum file size.",
            field.message_label()
        )),
        3 => Err(format!(
            "The file uploaded for \"{}\" was only partially uploaded.",
            field.message_label()
        )),
        _ => Err(format!(
            "The file uploaded for \"{}\" failed to upload.",
            field.message_label()
        )),
    }
}

fn validate_radio_group(
    field: &FieldDefinition,
    fields: &[FieldDefinition],
    value: Option<&Value>,
) -> Result<Option<Value>, String> {
    let mut required = false;
    let mut allow_change = false;
    let mut declared: Vec<&str> = Vec::new();

    for sibling in fields {
        if let FieldKind::Radio {
            value: declared_value,
        } = &sibling.kind
        {
            if sibling.name == field.name {
                required |= sibling.required();
                allow_change |= sibling.constraints.allow_change;
                declared.push(declared_value);
            }
        }
    }

    let text = present_text(value);
    if required && text.is_none() {
        return Err(required_message(field));
    }
    if let Some(text) = text {
        if !allow_change && !declared.contains(&text.as_str()) {
            return Err(format!(
                "\"{text}\" is not a valid value for \"{}\" - please choose from the list.",
                field.message_label()
            ));
        }
    }
    Ok(None)
}

/// Expand `name[a][b]` into path segments for value lookup.
fn field_path(name: &str) -> Vec<String> {
    match name.split_once('[') {
        None => vec![name.to_owned()],
        Some((head, rest)) => {
            let mut path = vec![head.to_owned()];
            for segment in rest.split('[') {
                path.push(segment.trim_end_matches(']').to_owned());
            }
            path
        }
    }
}

fn value_at<'v>(values: &'v Map<String, Value>, path: &[String]) -> Option<&'v Value> {
    let (first, rest) = path.split_first()?;
    let mut current = values.get(first)?;
    for segment in rest {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn set_value(values: &mut Map<String, Value>, path: &[String], new: Value) {
    match path {
        [] => {}
        [leaf] => {
            values.insert(leaf.clone(), new);
        }
        [first, middle @ .., leaf] => {
            let Some(mut current) = values.get_mut(first) else {
                return;
            };
            for segment in middle {
                let Some(next) = current
                    .as_object_mut()
                    .and_then(|object| object.get_mut(segment))
                else {
                    return;
                };
                current = next;
            }
            if let Some(object) = current.as_object_mut() {
                object.insert(leaf.clone(), new);
            }
        }
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_owned()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn present_text(value: Option<&Value>) -> Option<String> {
    value.and_then(as_text).filter(|text| !text.is_empty())
}
