//! Form building, registration, and submission validation.

pub mod builder;
pub mod field;
pub mod registry;
pub mod validate;

pub use builder::{FieldBuilder, FormBuilder};
pub use field::{FieldConstraints, FieldDefinition, FieldFlags, FieldKind, SelectOption};
pub use registry::{FormDefinition, FormMethod, FormRef, FormRegistry};
pub use validate::{validate_fields, ValidationOutcome};
