//! Measurement units for attribute values.
//!
//! # Responsibility
//! - Define the unit entity every attribute type is bound to.
//! - Own value rendering through the optional format template.
//!
//! # Invariants
//! - Unit names are globally unique.
//! - A format template, when present, contains the `{value}` placeholder.
//! - Units are immutable once created.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for measurement units.
pub type UnitId = Uuid;

/// Placeholder replaced by the value text when rendering with a template.
pub const VALUE_PLACEHOLDER: &str = "{value}";

/// Validation errors for unit input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitValidationError {
    /// Name is blank after trim.
    BlankName,
    /// Label is blank after trim.
    BlankLabel,
    /// Format template lacks the `{value}` placeholder.
    FormatMissingPlaceholder,
}

impl Display for UnitValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "unit name must not be blank"),
            Self::BlankLabel => write!(f, "unit label must not be blank"),
            Self::FormatMissingPlaceholder => write!(
                f,
                "unit format template must contain `{VALUE_PLACEHOLDER}`"
            ),
        }
    }
}

impl Error for UnitValidationError {}

/// Measurement unit read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Stable unit id.
    pub uuid: UnitId,
    /// Globally unique short name, e.g. `MHz`.
    pub name: String,
    /// Human-readable label, e.g. `Megahertz`.
    pub label: String,
    /// Optional render template containing `{value}`, e.g. `{value} MHz`.
    pub format: Option<String>,
    /// Optional free text.
    pub note: Option<String>,
}

impl Unit {
    /// Renders a value text through this unit's format template.
    ///
    /// Without a template the value text is returned bare.
    pub fn render(&self, value_text: &str) -> String {
        render_value(self.format.as_deref(), value_text)
    }
}

/// Renders a value text through an optional format template.
pub fn render_value(format: Option<&str>, value_text: &str) -> String {
    match format {
        Some(template) => template.replace(VALUE_PLACEHOLDER, value_text),
        None => value_text.to_string(),
    }
}

/// Input shape for creating one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUnit {
    pub name: String,
    pub label: String,
    pub format: Option<String>,
    pub note: Option<String>,
}

impl NewUnit {
    pub fn validate(&self) -> Result<(), UnitValidationError> {
        if self.name.trim().is_empty() {
            return Err(UnitValidationError::BlankName);
        }
        if self.label.trim().is_empty() {
            return Err(UnitValidationError::BlankLabel);
        }
        if let Some(format) = &self.format {
            if !format.contains(VALUE_PLACEHOLDER) {
                return Err(UnitValidationError::FormatMissingPlaceholder);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{render_value, NewUnit, UnitValidationError};

    #[test]
    fn render_substitutes_placeholder() {
        assert_eq!(render_value(Some("{value} MHz"), "2800"), "2800 MHz");
        assert_eq!(render_value(None, "2800"), "2800");
    }

    #[test]
    fn validate_rejects_template_without_placeholder() {
        let new_unit = NewUnit {
            name: "MHz".to_string(),
            label: "Megahertz".to_string(),
            format: Some("MHz".to_string()),
            note: None,
        };
        assert_eq!(
            new_unit.validate(),
            Err(UnitValidationError::FormatMissingPlaceholder)
        );
    }

    #[test]
    fn validate_rejects_blank_name_and_label() {
        let mut new_unit = NewUnit {
            name: " ".to_string(),
            label: "Megahertz".to_string(),
            format: None,
            note: None,
        };
        assert_eq!(new_unit.validate(), Err(UnitValidationError::BlankName));

        new_unit.name = "MHz".to_string();
        new_unit.label = String::new();
        assert_eq!(new_unit.validate(), Err(UnitValidationError::BlankLabel));
    }
}
