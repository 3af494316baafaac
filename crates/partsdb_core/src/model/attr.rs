//! Attribute types, deduplicated values, and authorizations.
//!
//! # Responsibility
//! - Define attribute typing (unit binding, shape flags) and the tagged
//!   value enum shared by scalar, range and set-valued attributes.
//! - Own value normalization and the canonical key used for deduplication.
//!
//! # Invariants
//! - `from_to` and `multi_value` are mutually exclusive on one attribute
//!   type.
//! - Multi values are sorted and deduplicated before canonicalization, so
//!   set-equal inputs produce the same canonical key.
//! - Range values require `from <= to`.

use crate::model::unit::UnitId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for attribute types.
pub type AttrTypeId = Uuid;

/// Stable identifier for deduplicated attribute values.
pub type AttrId = Uuid;

/// Shape of values carried by one attribute type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueShape {
    /// Single free-form text value.
    Scalar,
    /// Numeric from/to range with inclusive ends.
    Range,
    /// Set of text values.
    Multi,
}

impl Display for ValueShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Scalar => "scalar",
            Self::Range => "range",
            Self::Multi => "multi",
        };
        write!(f, "{label}")
    }
}

/// Validation errors for attribute-type input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrTypeValidationError {
    /// Name is blank after trim.
    BlankName,
    /// `from_to` and `multi_value` are both set.
    ConflictingShape,
}

impl Display for AttrTypeValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "attribute type name must not be blank"),
            Self::ConflictingShape => write!(
                f,
                "attribute type cannot be range-valued and set-valued at once"
            ),
        }
    }
}

impl Error for AttrTypeValidationError {}

/// Attribute type bound to a measurement unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrType {
    /// Stable attribute type id.
    pub uuid: AttrTypeId,
    /// Not globally unique; two `Frequency` types with different units may
    /// coexist.
    pub name: String,
    /// Unit every value of this type is measured in.
    pub unit_uuid: UnitId,
    /// Values are numeric from/to ranges.
    pub from_to: bool,
    /// Values are sets of text entries.
    pub multi_value: bool,
    /// Optional free text.
    pub note: Option<String>,
}

impl AttrType {
    /// Returns the value shape implied by the type flags.
    pub fn value_shape(&self) -> ValueShape {
        if self.from_to {
            ValueShape::Range
        } else if self.multi_value {
            ValueShape::Multi
        } else {
            ValueShape::Scalar
        }
    }
}

/// Input shape for creating one attribute type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewAttrType {
    pub name: String,
    pub unit_uuid: UnitId,
    pub from_to: bool,
    pub multi_value: bool,
    pub note: Option<String>,
}

impl NewAttrType {
    pub fn validate(&self) -> Result<(), AttrTypeValidationError> {
        if self.name.trim().is_empty() {
            return Err(AttrTypeValidationError::BlankName);
        }
        if self.from_to && self.multi_value {
            return Err(AttrTypeValidationError::ConflictingShape);
        }
        Ok(())
    }
}

/// Validation errors for attribute values.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValueError {
    /// Value shape does not match the attribute type flags.
    ShapeMismatch {
        expected: ValueShape,
        got: ValueShape,
    },
    /// Scalar or set entry is blank after trim.
    BlankValue,
    /// Multi value carries no entries.
    EmptySet,
    /// Range bounds are inverted.
    InvalidRange { from: f64, to: f64 },
}

impl Display for AttrValueError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShapeMismatch { expected, got } => {
                write!(f, "expected a {expected} value, got a {got} value")
            }
            Self::BlankValue => write!(f, "attribute value must not be blank"),
            Self::EmptySet => write!(f, "multi-valued attribute requires at least one entry"),
            Self::InvalidRange { from, to } => {
                write!(f, "range start {from} must not exceed range end {to}")
            }
        }
    }
}

impl Error for AttrValueError {}

/// Tagged attribute value.
///
/// One storage shape serves scalar, range and set-valued attribute types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Free-form scalar stored as text, e.g. `"2800"`.
    Scalar(String),
    /// Numeric range with inclusive ends.
    Range { from: f64, to: f64 },
    /// Set of scalar entries; order-insensitive.
    Multi(Vec<String>),
}

impl AttrValue {
    /// Returns this value's shape.
    pub fn shape(&self) -> ValueShape {
        match self {
            Self::Scalar(_) => ValueShape::Scalar,
            Self::Range { .. } => ValueShape::Range,
            Self::Multi(_) => ValueShape::Multi,
        }
    }

    /// Returns the value with multi sets sorted and deduplicated.
    ///
    /// Scalar and range values pass through unchanged.
    pub fn normalized(self) -> Self {
        match self {
            Self::Multi(values) => {
                let unique: BTreeSet<String> = values.into_iter().collect();
                Self::Multi(unique.into_iter().collect())
            }
            other => other,
        }
    }

    /// Canonical text key used for deduplication within one attribute type.
    ///
    /// Set-equal multi values map to one key regardless of input order.
    pub fn canonical_key(&self) -> String {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::Range { from, to } => format!("{from}..{to}"),
            Self::Multi(values) => {
                let unique: BTreeSet<&str> = values.iter().map(String::as_str).collect();
                let sorted: Vec<&str> = unique.into_iter().collect();
                serde_json::to_string(&sorted).expect("string slice vec serializes")
            }
        }
    }

    /// Short display form without unit decoration.
    pub fn display_text(&self) -> String {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::Range { from, to } => format!("{from}..{to}"),
            Self::Multi(values) => values.join(", "),
        }
    }

    /// Validates this value against the owning attribute type.
    pub fn validate_for(&self, attr_type: &AttrType) -> Result<(), AttrValueError> {
        let expected = attr_type.value_shape();
        let got = self.shape();
        if expected != got {
            return Err(AttrValueError::ShapeMismatch { expected, got });
        }

        match self {
            Self::Scalar(value) => {
                if value.trim().is_empty() {
                    return Err(AttrValueError::BlankValue);
                }
            }
            Self::Range { from, to } => {
                if from > to {
                    return Err(AttrValueError::InvalidRange {
                        from: *from,
                        to: *to,
                    });
                }
            }
            Self::Multi(values) => {
                if values.is_empty() {
                    return Err(AttrValueError::EmptySet);
                }
                if values.iter().any(|value| value.trim().is_empty()) {
                    return Err(AttrValueError::BlankValue);
                }
            }
        }
        Ok(())
    }
}

/// Deduplicated attribute value row.
///
/// One row per distinct (attribute type, canonical value); parts share rows
/// through assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attr {
    /// Stable attr id.
    pub uuid: AttrId,
    /// Owning attribute type.
    pub attr_type_uuid: AttrTypeId,
    /// Decoded value.
    pub value: AttrValue,
}

/// Attribute-type grant on one taxonomy node.
///
/// A grant on a part extends to every descendant of that part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    /// Part owning the grant.
    pub part_uuid: crate::model::part::PartId,
    /// Granted attribute type.
    pub attr_type_uuid: AttrTypeId,
}

#[cfg(test)]
mod tests {
    use super::{AttrType, AttrValue, AttrValueError, NewAttrType, ValueShape};
    use uuid::Uuid;

    fn multi_type() -> AttrType {
        AttrType {
            uuid: Uuid::new_v4(),
            name: "Supported memory".to_string(),
            unit_uuid: Uuid::new_v4(),
            from_to: false,
            multi_value: true,
            note: None,
        }
    }

    #[test]
    fn canonical_key_is_order_insensitive_for_multi() {
        let first = AttrValue::Multi(vec!["DDR2".to_string(), "DDR".to_string()]);
        let second = AttrValue::Multi(vec!["DDR".to_string(), "DDR2".to_string(), "DDR".to_string()]);
        assert_eq!(first.canonical_key(), second.canonical_key());
    }

    #[test]
    fn canonical_key_distinguishes_ranges_and_scalars() {
        let range = AttrValue::Range { from: 533.0, to: 800.0 };
        let scalar = AttrValue::Scalar("533..800".to_string());
        assert_eq!(range.canonical_key(), "533..800");
        assert_eq!(range.canonical_key(), scalar.canonical_key());
        assert_ne!(range.shape(), scalar.shape());
    }

    #[test]
    fn normalized_sorts_and_dedups_multi() {
        let value = AttrValue::Multi(vec![
            "b".to_string(),
            "a".to_string(),
            "b".to_string(),
        ]);
        assert_eq!(
            value.normalized(),
            AttrValue::Multi(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn validate_rejects_shape_mismatch() {
        let attr_type = multi_type();
        let err = AttrValue::Scalar("DDR".to_string())
            .validate_for(&attr_type)
            .unwrap_err();
        assert_eq!(
            err,
            AttrValueError::ShapeMismatch {
                expected: ValueShape::Multi,
                got: ValueShape::Scalar,
            }
        );
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let attr_type = AttrType {
            from_to: true,
            multi_value: false,
            ..multi_type()
        };
        let err = AttrValue::Range { from: 9.0, to: 3.0 }
            .validate_for(&attr_type)
            .unwrap_err();
        assert_eq!(err, AttrValueError::InvalidRange { from: 9.0, to: 3.0 });
    }

    #[test]
    fn new_attr_type_rejects_conflicting_shape_flags() {
        let new_attr_type = NewAttrType {
            name: "Frequency".to_string(),
            unit_uuid: Uuid::new_v4(),
            from_to: true,
            multi_value: true,
            note: None,
        };
        assert!(new_attr_type.validate().is_err());
    }
}
