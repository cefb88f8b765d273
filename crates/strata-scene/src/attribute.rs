//! Named, typed value slots owned by components.

use serde::{Deserialize, Serialize};

use crate::codec::{DataDeserializer, DataSerializer};
use crate::value::{AttributeKind, AttributeValue};
use crate::SceneError;

// ---------------------------------------------------------------------------
// AttributeDecl
// ---------------------------------------------------------------------------

/// One entry of a static component layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDecl {
    /// Stable id used by serialization formats.
    pub id: String,
    /// Human readable name.
    pub name: String,
    pub default: AttributeValue,
}

impl AttributeDecl {
    pub fn new(id: &str, name: &str, default: AttributeValue) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            default,
        }
    }

    pub fn kind(&self) -> AttributeKind {
        self.default.kind()
    }

    pub fn instantiate(&self) -> Attribute {
        Attribute::new(&self.id, &self.name, self.default.clone())
    }
}

// ---------------------------------------------------------------------------
// Attribute
// ---------------------------------------------------------------------------

/// A typed value slot.
///
/// The kind is fixed at construction; [`set_value`](Self::set_value) rejects
/// values of another kind. Every successful write that actually changes the
/// value raises the "changed" flag, which stays set until
/// [`clear_changed`](Self::clear_changed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    id: String,
    name: String,
    value: AttributeValue,
    dynamic: bool,
    changed: bool,
}

impl Attribute {
    pub fn new(id: &str, name: &str, value: AttributeValue) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            value,
            dynamic: false,
            changed: false,
        }
    }

    /// A runtime-created attribute of a dynamic component. Its display name
    /// equals its id.
    pub fn new_dynamic(id: &str, kind: AttributeKind) -> Self {
        Self {
            dynamic: true,
            ..Self::new(id, id, kind.default_value())
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AttributeKind {
        self.value.kind()
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().type_name()
    }

    pub fn type_id(&self) -> u32 {
        self.kind().type_id()
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn value(&self) -> &AttributeValue {
        &self.value
    }

    /// Replace the value. Returns `true` if it differed from the old one.
    pub fn set_value(&mut self, value: AttributeValue) -> Result<bool, SceneError> {
        if value.kind() != self.kind() {
            return Err(SceneError::AttributeTypeMismatch {
                attribute: self.id.clone(),
                expected: self.type_name(),
                found: value.kind().type_name(),
            });
        }
        if value == self.value {
            return Ok(false);
        }
        self.value = value;
        self.changed = true;
        Ok(true)
    }

    /// Whether the value changed since the last [`clear_changed`](Self::clear_changed).
    pub fn value_changed(&self) -> bool {
        self.changed
    }

    pub fn clear_changed(&mut self) {
        self.changed = false;
    }

    // -- encodings ----------------------------------------------------------

    pub fn to_string_value(&self) -> String {
        self.value.to_string()
    }

    /// Parse and store a string form. Returns `true` if the value changed.
    pub fn from_string_value(&mut self, s: &str) -> Result<bool, SceneError> {
        let value = AttributeValue::parse(self.kind(), s)?;
        self.set_decoded_value(value)
    }

    /// Store a value read from a serialized form. Asset references keep
    /// this attribute's type hint when the decoded value has none.
    pub fn set_decoded_value(&mut self, value: AttributeValue) -> Result<bool, SceneError> {
        let value = value.with_type_hint_of(&self.value);
        self.set_value(value)
    }

    pub fn to_binary(&self, dest: &mut DataSerializer) -> Result<(), SceneError> {
        self.value.write_binary(dest)
    }

    pub fn from_binary(&mut self, source: &mut DataDeserializer<'_>) -> Result<bool, SceneError> {
        let value = AttributeValue::read_binary(self.kind(), source)?;
        self.set_decoded_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_value_tracks_changes() {
        let mut attr = Attribute::new("visible", "Visible", AttributeValue::Bool(true));
        assert!(!attr.value_changed());
        assert!(!attr.set_value(AttributeValue::Bool(true)).unwrap());
        assert!(!attr.value_changed());
        assert!(attr.set_value(AttributeValue::Bool(false)).unwrap());
        assert!(attr.value_changed());
        attr.clear_changed();
        assert!(!attr.value_changed());
    }

    #[test]
    fn set_value_rejects_other_kinds() {
        let mut attr = Attribute::new("count", "Count", AttributeValue::Int(1));
        let err = attr.set_value(AttributeValue::Real(1.0)).unwrap_err();
        assert!(matches!(
            err,
            SceneError::AttributeTypeMismatch {
                expected: "int",
                found: "real",
                ..
            }
        ));
        assert_eq!(attr.value(), &AttributeValue::Int(1));
    }

    #[test]
    fn dynamic_attribute_name_equals_id() {
        let attr = Attribute::new_dynamic("speed", AttributeKind::Real);
        assert!(attr.is_dynamic());
        assert_eq!(attr.name(), "speed");
        assert_eq!(attr.value(), &AttributeValue::Real(0.0));
        assert_eq!(attr.type_id(), 3);
    }

    #[test]
    fn from_string_value_parses_with_own_kind() {
        let mut attr = Attribute::new_dynamic("n", AttributeKind::UInt);
        assert!(attr.from_string_value("12").unwrap());
        assert_eq!(attr.value(), &AttributeValue::UInt(12));
        assert!(attr.from_string_value("x").is_err());
        assert_eq!(attr.to_string_value(), "12");
    }
}
