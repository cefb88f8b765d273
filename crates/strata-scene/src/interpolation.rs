//! In-flight attribute interpolations.

use crate::entity::EntityWeak;
use crate::id::ComponentId;
use crate::value::AttributeValue;

/// Identity of one attribute of an attached component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeRef {
    pub entity: EntityWeak,
    pub component: ComponentId,
    pub attribute: String,
}

impl AttributeRef {
    pub fn new(entity: EntityWeak, component: ComponentId, attribute: &str) -> Self {
        Self {
            entity,
            component,
            attribute: attribute.to_owned(),
        }
    }

    /// Same destination attribute. Attribute ids compare case-insensitively.
    pub fn targets(&self, other: &AttributeRef) -> bool {
        self.entity == other.entity
            && self.component == other.component
            && self.attribute.eq_ignore_ascii_case(&other.attribute)
    }
}

/// Blend from `start` to `end` over `length` seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInterpolation {
    pub dest: AttributeRef,
    pub start: AttributeValue,
    pub end: AttributeValue,
    pub time: f32,
    pub length: f32,
}

impl AttributeInterpolation {
    /// Advance by `dt` and return the value to apply, or `None` if the
    /// kinds cannot be blended. A finished interpolation yields `end`
    /// exactly.
    pub fn advance(&mut self, dt: f32) -> Option<AttributeValue> {
        self.time += dt;
        if self.is_finished() {
            return (self.start.kind() == self.end.kind()).then(|| self.end.clone());
        }
        self.start.interpolate(&self.end, self.time / self.length)
    }

    pub fn is_finished(&self) -> bool {
        self.time >= self.length
    }
}
