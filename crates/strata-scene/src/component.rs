//! Components, component type metadata and the type registry.
//!
//! A [`Component`] is a named container of [`Attribute`]s. Its layout is
//! either *static* (fixed by a [`ComponentTypeInfo`] at construction) or
//! *dynamic* (attributes added and removed at runtime, keyed by id). Removed
//! dynamic attributes leave holes in the slot list so raw indices held
//! elsewhere stay valid; positional accessors skip the holes.
//!
//! Types are registered in a [`ComponentRegistry`] keyed by numeric type id and
//! by type name. Type names compare case-insensitively and the `EC_` prefix is
//! optional on lookup.

use std::collections::HashMap;

use crate::attribute::{Attribute, AttributeDecl};
use crate::change::AttributeChange;
use crate::codec::DataSerializer;
use crate::entity::EntityWeak;
use crate::id::ComponentId;
use crate::value::{AttributeValue, EntityReference, Transform};
use crate::SceneError;

/// Prefix carried by every component type name.
pub const TYPE_NAME_PREFIX: &str = "EC_";

/// `"Placeable"` becomes `"EC_Placeable"`; prefixed names are returned as is.
pub fn ensure_type_name_prefix(name: &str) -> String {
    if has_prefix(name) {
        name.to_owned()
    } else {
        format!("{TYPE_NAME_PREFIX}{name}")
    }
}

/// `"EC_Placeable"` becomes `"Placeable"`.
pub fn strip_type_name_prefix(name: &str) -> &str {
    if has_prefix(name) {
        &name[TYPE_NAME_PREFIX.len()..]
    } else {
        name
    }
}

fn has_prefix(name: &str) -> bool {
    name.get(..TYPE_NAME_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(TYPE_NAME_PREFIX))
}

// ---------------------------------------------------------------------------
// ComponentTypeInfo / ComponentType
// ---------------------------------------------------------------------------

/// Registered metadata for one component type.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentTypeInfo {
    pub type_id: u32,
    /// Full type name including the `EC_` prefix.
    pub type_name: String,
    /// Static layout. Empty for dynamic types.
    pub attributes: Vec<AttributeDecl>,
    pub dynamic: bool,
}

impl ComponentTypeInfo {
    pub fn new(type_id: u32, type_name: &str, attributes: Vec<AttributeDecl>) -> Self {
        Self {
            type_id,
            type_name: ensure_type_name_prefix(type_name),
            attributes,
            dynamic: false,
        }
    }

    pub fn new_dynamic(type_id: u32, type_name: &str) -> Self {
        Self {
            dynamic: true,
            ..Self::new(type_id, type_name, Vec::new())
        }
    }
}

/// Compile-time identity of a component type, used for typed lookup via
/// [`Entity::component`](crate::entity::Entity::component).
pub trait ComponentType {
    const TYPE_ID: u32;
    const TYPE_NAME: &'static str;

    fn type_info() -> ComponentTypeInfo;
}

// -- built-in types ---------------------------------------------------------

/// `EC_Name`: name, description and group of an entity.
#[derive(Debug, Clone, Copy)]
pub struct NameComponent;

impl NameComponent {
    pub const NAME: &'static str = "name";
    pub const DESCRIPTION: &'static str = "description";
    pub const GROUP: &'static str = "group";
}

impl ComponentType for NameComponent {
    const TYPE_ID: u32 = 26;
    const TYPE_NAME: &'static str = "EC_Name";

    fn type_info() -> ComponentTypeInfo {
        let empty = || AttributeValue::String(String::new());
        ComponentTypeInfo::new(
            Self::TYPE_ID,
            Self::TYPE_NAME,
            vec![
                AttributeDecl::new(Self::NAME, "Name", empty()),
                AttributeDecl::new(Self::DESCRIPTION, "Description", empty()),
                AttributeDecl::new(Self::GROUP, "Group", empty()),
            ],
        )
    }
}

/// `EC_Placeable`: spatial transform plus an attribute-based soft parent.
#[derive(Debug, Clone, Copy)]
pub struct Placeable;

impl Placeable {
    pub const TRANSFORM: &'static str = "transform";
    pub const VISIBLE: &'static str = "visible";
    pub const SELECTION_LAYER: &'static str = "selectionLayer";
    pub const PARENT_REF: &'static str = "parentRef";
    pub const PARENT_BONE: &'static str = "parentBone";
}

impl ComponentType for Placeable {
    const TYPE_ID: u32 = 20;
    const TYPE_NAME: &'static str = "EC_Placeable";

    fn type_info() -> ComponentTypeInfo {
        ComponentTypeInfo::new(
            Self::TYPE_ID,
            Self::TYPE_NAME,
            vec![
                AttributeDecl::new(
                    Self::TRANSFORM,
                    "Transform",
                    AttributeValue::Transform(Transform::default()),
                ),
                AttributeDecl::new(Self::VISIBLE, "Visible", AttributeValue::Bool(true)),
                AttributeDecl::new(
                    Self::SELECTION_LAYER,
                    "Selection layer",
                    AttributeValue::Int(1),
                ),
                AttributeDecl::new(
                    Self::PARENT_REF,
                    "Parent entity ref",
                    AttributeValue::EntityReference(EntityReference::default()),
                ),
                AttributeDecl::new(
                    Self::PARENT_BONE,
                    "Parent bone name",
                    AttributeValue::String(String::new()),
                ),
            ],
        )
    }
}

/// `EC_DynamicComponent`: attributes defined at runtime.
#[derive(Debug, Clone, Copy)]
pub struct DynamicComponent;

impl ComponentType for DynamicComponent {
    const TYPE_ID: u32 = 25;
    const TYPE_NAME: &'static str = "EC_DynamicComponent";

    fn type_info() -> ComponentTypeInfo {
        ComponentTypeInfo::new_dynamic(Self::TYPE_ID, Self::TYPE_NAME)
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Factory for components, keyed by type id and type name.
#[derive(Debug, Clone)]
pub struct ComponentRegistry {
    by_id: HashMap<u32, usize>,
    /// Lower-cased name without the `EC_` prefix.
    by_name: HashMap<String, usize>,
    infos: Vec<ComponentTypeInfo>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            infos: Vec::new(),
        }
    }

    /// A registry holding `EC_Name`, `EC_Placeable` and `EC_DynamicComponent`.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        for info in [
            NameComponent::type_info(),
            Placeable::type_info(),
            DynamicComponent::type_info(),
        ] {
            // Fresh registry, ids and names are distinct.
            let _ = reg.register(info);
        }
        reg
    }

    /// Register a component type. Both the type id and the type name must be
    /// unused.
    pub fn register(&mut self, info: ComponentTypeInfo) -> Result<(), SceneError> {
        let key = name_key(&info.type_name);
        if self.by_id.contains_key(&info.type_id) || self.by_name.contains_key(&key) {
            return Err(SceneError::DuplicateComponentType {
                type_id: info.type_id,
                type_name: info.type_name,
            });
        }
        let index = self.infos.len();
        self.by_id.insert(info.type_id, index);
        self.by_name.insert(key, index);
        self.infos.push(info);
        Ok(())
    }

    pub fn register_type<T: ComponentType>(&mut self) -> Result<(), SceneError> {
        self.register(T::type_info())
    }

    pub fn info_by_id(&self, type_id: u32) -> Option<&ComponentTypeInfo> {
        self.by_id.get(&type_id).map(|&i| &self.infos[i])
    }

    /// Lookup by type name, with or without the `EC_` prefix.
    pub fn info_by_name(&self, type_name: &str) -> Option<&ComponentTypeInfo> {
        self.by_name.get(&name_key(type_name)).map(|&i| &self.infos[i])
    }

    /// Instantiate a component by type id. The result is free-floating.
    pub fn create(&self, type_id: u32, name: &str) -> Result<Component, SceneError> {
        self.info_by_id(type_id)
            .map(|info| Component::new(info, name))
            .ok_or_else(|| self.unknown(&type_id.to_string()))
    }

    /// Instantiate a component by type name. The result is free-floating.
    pub fn create_by_name(&self, type_name: &str, name: &str) -> Result<Component, SceneError> {
        self.info_by_name(type_name)
            .map(|info| Component::new(info, name))
            .ok_or_else(|| self.unknown(type_name))
    }

    pub(crate) fn unknown(&self, name: &str) -> SceneError {
        SceneError::UnknownComponentType {
            name: name.to_owned(),
            registered: self.registered_names().join(", "),
        }
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Names of all registered types, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.infos.iter().map(|i| i.type_name.as_str()).collect();
        names.sort();
        names
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn name_key(type_name: &str) -> String {
    strip_type_name_prefix(type_name).to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A typed, named container of attributes.
///
/// A component is created free-floating by a [`ComponentRegistry`] and
/// attached to an entity through
/// [`EntityMut::add_component`](crate::entity::EntityMut::add_component).
/// Mutating methods on `Component` itself do not notify anyone; once attached,
/// attribute writes go through [`EntityMut`](crate::entity::EntityMut) so the
/// scene can emit change events.
#[derive(Debug, Clone)]
pub struct Component {
    id: ComponentId,
    type_id: u32,
    type_name: String,
    name: String,
    attributes: Vec<Option<Attribute>>,
    dynamic: bool,
    replicated: bool,
    temporary: bool,
    update_mode: AttributeChange,
    parent: Option<EntityWeak>,
}

impl Component {
    pub fn new(info: &ComponentTypeInfo, name: &str) -> Self {
        Self {
            id: ComponentId::NONE,
            type_id: info.type_id,
            type_name: info.type_name.clone(),
            name: name.to_owned(),
            attributes: info.attributes.iter().map(|d| Some(d.instantiate())).collect(),
            dynamic: info.dynamic,
            replicated: true,
            temporary: false,
            update_mode: AttributeChange::Default,
            parent: None,
        }
    }

    // -- identity -----------------------------------------------------------

    /// `ComponentId::NONE` while free-floating.
    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: ComponentId) {
        self.id = id;
    }

    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// The owning entity, or `None` when free-floating.
    pub fn parent_entity(&self) -> Option<EntityWeak> {
        self.parent
    }

    pub(crate) fn set_parent_entity(&mut self, parent: Option<EntityWeak>) {
        self.parent = parent;
    }

    // -- flags --------------------------------------------------------------

    pub fn is_replicated(&self) -> bool {
        self.replicated
    }

    pub fn is_local(&self) -> bool {
        !self.replicated
    }

    /// Choose replicated or local. Only allowed before an id is assigned.
    pub fn set_replicated(&mut self, enable: bool) {
        if !self.id.is_none() {
            tracing::error!(
                component = %self.id,
                type_name = %self.type_name,
                "replication mode cannot change after an id is assigned"
            );
            return;
        }
        self.replicated = enable;
    }

    pub(crate) fn force_replicated(&mut self, enable: bool) {
        self.replicated = enable;
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn set_temporary(&mut self, enable: bool) {
        self.temporary = enable;
    }

    pub fn update_mode(&self) -> AttributeChange {
        self.update_mode
    }

    pub fn set_update_mode(&mut self, mode: AttributeChange) {
        self.update_mode = mode;
    }

    /// Resolve a requested change type against this component's update mode
    /// and replication status.
    pub fn resolve_change(&self, change: AttributeChange) -> AttributeChange {
        change.or(self.update_mode).resolve(self.replicated)
    }

    /// Whether a save with the given filters includes this component.
    pub fn should_be_serialized(&self, serialize_temporary: bool, serialize_local: bool) -> bool {
        !(self.temporary && !serialize_temporary) && !(self.is_local() && !serialize_local)
    }

    // -- attribute access ---------------------------------------------------

    /// Non-empty attributes in slot order.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> + '_ {
        self.attributes.iter().flatten()
    }

    /// Raw slots, holes included.
    pub fn attribute_slots(&self) -> &[Option<Attribute>] {
        &self.attributes
    }

    /// Number of non-empty attributes.
    pub fn num_attributes(&self) -> usize {
        self.attributes().count()
    }

    /// Raw slot index of the `index`-th non-empty attribute.
    pub fn internal_attribute_index(&self, index: usize) -> Option<usize> {
        self.attributes
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .nth(index)
            .map(|(raw, _)| raw)
    }

    /// The `index`-th non-empty attribute.
    pub fn attribute(&self, index: usize) -> Option<&Attribute> {
        self.attributes().nth(index)
    }

    /// Case-insensitive lookup by id, first match wins.
    pub fn attribute_by_id(&self, id: &str) -> Option<&Attribute> {
        self.attributes().find(|a| a.id().eq_ignore_ascii_case(id))
    }

    /// Case-insensitive lookup by display name.
    pub fn attribute_by_name(&self, name: &str) -> Option<&Attribute> {
        self.attributes().find(|a| a.name().eq_ignore_ascii_case(name))
    }

    /// Raw slot index of the attribute with `id`.
    pub fn attribute_slot_by_id(&self, id: &str) -> Option<usize> {
        self.attributes
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|a| a.id().eq_ignore_ascii_case(id)))
    }

    /// Slot matching `id`, falling back to a display-name match.
    pub(crate) fn attribute_slot_by_id_or_name(&self, id: &str, name: &str) -> Option<usize> {
        self.attribute_slot_by_id(id).or_else(|| {
            self.attributes
                .iter()
                .position(|slot| slot.as_ref().is_some_and(|a| a.name().eq_ignore_ascii_case(name)))
        })
    }

    pub fn has_attribute(&self, id: &str) -> bool {
        self.attribute_slot_by_id(id).is_some()
    }

    pub(crate) fn slot_mut(&mut self, raw: usize) -> Option<&mut Attribute> {
        self.attributes.get_mut(raw).and_then(Option::as_mut)
    }

    /// Convenience for reading a value by attribute id.
    pub fn value(&self, id: &str) -> Option<&AttributeValue> {
        self.attribute_by_id(id).map(Attribute::value)
    }

    /// Write a value directly, without notifications. Intended for
    /// free-floating components being prepared before attachment.
    pub fn set_value(&mut self, id: &str, value: AttributeValue) -> Result<bool, SceneError> {
        let raw = self.require_slot(id)?;
        match self.slot_mut(raw) {
            Some(attr) => attr.set_value(value),
            None => Err(self.missing(id)),
        }
    }

    pub(crate) fn require_slot(&self, id: &str) -> Result<usize, SceneError> {
        self.attribute_slot_by_id(id).ok_or_else(|| self.missing(id))
    }

    fn missing(&self, id: &str) -> SceneError {
        SceneError::AttributeNotFound {
            component: self.type_name.clone(),
            attribute: id.to_owned(),
        }
    }

    // -- dynamic layout -----------------------------------------------------

    /// Insert an attribute into the first hole, or append. Dynamic components
    /// only; ids must be unique.
    pub fn add_attribute(&mut self, attribute: Attribute) -> Result<usize, SceneError> {
        self.require_dynamic()?;
        if self.has_attribute(attribute.id()) {
            return Err(SceneError::DuplicateAttribute {
                component: self.type_name.clone(),
                attribute: attribute.id().to_owned(),
            });
        }
        match self.attributes.iter().position(Option::is_none) {
            Some(hole) => {
                self.attributes[hole] = Some(attribute);
                Ok(hole)
            }
            None => {
                self.attributes.push(Some(attribute));
                Ok(self.attributes.len() - 1)
            }
        }
    }

    /// Empty the slot at `raw` and return its attribute. Dynamic only.
    pub fn remove_attribute(&mut self, raw: usize) -> Result<Option<Attribute>, SceneError> {
        self.require_dynamic()?;
        Ok(self.attributes.get_mut(raw).and_then(Option::take))
    }

    pub(crate) fn require_dynamic(&self) -> Result<(), SceneError> {
        if self.dynamic {
            Ok(())
        } else {
            Err(SceneError::NotDynamic {
                component: self.type_name.clone(),
            })
        }
    }

    /// True when both components hold attributes with the same ids and kinds,
    /// regardless of order and holes.
    pub fn contains_same_attributes(&self, other: &Component) -> bool {
        let signature = |c: &Component| {
            let mut sig: Vec<(String, u32)> = c
                .attributes()
                .map(|a| (a.id().to_lowercase(), a.type_id()))
                .collect();
            sig.sort();
            sig
        };
        signature(self) == signature(other)
    }

    // -- binary payload -----------------------------------------------------

    /// Encode the attribute payload.
    ///
    /// Static components write each attribute's binary value in layout order.
    /// Dynamic components write `u8 count` and then id, type name and string
    /// value for each attribute.
    pub fn write_payload(&self, dest: &mut DataSerializer) -> Result<(), SceneError> {
        if self.dynamic {
            let count = self.num_attributes();
            let count = u8::try_from(count).map_err(|_| SceneError::TooManyAttributes {
                component: self.type_name.clone(),
                count,
            })?;
            dest.add_u8(count);
            for attr in self.attributes() {
                dest.add_short_string(attr.id())?;
                dest.add_short_string(attr.type_name())?;
                dest.add_string(&attr.to_string_value())?;
            }
        } else {
            for attr in self.attributes() {
                attr.to_binary(dest)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttributeKind;

    #[test]
    fn prefix_helpers() {
        assert_eq!(ensure_type_name_prefix("Placeable"), "EC_Placeable");
        assert_eq!(ensure_type_name_prefix("EC_Name"), "EC_Name");
        assert_eq!(strip_type_name_prefix("EC_Name"), "Name");
        assert_eq!(strip_type_name_prefix("Mesh"), "Mesh");
    }

    #[test]
    fn registry_lookup_by_id_and_name() {
        let reg = ComponentRegistry::with_builtins();
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.info_by_id(20).unwrap().type_name, "EC_Placeable");
        assert_eq!(reg.info_by_name("placeable").unwrap().type_id, 20);
        assert_eq!(reg.info_by_name("EC_NAME").unwrap().type_id, 26);
        assert!(reg.info_by_name("EC_Mesh").is_none());
    }

    #[test]
    fn registry_rejects_duplicates() {
        let mut reg = ComponentRegistry::with_builtins();
        let dup_id = ComponentTypeInfo::new(20, "EC_Other", Vec::new());
        assert!(matches!(
            reg.register(dup_id),
            Err(SceneError::DuplicateComponentType { type_id: 20, .. })
        ));
        let dup_name = ComponentTypeInfo::new(99, "Name", Vec::new());
        assert!(reg.register(dup_name).is_err());
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn unknown_type_lists_registered_names() {
        let reg = ComponentRegistry::with_builtins();
        let err = reg.create_by_name("EC_Mesh", "").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("EC_Mesh"));
        assert!(msg.contains("EC_Placeable"));
    }

    #[test]
    fn static_component_has_declared_layout() {
        let reg = ComponentRegistry::with_builtins();
        let comp = reg.create(Placeable::TYPE_ID, "").unwrap();
        assert!(!comp.is_dynamic());
        assert_eq!(comp.num_attributes(), 5);
        assert_eq!(comp.attribute(0).unwrap().id(), Placeable::TRANSFORM);
        assert_eq!(
            comp.value("VISIBLE"),
            Some(&AttributeValue::Bool(true)),
            "lookup by id ignores case"
        );
        assert!(comp.parent_entity().is_none());
        assert!(comp.id().is_none());
    }

    #[test]
    fn static_component_rejects_layout_changes() {
        let reg = ComponentRegistry::with_builtins();
        let mut comp = reg.create(NameComponent::TYPE_ID, "").unwrap();
        let err = comp
            .add_attribute(Attribute::new_dynamic("x", AttributeKind::Int))
            .unwrap_err();
        assert!(matches!(err, SceneError::NotDynamic { .. }));
        assert!(comp.remove_attribute(0).is_err());
        assert_eq!(comp.num_attributes(), 3);
    }

    // -- dynamic layout -----------------------------------------------------

    #[test]
    fn removal_leaves_holes_and_positional_access_skips_them() {
        let reg = ComponentRegistry::with_builtins();
        let mut comp = reg.create(DynamicComponent::TYPE_ID, "vars").unwrap();
        comp.add_attribute(Attribute::new_dynamic("a", AttributeKind::Int)).unwrap();
        comp.add_attribute(Attribute::new_dynamic("b", AttributeKind::Real)).unwrap();
        comp.add_attribute(Attribute::new_dynamic("c", AttributeKind::Bool)).unwrap();

        let removed = comp.remove_attribute(1).unwrap().unwrap();
        assert_eq!(removed.id(), "b");
        assert_eq!(comp.attribute_slots().len(), 3);
        assert_eq!(comp.num_attributes(), 2);
        assert_eq!(comp.attribute(1).unwrap().id(), "c");
        assert_eq!(comp.internal_attribute_index(1), Some(2));
        assert_eq!(comp.internal_attribute_index(2), None);

        // The next addition fills the hole.
        let slot = comp
            .add_attribute(Attribute::new_dynamic("d", AttributeKind::String))
            .unwrap();
        assert_eq!(slot, 1);
    }

    #[test]
    fn duplicate_dynamic_ids_rejected_case_insensitively() {
        let reg = ComponentRegistry::with_builtins();
        let mut comp = reg.create(DynamicComponent::TYPE_ID, "").unwrap();
        comp.add_attribute(Attribute::new_dynamic("Speed", AttributeKind::Real)).unwrap();
        assert!(matches!(
            comp.add_attribute(Attribute::new_dynamic("speed", AttributeKind::Int)),
            Err(SceneError::DuplicateAttribute { .. })
        ));
    }

    #[test]
    fn contains_same_attributes_ignores_order() {
        let reg = ComponentRegistry::with_builtins();
        let mut a = reg.create(DynamicComponent::TYPE_ID, "").unwrap();
        let mut b = reg.create(DynamicComponent::TYPE_ID, "").unwrap();
        a.add_attribute(Attribute::new_dynamic("x", AttributeKind::Int)).unwrap();
        a.add_attribute(Attribute::new_dynamic("y", AttributeKind::Real)).unwrap();
        b.add_attribute(Attribute::new_dynamic("Y", AttributeKind::Real)).unwrap();
        b.add_attribute(Attribute::new_dynamic("x", AttributeKind::Int)).unwrap();
        assert!(a.contains_same_attributes(&b));
        b.remove_attribute(0).unwrap();
        assert!(!a.contains_same_attributes(&b));
    }

    // -- flags ----------------------------------------------------------------

    #[test]
    fn serialization_filters() {
        let reg = ComponentRegistry::with_builtins();
        let mut comp = reg.create(NameComponent::TYPE_ID, "").unwrap();
        assert!(comp.should_be_serialized(false, false));
        comp.set_temporary(true);
        assert!(!comp.should_be_serialized(false, true));
        assert!(comp.should_be_serialized(true, false));
        comp.set_temporary(false);
        comp.set_replicated(false);
        assert!(!comp.should_be_serialized(true, false));
        assert!(comp.should_be_serialized(false, true));
    }

    #[test]
    fn replication_mode_frozen_after_id_assignment() {
        let reg = ComponentRegistry::with_builtins();
        let mut comp = reg.create(NameComponent::TYPE_ID, "").unwrap();
        comp.set_id(ComponentId(3));
        comp.set_replicated(false);
        assert!(comp.is_replicated());
    }

    #[test]
    fn resolve_change_uses_update_mode_then_replication() {
        let reg = ComponentRegistry::with_builtins();
        let mut comp = reg.create(NameComponent::TYPE_ID, "").unwrap();
        assert_eq!(comp.resolve_change(AttributeChange::Default), AttributeChange::Replicate);
        comp.set_update_mode(AttributeChange::LocalOnly);
        assert_eq!(comp.resolve_change(AttributeChange::Default), AttributeChange::LocalOnly);
        assert_eq!(comp.resolve_change(AttributeChange::Replicate), AttributeChange::Replicate);
        comp.set_update_mode(AttributeChange::Disconnected);
        assert!(comp.resolve_change(AttributeChange::Default).is_disconnected());
    }

    #[test]
    fn dynamic_payload_uses_string_values() {
        let reg = ComponentRegistry::with_builtins();
        let mut comp = reg.create(DynamicComponent::TYPE_ID, "").unwrap();
        comp.add_attribute(Attribute::new_dynamic("n", AttributeKind::Int)).unwrap();
        comp.set_value("n", AttributeValue::Int(42)).unwrap();
        let mut ser = DataSerializer::new();
        comp.write_payload(&mut ser).unwrap();
        // count, "n", "int", u16 len + "42"
        assert_eq!(ser.as_bytes(), &[1, 1, b'n', 3, b'i', b'n', b't', 2, 0, b'4', b'2']);
    }
}
