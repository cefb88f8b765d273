//! Entities: component containers with a parent/child hierarchy.
//!
//! An [`Entity`] is owned by its [`Scene`]. Outside code holds entities by
//! [`EntityId`] or by [`EntityWeak`], a handle that survives id changes and
//! expires when the entity is removed. Read access goes through [`EntityRef`],
//! which can resolve hierarchy links; mutation goes through [`EntityMut`],
//! which routes every change through the scene so events are emitted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

use crate::attribute::Attribute;
use crate::change::AttributeChange;
use crate::component::{ensure_type_name_prefix, Component, ComponentType, NameComponent};
use crate::binary::decode_payload;
use crate::desc::AttributeDesc;
use crate::dynamic::plan_reconcile;
use crate::event::SceneEvent;
use crate::id::{ComponentId, EntityId, UniqueIdGenerator};
use crate::scene::Scene;
use crate::xml::parse_component_desc;
use crate::value::{AttributeKind, AttributeValue};
use crate::SceneError;

/// Longest parent chain a scene accepts, counting the root. Parenting and
/// both file formats reject anything deeper with
/// [`SceneError::HierarchyTooDeep`], which keeps hierarchy walks bounded.
pub const MAX_HIERARCHY_DEPTH: usize = 128;

// ---------------------------------------------------------------------------
// EntityWeak
// ---------------------------------------------------------------------------

/// Non-owning entity handle.
///
/// Wraps a per-scene key that is never reused, so a handle to a removed entity
/// stays expired even if its id is later taken by another entity. Resolve with
/// [`Scene::upgrade`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityWeak {
    pub(crate) key: u64,
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Where an entity action is executed. Bits combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecType(pub u8);

impl ExecType {
    pub const LOCAL: ExecType = ExecType(1);
    pub const SERVER: ExecType = ExecType(2);
    pub const PEERS: ExecType = ExecType(4);

    pub fn contains(self, other: ExecType) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ExecType {
    type Output = ExecType;

    fn bitor(self, rhs: ExecType) -> ExecType {
        ExecType(self.0 | rhs.0)
    }
}

/// Handler invoked when an action triggers locally.
pub type ActionHandler = Box<dyn FnMut(&[String])>;

/// A named action with local handlers.
pub struct EntityAction {
    name: String,
    handlers: Vec<ActionHandler>,
}

impl EntityAction {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            handlers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connect(&mut self, handler: ActionHandler) {
        self.handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    fn trigger(&mut self, params: &[String]) {
        for handler in &mut self.handlers {
            handler(params);
        }
    }
}

impl fmt::Debug for EntityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityAction")
            .field("name", &self.name)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A container of components. Created only by a [`Scene`].
#[derive(Debug)]
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) key: u64,
    pub(crate) temporary: bool,
    pub(crate) components: BTreeMap<ComponentId, Component>,
    pub(crate) id_generator: UniqueIdGenerator,
    pub(crate) parent: Option<EntityWeak>,
    pub(crate) children: Vec<EntityWeak>,
    /// Keyed by lower-cased action name.
    pub(crate) actions: BTreeMap<String, EntityAction>,
}

impl Entity {
    pub(crate) fn new(id: EntityId, key: u64, temporary: bool) -> Self {
        Self {
            id,
            key,
            temporary,
            components: BTreeMap::new(),
            id_generator: UniqueIdGenerator::new(),
            parent: None,
            children: Vec::new(),
            actions: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn weak(&self) -> EntityWeak {
        EntityWeak { key: self.key }
    }

    pub fn is_replicated(&self) -> bool {
        self.id.is_replicated()
    }

    pub fn is_local(&self) -> bool {
        self.id.is_local()
    }

    pub fn is_unacked(&self) -> bool {
        self.id.is_unacked()
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    // -- components ---------------------------------------------------------

    /// Components in id order.
    pub fn components(&self) -> impl Iterator<Item = &Component> + '_ {
        self.components.values()
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    pub fn component_by_id(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id)
    }

    /// First component of the given type. The `EC_` prefix is optional.
    pub fn component_by_type_name(&self, type_name: &str) -> Option<&Component> {
        let type_name = ensure_type_name_prefix(type_name);
        self.components()
            .find(|c| c.type_name().eq_ignore_ascii_case(&type_name))
    }

    /// Component of the given type and instance name.
    pub fn component_by_type_name_and_name(&self, type_name: &str, name: &str) -> Option<&Component> {
        let type_name = ensure_type_name_prefix(type_name);
        self.components()
            .find(|c| c.type_name().eq_ignore_ascii_case(&type_name) && c.name() == name)
    }

    pub fn component_by_type_id(&self, type_id: u32) -> Option<&Component> {
        self.components().find(|c| c.type_id() == type_id)
    }

    pub fn component_by_type_id_and_name(&self, type_id: u32, name: &str) -> Option<&Component> {
        self.components()
            .find(|c| c.type_id() == type_id && c.name() == name)
    }

    /// Typed lookup: first component of type `T`.
    pub fn component<T: ComponentType>(&self) -> Option<&Component> {
        self.component_by_type_id(T::TYPE_ID)
    }

    /// Typed lookup by instance name.
    pub fn component_named<T: ComponentType>(&self, name: &str) -> Option<&Component> {
        self.component_by_type_id_and_name(T::TYPE_ID, name)
    }

    pub fn components_of_type(&self, type_name: &str) -> Vec<&Component> {
        let type_name = ensure_type_name_prefix(type_name);
        self.components()
            .filter(|c| c.type_name().eq_ignore_ascii_case(&type_name))
            .collect()
    }

    pub fn components_of_type_id(&self, type_id: u32) -> Vec<&Component> {
        self.components().filter(|c| c.type_id() == type_id).collect()
    }

    // -- EC_Name sugar ------------------------------------------------------

    fn name_attribute(&self, id: &str) -> &str {
        self.component::<NameComponent>()
            .and_then(|c| c.value(id))
            .and_then(AttributeValue::as_str)
            .unwrap_or("")
    }

    /// Name stored in `EC_Name`, or an empty string.
    pub fn name(&self) -> &str {
        self.name_attribute(NameComponent::NAME)
    }

    pub fn description(&self) -> &str {
        self.name_attribute(NameComponent::DESCRIPTION)
    }

    pub fn group(&self) -> &str {
        self.name_attribute(NameComponent::GROUP)
    }

    // -- hierarchy handles --------------------------------------------------

    /// Parent handle. May be expired; resolve through the scene.
    pub fn parent_weak(&self) -> Option<EntityWeak> {
        self.parent
    }

    /// Child handles, expired ones included.
    pub fn children_weak(&self) -> &[EntityWeak] {
        &self.children
    }

    // -- actions ------------------------------------------------------------

    pub fn actions(&self) -> impl Iterator<Item = &EntityAction> + '_ {
        self.actions.values()
    }

    /// Case-insensitive action lookup.
    pub fn find_action(&self, name: &str) -> Option<&EntityAction> {
        self.actions.get(&name.to_lowercase())
    }

    pub(crate) fn detach_components(&mut self) {
        for comp in self.components.values_mut() {
            comp.set_parent_entity(None);
        }
    }
}

// ---------------------------------------------------------------------------
// EntityRef
// ---------------------------------------------------------------------------

/// Shared view of an entity that can resolve hierarchy links.
#[derive(Clone, Copy)]
pub struct EntityRef<'a> {
    pub(crate) scene: &'a Scene,
    pub(crate) entity: &'a Entity,
}

impl<'a> Deref for EntityRef<'a> {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        self.entity
    }
}

impl fmt::Debug for EntityRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityRef").field(&self.entity.id).finish()
    }
}

impl<'a> EntityRef<'a> {
    pub fn entity(&self) -> &'a Entity {
        self.entity
    }

    pub fn scene(&self) -> &'a Scene {
        self.scene
    }

    /// Live parent, if any.
    pub fn parent(&self) -> Option<EntityRef<'a>> {
        self.entity.parent.and_then(|w| self.scene.upgrade(w))
    }

    pub fn parent_id(&self) -> Option<EntityId> {
        self.parent().map(|p| p.id())
    }

    pub fn has_parent(&self) -> bool {
        self.parent().is_some()
    }

    /// Live children in attachment order. Expired handles are skipped.
    pub fn children(&self, recursive: bool) -> Vec<EntityRef<'a>> {
        let mut out = Vec::new();
        self.collect_children(&mut out, recursive);
        out
    }

    fn direct_children(&self) -> impl DoubleEndedIterator<Item = EntityRef<'a>> + 'a {
        let (scene, entity) = (self.scene, self.entity);
        entity.children.iter().filter_map(move |&w| scene.upgrade(w))
    }

    // Depth-first, children in insertion order.
    fn collect_children(&self, out: &mut Vec<EntityRef<'a>>, recursive: bool) {
        if !recursive {
            out.extend(self.direct_children());
            return;
        }
        let mut stack: Vec<EntityRef<'a>> = self.direct_children().rev().collect();
        while let Some(child) = stack.pop() {
            out.push(child);
            stack.extend(child.direct_children().rev());
        }
    }

    /// Levels in the subtree rooted here; `1` for a leaf.
    pub fn subtree_height(&self) -> usize {
        let mut height = 0;
        let mut stack = vec![(*self, 1usize)];
        while let Some((entity, depth)) = stack.pop() {
            height = height.max(depth);
            stack.extend(entity.direct_children().map(|c| (c, depth + 1)));
        }
        height
    }

    pub fn num_children(&self) -> usize {
        self.children(false).len()
    }

    /// The `index`-th live child.
    pub fn child(&self, index: usize) -> Option<EntityRef<'a>> {
        self.entity
            .children
            .iter()
            .filter_map(|&w| self.scene.upgrade(w))
            .nth(index)
    }

    /// First child whose name matches case-insensitively, optionally searching
    /// the whole subtree depth-first.
    pub fn child_by_name(&self, name: &str, recursive: bool) -> Option<EntityRef<'a>> {
        for child in self.entity.children.iter().filter_map(|&w| self.scene.upgrade(w)) {
            if child.name().eq_ignore_ascii_case(name) {
                return Some(child);
            }
            if recursive {
                if let Some(found) = child.child_by_name(name, true) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Whether a save with the given filters includes this entity at this
    /// level of the output.
    pub fn should_be_serialized(
        &self,
        serialize_temporary: bool,
        serialize_local: bool,
        serialize_children: bool,
    ) -> bool {
        if self.is_temporary() && !serialize_temporary {
            return false;
        }
        if self.is_local() && !serialize_local {
            return false;
        }
        if self.has_parent() && !serialize_children {
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// EntityMut
// ---------------------------------------------------------------------------

/// Mutable view of one entity, borrowing its scene.
pub struct EntityMut<'a> {
    pub(crate) scene: &'a mut Scene,
    pub(crate) id: EntityId,
}

impl fmt::Debug for EntityMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityMut").field(&self.id).finish()
    }
}

impl<'a> EntityMut<'a> {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn scene(&mut self) -> &mut Scene {
        self.scene
    }

    /// Read-only view of the entity.
    pub fn get(&self) -> Result<EntityRef<'_>, SceneError> {
        self.scene
            .entity(self.id)
            .ok_or(SceneError::EntityNotFound { entity: self.id })
    }

    fn entity(&self) -> Result<&Entity, SceneError> {
        self.scene
            .entities
            .get(&self.id)
            .ok_or(SceneError::EntityNotFound { entity: self.id })
    }

    fn entity_mut(&mut self) -> Result<&mut Entity, SceneError> {
        self.scene
            .entities
            .get_mut(&self.id)
            .ok_or(SceneError::EntityNotFound { entity: self.id })
    }

    fn component_mut(&mut self, id: ComponentId) -> Result<&mut Component, SceneError> {
        let entity = self.id;
        self.entity_mut()?
            .components
            .get_mut(&id)
            .ok_or(SceneError::ComponentNotFound {
                entity,
                component: id,
            })
    }

    // -- component lifecycle ------------------------------------------------

    /// Attach a free-floating component.
    ///
    /// With `id == ComponentId::NONE` an id is allocated from the range chosen
    /// by the component's replication flag and the scene's authority.
    /// Otherwise the component's replication flag follows the range of `id`
    /// and an occupied id is rejected.
    pub fn add_component(
        &mut self,
        id: ComponentId,
        mut component: Component,
        change: AttributeChange,
    ) -> Result<ComponentId, SceneError> {
        let authority = self.scene.authority;
        let entity_id = self.id;
        let entity = self.entity_mut()?;

        let id = if id.is_none() {
            if entity.is_local() {
                component.force_replicated(false);
            }
            loop {
                let raw = match (component.is_replicated(), authority) {
                    (true, true) => entity.id_generator.allocate_replicated(),
                    (true, false) => entity.id_generator.allocate_unacked(),
                    (false, _) => entity.id_generator.allocate_local(),
                };
                if !entity.components.contains_key(&ComponentId(raw)) {
                    break ComponentId(raw);
                }
            }
        } else {
            if entity.components.contains_key(&id) {
                tracing::error!(
                    entity = %entity_id,
                    component = %id,
                    type_name = %component.type_name(),
                    "component id already in use, not adding"
                );
                return Err(SceneError::ComponentIdInUse {
                    entity: entity_id,
                    component: id,
                });
            }
            component.force_replicated(id.is_replicated());
            if id.range() == crate::id::IdRange::Replicated {
                entity.id_generator.reset_replicated_id(id.raw());
            }
            id
        };

        component.set_id(id);
        component.set_parent_entity(Some(entity.weak()));
        let type_id = component.type_id();
        let resolved = component.resolve_change(change);
        entity.components.insert(id, component);

        if !resolved.is_disconnected() {
            self.scene.emit(SceneEvent::ComponentAdded {
                entity: entity_id,
                component: id,
                type_id,
                change: resolved,
            });
        }
        Ok(id)
    }

    fn add_new(
        &mut self,
        mut component: Component,
        change: AttributeChange,
        replicated: bool,
    ) -> Result<ComponentId, SceneError> {
        component.set_replicated(replicated);
        self.add_component(ComponentId::NONE, component, change)
    }

    /// Create and attach a component by type name.
    pub fn create_component(
        &mut self,
        type_name: &str,
        name: &str,
        change: AttributeChange,
        replicated: bool,
    ) -> Result<ComponentId, SceneError> {
        let component = self.scene.registry().create_by_name(type_name, name).inspect_err(|e| {
            tracing::error!(entity = %self.id, error = %e, "failed to create component");
        })?;
        self.add_new(component, change, replicated)
    }

    /// Create and attach a component by numeric type id.
    pub fn create_component_by_type_id(
        &mut self,
        type_id: u32,
        name: &str,
        change: AttributeChange,
        replicated: bool,
    ) -> Result<ComponentId, SceneError> {
        let component = self.scene.registry().create(type_id, name).inspect_err(|e| {
            tracing::error!(entity = %self.id, error = %e, "failed to create component");
        })?;
        self.add_new(component, change, replicated)
    }

    /// Create a component with an id dictated by the host. `NONE` allocates a
    /// replicated id.
    pub fn create_component_with_id(
        &mut self,
        comp_id: ComponentId,
        type_id: u32,
        name: &str,
        change: AttributeChange,
    ) -> Result<ComponentId, SceneError> {
        let mut component = self.scene.registry().create(type_id, name)?;
        if comp_id.is_none() {
            component.set_replicated(true);
        }
        self.add_component(comp_id, component, change)
    }

    /// Existing component of the given type and name, or a new one.
    pub fn get_or_create_component(
        &mut self,
        type_name: &str,
        name: &str,
        change: AttributeChange,
        replicated: bool,
    ) -> Result<ComponentId, SceneError> {
        if let Some(existing) = self.entity()?.component_by_type_name_and_name(type_name, name) {
            return Ok(existing.id());
        }
        self.create_component(type_name, name, change, replicated)
    }

    pub fn get_or_create_component_by_type_id(
        &mut self,
        type_id: u32,
        name: &str,
        change: AttributeChange,
        replicated: bool,
    ) -> Result<ComponentId, SceneError> {
        if let Some(existing) = self.entity()?.component_by_type_id_and_name(type_id, name) {
            return Ok(existing.id());
        }
        self.create_component_by_type_id(type_id, name, change, replicated)
    }

    pub fn create_local_component(&mut self, type_name: &str, name: &str) -> Result<ComponentId, SceneError> {
        self.create_component(type_name, name, AttributeChange::Default, false)
    }

    pub fn get_or_create_local_component(
        &mut self,
        type_name: &str,
        name: &str,
    ) -> Result<ComponentId, SceneError> {
        self.get_or_create_component(type_name, name, AttributeChange::Default, false)
    }

    /// Detach a component and hand it back free-floating.
    ///
    /// `ComponentRemoved` is emitted while the component is still attached.
    pub fn remove_component_by_id(&mut self, id: ComponentId, change: AttributeChange) -> Option<Component> {
        let (type_id, resolved) = {
            let comp = self.entity().ok()?.components.get(&id)?;
            (comp.type_id(), comp.resolve_change(change))
        };
        if !resolved.is_disconnected() {
            self.scene.emit(SceneEvent::ComponentRemoved {
                entity: self.id,
                component: id,
                type_id,
                change: resolved,
            });
        }
        let mut comp = self.entity_mut().ok()?.components.remove(&id)?;
        comp.set_parent_entity(None);
        Some(comp)
    }

    /// Remove the component with the given type and instance name.
    pub fn remove_component(&mut self, type_name: &str, name: &str, change: AttributeChange) -> Option<Component> {
        let id = self
            .entity()
            .ok()?
            .component_by_type_name_and_name(type_name, name)?
            .id();
        self.remove_component_by_id(id, change)
    }

    /// Remove every component of a type. Returns how many were removed.
    pub fn remove_components(&mut self, type_name: &str, change: AttributeChange) -> usize {
        let ids: Vec<ComponentId> = match self.entity() {
            Ok(e) => e.components_of_type(type_name).iter().map(|c| c.id()).collect(),
            Err(_) => return 0,
        };
        self.remove_ids(ids, change)
    }

    pub fn remove_components_by_type_id(&mut self, type_id: u32, change: AttributeChange) -> usize {
        let ids: Vec<ComponentId> = match self.entity() {
            Ok(e) => e.components_of_type_id(type_id).iter().map(|c| c.id()).collect(),
            Err(_) => return 0,
        };
        self.remove_ids(ids, change)
    }

    /// Remove all components one at a time, each with its own notification.
    pub fn remove_all_components(&mut self, change: AttributeChange) -> usize {
        let ids: Vec<ComponentId> = match self.entity() {
            Ok(e) => e.components.keys().copied().collect(),
            Err(_) => return 0,
        };
        self.remove_ids(ids, change)
    }

    fn remove_ids(&mut self, ids: Vec<ComponentId>, change: AttributeChange) -> usize {
        ids.into_iter()
            .filter(|&id| self.remove_component_by_id(id, change).is_some())
            .count()
    }

    /// Re-key a component, typically from an unacked id to the host's id.
    ///
    /// A component already occupying `new_id` is purged with a warning and
    /// returned.
    pub fn change_component_id(&mut self, old_id: ComponentId, new_id: ComponentId) -> Option<Component> {
        if old_id == new_id || self.entity().ok()?.component_by_id(old_id).is_none() {
            return None;
        }
        let purged = if self.entity().ok()?.component_by_id(new_id).is_some() {
            tracing::warn!(
                entity = %self.id,
                component = %new_id,
                "purged component to make room for a component id change, this should not happen"
            );
            self.remove_component_by_id(new_id, AttributeChange::LocalOnly)
        } else {
            None
        };
        let entity = self.entity_mut().ok()?;
        if let Some(mut comp) = entity.components.remove(&old_id) {
            comp.set_id(new_id);
            if new_id.range() == crate::id::IdRange::Replicated {
                entity.id_generator.reset_replicated_id(new_id.raw());
            }
            entity.components.insert(new_id, comp);
        }
        purged
    }

    pub fn set_component_temporary(&mut self, id: ComponentId, enable: bool) -> Result<(), SceneError> {
        self.component_mut(id)?.set_temporary(enable);
        Ok(())
    }

    pub fn set_component_update_mode(&mut self, id: ComponentId, mode: AttributeChange) -> Result<(), SceneError> {
        self.component_mut(id)?.set_update_mode(mode);
        Ok(())
    }

    // -- attributes ---------------------------------------------------------

    /// Write an attribute value and emit `AttributeChanged`.
    pub fn set_attribute(
        &mut self,
        component: ComponentId,
        attribute: &str,
        value: AttributeValue,
        change: AttributeChange,
    ) -> Result<(), SceneError> {
        let comp = self.component_mut(component)?;
        let raw = comp.require_slot(attribute)?;
        self.write_slot(component, raw, |attr| attr.set_value(value), change)
    }

    /// Parse and write an attribute's string form.
    pub fn set_attribute_from_string(
        &mut self,
        component: ComponentId,
        attribute: &str,
        value: &str,
        change: AttributeChange,
    ) -> Result<(), SceneError> {
        let comp = self.component_mut(component)?;
        let raw = comp.require_slot(attribute)?;
        self.write_slot(component, raw, |attr| attr.from_string_value(value), change)
    }

    fn write_slot<F>(
        &mut self,
        component: ComponentId,
        raw: usize,
        write: F,
        change: AttributeChange,
    ) -> Result<(), SceneError>
    where
        F: FnOnce(&mut Attribute) -> Result<bool, SceneError>,
    {
        let comp = self.component_mut(component)?;
        let resolved = comp.resolve_change(change);
        let Some(attr) = comp.slot_mut(raw) else {
            return Ok(());
        };
        write(attr)?;
        let attribute = attr.id().to_owned();
        self.emit_attribute(component, attribute, resolved, AttributeEvent::Changed);
        Ok(())
    }

    fn emit_attribute(
        &mut self,
        component: ComponentId,
        attribute: String,
        change: AttributeChange,
        kind: AttributeEvent,
    ) {
        if change.is_disconnected() {
            return;
        }
        let entity = self.id;
        let event = match kind {
            AttributeEvent::Added => SceneEvent::AttributeAdded {
                entity,
                component,
                attribute,
                change,
            },
            AttributeEvent::Changed => SceneEvent::AttributeChanged {
                entity,
                component,
                attribute,
                change,
            },
            AttributeEvent::Removed => SceneEvent::AttributeRemoved {
                entity,
                component,
                attribute,
                change,
            },
        };
        self.scene.emit(event);
    }

    /// Add a dynamic attribute. An existing attribute with the same id is
    /// returned unchanged. Returns the raw slot index.
    pub fn create_attribute(
        &mut self,
        component: ComponentId,
        kind: AttributeKind,
        id: &str,
        change: AttributeChange,
    ) -> Result<usize, SceneError> {
        self.insert_attribute(component, Attribute::new_dynamic(id, kind), change)
    }

    fn insert_attribute(
        &mut self,
        component: ComponentId,
        attribute: Attribute,
        change: AttributeChange,
    ) -> Result<usize, SceneError> {
        let comp = self.component_mut(component)?;
        comp.require_dynamic()?;
        if let Some(existing) = comp.attribute_slot_by_id(attribute.id()) {
            return Ok(existing);
        }
        let resolved = comp.resolve_change(change);
        let id = attribute.id().to_owned();
        let raw = comp.add_attribute(attribute)?;
        self.emit_attribute(component, id.clone(), resolved, AttributeEvent::Added);
        self.emit_attribute(component, id, resolved, AttributeEvent::Changed);
        Ok(raw)
    }

    /// Remove a dynamic attribute. `AttributeRemoved` is emitted first.
    pub fn remove_attribute(
        &mut self,
        component: ComponentId,
        id: &str,
        change: AttributeChange,
    ) -> Result<Option<Attribute>, SceneError> {
        let comp = self.component_mut(component)?;
        comp.require_dynamic()?;
        match comp.attribute_slot_by_id(id) {
            Some(raw) => self.remove_slot(component, raw, change),
            None => Ok(None),
        }
    }

    fn remove_slot(
        &mut self,
        component: ComponentId,
        raw: usize,
        change: AttributeChange,
    ) -> Result<Option<Attribute>, SceneError> {
        let comp = self.component_mut(component)?;
        let resolved = comp.resolve_change(change);
        let Some(id) = comp.attribute_slots().get(raw).and_then(Option::as_ref).map(|a| a.id().to_owned())
        else {
            return Ok(None);
        };
        self.emit_attribute(component, id, resolved, AttributeEvent::Removed);
        self.component_mut(component)?.remove_attribute(raw)
    }

    /// Remove every dynamic attribute of a component.
    pub fn remove_all_attributes(&mut self, component: ComponentId, change: AttributeChange) -> Result<(), SceneError> {
        let comp = self.component_mut(component)?;
        comp.require_dynamic()?;
        let slots = comp.attribute_slots().len();
        for raw in 0..slots {
            self.remove_slot(component, raw, change)?;
        }
        Ok(())
    }

    /// Bring a dynamic component's attribute set in line with `incoming`.
    ///
    /// Matching ids are updated in place, missing ids are created and
    /// surplus attributes are removed. Additions are applied before removals,
    /// each group in sorted-id order, after the diff is complete.
    pub fn reconcile_dynamic(
        &mut self,
        component: ComponentId,
        incoming: &[AttributeDesc],
        change: AttributeChange,
    ) -> Result<(), SceneError> {
        let plan = {
            let comp = self.component_mut(component)?;
            comp.require_dynamic()?;
            plan_reconcile(comp, incoming)
        };

        for (raw, desc) in &plan.updates {
            if let Err(e) = self.write_slot(component, *raw, |attr| attr.from_string_value(&desc.value), change) {
                tracing::warn!(attribute = %desc.id, error = %e, "dynamic attribute update skipped");
            }
        }

        for desc in &plan.additions {
            let existing = self.component_mut(component)?.attribute_slot_by_id(&desc.id);
            if let Some(raw) = existing {
                // Duplicate id in the incoming list: the later value wins.
                if let Err(e) = self.write_slot(component, raw, |attr| attr.from_string_value(&desc.value), change) {
                    tracing::warn!(attribute = %desc.id, error = %e, "dynamic attribute update skipped");
                }
                continue;
            }
            let Some(kind) = AttributeKind::from_type_name(&desc.type_name) else {
                tracing::error!(
                    attribute = %desc.id,
                    type_name = %desc.type_name,
                    "unknown attribute type, attribute not created"
                );
                continue;
            };
            let mut attr = Attribute::new_dynamic(&desc.id, kind);
            if let Err(e) = attr.from_string_value(&desc.value) {
                tracing::warn!(attribute = %desc.id, error = %e, "invalid value, keeping default");
            }
            self.insert_attribute(component, attr, change)?;
        }

        for &raw in &plan.removals {
            self.remove_slot(component, raw, change)?;
        }
        Ok(())
    }

    /// Load a component payload in the layout written by
    /// [`Component::write_payload`]. Dynamic components are reconciled
    /// against the payload; static ones take each decoded value.
    pub fn deserialize_component_from_binary(
        &mut self,
        component: ComponentId,
        data: &[u8],
        change: AttributeChange,
    ) -> Result<(), SceneError> {
        let type_id = self.component_mut(component)?.type_id();
        let attributes = {
            let registry = self.scene.registry();
            let info = registry
                .info_by_id(type_id)
                .ok_or_else(|| registry.unknown(&type_id.to_string()))?;
            decode_payload(info, data)?
        };
        self.apply_attribute_descs(component, &attributes, change)
    }

    /// Load a `<component>` element. Its type must match the component.
    pub fn deserialize_component_from_xml(
        &mut self,
        component: ComponentId,
        xml: &str,
        change: AttributeChange,
    ) -> Result<(), SceneError> {
        let desc = parse_component_desc(xml)?;
        let (type_id, type_name) = {
            let comp = self.component_mut(component)?;
            (comp.type_id(), comp.type_name().to_owned())
        };
        let same_type = if desc.type_id != 0 {
            desc.type_id == type_id
        } else {
            desc.type_name.eq_ignore_ascii_case(&type_name)
        };
        if !same_type {
            tracing::error!(
                entity = %self.id,
                component = %component,
                found = %desc.type_name,
                "component xml is for another type"
            );
            return Err(SceneError::ComponentTypeMismatch {
                component: type_name,
                found: desc.type_name,
            });
        }
        self.apply_attribute_descs(component, &desc.attributes, change)
    }

    fn apply_attribute_descs(
        &mut self,
        component: ComponentId,
        attributes: &[AttributeDesc],
        change: AttributeChange,
    ) -> Result<(), SceneError> {
        if self.component_mut(component)?.is_dynamic() {
            return self.reconcile_dynamic(component, attributes, change);
        }
        for desc in attributes {
            let Some(raw) = self
                .component_mut(component)?
                .attribute_slot_by_id_or_name(&desc.id, &desc.name)
            else {
                tracing::debug!(entity = %self.id, attribute = %desc.id, "unknown attribute ignored");
                continue;
            };
            let written = self.write_slot(
                component,
                raw,
                |attr| match &desc.typed {
                    Some(value) => attr.set_decoded_value(value.clone()),
                    None => attr.from_string_value(&desc.value),
                },
                change,
            );
            if let Err(e) = written {
                tracing::warn!(entity = %self.id, attribute = %desc.id, error = %e, "invalid value, keeping current");
            }
        }
        Ok(())
    }

    // -- hierarchy ----------------------------------------------------------

    /// Reparent this entity. `None` makes it a root.
    ///
    /// Self-parenting and cycles are rejected without touching any state.
    pub fn set_parent(&mut self, parent: Option<EntityId>, change: AttributeChange) -> Result<(), SceneError> {
        let (key, current, local) = {
            let e = self.entity()?;
            (e.key, e.parent, e.is_local())
        };
        let current = current.filter(|&w| self.scene.resolve(w).is_some());
        let new_parent = match parent {
            Some(pid) => Some(
                self.scene
                    .weak(pid)
                    .ok_or(SceneError::EntityNotFound { entity: pid })?,
            ),
            None => None,
        };
        if current == new_parent {
            return Ok(());
        }

        if let Some(pid) = parent {
            if pid == self.id {
                tracing::error!(entity = %self.id, "attempted to parent entity to itself");
                return Err(SceneError::SelfParenting { entity: self.id });
            }
            let mut ancestor = Some(pid);
            let mut steps = 0usize;
            while let Some(a) = ancestor {
                if a == self.id || steps > self.scene.entities.len() {
                    tracing::error!(entity = %self.id, parent = %pid, "cyclic parenting attempted");
                    return Err(SceneError::CyclicParenting {
                        entity: self.id,
                        parent: pid,
                    });
                }
                ancestor = self.scene.entity(a).and_then(|e| e.parent_id());
                steps += 1;
            }
            // `steps` is the depth of the new parent.
            if steps + self.get()?.subtree_height() > MAX_HIERARCHY_DEPTH {
                tracing::error!(entity = %self.id, parent = %pid, limit = MAX_HIERARCHY_DEPTH, "parenting exceeds hierarchy depth");
                return Err(SceneError::HierarchyTooDeep {
                    limit: MAX_HIERARCHY_DEPTH,
                });
            }
        }

        if let Some(old) = current.and_then(|w| self.scene.resolve(w)) {
            if let Some(old_parent) = self.scene.entities.get_mut(&old) {
                old_parent.children.retain(|c| c.key != key);
            }
        }
        if let Some(pid) = parent {
            if let Some(new_parent) = self.scene.entities.get_mut(&pid) {
                new_parent.children.push(EntityWeak { key });
            }
        }
        self.entity_mut()?.parent = new_parent;

        let resolved = change.or(if local {
            AttributeChange::LocalOnly
        } else {
            AttributeChange::Replicate
        });
        if !resolved.is_disconnected() {
            self.scene.emit(SceneEvent::EntityParentChanged {
                entity: self.id,
                parent,
                change: resolved,
            });
        }
        Ok(())
    }

    pub fn add_child(&mut self, child: EntityId, change: AttributeChange) -> Result<(), SceneError> {
        let id = self.id;
        self.scene
            .entity_mut(child)
            .ok_or(SceneError::EntityNotFound { entity: child })?
            .set_parent(Some(id), change)
    }

    fn is_own_child(&self, child: EntityId) -> bool {
        self.scene
            .entity(child)
            .and_then(|c| c.parent_id())
            .is_some_and(|p| p == self.id)
    }

    /// Remove a child from the scene. Non-children are ignored.
    pub fn remove_child(&mut self, child: EntityId, change: AttributeChange) -> bool {
        if !self.is_own_child(child) {
            tracing::warn!(entity = %self.id, child = %child, "remove_child: not a child of this entity");
            return false;
        }
        self.scene.remove_entity(child, change).is_some()
    }

    /// Make a child a root-level entity.
    pub fn detach_child(&mut self, child: EntityId, change: AttributeChange) -> Result<(), SceneError> {
        if !self.is_own_child(child) {
            tracing::warn!(entity = %self.id, child = %child, "detach_child: not a child of this entity");
            return Ok(());
        }
        self.scene
            .entity_mut(child)
            .ok_or(SceneError::EntityNotFound { entity: child })?
            .set_parent(None, change)
    }

    /// Remove every direct child from the scene.
    pub fn remove_all_children(&mut self, change: AttributeChange) -> usize {
        let children: Vec<EntityId> = match self.get() {
            Ok(e) => e.children(false).iter().map(|c| c.id()).collect(),
            Err(_) => return 0,
        };
        children
            .into_iter()
            .filter(|&c| self.scene.remove_entity(c, change).is_some())
            .count()
    }

    /// Create an entity parented to this one. The parent link is set
    /// silently; creation is announced by the scene's next update.
    pub fn create_child(
        &mut self,
        id: EntityId,
        components: &[&str],
        change: AttributeChange,
        replicated: bool,
        components_replicated: bool,
        temporary: bool,
    ) -> Result<EntityId, SceneError> {
        let child = self
            .scene
            .create_entity(id, components, change, replicated, components_replicated, temporary)?;
        let parent = self.id;
        if let Some(mut c) = self.scene.entity_mut(child) {
            c.set_parent(Some(parent), AttributeChange::Disconnected)?;
        }
        Ok(child)
    }

    pub fn create_local_child(&mut self, components: &[&str], change: AttributeChange) -> Result<EntityId, SceneError> {
        self.create_child(EntityId::NONE, components, change, false, false, false)
    }

    // -- flags & name -------------------------------------------------------

    pub fn set_temporary(&mut self, enable: bool, change: AttributeChange) -> Result<(), SceneError> {
        self.entity_mut()?.temporary = enable;
        let resolved = change.or(AttributeChange::Replicate);
        if !resolved.is_disconnected() {
            self.scene.emit(SceneEvent::EntityTemporaryStateToggled {
                entity: self.id,
                temporary: enable,
                change: resolved,
            });
        }
        Ok(())
    }

    fn set_name_attribute(&mut self, attribute: &str, value: &str) -> Result<(), SceneError> {
        let replicated = self.entity()?.is_replicated();
        let comp = self.get_or_create_component_by_type_id(
            NameComponent::TYPE_ID,
            "",
            AttributeChange::Default,
            replicated,
        )?;
        self.set_attribute(
            comp,
            attribute,
            AttributeValue::String(value.to_owned()),
            AttributeChange::Default,
        )
    }

    /// Store a name in `EC_Name`, creating the component if needed.
    pub fn set_name(&mut self, name: &str) -> Result<(), SceneError> {
        self.set_name_attribute(NameComponent::NAME, name)
    }

    pub fn set_description(&mut self, description: &str) -> Result<(), SceneError> {
        self.set_name_attribute(NameComponent::DESCRIPTION, description)
    }

    pub fn set_group(&mut self, group: &str) -> Result<(), SceneError> {
        self.set_name_attribute(NameComponent::GROUP, group)
    }

    // -- actions ------------------------------------------------------------

    /// The action with this name, created on first use.
    pub fn action(&mut self, name: &str) -> Result<&mut EntityAction, SceneError> {
        Ok(self
            .entity_mut()?
            .actions
            .entry(name.to_lowercase())
            .or_insert_with(|| EntityAction::new(name)))
    }

    pub fn connect_action<F>(&mut self, name: &str, handler: F) -> Result<(), SceneError>
    where
        F: FnMut(&[String]) + 'static,
    {
        self.action(name)?.connect(Box::new(handler));
        Ok(())
    }

    pub fn remove_action(&mut self, name: &str) -> Option<EntityAction> {
        self.entity_mut().ok()?.actions.remove(&name.to_lowercase())
    }

    /// Execute an action. Local handlers run when `exec_type` contains
    /// [`ExecType::LOCAL`]; `ActionTriggered` is emitted in every case so the
    /// sync layer can forward server and peer executions.
    pub fn exec(&mut self, exec_type: ExecType, action: &str, params: &[String]) -> Result<(), SceneError> {
        if exec_type.contains(ExecType::LOCAL) {
            if let Some(a) = self.entity_mut()?.actions.get_mut(&action.to_lowercase()) {
                a.trigger(params);
            }
        }
        self.scene.emit(SceneEvent::ActionTriggered {
            entity: self.id,
            action: action.to_owned(),
            params: params.to_vec(),
            exec_type,
        });
        Ok(())
    }

    // -- cloning ------------------------------------------------------------

    /// Copy this entity and its components into a new entity with the same
    /// parent. Children are not copied.
    pub fn clone_entity(
        &mut self,
        local: bool,
        temporary: bool,
        clone_name: Option<&str>,
        change: AttributeChange,
    ) -> Result<EntityId, SceneError> {
        let (mut desc, parent) = {
            let me = self.get()?;
            (crate::scene::entity_desc(&me, true, true, false), me.parent_id())
        };
        desc.id = if local {
            self.scene.next_free_id_local()
        } else {
            self.scene.next_free_id()
        }
        .raw();
        desc.sync = !local;
        desc.temporary = temporary;
        if let Some(name) = clone_name {
            if let Some(attr) = desc
                .components
                .iter_mut()
                .find(|c| c.type_id == NameComponent::TYPE_ID)
                .and_then(|c| c.attribute_mut(NameComponent::NAME))
            {
                attr.value = name.to_owned();
            }
        }

        let scene_desc = crate::desc::SceneDesc {
            filename: String::new(),
            entities: vec![desc],
        };
        let created = self.scene.create_content_from_scene_desc(&scene_desc, true, change)?;
        let clone = created
            .first()
            .copied()
            .ok_or(SceneError::EntityNotFound { entity: EntityId::NONE })?;
        if let Some(p) = parent {
            if let Some(mut c) = self.scene.entity_mut(clone) {
                c.set_parent(Some(p), change)?;
            }
        }
        Ok(clone)
    }
}

#[derive(Debug, Clone, Copy)]
enum AttributeEvent {
    Added,
    Changed,
    Removed,
}
