//! The scene: owner of all entities, id policy and event fan-out.
//!
//! A [`Scene`] owns its entities in a map ordered by [`EntityId`] so iteration
//! and hierarchy operations are deterministic. It decides which id range new
//! entities come from: an *authoritative* scene (the replication host) hands
//! out replicated ids directly, any other scene hands out unacked ids that the
//! host later confirms with [`Scene::change_entity_id`] and
//! [`Scene::emit_entity_acked`].
//!
//! Entity creation is announced lazily: `EntityCreated` for every entity
//! created since the last [`Scene::update`] is emitted at the start of the
//! next update, in creation order.
//!
//! # Example
//!
//! ```
//! use strata_scene::prelude::*;
//!
//! let mut scene = Scene::new("world", SceneContext::default(), false, true);
//! let parent = scene
//!     .create_entity(EntityId::NONE, &["EC_Name"], AttributeChange::Default, true, true, false)
//!     .unwrap();
//! let child = scene.create_local_entity(&["EC_Placeable"], AttributeChange::Default).unwrap();
//!
//! assert_eq!(parent, EntityId(1));
//! assert_eq!(child, EntityId(FIRST_LOCAL_ID));
//!
//! scene
//!     .entity_mut(child)
//!     .unwrap()
//!     .set_parent(Some(parent), AttributeChange::Default)
//!     .unwrap();
//! assert_eq!(scene.entity(child).unwrap().parent_id(), Some(parent));
//! assert_eq!(scene.root_level_entities(), vec![parent]);
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::attribute::Attribute;
use crate::change::AttributeChange;
use crate::component::{Component, ComponentRegistry, ComponentType, Placeable};
use crate::desc::{parents_first, AttributeDesc, ComponentDesc, EntityDesc, ParentingTracker, SceneDesc};
use crate::entity::{Entity, EntityMut, EntityRef, EntityWeak, MAX_HIERARCHY_DEPTH};
use crate::event::{ObserverId, SceneEvent, SceneObserver};
use crate::id::{ComponentId, EntityId, IdRange, UniqueIdGenerator};
use crate::interpolation::{AttributeInterpolation, AttributeRef};
use crate::value::{AttributeKind, AttributeValue, EntityReference};
use crate::SceneError;

// ---------------------------------------------------------------------------
// SceneContext
// ---------------------------------------------------------------------------

/// Services shared by every scene of a framework.
#[derive(Debug, Clone)]
pub struct SceneContext {
    registry: Arc<ComponentRegistry>,
}

impl SceneContext {
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }
}

impl Default for SceneContext {
    /// A context whose registry holds only the built-in component types.
    fn default() -> Self {
        Self::new(Arc::new(ComponentRegistry::with_builtins()))
    }
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

pub struct Scene {
    name: String,
    context: SceneContext,
    pub(crate) entities: BTreeMap<EntityId, Entity>,
    /// Weak-handle key -> current id.
    keys: HashMap<u64, EntityId>,
    next_key: u64,
    id_generator: UniqueIdGenerator,
    view_enabled: bool,
    pub(crate) authority: bool,
    interpolations: Vec<AttributeInterpolation>,
    interpolating: bool,
    pending_created: Vec<(EntityWeak, AttributeChange)>,
    parenting_tracker: ParentingTracker,
    observers: Vec<(ObserverId, Box<dyn SceneObserver>)>,
    next_observer: u64,
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("entities", &self.entities.len())
            .field("authority", &self.authority)
            .field("view_enabled", &self.view_enabled)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Scene {
    pub fn new(name: &str, context: SceneContext, view_enabled: bool, authority: bool) -> Self {
        Self {
            name: name.to_owned(),
            context,
            entities: BTreeMap::new(),
            keys: HashMap::new(),
            next_key: 1,
            id_generator: UniqueIdGenerator::new(),
            view_enabled,
            authority,
            interpolations: Vec::new(),
            interpolating: false,
            pending_created: Vec::new(),
            parenting_tracker: ParentingTracker::new(),
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this scene is the replication host.
    pub fn is_authority(&self) -> bool {
        self.authority
    }

    /// Whether presentation side effects should happen for this scene.
    pub fn view_enabled(&self) -> bool {
        self.view_enabled
    }

    pub fn context(&self) -> &SceneContext {
        &self.context
    }

    pub fn registry(&self) -> &ComponentRegistry {
        self.context.registry()
    }

    pub fn parenting_tracker(&self) -> &ParentingTracker {
        &self.parenting_tracker
    }

    // -- observers ----------------------------------------------------------

    pub fn subscribe<O: SceneObserver + 'static>(&mut self, observer: O) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    pub(crate) fn emit(&mut self, event: SceneEvent) {
        tracing::trace!(scene = %self.name, ?event, "scene event");
        if self.observers.is_empty() {
            return;
        }
        let mut observers = std::mem::take(&mut self.observers);
        for (_, observer) in observers.iter_mut() {
            observer.on_event(self, &event);
        }
        self.observers = observers;
    }

    // -- lookup -------------------------------------------------------------

    pub fn entity(&self, id: EntityId) -> Option<EntityRef<'_>> {
        self.entities.get(&id).map(|entity| EntityRef { scene: self, entity })
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<EntityMut<'_>> {
        if self.entities.contains_key(&id) {
            Some(EntityMut { scene: self, id })
        } else {
            None
        }
    }

    pub fn has_entity(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Weak handle to a live entity.
    pub fn weak(&self, id: EntityId) -> Option<EntityWeak> {
        self.entities.get(&id).map(Entity::weak)
    }

    /// Current id of a weak handle, or `None` once the entity is gone.
    pub fn resolve(&self, weak: EntityWeak) -> Option<EntityId> {
        self.keys.get(&weak.key).copied()
    }

    pub fn upgrade(&self, weak: EntityWeak) -> Option<EntityRef<'_>> {
        self.resolve(weak).and_then(|id| self.entity(id))
    }

    /// Live entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = EntityRef<'_>> + '_ {
        self.entities.values().map(|entity| EntityRef { scene: self, entity })
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    // -- creation -----------------------------------------------------------

    /// Next unused replicated id: authoritative on the host, unacked
    /// elsewhere.
    pub fn next_free_id(&mut self) -> EntityId {
        loop {
            let raw = if self.authority {
                self.id_generator.allocate_replicated()
            } else {
                self.id_generator.allocate_unacked()
            };
            if !self.entities.contains_key(&EntityId(raw)) {
                return EntityId(raw);
            }
        }
    }

    pub fn next_free_id_local(&mut self) -> EntityId {
        loop {
            let raw = self.id_generator.allocate_local();
            if !self.entities.contains_key(&EntityId(raw)) {
                return EntityId(raw);
            }
        }
    }

    /// Create an entity.
    ///
    /// With `id == EntityId::NONE` the id comes from the replicated range
    /// (authoritative or unacked, depending on this scene's authority) or the
    /// local range. An explicit id that is already in use is rejected.
    /// Requested components are created with `components_replicated`; unknown
    /// type names are logged and skipped.
    pub fn create_entity(
        &mut self,
        id: EntityId,
        components: &[&str],
        change: AttributeChange,
        replicated: bool,
        components_replicated: bool,
        temporary: bool,
    ) -> Result<EntityId, SceneError> {
        let id = if id.is_none() {
            if replicated {
                self.next_free_id()
            } else {
                self.next_free_id_local()
            }
        } else {
            if self.entities.contains_key(&id) {
                tracing::error!(scene = %self.name, entity = %id, "entity id already in use");
                return Err(SceneError::EntityIdInUse { entity: id });
            }
            if id.range() == IdRange::Replicated {
                self.id_generator.reset_replicated_id(id.raw());
            }
            id
        };

        let key = self.next_key;
        self.next_key += 1;
        self.entities.insert(id, Entity::new(id, key, temporary));
        self.keys.insert(key, id);

        let component_change = if change.is_disconnected() {
            AttributeChange::Disconnected
        } else {
            AttributeChange::Default
        };
        for type_name in components {
            let mut entity = EntityMut { scene: &mut *self, id };
            if let Err(e) = entity.create_component(type_name, "", component_change, components_replicated) {
                tracing::warn!(entity = %id, type_name = %type_name, error = %e, "component skipped");
            }
        }

        if !change.is_disconnected() {
            self.pending_created.push((EntityWeak { key }, change));
        }
        tracing::debug!(scene = %self.name, entity = %id, "entity created");
        Ok(id)
    }

    pub fn create_local_entity(&mut self, components: &[&str], change: AttributeChange) -> Result<EntityId, SceneError> {
        self.create_entity(EntityId::NONE, components, change, false, false, false)
    }

    pub fn create_temporary_entity(
        &mut self,
        components: &[&str],
        change: AttributeChange,
    ) -> Result<EntityId, SceneError> {
        self.create_entity(EntityId::NONE, components, change, true, true, true)
    }

    pub fn create_local_temporary_entity(
        &mut self,
        components: &[&str],
        change: AttributeChange,
    ) -> Result<EntityId, SceneError> {
        self.create_entity(EntityId::NONE, components, change, false, false, true)
    }

    /// Announce an entity now instead of at the next update.
    pub fn emit_entity_created(&mut self, id: EntityId, change: AttributeChange) {
        let Some(weak) = self.weak(id) else {
            return;
        };
        self.pending_created.retain(|(w, _)| *w != weak);
        let change = change.or(AttributeChange::Replicate);
        if !change.is_disconnected() {
            self.emit(SceneEvent::EntityCreated { entity: id, change });
        }
    }

    // -- removal ------------------------------------------------------------

    /// Remove an entity and return it with its components detached.
    ///
    /// The entity is silently unparented first. Its children are not removed;
    /// their parent handle simply expires.
    pub fn remove_entity(&mut self, id: EntityId, change: AttributeChange) -> Option<Entity> {
        let mut entity = self.entity_mut(id)?;
        if let Err(e) = entity.set_parent(None, AttributeChange::Disconnected) {
            tracing::warn!(entity = %id, error = %e, "failed to unparent entity before removal");
        }

        let change = change.or(AttributeChange::Replicate);
        if !change.is_disconnected() {
            self.emit(SceneEvent::EntityRemoved { entity: id, change });
        }

        let mut entity = self.entities.remove(&id)?;
        self.keys.remove(&entity.key);
        entity.detach_components();
        let weak = entity.weak();
        self.interpolations.retain(|i| i.dest.entity != weak);
        tracing::debug!(scene = %self.name, entity = %id, "entity removed");
        Some(entity)
    }

    /// Remove every entity one at a time, then reset the id generator.
    /// Without `signal` nothing is emitted.
    pub fn remove_all_entities(&mut self, signal: bool, change: AttributeChange) {
        let change = if signal {
            change
        } else {
            AttributeChange::Disconnected
        };
        for id in self.entity_ids() {
            self.remove_entity(id, change);
        }
        if signal {
            self.emit(SceneEvent::SceneCleared { change });
        }
        self.pending_created.clear();
        self.interpolations.clear();
        self.parenting_tracker.clear();
        self.id_generator.reset();
    }

    /// Re-key an entity, typically from an unacked id to the host's id. No
    /// event is emitted for the change itself. An entity already occupying
    /// `new_id` is purged with a warning and returned.
    pub fn change_entity_id(&mut self, old_id: EntityId, new_id: EntityId) -> Option<Entity> {
        if old_id == new_id || !self.has_entity(old_id) {
            return None;
        }
        let purged = if self.has_entity(new_id) {
            tracing::warn!(
                entity = %new_id,
                "purged entity to make room for an entity id change, this should not happen"
            );
            self.remove_entity(new_id, AttributeChange::LocalOnly)
        } else {
            None
        };
        if let Some(mut entity) = self.entities.remove(&old_id) {
            entity.id = new_id;
            self.keys.insert(entity.key, new_id);
            if new_id.range() == IdRange::Replicated {
                self.id_generator.reset_replicated_id(new_id.raw());
            }
            self.entities.insert(new_id, entity);
        }
        purged
    }

    // -- acks ---------------------------------------------------------------

    /// The host confirmed `old_id` as `id`. Fixes imported soft parent
    /// references once every tracked entity is acknowledged.
    pub fn emit_entity_acked(&mut self, id: EntityId, old_id: EntityId) {
        self.emit(SceneEvent::EntityAcked { entity: id, old_id });
        if let Some(map) = self.parenting_tracker.ack(id, old_id) {
            let acked: Vec<EntityId> = map.values().copied().collect();
            self.fix_placeable_parent_ids(&acked, &map, AttributeChange::Replicate);
        }
    }

    pub fn emit_component_acked(&mut self, entity: EntityId, component: ComponentId, old_id: ComponentId) {
        self.emit(SceneEvent::ComponentAcked {
            entity,
            component,
            old_id,
        });
    }

    // -- frame --------------------------------------------------------------

    /// Flush pending creation notifications, then advance interpolations.
    pub fn update(&mut self, frame_time: f32) {
        let pending = std::mem::take(&mut self.pending_created);
        for (weak, change) in pending {
            if let Some(id) = self.resolve(weak) {
                self.emit(SceneEvent::EntityCreated {
                    entity: id,
                    change: change.or(AttributeChange::Replicate),
                });
            }
        }
        self.update_attribute_interpolations(frame_time);
    }

    // -- interpolation ------------------------------------------------------

    /// Blend an attribute of a static component toward `end` over `length`
    /// seconds. Replaces any interpolation already running on the attribute.
    pub fn start_attribute_interpolation(
        &mut self,
        dest: AttributeRef,
        end: AttributeValue,
        length: f32,
    ) -> Result<(), SceneError> {
        let invalid = |details: &str| SceneError::InvalidInterpolation {
            details: details.to_owned(),
        };
        if !(length > 0.0 && length.is_finite()) {
            return Err(invalid("length must be positive and finite"));
        }
        let start = {
            let entity = self
                .upgrade(dest.entity)
                .ok_or_else(|| invalid("destination entity is not in this scene"))?;
            let comp = entity
                .component_by_id(dest.component)
                .ok_or(SceneError::ComponentNotFound {
                    entity: entity.id(),
                    component: dest.component,
                })?;
            if comp.is_dynamic() {
                return Err(invalid("attributes of dynamic components cannot be interpolated"));
            }
            let attr = comp
                .attribute_by_id(&dest.attribute)
                .ok_or_else(|| SceneError::AttributeNotFound {
                    component: comp.type_name().to_owned(),
                    attribute: dest.attribute.clone(),
                })?;
            if !attr.kind().is_interpolable() {
                return Err(invalid("attribute kind is not interpolable"));
            }
            if end.kind() != attr.kind() {
                return Err(SceneError::AttributeTypeMismatch {
                    attribute: attr.id().to_owned(),
                    expected: attr.type_name(),
                    found: end.kind().type_name(),
                });
            }
            attr.value().clone()
        };
        self.interpolations.retain(|i| !i.dest.targets(&dest));
        self.interpolations.push(AttributeInterpolation {
            dest,
            start,
            end,
            time: 0.0,
            length,
        });
        Ok(())
    }

    /// Stop the interpolation on `dest`, leaving the current value in place.
    pub fn end_attribute_interpolation(&mut self, dest: &AttributeRef) -> bool {
        let before = self.interpolations.len();
        self.interpolations.retain(|i| !i.dest.targets(dest));
        self.interpolations.len() != before
    }

    pub fn end_all_attribute_interpolations(&mut self) {
        self.interpolations.clear();
    }

    pub fn has_attribute_interpolation(&self, dest: &AttributeRef) -> bool {
        self.interpolations.iter().any(|i| i.dest.targets(dest))
    }

    pub fn num_attribute_interpolations(&self) -> usize {
        self.interpolations.len()
    }

    /// True while interpolated values are being written, so observers can
    /// tell interpolation steps from other changes.
    pub fn is_interpolating(&self) -> bool {
        self.interpolating
    }

    /// Advance every interpolation by `dt` and write the blended values with
    /// `LocalOnly` semantics. Finished or orphaned interpolations are dropped.
    pub fn update_attribute_interpolations(&mut self, dt: f32) {
        if self.interpolations.is_empty() {
            return;
        }
        self.interpolating = true;
        let running = std::mem::take(&mut self.interpolations);
        let mut keep = Vec::with_capacity(running.len());
        for mut interp in running {
            let Some(value) = interp.advance(dt) else {
                continue;
            };
            if let Err(e) = self.write_attribute(&interp.dest, value, AttributeChange::LocalOnly) {
                tracing::debug!(attribute = %interp.dest.attribute, error = %e, "interpolation target gone");
                continue;
            }
            if !interp.is_finished() {
                keep.push(interp);
            }
        }
        self.interpolations = keep;
        self.interpolating = false;
    }

    /// Write an attribute addressed by handle, emitting `AttributeChanged`.
    pub fn write_attribute(
        &mut self,
        dest: &AttributeRef,
        value: AttributeValue,
        change: AttributeChange,
    ) -> Result<(), SceneError> {
        let id = self
            .resolve(dest.entity)
            .ok_or(SceneError::EntityNotFound { entity: EntityId::NONE })?;
        let mut entity = self
            .entity_mut(id)
            .ok_or(SceneError::EntityNotFound { entity: id })?;
        entity.set_attribute(dest.component, &dest.attribute, value, change)
    }

    // -- queries ------------------------------------------------------------

    /// First entity whose `EC_Name` name equals `name` exactly.
    pub fn entity_by_name(&self, name: &str) -> Option<EntityRef<'_>> {
        if name.is_empty() {
            return None;
        }
        self.entities().find(|e| e.name() == name)
    }

    pub fn is_unique_name(&self, name: &str) -> bool {
        self.entity_by_name(name).is_none()
    }

    pub fn find_entities_by_name(&self, name: &str, case_sensitive: bool) -> Vec<EntityId> {
        self.entities()
            .filter(|e| {
                if case_sensitive {
                    e.name() == name
                } else {
                    e.name().eq_ignore_ascii_case(name)
                }
            })
            .map(|e| e.id())
            .collect()
    }

    pub fn find_entities_containing(&self, substring: &str, case_sensitive: bool) -> Vec<EntityId> {
        let needle = if case_sensitive {
            substring.to_owned()
        } else {
            substring.to_lowercase()
        };
        self.entities()
            .filter(|e| {
                if case_sensitive {
                    e.name().contains(&needle)
                } else {
                    e.name().to_lowercase().contains(&needle)
                }
            })
            .map(|e| e.id())
            .collect()
    }

    /// Entities with a component of `type_id`, optionally with a given name.
    pub fn entities_with_component(&self, type_id: u32, name: Option<&str>) -> Vec<EntityId> {
        self.entities()
            .filter(|e| match name {
                Some(n) => e.component_by_type_id_and_name(type_id, n).is_some(),
                None => e.component_by_type_id(type_id).is_some(),
            })
            .map(|e| e.id())
            .collect()
    }

    pub fn entities_with_component_type_name(&self, type_name: &str, name: Option<&str>) -> Vec<EntityId> {
        self.entities()
            .filter(|e| match name {
                Some(n) => e.component_by_type_name_and_name(type_name, n).is_some(),
                None => e.component_by_type_name(type_name).is_some(),
            })
            .map(|e| e.id())
            .collect()
    }

    pub fn entities_of_group(&self, group: &str) -> Vec<EntityId> {
        if group.is_empty() {
            return Vec::new();
        }
        self.entities()
            .filter(|e| e.group() == group)
            .map(|e| e.id())
            .collect()
    }

    /// Every component of `type_id` in the scene, as `(entity, component)`.
    pub fn components(&self, type_id: u32, name: Option<&str>) -> Vec<(EntityId, ComponentId)> {
        self.entities
            .values()
            .flat_map(|e| {
                e.components()
                    .filter(move |c| c.type_id() == type_id && name.map_or(true, |n| c.name() == n))
                    .map(move |c| (e.id(), c.id()))
            })
            .collect()
    }

    /// Entities without a live entity-level parent.
    pub fn root_level_entities(&self) -> Vec<EntityId> {
        self.entities()
            .filter(|e| !e.has_parent())
            .map(|e| e.id())
            .collect()
    }

    /// Hierarchy parent of an entity. The entity-level parent wins; otherwise
    /// `EC_Placeable`'s `parentRef` is resolved by id or by name.
    pub fn entity_parent_id(&self, id: EntityId) -> Option<EntityId> {
        let entity = self.entity(id)?;
        if let Some(parent) = entity.parent_id() {
            return Some(parent);
        }
        let reference = entity
            .component::<Placeable>()?
            .value(Placeable::PARENT_REF)?
            .as_entity_reference()?;
        if reference.is_empty() {
            return None;
        }
        match reference.as_id() {
            Some(pid) => self.has_entity(pid).then_some(pid),
            None => self.entity_by_name(reference.reference.trim()).map(|e| e.id()),
        }
    }

    /// Order `ids` so that parents come before their children.
    pub fn sort_entities(&self, ids: &[EntityId]) -> Vec<EntityId> {
        parents_first(ids.to_vec(), |id| *id, |id| self.entity_parent_id(*id))
    }

    /// Rewrite numeric `EC_Placeable` parent references of `entities`
    /// through `old_to_new`.
    pub fn fix_placeable_parent_ids(
        &mut self,
        entities: &[EntityId],
        old_to_new: &BTreeMap<EntityId, EntityId>,
        change: AttributeChange,
    ) {
        let fixes: Vec<(EntityId, ComponentId, EntityId)> = entities
            .iter()
            .filter_map(|&id| {
                let comp = self.entity(id)?.entity().component::<Placeable>()?;
                let old = comp
                    .value(Placeable::PARENT_REF)?
                    .as_entity_reference()?
                    .as_id()?;
                let new = *old_to_new.get(&old)?;
                (new != old).then_some((id, comp.id(), new))
            })
            .collect();

        for (id, comp, new_parent) in fixes {
            tracing::debug!(entity = %id, parent = %new_parent, "rewriting placeable parent reference");
            if let Some(mut entity) = self.entity_mut(id) {
                let value = AttributeValue::EntityReference(EntityReference::from_id(new_parent));
                if let Err(e) = entity.set_attribute(comp, Placeable::PARENT_REF, value, change) {
                    tracing::warn!(entity = %id, error = %e, "failed to rewrite parent reference");
                }
            }
        }
    }

    // -- descriptions -------------------------------------------------------

    /// Describe the scene. Parented entities are nested under their parents.
    pub fn to_scene_desc(&self, serialize_temporary: bool, serialize_local: bool) -> SceneDesc {
        SceneDesc {
            filename: String::new(),
            entities: self
                .entities()
                .filter(|e| e.should_be_serialized(serialize_temporary, serialize_local, false))
                .map(|e| entity_desc(&e, serialize_temporary, serialize_local, true))
                .collect(),
        }
    }

    /// Describe one entity, optionally with its children.
    pub fn entity_to_desc(&self, id: EntityId, serialize_temporary: bool, serialize_children: bool) -> Option<EntityDesc> {
        self.entity(id)
            .map(|e| entity_desc(&e, serialize_temporary, true, serialize_children))
    }

    /// Instantiate described content.
    ///
    /// Without `use_entity_ids_from_file`, fresh ids are allocated and numeric
    /// `EC_Placeable` parent references are remapped to them. With it, the
    /// stored ids are used and existing entities holding them are replaced.
    /// Content is built silently; afterwards `EntityCreated` (and
    /// `EntityParentChanged` for nested entities) is emitted parent-first.
    pub fn create_content_from_scene_desc(
        &mut self,
        desc: &SceneDesc,
        use_entity_ids_from_file: bool,
        change: AttributeChange,
    ) -> Result<Vec<EntityId>, SceneError> {
        if desc.depth() > MAX_HIERARCHY_DEPTH {
            tracing::error!(limit = MAX_HIERARCHY_DEPTH, "scene description nests entities too deeply");
            return Err(SceneError::HierarchyTooDeep {
                limit: MAX_HIERARCHY_DEPTH,
            });
        }
        let mut sorted = desc.clone();
        sorted.sort_entities();

        let registry = Arc::clone(&self.context.registry);
        let mut import = Import {
            registry: &registry,
            use_ids: use_entity_ids_from_file,
            change,
            old_to_new: BTreeMap::new(),
            seen: HashSet::new(),
            created: Vec::new(),
        };
        for entity in &sorted.entities {
            import.entity(self, entity, None)?;
        }

        let ids: Vec<EntityId> = import.created.iter().map(|(id, _)| *id).collect();
        if !use_entity_ids_from_file {
            self.fix_placeable_parent_ids(&ids, &import.old_to_new, AttributeChange::Disconnected);
        }
        if !self.authority {
            for id in ids.iter().filter(|id| id.is_unacked()) {
                self.parenting_tracker.track(*id);
            }
        }
        if !change.is_disconnected() {
            for (id, parent) in &import.created {
                self.emit_entity_created(*id, change);
                if let Some(parent) = parent {
                    let resolved = change.or(if id.is_local() {
                        AttributeChange::LocalOnly
                    } else {
                        AttributeChange::Replicate
                    });
                    self.emit(SceneEvent::EntityParentChanged {
                        entity: *id,
                        parent: Some(*parent),
                        change: resolved,
                    });
                }
            }
        }
        tracing::info!(scene = %self.name, count = ids.len(), "created content from scene description");
        Ok(ids)
    }

    /// Blake3 digest (hex) of the full binary serialization. Equal scenes
    /// produce equal digests.
    pub fn state_hash(&self) -> Result<String, SceneError> {
        let bytes = self.serialize_to_binary(true, true)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

struct Import<'r> {
    registry: &'r ComponentRegistry,
    use_ids: bool,
    change: AttributeChange,
    old_to_new: BTreeMap<EntityId, EntityId>,
    /// Nonzero ids from the description imported so far.
    seen: HashSet<u32>,
    /// `(entity, nested parent)` in parent-first order.
    created: Vec<(EntityId, Option<EntityId>)>,
}

impl Import<'_> {
    fn entity(&mut self, scene: &mut Scene, desc: &EntityDesc, parent: Option<EntityId>) -> Result<(), SceneError> {
        let first = desc.id == 0 || self.seen.insert(desc.id);
        if !first && self.use_ids {
            tracing::warn!(entity = desc.id, "duplicate entity id in scene description, skipped with its children");
            return Ok(());
        }
        let id = if self.use_ids && desc.id != 0 {
            let id = EntityId(desc.id);
            if scene.has_entity(id) {
                tracing::warn!(entity = %id, "entity id from file already in use, removing existing entity");
                scene.remove_entity(id, self.change);
            }
            id
        } else if desc.sync {
            scene.next_free_id()
        } else {
            scene.next_free_id_local()
        };
        if desc.id != 0 && first {
            self.old_to_new.insert(EntityId(desc.id), id);
        }

        let id = scene.create_entity(
            id,
            &[],
            AttributeChange::Disconnected,
            desc.sync,
            desc.sync,
            desc.temporary,
        )?;
        for comp_desc in &desc.components {
            let Some(component) = self.component(comp_desc) else {
                continue;
            };
            if let Some(mut entity) = scene.entity_mut(id) {
                entity.add_component(ComponentId::NONE, component, AttributeChange::Disconnected)?;
            }
        }
        self.created.push((id, parent));

        if let Some(parent) = parent {
            if let Some(mut entity) = scene.entity_mut(id) {
                entity.set_parent(Some(parent), AttributeChange::Disconnected)?;
            }
        }
        for child in &desc.children {
            self.entity(scene, child, Some(id))?;
        }
        Ok(())
    }

    fn component(&self, desc: &ComponentDesc) -> Option<Component> {
        let info = self
            .registry
            .info_by_id(desc.type_id)
            .or_else(|| self.registry.info_by_name(&desc.type_name));
        let Some(info) = info else {
            tracing::warn!(
                type_id = desc.type_id,
                type_name = %desc.type_name,
                "unknown component type in scene description, skipped"
            );
            return None;
        };
        let mut comp = Component::new(info, &desc.name);
        comp.set_replicated(desc.sync);
        comp.set_temporary(desc.temporary);
        apply_attribute_descs(&mut comp, &desc.attributes);
        Some(comp)
    }
}

/// Fill a free-floating component from string descriptions.
fn apply_attribute_descs(comp: &mut Component, attributes: &[AttributeDesc]) {
    if comp.is_dynamic() {
        for desc in attributes {
            let Some(kind) = AttributeKind::from_type_name(&desc.type_name) else {
                tracing::warn!(attribute = %desc.id, type_name = %desc.type_name, "unknown attribute type, skipped");
                continue;
            };
            let mut attr = Attribute::new_dynamic(&desc.id, kind);
            if let Err(e) = attr.from_string_value(&desc.value) {
                tracing::warn!(attribute = %desc.id, error = %e, "invalid value, keeping default");
            }
            if let Err(e) = comp.add_attribute(attr) {
                tracing::warn!(attribute = %desc.id, error = %e, "dynamic attribute skipped");
            }
        }
        return;
    }

    for desc in attributes {
        let raw = comp.attribute_slot_by_id_or_name(&desc.id, &desc.name);
        let Some(attr) = raw.and_then(|raw| comp.slot_mut(raw)) else {
            tracing::debug!(component = %comp.type_name(), attribute = %desc.id, "unknown attribute ignored");
            continue;
        };
        let applied = match &desc.typed {
            Some(value) => attr.set_decoded_value(value.clone()),
            None => attr.from_string_value(&desc.value),
        };
        if let Err(e) = applied {
            tracing::warn!(attribute = %desc.id, error = %e, "invalid value, keeping default");
        }
    }
}

/// Description of a live entity.
pub(crate) fn entity_desc(
    entity: &EntityRef<'_>,
    serialize_temporary: bool,
    serialize_local: bool,
    serialize_children: bool,
) -> EntityDesc {
    let children = if serialize_children {
        entity
            .children(false)
            .iter()
            .filter(|c| c.should_be_serialized(serialize_temporary, serialize_local, true))
            .map(|c| entity_desc(c, serialize_temporary, serialize_local, true))
            .collect()
    } else {
        Vec::new()
    };
    EntityDesc {
        id: entity.id().raw(),
        sync: entity.is_replicated(),
        temporary: entity.is_temporary(),
        components: entity
            .components()
            .filter(|c| c.should_be_serialized(serialize_temporary, serialize_local))
            .map(component_desc)
            .collect(),
        children,
    }
}

fn component_desc(comp: &Component) -> ComponentDesc {
    ComponentDesc {
        type_id: comp.type_id(),
        type_name: comp.type_name().to_owned(),
        name: comp.name().to_owned(),
        sync: comp.is_replicated(),
        temporary: comp.is_temporary(),
        attributes: comp
            .attributes()
            .map(|a| AttributeDesc {
                id: a.id().to_owned(),
                name: a.name().to_owned(),
                type_name: if comp.is_dynamic() {
                    a.type_name().to_owned()
                } else {
                    String::new()
                },
                value: a.to_string_value(),
                typed: None,
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
