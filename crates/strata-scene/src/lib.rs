//! Strata Scene -- replicated scene model of entities, components and typed
//! attributes.
//!
//! A [`Scene`](scene::Scene) owns entities; entities own named components;
//! components own typed attributes. Every structural change is reported to
//! observers as a [`SceneEvent`](event::SceneEvent) tagged with an
//! [`AttributeChange`](change::AttributeChange) that tells a network sync
//! layer whether to replicate it. Entity and component ids are split into
//! replicated, unacked and local ranges so a client can create content before
//! the host has confirmed it.
//!
//! Scenes load from and save to an XML and a compact binary format, both via
//! an intermediate [`SceneDesc`](desc::SceneDesc).
//!
//! # Quick Start
//!
//! ```
//! use strata_scene::prelude::*;
//!
//! let mut scene = Scene::new("world", SceneContext::default(), false, true);
//! let lamp = scene
//!     .create_entity(EntityId::NONE, &["EC_Name", "EC_Placeable"], AttributeChange::Default, true, true, false)
//!     .unwrap();
//!
//! let mut entity = scene.entity_mut(lamp).unwrap();
//! entity.set_name("Lamp").unwrap();
//! let placeable = entity.get().unwrap().component::<Placeable>().unwrap().id();
//! entity
//!     .set_attribute(placeable, Placeable::VISIBLE, AttributeValue::Bool(false), AttributeChange::Default)
//!     .unwrap();
//!
//! let xml = scene.serialize_to_xml_string(false, false).unwrap();
//! assert!(xml.contains("Lamp"));
//!
//! let mut copy = Scene::new("copy", SceneContext::default(), false, true);
//! copy.create_content_from_xml(&xml, true, AttributeChange::Default).unwrap();
//! assert_eq!(copy.entity_by_name("Lamp").unwrap().id(), lamp);
//! ```

#![deny(unsafe_code)]

pub mod attribute;
pub mod binary;
pub mod change;
pub mod codec;
pub mod component;
pub mod desc;
pub mod dynamic;
pub mod entity;
pub mod event;
pub mod id;
pub mod interpolation;
pub mod scene;
pub mod value;
pub mod xml;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by scene operations.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// An explicit entity id is already taken.
    #[error("entity id {entity} is already in use")]
    EntityIdInUse { entity: id::EntityId },

    #[error("entity {entity} does not exist")]
    EntityNotFound { entity: id::EntityId },

    /// An explicit component id is already taken on this entity.
    #[error("component id {component} is already in use on entity {entity}")]
    ComponentIdInUse {
        entity: id::EntityId,
        component: id::ComponentId,
    },

    #[error("entity {entity} has no component {component}")]
    ComponentNotFound {
        entity: id::EntityId,
        component: id::ComponentId,
    },

    #[error("component type '{name}' not registered. Registered types: [{registered}]")]
    UnknownComponentType { name: String, registered: String },

    #[error("component type {type_id} ('{type_name}') conflicts with a registered type")]
    DuplicateComponentType { type_id: u32, type_name: String },

    #[error("entity {entity} cannot be its own parent")]
    SelfParenting { entity: id::EntityId },

    /// The requested parent is a descendant of the entity.
    #[error("parenting entity {entity} to {parent} would create a cycle")]
    CyclicParenting {
        entity: id::EntityId,
        parent: id::EntityId,
    },

    /// A parent link or input would nest entities deeper than
    /// [`MAX_HIERARCHY_DEPTH`](entity::MAX_HIERARCHY_DEPTH).
    #[error("entity hierarchy deeper than {limit} levels")]
    HierarchyTooDeep { limit: usize },

    /// Serialized component data names a different component type.
    #[error("component '{component}' cannot load data of type '{found}'")]
    ComponentTypeMismatch { component: String, found: String },

    #[error("component '{component}' does not support dynamic attributes")]
    NotDynamic { component: String },

    #[error("component '{component}' has no attribute '{attribute}'")]
    AttributeNotFound { component: String, attribute: String },

    #[error("component '{component}' already has an attribute '{attribute}'")]
    DuplicateAttribute { component: String, attribute: String },

    #[error("attribute '{attribute}' holds {expected}, got {found}")]
    AttributeTypeMismatch {
        attribute: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A string could not be parsed as the attribute kind.
    #[error("invalid {kind} value '{value}'")]
    InvalidAttributeValue { kind: &'static str, value: String },

    #[error("invalid attribute interpolation: {details}")]
    InvalidInterpolation { details: String },

    // -- encoding -----------------------------------------------------------
    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("string of {len} bytes exceeds the maximum of {max}")]
    StringTooLong { len: usize, max: usize },

    #[error("list of {len} entries exceeds the maximum of {max}")]
    ListTooLong { len: usize, max: usize },

    #[error("invalid UTF-8 in string data: {details}")]
    InvalidUtf8 { details: String },

    #[error("component '{component}' has {count} attributes, more than the format allows")]
    TooManyAttributes { component: String, count: usize },

    #[error("entity {entity} has {count} components, at most 65535 can be serialized")]
    TooManyComponents { entity: id::EntityId, count: usize },

    #[error("entity {entity} has {count} children, at most 65535 can be serialized")]
    TooManyChildren { entity: id::EntityId, count: usize },

    #[error("malformed scene XML: {details}")]
    Xml { details: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::attribute::{Attribute, AttributeDecl};
    pub use crate::change::AttributeChange;
    pub use crate::component::{
        Component, ComponentRegistry, ComponentType, ComponentTypeInfo, DynamicComponent, NameComponent, Placeable,
    };
    pub use crate::desc::{AttributeDesc, ComponentDesc, EntityDesc, ParentingTracker, SceneDesc};
    pub use crate::entity::{Entity, EntityAction, EntityMut, EntityRef, EntityWeak, ExecType, MAX_HIERARCHY_DEPTH};
    pub use crate::event::{EventQueue, ObserverId, SceneEvent, SceneObserver};
    pub use crate::id::{
        ComponentId, EntityId, IdRange, UniqueIdGenerator, FIRST_LOCAL_ID, FIRST_REPLICATED_ID, FIRST_UNACKED_ID,
    };
    pub use crate::interpolation::AttributeRef;
    pub use crate::scene::{Scene, SceneContext};
    pub use crate::value::{
        AssetReference, AssetReferenceList, AttributeKind, AttributeValue, Color, EntityReference, Transform,
    };
    pub use crate::SceneError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
