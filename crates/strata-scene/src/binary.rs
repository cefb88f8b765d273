//! Binary scene format.
//!
//! All integers are little-endian.
//!
//! ```text
//! scene     := u32 root_count, entity*
//! entity    := u32 id, u8 replicated, u32 (component_count | child_count << 16),
//!              component*, entity*            (children)
//! component := u32 type_id, u8-string name, u8 replicated, u32 byte_length,
//!              payload[byte_length]
//! ```
//!
//! Static payloads hold each attribute's binary value in layout order, so
//! decoding needs the component registry. Components of unknown types are
//! skipped using their byte length.

use std::path::Path;

use crate::change::AttributeChange;
use crate::codec::{DataDeserializer, DataSerializer};
use crate::component::{Component, ComponentRegistry, ComponentTypeInfo};
use crate::desc::{AttributeDesc, ComponentDesc, EntityDesc, SceneDesc};
use crate::entity::{EntityRef, MAX_HIERARCHY_DEPTH};
use crate::id::EntityId;
use crate::scene::Scene;
use crate::value::AttributeValue;
use crate::SceneError;

/// Components or children per entity representable in the packed count.
pub const MAX_PACKED_COUNT: usize = 0xFFFF;

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

struct Filter {
    temporary: bool,
    local: bool,
    children: bool,
}

fn write_entity(dest: &mut DataSerializer, entity: &EntityRef<'_>, filter: &Filter) -> Result<(), SceneError> {
    let components: Vec<&Component> = entity
        .components()
        .filter(|c| c.should_be_serialized(filter.temporary, filter.local))
        .collect();
    let children: Vec<EntityRef<'_>> = if filter.children {
        entity
            .children(false)
            .into_iter()
            .filter(|c| c.should_be_serialized(filter.temporary, filter.local, true))
            .collect()
    } else {
        Vec::new()
    };
    if components.len() > MAX_PACKED_COUNT {
        return Err(SceneError::TooManyComponents {
            entity: entity.id(),
            count: components.len(),
        });
    }
    if children.len() > MAX_PACKED_COUNT {
        return Err(SceneError::TooManyChildren {
            entity: entity.id(),
            count: children.len(),
        });
    }

    dest.add_u32(entity.id().raw());
    dest.add_u8(u8::from(entity.is_replicated()));
    dest.add_u32(components.len() as u32 | (children.len() as u32) << 16);

    for comp in components {
        dest.add_u32(comp.type_id());
        dest.add_short_string(comp.name())?;
        dest.add_u8(u8::from(comp.is_replicated()));
        let mut payload = DataSerializer::new();
        comp.write_payload(&mut payload)?;
        let len = u32::try_from(payload.len()).map_err(|_| SceneError::TooManyAttributes {
            component: comp.type_name().to_owned(),
            count: comp.num_attributes(),
        })?;
        dest.add_u32(len);
        dest.add_bytes(payload.as_bytes());
    }
    for child in &children {
        write_entity(dest, child, filter)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Decode a binary scene into a description. Nothing is applied anywhere, so
/// a truncated or corrupt buffer simply yields `Err`.
pub fn parse_scene_desc(data: &[u8], registry: &ComponentRegistry) -> Result<SceneDesc, SceneError> {
    let mut source = DataDeserializer::new(data);
    let count = source.read_u32()?;
    let mut entities = Vec::new();
    for _ in 0..count {
        entities.push(read_entity(&mut source, registry, 1)?);
    }
    if source.remaining() > 0 {
        tracing::warn!(bytes = source.remaining(), "trailing data after binary scene");
    }
    Ok(SceneDesc {
        filename: String::new(),
        entities,
    })
}

fn read_entity(
    source: &mut DataDeserializer<'_>,
    registry: &ComponentRegistry,
    depth: usize,
) -> Result<EntityDesc, SceneError> {
    if depth > MAX_HIERARCHY_DEPTH {
        tracing::error!(limit = MAX_HIERARCHY_DEPTH, "binary scene nests entities too deeply");
        return Err(SceneError::HierarchyTooDeep {
            limit: MAX_HIERARCHY_DEPTH,
        });
    }
    let id = source.read_u32()?;
    let sync = source.read_u8()? != 0;
    let packed = source.read_u32()?;
    let num_components = packed & 0xFFFF;
    let num_children = packed >> 16;

    let mut components = Vec::new();
    for _ in 0..num_components {
        let type_id = source.read_u32()?;
        let name = source.read_short_string()?;
        let replicated = source.read_u8()? != 0;
        let len = source.read_u32()? as usize;
        let payload = source.read_bytes(len)?;
        let Some(info) = registry.info_by_id(type_id) else {
            tracing::warn!(entity = id, type_id, "unknown component type in binary data, skipped");
            continue;
        };
        components.push(ComponentDesc {
            type_id,
            type_name: info.type_name.clone(),
            name,
            sync: replicated,
            temporary: false,
            attributes: decode_payload(info, payload)?,
        });
    }

    let mut children = Vec::new();
    for _ in 0..num_children {
        children.push(read_entity(source, registry, depth + 1)?);
    }
    Ok(EntityDesc {
        id,
        sync,
        temporary: false,
        components,
        children,
    })
}

pub(crate) fn decode_payload(info: &ComponentTypeInfo, payload: &[u8]) -> Result<Vec<AttributeDesc>, SceneError> {
    let mut source = DataDeserializer::new(payload);
    let mut attributes = Vec::new();
    if info.dynamic {
        let count = source.read_u8()?;
        for _ in 0..count {
            let id = source.read_short_string()?;
            let type_name = source.read_short_string()?;
            let value = source.read_string()?;
            attributes.push(AttributeDesc::new(&id, &type_name, &value));
        }
        return Ok(attributes);
    }
    for decl in &info.attributes {
        // Payloads written with a shorter layout end early.
        if source.remaining() == 0 {
            break;
        }
        let value = AttributeValue::read_binary(decl.kind(), &mut source)?;
        attributes.push(AttributeDesc {
            id: decl.id.clone(),
            name: decl.name.clone(),
            type_name: String::new(),
            value: value.to_string(),
            typed: Some(value),
        });
    }
    Ok(attributes)
}

// ---------------------------------------------------------------------------
// Scene integration
// ---------------------------------------------------------------------------

impl Scene {
    /// Root-level entities with their children nested.
    pub fn serialize_to_binary(&self, serialize_temporary: bool, serialize_local: bool) -> Result<Vec<u8>, SceneError> {
        let filter = Filter {
            temporary: serialize_temporary,
            local: serialize_local,
            children: true,
        };
        let roots: Vec<EntityRef<'_>> = self
            .entities()
            .filter(|e| e.should_be_serialized(serialize_temporary, serialize_local, false))
            .collect();
        let mut dest = DataSerializer::new();
        dest.add_u32(roots.len() as u32);
        for entity in &roots {
            write_entity(&mut dest, entity, &filter)?;
        }
        Ok(dest.into_bytes())
    }

    /// One entity as a single-root scene, so the result can be fed back to
    /// [`Scene::create_content_from_binary`].
    pub fn serialize_entity_to_binary(
        &self,
        id: EntityId,
        serialize_temporary: bool,
        serialize_children: bool,
    ) -> Result<Vec<u8>, SceneError> {
        let entity = self.entity(id).ok_or(SceneError::EntityNotFound { entity: id })?;
        let filter = Filter {
            temporary: serialize_temporary,
            local: true,
            children: serialize_children,
        };
        let mut dest = DataSerializer::new();
        dest.add_u32(1);
        write_entity(&mut dest, &entity, &filter)?;
        Ok(dest.into_bytes())
    }

    pub fn create_scene_desc_from_binary(&self, data: &[u8]) -> Result<SceneDesc, SceneError> {
        parse_scene_desc(data, self.registry())
    }

    pub fn create_content_from_binary(
        &mut self,
        data: &[u8],
        use_entity_ids_from_file: bool,
        change: AttributeChange,
    ) -> Result<Vec<EntityId>, SceneError> {
        let desc = parse_scene_desc(data, self.registry())?;
        self.create_content_from_scene_desc(&desc, use_entity_ids_from_file, change)
    }

    pub fn save_scene_binary(
        &self,
        path: impl AsRef<Path>,
        serialize_temporary: bool,
        serialize_local: bool,
    ) -> Result<(), SceneError> {
        let path = path.as_ref();
        let bytes = self.serialize_to_binary(serialize_temporary, serialize_local)?;
        std::fs::write(path, &bytes)?;
        tracing::info!(scene = %self.name(), path = %path.display(), bytes = bytes.len(), "saved binary scene");
        Ok(())
    }

    /// Load a binary scene file. Decoding finishes before the scene is
    /// cleared.
    pub fn load_scene_binary(
        &mut self,
        path: impl AsRef<Path>,
        clear_scene: bool,
        use_entity_ids_from_file: bool,
        change: AttributeChange,
    ) -> Result<Vec<EntityId>, SceneError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mut desc = parse_scene_desc(&bytes, self.registry())?;
        desc.filename = path.display().to_string();
        if clear_scene {
            self.remove_all_entities(true, change);
        }
        let ids = self.create_content_from_scene_desc(&desc, use_entity_ids_from_file, change)?;
        tracing::info!(scene = %self.name(), path = %path.display(), entities = ids.len(), "loaded binary scene");
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentType, DynamicComponent, NameComponent, Placeable};
    use crate::scene::SceneContext;
    use crate::value::AttributeKind;

    fn scene() -> Scene {
        Scene::new("bin", SceneContext::default(), false, true)
    }

    #[test]
    fn empty_scene_is_a_zero_count() {
        assert_eq!(scene().serialize_to_binary(true, true).unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn entity_header_layout() {
        let mut s = scene();
        let parent = s
            .create_entity(EntityId::NONE, &["EC_Name"], AttributeChange::Default, true, true, false)
            .unwrap();
        let child = s
            .create_entity(EntityId::NONE, &[], AttributeChange::Default, true, true, false)
            .unwrap();
        s.entity_mut(child)
            .unwrap()
            .set_parent(Some(parent), AttributeChange::Default)
            .unwrap();

        let bytes = s.serialize_to_binary(true, true).unwrap();
        // one root
        assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
        assert_eq!(bytes[8], 1);
        // one component, one child
        assert_eq!(&bytes[9..13], &(1u32 | 1 << 16).to_le_bytes());
        assert_eq!(&bytes[13..17], &NameComponent::TYPE_ID.to_le_bytes());
    }

    #[test]
    fn dynamic_payload_round_trips() {
        let mut s = scene();
        let id = s
            .create_entity(EntityId::NONE, &[], AttributeChange::Default, true, true, false)
            .unwrap();
        let mut e = s.entity_mut(id).unwrap();
        let comp = e
            .create_component(DynamicComponent::TYPE_NAME, "state", AttributeChange::Default, true)
            .unwrap();
        e.create_attribute(comp, AttributeKind::Real, "speed", AttributeChange::Default)
            .unwrap();
        e.set_attribute(comp, "speed", AttributeValue::Real(2.5), AttributeChange::Default)
            .unwrap();

        let desc = s
            .create_scene_desc_from_binary(&s.serialize_to_binary(true, true).unwrap())
            .unwrap();
        let attr = &desc.entities[0].components[0].attributes[0];
        assert_eq!(attr.id, "speed");
        assert_eq!(attr.type_name, "real");
        assert_eq!(attr.value, "2.5");
    }

    #[test]
    fn unknown_component_type_is_skipped() {
        let mut dest = DataSerializer::new();
        dest.add_u32(1);
        dest.add_u32(3);
        dest.add_u8(1);
        dest.add_u32(2);
        // unknown type with a 2 byte payload
        dest.add_u32(999);
        dest.add_short_string("x").unwrap();
        dest.add_u8(1);
        dest.add_u32(2);
        dest.add_bytes(&[0xAB, 0xCD]);
        // EC_Placeable with an empty payload keeps defaults
        dest.add_u32(Placeable::TYPE_ID);
        dest.add_short_string("").unwrap();
        dest.add_u8(0);
        dest.add_u32(0);

        let reg = ComponentRegistry::with_builtins();
        let desc = parse_scene_desc(dest.as_bytes(), &reg).unwrap();
        let comps = &desc.entities[0].components;
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].type_id, Placeable::TYPE_ID);
        assert!(!comps[0].sync);
        assert!(comps[0].attributes.is_empty());
    }

    // -- hierarchy depth ---------------------------------------------------

    fn chain_bytes(levels: usize) -> Vec<u8> {
        let mut dest = DataSerializer::new();
        dest.add_u32(1);
        for i in 0..levels {
            dest.add_u32(i as u32 + 1);
            dest.add_u8(1);
            dest.add_u32(if i + 1 < levels { 1 << 16 } else { 0 });
        }
        dest.as_bytes().to_vec()
    }

    #[test]
    fn deeply_nested_buffer_is_rejected() {
        let reg = ComponentRegistry::with_builtins();
        let err = parse_scene_desc(&chain_bytes(200_000), &reg).unwrap_err();
        assert!(matches!(err, SceneError::HierarchyTooDeep { limit: MAX_HIERARCHY_DEPTH }));
    }

    #[test]
    fn chain_at_depth_limit_parses() {
        let reg = ComponentRegistry::with_builtins();
        let desc = parse_scene_desc(&chain_bytes(MAX_HIERARCHY_DEPTH), &reg).unwrap();
        assert_eq!(desc.entity_count(), MAX_HIERARCHY_DEPTH);
        assert!(parse_scene_desc(&chain_bytes(MAX_HIERARCHY_DEPTH + 1), &reg).is_err());
    }

    #[test]
    fn truncated_data_is_an_error() {
        let mut s = scene();
        s.create_entity(EntityId::NONE, &["EC_Placeable"], AttributeChange::Default, true, true, false)
            .unwrap();
        let bytes = s.serialize_to_binary(true, true).unwrap();
        let err = s
            .create_content_from_binary(&bytes[..bytes.len() - 3], false, AttributeChange::Default)
            .unwrap_err();
        assert!(matches!(err, SceneError::UnexpectedEof { .. }));
        assert_eq!(s.len(), 1, "nothing applied");
    }
}
