//! Integration tests for the XML and binary scene formats.

use std::sync::Arc;

use strata_scene::codec::DataSerializer;
use strata_scene::prelude::*;

// -- helpers ----------------------------------------------------------------

fn host(name: &str) -> Scene {
    Scene::new(name, SceneContext::default(), false, true)
}

/// An entity with `EC_Name`, a local `EC_Placeable` and a named dynamic
/// component.
fn furnished(scene: &mut Scene) -> EntityId {
    let id = scene
        .create_entity(EntityId::NONE, &["EC_Name"], AttributeChange::Default, true, true, false)
        .unwrap();
    let mut e = scene.entity_mut(id).unwrap();
    e.set_name("Desk").unwrap();
    let placeable = e
        .create_component("EC_Placeable", "", AttributeChange::Default, false)
        .unwrap();
    e.set_attribute(
        placeable,
        Placeable::TRANSFORM,
        AttributeValue::Transform(Transform::from_pos(glam::Vec3::new(1.0, 2.0, 3.0))),
        AttributeChange::Default,
    )
    .unwrap();
    let dynamic = e
        .create_component("EC_DynamicComponent", "drawer", AttributeChange::Default, true)
        .unwrap();
    e.create_attribute(dynamic, AttributeKind::Int, "items", AttributeChange::Default)
        .unwrap();
    e.set_attribute(dynamic, "items", AttributeValue::Int(4), AttributeChange::Default)
        .unwrap();
    id
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("strata-scene-{}-{name}", std::process::id()))
}

// -- binary -----------------------------------------------------------------

#[test]
fn binary_round_trip_preserves_components() {
    let mut source = host("source");
    let id = furnished(&mut source);
    let bytes = source.serialize_to_binary(false, true).unwrap();

    let mut target = host("target");
    let ids = target
        .create_content_from_binary(&bytes, true, AttributeChange::Default)
        .unwrap();
    assert_eq!(ids, vec![id]);

    let original = source.entity(id).unwrap();
    let copy = target.entity(id).unwrap();
    assert_eq!(copy.num_components(), 3);
    for comp in original.components() {
        let other = copy
            .component_by_type_id_and_name(comp.type_id(), comp.name())
            .unwrap();
        assert_eq!(other.is_replicated(), comp.is_replicated(), "{}", comp.type_name());
        assert!(other.contains_same_attributes(comp));
        for attr in comp.attributes() {
            assert_eq!(other.value(attr.id()), Some(attr.value()));
        }
    }
    assert_eq!(source.state_hash().unwrap(), target.state_hash().unwrap());
}

#[test]
fn entity_binary_can_be_pasted_with_fresh_ids() {
    let mut scene = host("paste");
    let id = furnished(&mut scene);
    let bytes = scene.serialize_entity_to_binary(id, false, false).unwrap();
    let pasted = scene
        .create_content_from_binary(&bytes, false, AttributeChange::Default)
        .unwrap();
    assert_eq!(pasted.len(), 1);
    assert_ne!(pasted[0], id);
    assert_eq!(scene.find_entities_by_name("Desk", true).len(), 2);
}

#[test]
fn corrupt_binary_applies_nothing() {
    let mut scene = host("corrupt");
    furnished(&mut scene);
    let mut bytes = scene.serialize_to_binary(true, true).unwrap();
    bytes.truncate(bytes.len() / 2);

    let mut target = host("target");
    assert!(target
        .create_content_from_binary(&bytes, false, AttributeChange::Default)
        .is_err());
    assert!(target.is_empty());
}

#[test]
fn binary_keeps_list_entries_and_type_hint() {
    let mut registry = ComponentRegistry::with_builtins();
    registry
        .register(ComponentTypeInfo::new(
            1000,
            "EC_Material",
            vec![AttributeDecl::new(
                "textures",
                "Textures",
                AttributeValue::AssetReferenceList(AssetReferenceList {
                    refs: Vec::new(),
                    type_name: "Texture".to_owned(),
                }),
            )],
        ))
        .unwrap();
    let context = SceneContext::new(Arc::new(registry));

    let textures = AttributeValue::AssetReferenceList(AssetReferenceList {
        refs: vec![String::new(), "a;b".to_owned()],
        type_name: "Texture".to_owned(),
    });
    let mut source = Scene::new("source", context.clone(), false, true);
    let id = source
        .create_entity(EntityId::NONE, &["EC_Material"], AttributeChange::Default, true, true, false)
        .unwrap();
    let comp = source.entity(id).unwrap().component_by_type_name("EC_Material").unwrap().id();
    source
        .entity_mut(id)
        .unwrap()
        .set_attribute(comp, "textures", textures.clone(), AttributeChange::Default)
        .unwrap();

    let mut target = Scene::new("target", context, false, true);
    target
        .create_content_from_binary(&source.serialize_to_binary(true, true).unwrap(), true, AttributeChange::Default)
        .unwrap();
    let loaded = target.entity(id).unwrap();
    let loaded = loaded.component_by_type_name("EC_Material").unwrap().value("textures").cloned();
    assert_eq!(loaded, Some(textures));
}

#[test]
fn depth_limited_chain_round_trips_in_both_formats() {
    let mut source = host("chain");
    let mut last: Option<EntityId> = None;
    for _ in 0..MAX_HIERARCHY_DEPTH {
        let id = source
            .create_entity(EntityId::NONE, &["EC_Name"], AttributeChange::Default, true, true, false)
            .unwrap();
        if last.is_some() {
            source.entity_mut(id).unwrap().set_parent(last, AttributeChange::Default).unwrap();
        }
        last = Some(id);
    }
    let expected = source.state_hash().unwrap();

    let mut from_binary = host("binary");
    from_binary
        .create_content_from_binary(&source.serialize_to_binary(true, true).unwrap(), true, AttributeChange::Default)
        .unwrap();
    assert_eq!(from_binary.len(), MAX_HIERARCHY_DEPTH);
    assert_eq!(from_binary.state_hash().unwrap(), expected);

    let mut from_xml = host("xml");
    from_xml
        .create_content_from_xml(&source.serialize_to_xml_string(true, true).unwrap(), true, AttributeChange::Default)
        .unwrap();
    assert_eq!(from_xml.len(), MAX_HIERARCHY_DEPTH);
    assert_eq!(from_xml.state_hash().unwrap(), expected);
}

#[test]
fn overly_deep_binary_applies_nothing() {
    let mut dest = DataSerializer::new();
    dest.add_u32(1);
    for i in 0..200_000u32 {
        dest.add_u32(i + 1);
        dest.add_u8(1);
        dest.add_u32(1 << 16);
    }
    let mut scene = host("deep");
    let err = scene
        .create_content_from_binary(dest.as_bytes(), true, AttributeChange::Default)
        .unwrap_err();
    assert!(matches!(err, SceneError::HierarchyTooDeep { .. }));
    assert!(scene.is_empty());
}

#[test]
fn overly_deep_description_applies_nothing() {
    let mut desc = EntityDesc::default();
    for _ in 0..MAX_HIERARCHY_DEPTH {
        desc = EntityDesc {
            children: vec![desc],
            ..EntityDesc::default()
        };
    }
    let desc = SceneDesc {
        filename: String::new(),
        entities: vec![desc],
    };
    let mut scene = host("deep");
    let err = scene
        .create_content_from_scene_desc(&desc, false, AttributeChange::Default)
        .unwrap_err();
    assert!(matches!(err, SceneError::HierarchyTooDeep { .. }));
    assert!(scene.is_empty());
}

// -- xml --------------------------------------------------------------------

#[test]
fn xml_round_trip_reproduces_structure() {
    let mut source = host("source");
    let root = furnished(&mut source);
    let child = source
        .entity_mut(root)
        .unwrap()
        .create_child(EntityId::NONE, &["EC_Name"], AttributeChange::Default, true, true, false)
        .unwrap();
    source.entity_mut(child).unwrap().set_name("Lamp").unwrap();

    let xml = source.serialize_to_xml_string(false, false).unwrap();
    let mut target = host("target");
    let ids = target
        .create_content_from_xml(&xml, false, AttributeChange::Default)
        .unwrap();
    assert_eq!(ids.len(), 2);

    let desk = target.entity_by_name("Desk").unwrap();
    let lamp = target.entity_by_name("Lamp").unwrap();
    assert_eq!(lamp.parent_id(), Some(desk.id()));
    assert_eq!(
        desk.component_named::<DynamicComponent>("drawer")
            .unwrap()
            .value("items"),
        Some(&AttributeValue::Int(4))
    );
    // the local placeable is a local component, filtered out
    assert!(desk.component::<Placeable>().is_none());
}

#[test]
fn xml_import_announces_parent_first() {
    let xml = r#"<scene>
        <entity id="5" sync="true">
          <entity id="6" sync="true"/>
        </entity>
      </scene>"#;
    let mut scene = host("events");
    let queue = EventQueue::new();
    scene.subscribe(queue.clone());
    let ids = scene
        .create_content_from_xml(xml, true, AttributeChange::Default)
        .unwrap();
    assert_eq!(ids, vec![EntityId(5), EntityId(6)]);
    assert_eq!(
        queue.drain(),
        vec![
            SceneEvent::EntityCreated {
                entity: EntityId(5),
                change: AttributeChange::Replicate
            },
            SceneEvent::EntityCreated {
                entity: EntityId(6),
                change: AttributeChange::Replicate
            },
            SceneEvent::EntityParentChanged {
                entity: EntityId(6),
                parent: Some(EntityId(5)),
                change: AttributeChange::Replicate
            },
        ]
    );
    scene.update(0.0);
    assert!(queue.is_empty(), "no duplicate creation notice");
}

#[test]
fn ids_from_file_replace_existing_entities() {
    let mut scene = host("replace");
    let existing = furnished(&mut scene);
    let xml = format!(
        r#"<scene><entity id="{}" sync="true">
             <component type="EC_Name" typeId="26" sync="true">
               <attribute value="Chair" id="name" name="name"/>
             </component>
           </entity></scene>"#,
        existing.raw()
    );
    scene
        .create_content_from_xml(&xml, true, AttributeChange::Default)
        .unwrap();
    assert_eq!(scene.len(), 1);
    assert_eq!(scene.entity(existing).unwrap().name(), "Chair");
}

#[test]
fn duplicate_file_ids_keep_the_first_entity() {
    let xml = r#"<scene>
        <entity id="5" sync="true">
          <component type="EC_Name" typeId="26"><attribute id="name" name="name" value="First"/></component>
        </entity>
        <entity id="5" sync="true">
          <component type="EC_Name" typeId="26"><attribute id="name" name="name" value="Second"/></component>
          <entity id="6" sync="true"/>
        </entity>
      </scene>"#;
    let mut scene = host("duplicates");
    let ids = scene
        .create_content_from_xml(xml, true, AttributeChange::Default)
        .unwrap();
    assert_eq!(ids, vec![EntityId(5)]);
    assert_eq!(scene.len(), 1);
    assert_eq!(scene.entity(EntityId(5)).unwrap().name(), "First");

    // Fresh ids: both copies are created.
    let mut pasted = host("pasted");
    let ids = pasted
        .create_content_from_xml(xml, false, AttributeChange::Default)
        .unwrap();
    assert_eq!(ids.len(), 3);
}

#[test]
fn malformed_xml_applies_nothing() {
    let mut scene = host("malformed");
    let xml = r#"<scene><entity id="1"><component type="EC_Name" typeId="26"></entity></scene>"#;
    assert!(scene
        .create_content_from_xml(xml, false, AttributeChange::Default)
        .is_err());
    assert!(scene.is_empty());
}

#[test]
fn unknown_component_types_are_skipped() {
    let xml = r#"<scene><entity id="3" sync="true">
        <component type="EC_Mesh" typeId="17" sync="true"/>
        <component type="EC_Name" typeId="26" sync="true"/>
      </entity></scene>"#;
    let mut scene = host("unknown");
    let ids = scene
        .create_content_from_xml(xml, true, AttributeChange::Default)
        .unwrap();
    assert_eq!(scene.entity(ids[0]).unwrap().num_components(), 1);
}

#[test]
fn component_type_name_is_used_when_id_is_missing() {
    let xml = r#"<scene><entity id="3"><component type="Placeable"/></entity></scene>"#;
    let mut scene = host("by-name");
    let ids = scene
        .create_content_from_xml(xml, true, AttributeChange::Default)
        .unwrap();
    assert!(scene.entity(ids[0]).unwrap().component::<Placeable>().is_some());
}

// -- files ------------------------------------------------------------------

#[test]
fn save_and_load_xml_file() {
    let path = temp_path("scene.xml");
    let mut source = host("source");
    furnished(&mut source);
    source.save_scene_xml(&path, false, true).unwrap();

    let mut target = host("target");
    target.create_entity(EntityId::NONE, &[], AttributeChange::Default, true, true, false)
        .unwrap();
    let ids = target
        .load_scene_xml(&path, true, true, AttributeChange::Default)
        .unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(ids.len(), 1);
    assert_eq!(target.len(), 1);
    assert_eq!(target.entity(ids[0]).unwrap().num_components(), 3);
}

#[test]
fn save_and_load_binary_file() {
    let path = temp_path("scene.bin");
    let mut source = host("source");
    furnished(&mut source);
    source.save_scene_binary(&path, false, true).unwrap();

    let mut target = host("target");
    let ids = target
        .load_scene_binary(&path, false, false, AttributeChange::Default)
        .unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(target.entity(ids[0]).unwrap().name(), "Desk");
}

#[test]
fn missing_file_is_an_io_error() {
    let mut scene = host("missing");
    let err = scene
        .load_scene_xml(temp_path("does-not-exist.xml"), true, false, AttributeChange::Default)
        .unwrap_err();
    assert!(matches!(err, SceneError::Io(_)));
}

// -- descriptions -----------------------------------------------------------

#[test]
fn scene_desc_serializes_to_json() {
    let mut scene = host("json");
    furnished(&mut scene);
    let desc = scene.to_scene_desc(false, true);
    let json = serde_json::to_string(&desc).unwrap();
    let back: SceneDesc = serde_json::from_str(&json).unwrap();
    assert_eq!(back, desc);
}
