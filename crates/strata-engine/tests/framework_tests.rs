//! Integration tests for the framework layer: config files, scene files and
//! the frame loop working together.

use std::path::PathBuf;

use proptest::prelude::*;
use strata_engine::prelude::*;

// -- helpers ----------------------------------------------------------------

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("strata-engine-{}-{name}", std::process::id()))
}

fn populate(scene: &mut Scene) -> EntityId {
    let root = scene
        .create_entity(EntityId::NONE, &["EC_Name", "EC_Placeable"], AttributeChange::Default, true, true, false)
        .unwrap();
    scene.entity_mut(root).unwrap().set_name("Room").unwrap();
    let child = scene
        .entity_mut(root)
        .unwrap()
        .create_child(EntityId::NONE, &["EC_Name"], AttributeChange::Default, true, true, false)
        .unwrap();
    scene.entity_mut(child).unwrap().set_name("Chair").unwrap();
    root
}

// -- config -----------------------------------------------------------------

#[test]
fn config_file_drives_framework_startup() {
    let path = temp_path("engine.json");
    std::fs::write(
        &path,
        r#"{ "frame_time": 0.1, "scenes": [ { "name": "server" }, { "name": "client", "authority": false } ] }"#,
    )
    .unwrap();
    let config = EngineConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let mut fw = Framework::new(config, ComponentRegistry::with_builtins()).unwrap();
    assert_eq!(fw.scene_count(), 2);
    fw.run_frames(10);
    assert!((fw.elapsed_time() - 1.0).abs() < 1e-9);

    // Unacked ids are only handed out by non-authoritative scenes.
    let id = fw
        .scene_mut("client")
        .unwrap()
        .create_entity(EntityId::NONE, &[], AttributeChange::Default, true, true, false)
        .unwrap();
    assert!(id.is_unacked());
}

#[test]
fn missing_config_file_is_io_error() {
    assert!(matches!(
        EngineConfig::from_file(temp_path("nope.json")),
        Err(EngineError::Io(_))
    ));
}

// -- formats ----------------------------------------------------------------

#[test]
fn convert_xml_to_binary_and_back() {
    let mut fw = Framework::new(EngineConfig::default(), ComponentRegistry::with_builtins()).unwrap();
    let source = fw.create_scene("source", false, true).unwrap();
    let root = populate(source);
    let expected = source.state_hash().unwrap();

    let xml = temp_path("room.xml");
    let bin = temp_path("room.bin");
    SceneFormat::from_path(&xml).unwrap().save(fw.scene("source").unwrap(), &xml).unwrap();

    let staging = fw.create_scene("staging", false, true).unwrap();
    SceneFormat::Xml.load(staging, &xml).unwrap();
    SceneFormat::Binary.save(staging, &bin).unwrap();

    let target = fw.create_scene("target", false, true).unwrap();
    let ids = SceneFormat::Binary.load(target, &bin).unwrap();
    std::fs::remove_file(&xml).ok();
    std::fs::remove_file(&bin).ok();

    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], root);
    assert_eq!(target.entity_by_name("Chair").unwrap().parent_id(), Some(root));
    assert_eq!(target.state_hash().unwrap(), expected);
}

#[test]
fn load_replaces_existing_content() {
    let path = temp_path("replace.xml");
    let mut source = Scene::new("source", SceneContext::default(), false, true);
    populate(&mut source);
    SceneFormat::Xml.save(&source, &path).unwrap();

    let mut target = Scene::new("target", SceneContext::default(), false, true);
    for _ in 0..5 {
        target.create_local_entity(&[], AttributeChange::Default).unwrap();
    }
    SceneFormat::Xml.load(&mut target, &path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(target.len(), 2);
}

#[test]
fn scene_errors_convert_into_engine_errors() {
    let path = temp_path("broken.xml");
    std::fs::write(&path, "<scene><entity>").unwrap();
    let mut scene = Scene::new("broken", SceneContext::default(), false, true);
    let err = SceneFormat::Xml.load(&mut scene, &path).unwrap_err();
    std::fs::remove_file(&path).ok();
    assert!(matches!(err, EngineError::Scene(SceneError::Xml { .. })));
    assert!(scene.is_empty());
}

// -- frame loop -------------------------------------------------------------

#[test]
fn interpolation_finishes_through_frames() {
    let config = EngineConfig {
        frame_time: 0.25,
        ..Default::default()
    };
    let mut fw = Framework::new(config, ComponentRegistry::with_builtins()).unwrap();
    let scene = fw.create_scene("main", true, true).unwrap();
    let id = scene
        .create_entity(EntityId::NONE, &["EC_Placeable"], AttributeChange::Default, true, true, false)
        .unwrap();
    let comp = scene.entity(id).unwrap().component::<Placeable>().unwrap().id();
    let dest = AttributeRef::new(scene.weak(id).unwrap(), comp, Placeable::TRANSFORM);
    let end = Transform::from_pos(glam::Vec3::new(4.0, 0.0, 0.0));
    scene
        .start_attribute_interpolation(dest, AttributeValue::Transform(end), 1.0)
        .unwrap();

    fw.run_frames(2);
    assert_eq!(fw.scene("main").unwrap().num_attribute_interpolations(), 1);
    fw.run_frames(3);
    let scene = fw.scene("main").unwrap();
    assert_eq!(scene.num_attribute_interpolations(), 0);
    let value = scene
        .entity(id)
        .unwrap()
        .component::<Placeable>()
        .unwrap()
        .value(Placeable::TRANSFORM)
        .cloned();
    match value {
        Some(AttributeValue::Transform(t)) => assert_eq!(t.pos, end.pos),
        other => panic!("unexpected transform value {other:?}"),
    }
}

// -- properties -------------------------------------------------------------

proptest! {
    #[test]
    fn elapsed_time_sums_frame_steps(steps in prop::collection::vec(0.001f64..1.0, 0..40)) {
        let mut fw = Framework::new(EngineConfig::default(), ComponentRegistry::new()).unwrap();
        for &dt in &steps {
            fw.frame_with(dt);
        }
        prop_assert_eq!(fw.frame_count(), steps.len() as u64);
        let total: f64 = steps.iter().sum();
        prop_assert!((fw.elapsed_time() - total).abs() < 1e-9);
    }
}
