//! Scene throughput benchmarks.
//!
//! - entity creation with the built-in components,
//! - dynamic attribute reconciliation against a changing attribute set,
//! - binary and XML serialization of a populated scene.
//!
//! Run with: `cargo bench --bench scene_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use strata_scene::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn populated(count: usize) -> Scene {
    let mut scene = Scene::new("bench", SceneContext::default(), false, true);
    for i in 0..count {
        let id = scene
            .create_entity(EntityId::NONE, &["EC_Name", "EC_Placeable"], AttributeChange::Default, true, true, false)
            .expect("entity creation");
        scene
            .entity_mut(id)
            .expect("entity exists")
            .set_name(&format!("entity-{i}"))
            .expect("name set");
    }
    scene.update(0.0);
    scene
}

fn attribute_set(count: usize, offset: usize) -> Vec<AttributeDesc> {
    (0..count)
        .map(|i| AttributeDesc::new(&format!("attr{:04}", i + offset), "real", &format!("{i}.5")))
        .collect()
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_create_entities(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_entities");
    for &count in &[100usize, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| black_box(populated(count)));
        });
    }
    group.finish();
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_dynamic");
    for &count in &[16usize, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut scene = Scene::new("bench", SceneContext::default(), false, true);
            let id = scene
                .create_entity(EntityId::NONE, &["EC_DynamicComponent"], AttributeChange::Default, true, true, false)
                .expect("entity creation");
            let comp = scene
                .entity(id)
                .and_then(|e| e.component::<DynamicComponent>().map(|c| c.id()))
                .expect("dynamic component");
            // Half the ids shift each round, so every pass updates, adds and removes.
            let sets = [attribute_set(count, 0), attribute_set(count, count / 2)];
            let mut round = 0usize;
            b.iter(|| {
                round += 1;
                scene
                    .entity_mut(id)
                    .expect("entity exists")
                    .reconcile_dynamic(comp, &sets[round % 2], AttributeChange::Disconnected)
                    .expect("reconcile");
            });
        });
    }
    group.finish();
}

fn bench_serialize(c: &mut Criterion) {
    let scene = populated(1_000);
    c.bench_function("serialize_binary_1k", |b| {
        b.iter(|| black_box(scene.serialize_to_binary(false, false).expect("binary")));
    });
    c.bench_function("serialize_xml_1k", |b| {
        b.iter(|| black_box(scene.serialize_to_xml_string(false, false).expect("xml")));
    });

    let bytes = scene.serialize_to_binary(false, false).expect("binary");
    c.bench_function("parse_binary_1k", |b| {
        b.iter(|| black_box(scene.create_scene_desc_from_binary(&bytes).expect("parse")));
    });
}

criterion_group!(benches, bench_create_entities, bench_reconcile, bench_serialize);
criterion_main!(benches);
