use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bevy::prelude::*;
use rs_render::{
    GridAtlasStitcher, INVISIBLE_GROUP, ItemModel, ModelManager, ModelReloadInFlight,
    ModelReloadPlugin, ModelReloadQueue, ModelReloadRequest, ReloadInputs, StaticColorSource,
    load_block_state_bindings, load_item_bindings,
};
use rs_utils::{BlockDefinition, BlockRegistry, BlockStateId, FluidKind, ResourceLocation};

fn loc(s: &str) -> ResourceLocation {
    ResourceLocation::parse(s)
}

fn files(entries: &[(&str, &str)]) -> HashMap<ResourceLocation, String> {
    entries
        .iter()
        .map(|(id, json)| (loc(id), json.to_string()))
        .collect()
}

fn state(registry: &BlockRegistry, block: &str, key: &str) -> BlockStateId {
    let block = registry.block_by_name(&loc(block)).unwrap();
    registry
        .states_of(block)
        .find(|s| registry.variant_key(*s) == key)
        .unwrap()
}

fn inputs() -> ReloadInputs {
    let registry = Arc::new(BlockRegistry::new([
        BlockDefinition::new("minecraft:air").invisible(),
        BlockDefinition::new("minecraft:water")
            .with_property("level", (0..16).map(|l| l.to_string()))
            .fluid(FluidKind::Water),
        BlockDefinition::new("minecraft:stone"),
        BlockDefinition::new("minecraft:glitch"),
        BlockDefinition::new("minecraft:furnace")
            .with_property("facing", ["north", "east"])
            .with_property("lit", ["false", "true"]),
        BlockDefinition::new("minecraft:redstone_wire").with_property("power", ["0", "1", "2"]),
    ]));
    let blockstates = files(&[
        ("minecraft:stone", r#"{"variants": {"": {"model": "block/stone"}}}"#),
        ("minecraft:glitch", r#"{"variants": {"": {"model": "block/loop_a"}}}"#),
        (
            "minecraft:furnace",
            r#"{"variants": {
                "facing=north": {"model": "block/furnace"},
                "facing=east": {"model": "block/furnace", "y": 90}
            }}"#,
        ),
        ("minecraft:redstone_wire", r#"{"variants": {"": {"model": "block/dust"}}}"#),
    ]);
    let raw_models = files(&[
        (
            "block/cube",
            r##"{
                "textures": {"particle": "#north"},
                "elements": [{"from": [0, 0, 0], "to": [16, 16, 16], "faces": {
                    "north": {"texture": "#north", "cullface": "north"},
                    "up": {"texture": "#up", "cullface": "up"}
                }}]
            }"##,
        ),
        (
            "block/cube_all",
            r##"{"parent": "block/cube", "textures": {"north": "#all", "up": "#all"}}"##,
        ),
        ("block/stone", r#"{"parent": "block/cube_all", "textures": {"all": "block/stone"}}"#),
        (
            "block/furnace",
            r#"{"parent": "block/cube", "textures": {"north": "block/furnace_front", "up": "block/furnace_top"}}"#,
        ),
        ("block/dust", r#"{"parent": "block/cube_all", "textures": {"all": "block/redstone_dust"}}"#),
        ("block/loop_a", r#"{"parent": "block/loop_b"}"#),
        ("block/loop_b", r#"{"parent": "block/loop_a"}"#),
        ("block/orphan", "{}"),
    ]);
    let items = files(&[
        ("minecraft:stone", r#"{"model": {"type": "minecraft:model", "model": "block/stone"}}"#),
        ("minecraft:air", r#"{"model": {"type": "minecraft:empty"}}"#),
    ]);

    ReloadInputs {
        raw_models,
        block_bindings: Arc::new(load_block_state_bindings(&registry, &blockstates)),
        item_bindings: Arc::new(load_item_bindings(&items)),
        registry,
        color_source: Arc::new(StaticColorSource::new([(
            loc("redstone_wire"),
            vec!["power".to_string()],
        )])),
        stitcher: Arc::new(GridAtlasStitcher::new(
            ["block/stone", "block/furnace_front", "block/redstone_dust"]
                .into_iter()
                .map(loc),
        )),
        report_unreferenced: true,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reload_resolves_bakes_and_groups() {
    let inputs = inputs();
    let registry = inputs.registry.clone();
    let mut manager = ModelManager::default();
    manager.reload(inputs, async {}).await;
    let snapshot = manager.snapshot();

    let stone = state(&registry, "stone", "");
    let stone_model = snapshot.model(stone).primary().unwrap().clone();
    assert_eq!(stone_model.particle_icon().name, loc("block/stone"));
    assert!(!stone_model.particle_icon().is_missing());

    // a reference loop degrades to the missing model instead of failing the reload
    let glitch = snapshot.model(state(&registry, "glitch", "")).primary().unwrap();
    assert!(glitch.particle_icon().is_missing());

    // both furnace facings share one model id but bake under different rotations
    let north = snapshot
        .model(state(&registry, "furnace", "facing=north,lit=false"))
        .primary()
        .unwrap()
        .clone();
    let north_lit = snapshot
        .model(state(&registry, "furnace", "facing=north,lit=true"))
        .primary()
        .unwrap()
        .clone();
    let east = snapshot
        .model(state(&registry, "furnace", "facing=east,lit=false"))
        .primary()
        .unwrap()
        .clone();
    assert!(Arc::ptr_eq(&north, &north_lit));
    assert!(!Arc::ptr_eq(&north, &east));
    assert_eq!(east.quads(Some(rs_utils::Direction::East)).len(), 1);

    // furnace_top is not in the atlas
    let furnace_missing = &snapshot.missing_textures()["minecraft:block/furnace"];
    assert_eq!(furnace_missing.len(), 1);
    assert!(furnace_missing.contains("minecraft:block/furnace_top"));

    assert_eq!(snapshot.unreferenced(), [loc("block/orphan")].as_slice());

    let ItemModel::Model(item) = snapshot.item_model(&loc("stone")) else {
        panic!("stone item should bake");
    };
    assert!(Arc::ptr_eq(item, &stone_model));
    assert!(matches!(snapshot.item_model(&loc("air")), ItemModel::Empty));

    let groups = snapshot.groups();
    assert_eq!(groups.group(state(&registry, "air", "")), INVISIBLE_GROUP);
    assert_eq!(groups.group(state(&registry, "water", "level=4")), INVISIBLE_GROUP);
    let wire: Vec<i32> = ["power=0", "power=1", "power=2"]
        .iter()
        .map(|key| groups.group(state(&registry, "redstone_wire", key)))
        .collect();
    // same binding but different tint values: never grouped together
    assert!(wire.iter().all(|g| *g == rs_render::SINGLETON_GROUP));
    assert!(!manager.requires_render(
        state(&registry, "furnace", "facing=north,lit=false"),
        state(&registry, "furnace", "facing=north,lit=true"),
    ));
    assert!(manager.requires_render(
        state(&registry, "furnace", "facing=north,lit=false"),
        state(&registry, "furnace", "facing=east,lit=false"),
    ));
    assert!(manager.requires_render(
        state(&registry, "water", "level=0"),
        state(&registry, "water", "level=1"),
    ));

    let stats = snapshot.stats();
    assert_eq!(stats.loaded_models, 8);
    assert_eq!(stats.bake.failed_bindings, 0);
    assert!(stats.bake.cache_hits >= 2);
}

#[tokio::test]
async fn second_reload_replaces_the_whole_generation() {
    let mut manager = ModelManager::default();
    manager.reload(inputs(), async {}).await;
    let first = manager.snapshot();
    manager.reload(inputs(), async {}).await;
    let second = manager.snapshot();
    assert_eq!(manager.generation(), 2);
    assert!(!Arc::ptr_eq(&first, &second));

    let registry = second.registry().clone();
    let stone = state(&registry, "stone", "");
    // bake caches do not outlive their reload
    assert!(!Arc::ptr_eq(
        first.model(stone).primary().unwrap(),
        second.model(stone).primary().unwrap()
    ));
}

#[test]
fn plugin_applies_finished_reloads() {
    let mut app = App::new();
    app.add_plugins(ModelReloadPlugin);
    let (request, release) = ModelReloadRequest::gated(inputs());
    app.world_mut()
        .resource_mut::<ModelReloadQueue>()
        .0
        .push(request);

    app.update();
    assert_eq!(app.world().resource::<ModelReloadInFlight>().pending, 1);
    std::thread::sleep(Duration::from_millis(50));
    app.update();
    assert_eq!(app.world().resource::<ModelManager>().generation(), 0);

    release.send(()).unwrap();
    for _ in 0..200 {
        app.update();
        if app.world().resource::<ModelManager>().generation() == 1 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(app.world().resource::<ModelManager>().generation(), 1);
    assert_eq!(app.world().resource::<ModelReloadInFlight>().pending, 0);
}

fn update_until(app: &mut App, done: impl Fn(&App) -> bool) {
    for _ in 0..200 {
        app.update();
        if done(app) {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn dropped_gate_keeps_the_current_generation() {
    let mut app = App::new();
    app.add_plugins(ModelReloadPlugin);
    let (request, release) = ModelReloadRequest::gated(inputs());
    app.world_mut()
        .resource_mut::<ModelReloadQueue>()
        .0
        .push(request);
    app.update();
    assert_eq!(app.world().resource::<ModelReloadInFlight>().pending, 1);

    drop(release);
    update_until(&mut app, |app| {
        app.world().resource::<ModelReloadInFlight>().pending == 0
    });
    assert_eq!(app.world().resource::<ModelReloadInFlight>().pending, 0);
    for _ in 0..10 {
        app.update();
    }
    assert_eq!(app.world().resource::<ModelManager>().generation(), 0);
    assert_eq!(app.world().resource::<ModelReloadInFlight>().last_applied(), None);
}

#[test]
fn late_reload_never_replaces_a_newer_one() {
    let mut app = App::new();
    app.add_plugins(ModelReloadPlugin);
    let (older, release) = ModelReloadRequest::gated(inputs());
    {
        let mut queue = app.world_mut().resource_mut::<ModelReloadQueue>();
        queue.0.push(older);
        queue.0.push(ModelReloadRequest::new(inputs()));
    }
    update_until(&mut app, |app| {
        app.world().resource::<ModelManager>().generation() == 1
    });
    assert_eq!(app.world().resource::<ModelManager>().generation(), 1);
    assert_eq!(app.world().resource::<ModelReloadInFlight>().last_applied(), Some(1));
    let newer = app.world().resource::<ModelManager>().snapshot();

    release.send(()).unwrap();
    update_until(&mut app, |app| {
        app.world().resource::<ModelReloadInFlight>().pending == 0
    });
    assert_eq!(app.world().resource::<ModelReloadInFlight>().pending, 0);
    assert_eq!(app.world().resource::<ModelManager>().generation(), 1);
    assert!(Arc::ptr_eq(
        &newer,
        &app.world().resource::<ModelManager>().snapshot()
    ));
}

