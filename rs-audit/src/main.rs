//! Loads a resource pack's models the way the client does and reports what went wrong.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rs_render::{
    INVISIBLE_GROUP, ModelManager, ModelSnapshot, ReloadInputs, SINGLETON_GROUP,
    StaticColorSource, load_block_state_bindings, load_item_bindings,
};
use rs_utils::{ModelSettings, namespace_root};
use tracing::{Level, info};

mod assets;

use assets::{AssetFiles, PngAtlasStitcher, infer_registry};

/// Audit block and item models of an assets directory
#[derive(Parser)]
#[command(name = "rs-audit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Assets root holding one directory per namespace
    #[arg(short, long)]
    assets: Option<PathBuf>,

    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Namespace to audit
    #[arg(short, long)]
    namespace: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// List every model no block state or item reaches
    #[arg(long)]
    unreferenced: bool,

    /// Print model group statistics
    #[arg(long)]
    groups: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .without_time()
        .compact()
        .with_max_level(log_level)
        .init();

    let mut settings = match &cli.config {
        Some(path) => ModelSettings::load(path)?,
        None => ModelSettings::default(),
    };
    if let Some(assets) = cli.assets {
        settings.assets_root = Some(assets);
    }
    if let Some(namespace) = cli.namespace {
        settings.namespace = namespace;
    }
    settings.report_unreferenced |= cli.unreferenced;

    let root = namespace_root(&settings.assets_root(), &settings.namespace);
    info!("Reading assets from {}", root.display());
    let files = AssetFiles::read(&root, &settings.namespace)?;
    info!(
        "Found {} models, {} block states, {} items, {} textures",
        files.models.len(),
        files.blockstates.len(),
        files.items.len(),
        files.textures.len()
    );

    let registry = Arc::new(infer_registry(&settings, &files.blockstates));
    let inputs = ReloadInputs {
        block_bindings: Arc::new(load_block_state_bindings(&registry, &files.blockstates)),
        item_bindings: Arc::new(load_item_bindings(&files.items)),
        registry,
        color_source: Arc::new(StaticColorSource::from_settings(&settings)),
        stitcher: Arc::new(PngAtlasStitcher::new(files.textures)),
        raw_models: files.models,
        report_unreferenced: settings.report_unreferenced,
    };

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(threads) = settings.worker_threads {
        builder.worker_threads(threads.max(1));
    }
    let runtime = builder.enable_all().build()?;

    let mut manager = ModelManager::default();
    runtime.block_on(manager.reload(inputs, async {}));

    report(&manager.snapshot(), cli.unreferenced, cli.groups);
    Ok(())
}

fn report(snapshot: &ModelSnapshot, list_unreferenced: bool, show_groups: bool) {
    let stats = snapshot.stats();
    println!("models loaded:       {}", stats.loaded_models);
    println!("models unparseable:  {}", stats.failed_models);
    println!("models referenced:   {}", stats.referenced_models);
    println!("models baked:        {}", stats.bake.unique_models);
    println!("bindings failed:     {}", stats.bake.failed_bindings);
    println!(
        "bake cache:          {} hits, {} misses",
        stats.bake.cache_hits, stats.bake.cache_misses
    );
    println!("item models:         {}", snapshot.item_model_count());
    println!("sprites:             {}", snapshot.atlases().sprite_count());
    println!("states without model: {}", stats.dispatch_misses);

    let missing = snapshot.missing_textures();
    if !missing.is_empty() {
        println!();
        println!("missing textures ({} models):", missing.len());
        for (model, textures) in missing {
            let names: Vec<&str> = textures.iter().map(String::as_str).collect();
            println!("  {}: {}", model, names.join(", "));
        }
    }

    let unreferenced = snapshot.unreferenced();
    if !unreferenced.is_empty() {
        println!();
        println!("unreferenced models: {}", unreferenced.len());
        if list_unreferenced {
            for id in unreferenced {
                println!("  {}", id);
            }
        }
    }

    if show_groups {
        let registry = snapshot.registry();
        let groups = snapshot.groups();
        let (mut invisible, mut singletons, mut grouped) = (0usize, 0usize, 0usize);
        for state in registry.states() {
            match groups.group(state) {
                INVISIBLE_GROUP => invisible += 1,
                SINGLETON_GROUP => singletons += 1,
                _ => grouped += 1,
            }
        }
        println!();
        println!("states:              {}", registry.state_count());
        println!("groups:              {}", groups.group_count());
        println!("grouped states:      {}", grouped);
        println!("invisible states:    {}", invisible);
        println!("singleton states:    {}", singletons);
    }
}
