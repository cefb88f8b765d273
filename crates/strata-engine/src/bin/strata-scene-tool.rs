//! Inspect and convert scene files.
//!
//! ```text
//! strata-scene-tool info room.xml
//! strata-scene-tool convert room.xml room.bin
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use strata_engine::prelude::*;

#[derive(Parser)]
#[command(name = "strata-scene-tool", about = "Inspect and convert scene files")]
struct Args {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print an entity and component summary of a scene file
    Info {
        file: PathBuf,
    },
    /// Convert between XML and binary; formats follow the file extensions
    Convert {
        input: PathBuf,
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log)?;

    match args.command {
        Command::Info { file } => info(&file),
        Command::Convert { input, output } => convert(&input, &output),
    }
}

fn load(path: &Path) -> anyhow::Result<Scene> {
    let format = SceneFormat::from_path(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("scene")
        .to_owned();
    let mut scene = Scene::new(&name, SceneContext::default(), false, true);
    format
        .load(&mut scene, path)
        .with_context(|| format!("loading {} as {format}", path.display()))?;
    Ok(scene)
}

fn info(path: &Path) -> anyhow::Result<()> {
    let scene = load(path)?;
    println!("{}: {} entities", path.display(), scene.len());
    for entity in scene.entities() {
        let parent = entity
            .parent_id()
            .map(|p| format!(" parent={p}"))
            .unwrap_or_default();
        let name = entity.name();
        let label = if name.is_empty() { String::new() } else { format!(" {name:?}") };
        println!("entity {}{label}{parent}", entity.id());
        for comp in entity.components() {
            let comp_name = if comp.name().is_empty() {
                String::new()
            } else {
                format!(" {:?}", comp.name())
            };
            println!(
                "  {} {}{comp_name} ({} attributes)",
                comp.id(),
                comp.type_name(),
                comp.num_attributes()
            );
        }
    }
    println!("state hash {}", scene.state_hash()?);
    Ok(())
}

fn convert(input: &Path, output: &Path) -> anyhow::Result<()> {
    let scene = load(input)?;
    let format = SceneFormat::from_path(output)?;
    format
        .save(&scene, output)
        .with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(input = %input.display(), output = %output.display(), %format, entities = scene.len(), "converted");
    Ok(())
}
