//! ddd CLI - procedural scene pipelines
//!
//! Runs declarative pipeline files and manages the prototype catalog.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ddd::{Pipeline, PipelineBuilder};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod ops;
mod script;

use script::Script;

#[derive(Parser)]
#[command(name = "ddd", version)]
#[command(about = "Procedural 2D/3D scene generation pipelines", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,

    /// Pipeline file to run (same as `ddd run <script>`)
    script: Option<PathBuf>,
}

/// Only headless runs are supported.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Renderer {
    None,
}

#[derive(Args, Debug)]
pub(crate) struct GlobalArgs {
    /// Debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Overwrite existing outputs
    #[arg(short, long, global = true)]
    overwrite: bool,

    /// Write per-task timings as JSON to this file
    #[arg(short = 'r', long, global = true, value_name = "FILE")]
    profile: Option<PathBuf>,

    /// Renderer
    #[arg(long, global = true, value_enum, default_value = "none")]
    renderer: Renderer,

    /// Settings file (TOML); may repeat, later files win
    #[arg(short, long, global = true, value_name = "FILE")]
    pub(crate) config: Vec<PathBuf>,

    /// Pipeline data property; may repeat
    #[arg(short, long, global = true, value_name = "KEY=VALUE")]
    pub(crate) property: Vec<String>,

    /// Export naming mode
    #[arg(long, global = true, value_parser = ["name", "path", "name_numbered", "name_unique"])]
    pub(crate) naming: Option<String>,

    /// Rebuild catalog entries instead of loading them
    #[arg(long, global = true, conflicts_with = "catalog_ignore")]
    pub(crate) catalog_overwrite: bool,

    /// Neither load nor store catalog entries
    #[arg(long, global = true)]
    pub(crate) catalog_ignore: bool,

    /// Read caches but never write them
    #[arg(long, global = true)]
    pub(crate) cache_ro: bool,

    /// Delete caches ordered at or after ORDER (all when omitted)
    #[arg(long, global = true, value_name = "ORDER", num_args = 0..=1, default_missing_value = "0")]
    cache_clear: Option<String>,

    /// Export instances as standalone meshes
    #[arg(long, global = true)]
    pub(crate) export_meshes: bool,

    /// Do not export vertex normals
    #[arg(long, global = true)]
    pub(crate) no_normals: bool,

    /// Do not embed textures
    #[arg(long, global = true)]
    pub(crate) no_textures: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline file
    Run {
        /// Pipeline file (TOML)
        script: PathBuf,
    },
    /// List the resolved tasks of a pipeline file
    Describe {
        /// Pipeline file (TOML)
        script: PathBuf,
    },
    /// List catalogued prototypes
    CatalogShow,
    /// Export every catalogued prototype on a grid
    CatalogExport {
        /// Output path; `.json` and `.glb` are written
        #[arg(default_value = "catalog")]
        output: PathBuf,
    },
    /// Delete every catalogued prototype
    CatalogClear,
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.debug);
    let args = &cli.global;
    tracing::debug!(renderer = ?args.renderer, "headless run");

    match cli.command {
        Some(Commands::Run { script }) => run(args, &script)?,
        Some(Commands::Describe { script }) => describe(args, &script)?,
        Some(Commands::CatalogShow) => catalog_show(args)?,
        Some(Commands::CatalogExport { output }) => catalog_export(args, &output)?,
        Some(Commands::CatalogClear) => catalog_clear(args)?,
        None => match &cli.script {
            Some(script) => run(args, script)?,
            None => bail!("no pipeline file given (see `ddd --help`)"),
        },
    }

    Ok(())
}

fn pipeline(args: &GlobalArgs, path: &Path) -> Result<Pipeline> {
    let settings = config::settings(args)?;
    let catalog = config::catalog(args, &settings);
    let mut script = Script::load(path)?;
    let root = ddd::builder::group2(&script.root);
    let mut builder = PipelineBuilder::new()
        .settings(settings)
        .catalog(catalog)
        .root(root);
    for def in std::mem::take(&mut script.tasks) {
        builder = builder.task(ops::task(def, &script, args.overwrite)?);
    }
    Ok(builder.build()?)
}

fn run(args: &GlobalArgs, path: &Path) -> Result<()> {
    let mut pipeline = pipeline(args, path)?;
    if let Some(order) = &args.cache_clear {
        let removed = pipeline.clear_cache_from(order)?;
        info!(removed, from = %order, "cleared caches");
    }
    let result = pipeline.run();
    if let Some(profile) = &args.profile {
        let json = serde_json::to_string_pretty(pipeline.timings())?;
        std::fs::write(profile, json)
            .with_context(|| format!("failed to write profile {}", profile.display()))?;
    }
    result.with_context(|| format!("pipeline {} failed", path.display()))?;
    info!(nodes = pipeline.root.count(), "pipeline complete");
    Ok(())
}

fn describe(args: &GlobalArgs, path: &Path) -> Result<()> {
    let pipeline = pipeline(args, path)?;
    print!("{}", pipeline.describe());
    Ok(())
}

fn catalog_show(args: &GlobalArgs) -> Result<()> {
    let settings = config::settings(args)?;
    let mut catalog = ddd::Catalog::from_settings(&settings);
    let n = catalog.load_all()?;
    for key in catalog.keys() {
        println!("{key}");
        if let Some(proto) = catalog.get(&key) {
            for line in proto.dump().lines() {
                println!("  {line}");
            }
        }
    }
    println!("{n} prototypes in {}", catalog.dir().display());
    Ok(())
}

fn catalog_export(args: &GlobalArgs, output: &Path) -> Result<()> {
    let settings = config::settings(args)?;
    let mut catalog = ddd::Catalog::from_settings(&settings);
    catalog.load_all()?;
    for path in catalog.export(output)? {
        println!("{}", path.display());
    }
    Ok(())
}

fn catalog_clear(args: &GlobalArgs) -> Result<()> {
    let settings = config::settings(args)?;
    let removed = ddd::Catalog::from_settings(&settings).clear()?;
    println!("removed {removed} prototypes");
    Ok(())
}
