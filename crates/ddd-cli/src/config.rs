//! Settings and catalog from command-line options.

use anyhow::{Context, Result};
use ddd::{Catalog, Settings};

use crate::GlobalArgs;

/// Config files, then the environment, then `-p` properties and flags.
pub fn settings(args: &GlobalArgs) -> Result<Settings> {
    let mut settings = Settings::from_files(&args.config).context("failed to load config")?;
    settings
        .apply_env()
        .context("invalid DDD_* environment variable")?;
    for property in &args.property {
        settings.set_property(property)?;
    }
    if let Some(naming) = &args.naming {
        settings.export.naming = naming.parse()?;
    }
    if args.export_meshes {
        settings.export.export_meshes = true;
    }
    if args.no_normals {
        settings.export.normals = false;
    }
    if args.no_textures {
        settings.export.textures = false;
    }
    if args.cache_ro {
        settings.cache_ro = true;
    }
    Ok(settings)
}

/// Catalog in the work directory with the catalog flags applied.
pub fn catalog(args: &GlobalArgs, settings: &Settings) -> Catalog {
    let mut catalog = Catalog::from_settings(settings);
    catalog.overwrite = args.catalog_overwrite;
    catalog.ignore = args.catalog_ignore;
    catalog
}
