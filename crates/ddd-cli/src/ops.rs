//! Built-in operations of pipeline files.

use std::path::PathBuf;

use anyhow::{Context, Result};
use ddd::export::geojson::load_geojson;
use ddd::lock::OutputLock;
use ddd::{builder, DddError, Edit, MetaValue, Node, Task};
use ddd_geom2::extrude::ExtrudeOptions;
use ddd_geom2::ops::{BufferOptions, CapStyle, CleanOptions, JoinStyle};
use ddd_math::Transform;
use tracing::{info, warn};

use crate::script::{Cap, Join, Op, Script, TaskDef};

fn buffer_options(cap: Cap, join: Join) -> BufferOptions {
    BufferOptions {
        cap: match cap {
            Cap::Round => CapStyle::Round,
            Cap::Flat => CapStyle::Flat,
            Cap::Square => CapStyle::Square,
        },
        join: match join {
            Join::Round => JoinStyle::Round,
            Join::Mitre => JoinStyle::Mitre,
            Join::Bevel => JoinStyle::Bevel,
        },
        ..BufferOptions::default()
    }
}

fn height_of(node: &Node, fixed: Option<f64>) -> ddd::Result<f64> {
    if let Some(h) = fixed {
        return Ok(h);
    }
    node.require("ddd:height")?.as_f64().ok_or_else(|| {
        DddError::MissingMetadata {
            key: "ddd:height".into(),
            node: None,
        }
        .at(node)
    })
}

fn catalog_instance(node: &Node, key: &str, ctx: &mut ddd::TaskContext) -> ddd::Result<Node> {
    let inst = match ctx.catalog.instance(key, Some(&node.name())) {
        Some(inst) => inst,
        None => {
            let proto = node.copy();
            proto.set_transform(Transform::identity());
            let inst = ctx.catalog.add(key, &proto)?;
            inst.set_name(node.name());
            inst
        }
    };
    inst.set_transform(node.transform());
    Ok(inst)
}

fn save(root: &Node, path: &PathBuf, overwrite: bool, ctx: &ddd::TaskContext) -> ddd::Result<()> {
    if path.exists() && !overwrite {
        warn!(path = %path.display(), "output exists, not overwritten (use -o)");
        return Ok(());
    }
    let _lock = OutputLock::acquire(path)?;
    root.save(path, &ctx.settings.export)?;
    info!(path = %path.display(), "saved");
    Ok(())
}

/// Pipeline task for a `[[task]]` table.
pub fn task(def: TaskDef, script: &Script, overwrite: bool) -> Result<Task> {
    let task = match def.op {
        Op::LoadGeojson { file } => {
            let file = script.resolve(&file);
            Task::run(&def.name, move |ctx| {
                ctx.root.append(&load_geojson(&file)?)?;
                Ok(())
            })
        }
        Op::Load { file } => {
            let file = script.resolve(&file);
            Task::run(&def.name, move |ctx| {
                ctx.root.append(&Node::load(&file)?)?;
                Ok(())
            })
        }
        Op::Rect { node, bounds } => Task::run(&def.name, move |ctx| {
            ctx.root.append(&builder::rect(&node, bounds))?;
            Ok(())
        }),
        Op::Disc {
            node,
            center,
            radius,
            resolution,
        } => Task::run(&def.name, move |ctx| {
            ctx.root.append(&builder::disc(&node, center, radius, resolution))?;
            Ok(())
        }),
        Op::Set { key, value } => {
            let json = serde_json::to_value(&value)
                .with_context(|| format!("task '{}': invalid value", def.name))?;
            let value = MetaValue::from_json(&json);
            Task::each(&def.name, move |n, _| {
                n.set(key.clone(), value.clone());
                Ok(Edit::Keep)
            })
        }
        Op::Remove => Task::each(&def.name, |_, _| Ok(Edit::Remove)),
        Op::Buffer {
            distance,
            cap,
            join,
        } => {
            let options = buffer_options(cap, join);
            Task::each(&def.name, move |n, _| Ok(Edit::Replace(n.buffer(distance, &options))))
        }
        Op::Clean { eps } => {
            let options = CleanOptions {
                eps,
                ..CleanOptions::default()
            };
            Task::each(&def.name, move |n, _| Ok(Edit::Replace(n.clean(&options))))
        }
        Op::Union => Task::each(&def.name, |n, _| Ok(Edit::Replace(n.union()))),
        Op::Extrude { height, center } => {
            let options = ExtrudeOptions {
                center,
                ..ExtrudeOptions::default()
            };
            Task::each(&def.name, move |n, _| {
                let h = height_of(n, height)?;
                Ok(Edit::Replace(n.extrude(h, &options)?))
            })
        }
        Op::Triangulate => Task::each(&def.name, |n, _| Ok(Edit::Replace(n.triangulate(false)?))),
        Op::Combine => Task::each(&def.name, |n, _| Ok(Edit::Replace(n.combine()))),
        Op::Catalog { key } => Task::each(&def.name, move |n, ctx| {
            Ok(Edit::Replace(catalog_instance(n, &key, ctx)?))
        }),
        Op::Condition { key } => Task::condition(&def.name, move |ctx| {
            Ok(ctx.data.get(&key).and_then(MetaValue::as_bool).unwrap_or(false))
        }),
        Op::Cache { file } => {
            Task::cache(&def.name, move |ctx| Ok(Some(ctx.settings.cache_dir().join(&file))))
        }
        Op::Save { file } => Task::run(&def.name, move |ctx| {
            let root = ctx.root.clone();
            save(&root, &file, overwrite, ctx)
        }),
    };

    let mut task = task.recurse(def.recurse);
    if let Some(order) = &def.order {
        task = task.order(order);
    }
    if let Some(path) = &def.path {
        task = task.path(path);
    }
    if let Some(selector) = &def.select {
        task = task
            .select(selector)
            .with_context(|| format!("task '{}': invalid selector", def.name))?;
    }
    if def.init {
        task = task.init();
    }
    if def.cache_override {
        task = task.cache_override();
    }
    Ok(task)
}
