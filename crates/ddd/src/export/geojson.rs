//! GeoJSON features.

use std::path::Path;

use geo::AffineOps;
use geojson::{feature::Id, Feature, FeatureCollection, GeoJson};
use serde_json::Map;

use super::{flatten, ExportOptions, Namer};
use crate::meta::{MetaValue, MetadataExt};
use crate::node::Node;
use crate::ops3::planar_affine;
use crate::{DddError, Result};

/// Feature collection of every 2D geometry in the tree, in world
/// coordinates. Exported metadata becomes the feature properties.
pub fn to_geojson(root: &Node, options: &ExportOptions) -> Result<String> {
    let mut namer = Namer::new(options.naming, false);
    let mut features = Vec::new();
    for placed in flatten(root) {
        let Some(g) = placed.node.geometry() else {
            continue;
        };
        let g = if placed.world.is_identity() {
            g
        } else {
            g.affine_transform(&planar_affine(&placed.world))
        };
        let properties: Map<String, serde_json::Value> = placed.node.metadata().exported();
        features.push(Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&g))),
            id: Some(Id::String(namer.name(&placed.node.name(), &placed.path))),
            properties: Some(properties),
            foreign_members: None,
        });
    }
    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    Ok(serde_json::to_string_pretty(&collection)?)
}

/// Property keys without a namespace are read as `osm:` tags.
fn property_key(key: &str) -> String {
    if key.contains(':') {
        key.to_string()
    } else {
        format!("osm:{key}")
    }
}

fn feature_node(feature: Feature, index: usize) -> Result<Option<Node>> {
    let Some(geometry) = feature.geometry else {
        return Ok(None);
    };
    let g: geo::Geometry<f64> = geometry
        .try_into()
        .map_err(|e: geojson::Error| DddError::Serialization(e.to_string()))?;
    let name = match &feature.id {
        Some(Id::String(s)) => s.clone(),
        Some(Id::Number(n)) => n.to_string(),
        None => format!("feature_{index}"),
    };
    let node = Node::new2(name, Some(g));
    if let Some(props) = feature.properties {
        let mut meta = node.metadata_mut();
        for (k, v) in props {
            meta.insert(property_key(&k), MetaValue::from_json(&v));
        }
    }
    Ok(Some(node))
}

/// Reads a GeoJSON file into a 2D group with one node per feature.
pub fn load_geojson(path: impl AsRef<Path>) -> Result<Node> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let gj: GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| DddError::Serialization(e.to_string()))?;
    let features = match gj {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(g) => vec![Feature::from(g)],
    };
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let group = Node::new2(name, None);
    for (i, f) in features.into_iter().enumerate() {
        if let Some(n) = feature_node(f, i)? {
            group.append(&n)?;
        }
    }
    Ok(group)
}
