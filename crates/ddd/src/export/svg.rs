//! SVG outlines of 2D geometry.
//!
//! Polygons become `<path>` elements (even-odd fill, holes as subpaths),
//! lines `<polyline>` and points small `<circle>`s. The Y axis points up:
//! content is drawn inside a group flipped with `scale(1,-1)`. Exported
//! metadata is written as `data-*` attributes.

use std::fmt::Write;

use geo::{AffineOps, Coord, LineString};

use super::{flatten, ExportOptions, Namer};
use crate::meta::{is_exported_key, MetaValue};
use crate::node::Node;
use crate::ops3::planar_affine;

const POINT_RADIUS: f64 = 0.5;

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// `osm:building` -> `data-osm-building`.
fn data_attribute(key: &str) -> String {
    let key: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!("data-{key}")
}

fn ring_path(out: &mut String, ring: &LineString<f64>) {
    for (i, c) in ring.0.iter().enumerate() {
        let cmd = if i == 0 { 'M' } else { 'L' };
        let _ = write!(out, "{cmd}{} {} ", c.x, c.y);
    }
    out.push('Z');
}

fn points_attr(coords: &[Coord<f64>]) -> String {
    coords
        .iter()
        .map(|c| format!("{},{}", c.x, c.y))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Renders the 2D content of the tree as an SVG document.
pub fn to_svg(root: &Node, options: &ExportOptions) -> String {
    let mut namer = Namer::new(options.naming, false);
    let mut body = String::new();
    let mut bounds: Option<(Coord<f64>, Coord<f64>)> = None;

    for placed in flatten(root) {
        let Some(g) = placed.node.geometry() else {
            continue;
        };
        let g = if placed.world.is_identity() {
            g
        } else {
            g.affine_transform(&planar_affine(&placed.world))
        };
        if let Some(r) = ddd_geom2::bounds(&g) {
            bounds = Some(match bounds {
                None => (r.min(), r.max()),
                Some((lo, hi)) => (
                    Coord { x: lo.x.min(r.min().x), y: lo.y.min(r.min().y) },
                    Coord { x: hi.x.max(r.max().x), y: hi.y.max(r.max().y) },
                ),
            });
        }

        let mut attrs = format!(
            " id=\"{}\"",
            escape(&namer.name(&placed.node.name(), &placed.path))
        );
        for (k, v) in placed.node.metadata().iter() {
            if is_exported_key(k) && !matches!(v, MetaValue::Null) {
                let _ = write!(attrs, " {}=\"{}\"", data_attribute(k), escape(&v.to_text()));
            }
        }

        let _ = writeln!(body, "  <g{attrs}>");
        for p in ddd_geom2::polygons(&g) {
            let mut d = String::new();
            ring_path(&mut d, p.exterior());
            for hole in p.interiors() {
                d.push(' ');
                ring_path(&mut d, hole);
            }
            let _ = writeln!(body, "    <path d=\"{d}\" fill-rule=\"evenodd\"/>");
        }
        for l in ddd_geom2::line_strings(&g) {
            let _ = writeln!(
                body,
                "    <polyline points=\"{}\" fill=\"none\"/>",
                points_attr(&l.0)
            );
        }
        for p in ddd_geom2::points(&g) {
            let _ = writeln!(
                body,
                "    <circle cx=\"{}\" cy=\"{}\" r=\"{POINT_RADIUS}\"/>",
                p.x(),
                p.y()
            );
        }
        body.push_str("  </g>\n");
    }

    let (lo, hi) = bounds.unwrap_or((Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }));
    let (w, h) = ((hi.x - lo.x).max(1e-9), (hi.y - lo.y).max(1e-9));
    let mut out = String::new();
    let _ = writeln!(
        out,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"{} {} {w} {h}\">",
        lo.x, -hi.y
    );
    out.push_str(" <g transform=\"scale(1,-1)\" stroke=\"black\" fill=\"#ccc\" stroke-width=\"0.1\">\n");
    out.push_str(&body);
    out.push_str(" </g>\n</svg>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder;

    #[test]
    fn test_polygons_and_metadata_attributes() {
        let root = builder::group2("plan");
        let r = builder::rect("house", [0.0, 0.0, 4.0, 2.0]);
        r.set("osm:building", "<yes>").set("_hidden", 1.0);
        root.append(&r).unwrap();
        root.append(&builder::line("road", &[[0.0, -1.0], [4.0, -1.0]])).unwrap();
        root.append(&builder::point("tree", [1.0, 1.0])).unwrap();

        let svg = to_svg(&root, &ExportOptions::default());
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("viewBox=\"0 -2 4 3\""), "{svg}");
        assert!(svg.contains("id=\"house\" data-osm-building=\"&lt;yes&gt;\""));
        assert!(!svg.contains("hidden"));
        let path = svg.lines().find(|l| l.contains("<path")).unwrap();
        assert_eq!(path.matches('L').count(), 4);
        assert!(path.contains("Z\" fill-rule=\"evenodd\""));
        assert!(svg.contains("<polyline points=\"0,-1 4,-1\""));
        assert!(svg.contains("<circle cx=\"1\" cy=\"1\""));
    }
}
