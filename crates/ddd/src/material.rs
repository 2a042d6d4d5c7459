//! Materials.
//!
//! Materials are immutable once built and shared between nodes through
//! `Rc<Material>`; builder methods consume and return the value.

use std::collections::BTreeMap;
use std::rc::Rc;

pub use ddd_ir::AlphaMode;
use ddd_ir::MaterialDef;

use crate::meta::MetaValue;
use crate::persist::{meta_from_ir, meta_to_ir};

/// Texture slot names.
pub const TEXTURE_SLOTS: [&str; 5] = ["albedo", "normal", "displacement", "roughness", "emissive"];

/// Named surface appearance.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Material name, also its key in exported documents.
    pub name: String,
    /// Base color, linear RGBA in `0..=1`.
    pub color: [f32; 4],
    /// PBR metallic factor.
    pub metallic: Option<f32>,
    /// PBR roughness factor.
    pub roughness: Option<f32>,
    /// Texture paths by slot (see [`TEXTURE_SLOTS`]).
    pub textures: BTreeMap<String, String>,
    /// Alpha mode.
    pub alpha_mode: AlphaMode,
    /// Cutoff for [`AlphaMode::Mask`].
    pub alpha_cutoff: Option<f32>,
    /// Render both faces.
    pub double_sided: bool,
    /// Texture atlas this material samples from.
    pub atlas: Option<String>,
    /// Free-form extras.
    pub extras: BTreeMap<String, MetaValue>,
}

impl Material {
    /// A white opaque material.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: [1.0, 1.0, 1.0, 1.0],
            metallic: None,
            roughness: None,
            textures: BTreeMap::new(),
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: None,
            double_sided: false,
            atlas: None,
            extras: BTreeMap::new(),
        }
    }

    /// Sets the base color.
    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }

    /// Sets the base color from `#rrggbb` or `#rrggbbaa`.
    ///
    /// Invalid strings leave the color unchanged.
    pub fn with_hex(mut self, hex: &str) -> Self {
        if let Some(c) = parse_hex(hex) {
            self.color = c;
        }
        self
    }

    /// Sets metallic and roughness factors.
    pub fn with_pbr(mut self, metallic: f32, roughness: f32) -> Self {
        self.metallic = Some(metallic);
        self.roughness = Some(roughness);
        self
    }

    /// Sets the texture for `slot`.
    pub fn with_texture(mut self, slot: &str, path: impl Into<String>) -> Self {
        self.textures.insert(slot.to_string(), path.into());
        self
    }

    /// Sets the alpha mode and cutoff.
    pub fn with_alpha(mut self, mode: AlphaMode, cutoff: Option<f32>) -> Self {
        self.alpha_mode = mode;
        self.alpha_cutoff = cutoff;
        self
    }

    /// Renders both faces.
    pub fn double_sided(mut self) -> Self {
        self.double_sided = true;
        self
    }

    /// Sets the atlas reference.
    pub fn with_atlas(mut self, atlas: impl Into<String>) -> Self {
        self.atlas = Some(atlas.into());
        self
    }

    /// Wraps the material for sharing between nodes.
    pub fn shared(self) -> Rc<Material> {
        Rc::new(self)
    }

    /// Albedo texture path.
    pub fn albedo(&self) -> Option<&str> {
        self.textures.get("albedo").map(String::as_str)
    }

    /// Serializable definition.
    pub fn to_def(&self) -> MaterialDef {
        MaterialDef {
            name: self.name.clone(),
            color: self.color,
            metallic: self.metallic,
            roughness: self.roughness,
            textures: self.textures.clone(),
            alpha_mode: self.alpha_mode,
            alpha_cutoff: self.alpha_cutoff,
            double_sided: self.double_sided,
            atlas: self.atlas.clone(),
            extras: self
                .extras
                .iter()
                .map(|(k, v)| (k.clone(), meta_to_ir(v, &mut |_| None)))
                .collect(),
        }
    }

    /// Material from its serializable definition.
    pub fn from_def(def: &MaterialDef) -> Self {
        Self {
            name: def.name.clone(),
            color: def.color,
            metallic: def.metallic,
            roughness: def.roughness,
            textures: def.textures.clone(),
            alpha_mode: def.alpha_mode,
            alpha_cutoff: def.alpha_cutoff,
            double_sided: def.double_sided,
            atlas: def.atlas.clone(),
            extras: def
                .extras
                .iter()
                .map(|(k, v)| (k.clone(), meta_from_ir(v, &|_| None)))
                .collect(),
        }
    }
}

fn parse_hex(hex: &str) -> Option<[f32; 4]> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok().map(|v| v as f32 / 255.0);
    let alpha = if hex.len() == 8 { channel(6)? } else { 1.0 };
    Some([channel(0)?, channel(2)?, channel(4)?, alpha])
}
