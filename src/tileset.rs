//! Implicit-tiling `tileset.json` descriptor
//!
//! Viewers discover subtrees through the tileset: the root tile carries an
//! `implicitTiling` object with the subtree level count and a URI template
//! that resolves to the store's subtree endpoint or to exported files.

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result, SubtreeConfig};
use crate::math::{tile_bounds, TileCoord};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tileset {
    pub asset: Asset,
    pub geometric_error: f64,
    pub root: Tile,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    pub bounding_volume: BoundingVolume,
    pub geometric_error: f64,
    pub refine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implicit_tiling: Option<ImplicitTiling>,
}

/// `[west, south, east, north, min_height, max_height]`, angles in radians.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingVolume {
    pub region: [f64; 6],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub uri: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplicitTiling {
    pub subdivision_scheme: String,
    pub subtree_levels: u32,
    pub available_levels: u32,
    pub subtrees: Subtrees,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subtrees {
    pub uri: String,
}

/// Presentation settings that the rank config does not cover.
#[derive(Clone, Debug)]
pub struct TilesetOptions {
    /// URI template for subtree files, with `{level}`, `{x}` and `{y}`.
    pub subtree_uri: String,
    /// URI template for tile content, if tiles carry content.
    pub content_uri: Option<String>,
    pub geometric_error: f64,
    pub min_height: f64,
    pub max_height: f64,
    pub refine: String,
}

impl Default for TilesetOptions {
    fn default() -> Self {
        Self {
            subtree_uri: "subtrees/{level}.{x}.{y}.subtree".to_string(),
            content_uri: Some("content/content_{level}__{x}_{y}.glb".to_string()),
            geometric_error: 100.0,
            min_height: 0.0,
            max_height: 100.0,
            refine: "ADD".to_string(),
        }
    }
}

/// Substitute `{level}`, `{x}` and `{y}` in a URI template.
pub fn expand_uri(template: &str, coord: TileCoord) -> String {
    template
        .replace("{level}", &coord.level.to_string())
        .replace("{x}", &coord.x.to_string())
        .replace("{y}", &coord.y.to_string())
}

/// 3D Tiles 1.1 tileset whose root is an implicit quadtree over the served levels.
///
/// Implicit tiling addresses subtrees from level 0, so `min_level` must be 0.
pub fn implicit_tileset(config: &SubtreeConfig, options: &TilesetOptions) -> Result<Tileset> {
    config.validate()?;
    if config.min_level != 0 {
        return Err(Error::Config(format!(
            "implicit tilesets start at level 0, but min_level is {}",
            config.min_level
        )));
    }

    let world = tile_bounds(0, 0, 0);
    Ok(Tileset {
        asset: Asset { version: "1.1".to_string() },
        geometric_error: options.geometric_error,
        root: Tile {
            bounding_volume: BoundingVolume {
                region: [
                    world.lon_min,
                    world.lat_min,
                    world.lon_max,
                    world.lat_max,
                    options.min_height,
                    options.max_height,
                ],
            },
            geometric_error: options.geometric_error,
            refine: options.refine.clone(),
            content: options.content_uri.as_ref().map(|uri| Content { uri: uri.clone() }),
            implicit_tiling: Some(ImplicitTiling {
                subdivision_scheme: "QUADTREE".to_string(),
                subtree_levels: config.subtree_levels,
                available_levels: config.max_level + 1,
                subtrees: Subtrees { uri: options.subtree_uri.clone() },
            }),
        },
    })
}

impl Tileset {
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize tileset: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_implicit_tileset() {
        let config = SubtreeConfig::new(0, 7, 4).unwrap();
        let tileset = implicit_tileset(&config, &TilesetOptions::default()).unwrap();

        let value = serde_json::to_value(&tileset).unwrap();
        assert_eq!(value["asset"]["version"], "1.1");
        let implicit = &value["root"]["implicitTiling"];
        assert_eq!(implicit["subdivisionScheme"], "QUADTREE");
        assert_eq!(implicit["subtreeLevels"], 4);
        assert_eq!(implicit["availableLevels"], 8);
        assert_eq!(implicit["subtrees"]["uri"], "subtrees/{level}.{x}.{y}.subtree");

        let region = tileset.root.bounding_volume.region;
        assert_eq!(region[..4], [-PI, -FRAC_PI_2, PI, FRAC_PI_2]);
    }

    #[test]
    fn test_optional_content() {
        let config = SubtreeConfig::default();
        let options = TilesetOptions { content_uri: None, ..Default::default() };
        let json = implicit_tileset(&config, &options).unwrap().to_json_pretty().unwrap();
        assert!(!json.contains("\"content\""));
        assert!(json.contains("\"boundingVolume\""));
    }

    #[test]
    fn test_rejects_offset_min_level() {
        let config = SubtreeConfig::new(4, 7, 4).unwrap();
        let result = implicit_tileset(&config, &TilesetOptions::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_tileset_json_roundtrip() {
        let tileset = implicit_tileset(&SubtreeConfig::default(), &TilesetOptions::default()).unwrap();
        let parsed: Tileset = serde_json::from_str(&tileset.to_json_pretty().unwrap()).unwrap();
        assert_eq!(parsed, tileset);
    }

    #[test]
    fn test_expand_uri() {
        let uri = expand_uri("subtrees/{level}.{x}.{y}.subtree", TileCoord::new(4, 3, 11));
        assert_eq!(uri, "subtrees/4.3.11.subtree");
    }
}
