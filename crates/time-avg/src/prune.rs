//! Tile pruning and masking.

use tracing::debug;

use tam_common::{BoundingBox, Tile};

/// Drop every tile that has no valid sample, keeping the order of the rest.
pub fn prune(tiles: Vec<Tile>) -> Vec<Tile> {
    let before = tiles.len();
    let kept: Vec<Tile> = tiles.into_iter().filter(Tile::has_valid_samples).collect();
    if kept.len() < before {
        debug!(dropped = before - kept.len(), kept = kept.len(), "Pruned empty tiles");
    }
    kept
}

/// Mask every sample of every tile that lies outside `bbox`.
pub fn mask_to_bounds(tiles: &mut [Tile], bbox: &BoundingBox) {
    for tile in tiles.iter_mut() {
        tile.mask_to_bbox(bbox);
    }
}
