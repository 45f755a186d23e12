//! H3 covering computation for partition pruning
//!
//! Feature tables are partitioned by the H3 cell of each geometry's
//! centroid at a fixed resolution. Restricting a query to the cells that
//! cover the request bbox lets the engine skip every other partition.
//!
//! The covering must never omit a cell that intersects the box (a missed
//! cell would silently drop true matches), so the tiler runs in `Covers`
//! containment mode: cells may spill past the polygon boundary, never
//! fall short of it. Covering failures are reported to the caller, which
//! degrades to a full scan rather than failing the request.

use std::collections::BTreeSet;

use h3o::geom::{ContainmentMode, TilerBuilder};
use h3o::{LatLng, Resolution};

use crate::bbox::BoundingBox;
use crate::{HexgateError, Result};

/// Compute the set of H3 cells covering a bounding box at `resolution`.
///
/// The returned identifiers are lowercase hex strings, matching the
/// format of the `h3_cell` partition column written at ingest time.
pub fn bbox_cells(bbox: &BoundingBox, resolution: u8) -> Result<BTreeSet<String>> {
    if bbox.is_degenerate() {
        return Err(HexgateError::Internal(format!(
            "degenerate bbox has no area to cover: {}",
            bbox
        )));
    }
    let resolution = parse_resolution(resolution)?;

    let mut tiler = TilerBuilder::new(resolution)
        .containment_mode(ContainmentMode::Covers)
        .build();
    tiler
        .add(bbox.to_polygon())
        .map_err(|e| HexgateError::Internal(format!("H3 covering failed: {}", e)))?;

    Ok(tiler.into_coverage().map(|cell| cell.to_string()).collect())
}

/// The H3 cell containing a single WGS84 point at `resolution`.
pub fn point_cell(x: f64, y: f64, resolution: u8) -> Result<String> {
    let resolution = parse_resolution(resolution)?;
    let coord = LatLng::new(y, x)
        .map_err(|e| HexgateError::Internal(format!("invalid coordinate: {}", e)))?;
    Ok(coord.to_cell(resolution).to_string())
}

fn parse_resolution(resolution: u8) -> Result<Resolution> {
    Resolution::try_from(resolution)
        .map_err(|e| HexgateError::Internal(format!("invalid H3 resolution {}: {}", resolution, e)))
}
