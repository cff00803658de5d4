//! Bounding-box and grid helpers
//!
//! All operations work in a Y-up coordinate system; tiles and voxel grids
//! are laid out on the XZ plane.

use crate::Vec3;

/// Check if two 3D axis-aligned bounding boxes overlap.
///
/// The test is inclusive: boxes that only share a face are considered
/// overlapping.
#[inline]
pub fn overlap_bounds(amin: &[f32; 3], amax: &[f32; 3], bmin: &[f32; 3], bmax: &[f32; 3]) -> bool {
    amin[0] <= bmax[0]
        && amax[0] >= bmin[0]
        && amin[1] <= bmax[1]
        && amax[1] >= bmin[1]
        && amin[2] <= bmax[2]
        && amax[2] >= bmin[2]
}

/// Calculates the voxel grid size covering the given bounds.
///
/// Each axis is rounded to the nearest whole cell, so a 10.0 wide area with a
/// 0.3 cell size yields 33 cells.
pub fn calc_grid_size(bmin: &Vec3, bmax: &Vec3, cs: f32) -> (i32, i32) {
    let width = ((bmax.x - bmin.x) / cs + 0.5) as i32;
    let height = ((bmax.z - bmin.z) / cs + 0.5) as i32;
    (width, height)
}

/// Returns true when every component of the vector is finite.
#[inline]
pub fn is_finite3(v: &[f32; 3]) -> bool {
    v.iter().all(|c| c.is_finite())
}
