//! Obstacle carving on decompressed layers
//!
//! Carving rewrites the area of every cell whose centre lies inside the
//! obstacle footprint and whose stored height falls within the obstacle's
//! vertical band. Coordinates are relative to the layer's `bmin`.

use tilecache_common::sqr;

use crate::layer::TileCacheLayer;
use crate::obstacle::ObstacleGeometry;

/// Cell rectangle and height band covered by a shape, clamped to the layer
struct CellRange {
    minx: i32,
    maxx: i32,
    minz: i32,
    maxz: i32,
    miny: i32,
    maxy: i32,
}

impl CellRange {
    /// Returns `None` when the range misses the layer entirely
    fn clamped(
        layer: &TileCacheLayer,
        (minx, maxx): (f32, f32),
        (minz, maxz): (f32, f32),
        (miny, maxy): (f32, f32),
    ) -> Option<Self> {
        let w = layer.width() as i32;
        let h = layer.height() as i32;

        let minx = minx.floor() as i32;
        let maxx = maxx.floor() as i32;
        let minz = minz.floor() as i32;
        let maxz = maxz.floor() as i32;

        if maxx < 0 || minx >= w || maxz < 0 || minz >= h {
            return None;
        }

        Some(Self {
            minx: minx.max(0),
            maxx: maxx.min(w - 1),
            minz: minz.max(0),
            maxz: maxz.min(h - 1),
            miny: miny.floor() as i32,
            maxy: maxy.floor() as i32,
        })
    }

    /// Visits cells in range whose height lies in the band
    fn for_each_cell(&self, layer: &mut TileCacheLayer, mut f: impl FnMut(i32, i32, &mut u8)) {
        let w = layer.width();
        let (heights, areas) = layer.heights_and_areas_mut();
        for z in self.minz..=self.maxz {
            for x in self.minx..=self.maxx {
                let idx = x as usize + z as usize * w;
                let y = heights[idx] as i32;
                if y < self.miny || y > self.maxy {
                    continue;
                }
                f(x, z, &mut areas[idx]);
            }
        }
    }
}

/// Marks cells inside a vertical cylinder standing on `pos`
#[allow(clippy::too_many_arguments)]
pub fn mark_cylinder_area(
    layer: &mut TileCacheLayer,
    orig: &[f32; 3],
    cs: f32,
    ch: f32,
    pos: &[f32; 3],
    radius: f32,
    height: f32,
    area_id: u8,
) {
    let ics = 1.0 / cs;
    let ich = 1.0 / ch;

    let px = (pos[0] - orig[0]) * ics;
    let pz = (pos[2] - orig[2]) * ics;
    let r = radius * ics;

    let Some(range) = CellRange::clamped(
        layer,
        (px - r, px + r),
        (pz - r, pz + r),
        ((pos[1] - orig[1]) * ich, (pos[1] + height - orig[1]) * ich),
    ) else {
        return;
    };

    // Half a cell of slack so thin obstacles still cover the cells they cross
    let r2 = sqr(r + 0.5);
    range.for_each_cell(layer, |x, z, area| {
        let dx = x as f32 + 0.5 - px;
        let dz = z as f32 + 0.5 - pz;
        if dx * dx + dz * dz <= r2 {
            *area = area_id;
        }
    });
}

/// Marks cells inside an axis-aligned box
pub fn mark_box_area(
    layer: &mut TileCacheLayer,
    orig: &[f32; 3],
    cs: f32,
    ch: f32,
    bmin: &[f32; 3],
    bmax: &[f32; 3],
    area_id: u8,
) {
    let ics = 1.0 / cs;
    let ich = 1.0 / ch;

    let Some(range) = CellRange::clamped(
        layer,
        ((bmin[0] - orig[0]) * ics, (bmax[0] - orig[0]) * ics),
        ((bmin[2] - orig[2]) * ics, (bmax[2] - orig[2]) * ics),
        ((bmin[1] - orig[1]) * ich, (bmax[1] - orig[1]) * ich),
    ) else {
        return;
    };

    range.for_each_cell(layer, |_, _, area| *area = area_id);
}

/// Marks cells inside a box rotated around the Y axis.
///
/// `rot_aux` holds `[sin(yaw), cos(yaw)]`.
#[allow(clippy::too_many_arguments)]
pub fn mark_oriented_box_area(
    layer: &mut TileCacheLayer,
    orig: &[f32; 3],
    cs: f32,
    ch: f32,
    center: &[f32; 3],
    half_extents: &[f32; 3],
    rot_aux: &[f32; 2],
    area_id: u8,
) {
    let ics = 1.0 / cs;
    let ich = 1.0 / ch;

    let cx = (center[0] - orig[0]) * ics;
    let cz = (center[2] - orig[2]) * ics;

    // Circumscribed square of the footprint
    let maxr = std::f32::consts::SQRT_2 * half_extents[0].max(half_extents[2]) * ics;

    let Some(range) = CellRange::clamped(
        layer,
        (cx - maxr, cx + maxr),
        (cz - maxr, cz + maxr),
        (
            (center[1] - half_extents[1] - orig[1]) * ich,
            (center[1] + half_extents[1] - orig[1]) * ich,
        ),
    ) else {
        return;
    };

    let [sin, cos] = *rot_aux;
    let xhalf = half_extents[0] * ics + 0.5;
    let zhalf = half_extents[2] * ics + 0.5;

    range.for_each_cell(layer, |x, z, area| {
        let dx = x as f32 + 0.5 - cx;
        let dz = z as f32 + 0.5 - cz;
        let local_x = cos * dx - sin * dz;
        if local_x.abs() > xhalf {
            return;
        }
        let local_z = sin * dx + cos * dz;
        if local_z.abs() > zhalf {
            return;
        }
        *area = area_id;
    });
}

/// Carves any obstacle shape into a layer, relative to the layer's own bounds
pub fn carve_obstacle(
    layer: &mut TileCacheLayer,
    geometry: &ObstacleGeometry,
    cs: f32,
    ch: f32,
    area_id: u8,
) {
    let orig = layer.header.bmin;
    match geometry {
        ObstacleGeometry::Cylinder {
            pos,
            radius,
            height,
        } => mark_cylinder_area(layer, &orig, cs, ch, pos, *radius, *height, area_id),
        ObstacleGeometry::Box { bmin, bmax } => {
            mark_box_area(layer, &orig, cs, ch, bmin, bmax, area_id)
        }
        ObstacleGeometry::OrientedBox {
            center,
            half_extents,
            rot_aux,
        } => mark_oriented_box_area(
            layer,
            &orig,
            cs,
            ch,
            center,
            half_extents,
            rot_aux,
            area_id,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{TileCacheLayerHeader, TILECACHE_NULL_AREA, TILECACHE_WALKABLE_AREA};

    const CS: f32 = 1.0;
    const CH: f32 = 0.5;

    /// 10x10 flat layer at height 2 (y = 1.0)
    fn flat_layer() -> TileCacheLayer {
        let header = TileCacheLayerHeader {
            bmin: [0.0, 0.0, 0.0],
            bmax: [10.0, 5.0, 10.0],
            width: 10,
            height: 10,
            maxx: 9,
            maxy: 9,
            ..TileCacheLayerHeader::new()
        };
        let mut grids = vec![2u8; 100];
        grids.extend(std::iter::repeat(TILECACHE_WALKABLE_AREA).take(100));
        grids.extend(std::iter::repeat(0).take(100));
        TileCacheLayer::from_grids(header, grids).unwrap()
    }

    fn carved_cells(layer: &TileCacheLayer) -> Vec<(usize, usize)> {
        layer
            .areas()
            .iter()
            .enumerate()
            .filter(|&(_, &a)| a == TILECACHE_NULL_AREA)
            .map(|(i, _)| (i % 10, i / 10))
            .collect()
    }

    #[test]
    fn test_cylinder_carves_disc() {
        let mut layer = flat_layer();
        let geom = ObstacleGeometry::cylinder([5.0, 0.0, 5.0], 1.0, 2.0);
        carve_obstacle(&mut layer, &geom, CS, CH, TILECACHE_NULL_AREA);

        let cells = carved_cells(&layer);
        assert!(cells.contains(&(4, 4)));
        assert!(cells.contains(&(5, 5)));
        assert!(cells.contains(&(4, 5)));
        assert!(!cells.contains(&(0, 0)));
        assert!(!cells.contains(&(8, 5)));
        // Radius 1.5 cells around (5, 5) covers a 4x4 block at most
        assert!(cells.len() <= 16);
    }

    #[test]
    fn test_cylinder_respects_height_band() {
        let mut layer = flat_layer();
        // Floor sits at y = 1.0, the cylinder starts above it
        let geom = ObstacleGeometry::cylinder([5.0, 2.0, 5.0], 1.0, 2.0);
        carve_obstacle(&mut layer, &geom, CS, CH, TILECACHE_NULL_AREA);
        assert!(carved_cells(&layer).is_empty());
    }

    #[test]
    fn test_box_carves_rectangle() {
        let mut layer = flat_layer();
        let geom = ObstacleGeometry::aabb([2.0, 0.0, 3.0], [3.5, 2.0, 3.5]);
        carve_obstacle(&mut layer, &geom, CS, CH, TILECACHE_NULL_AREA);
        assert_eq!(carved_cells(&layer), vec![(2, 3), (3, 3)]);
    }

    #[test]
    fn test_box_outside_layer_is_ignored() {
        let mut layer = flat_layer();
        let geom = ObstacleGeometry::aabb([20.0, 0.0, 20.0], [25.0, 2.0, 25.0]);
        carve_obstacle(&mut layer, &geom, CS, CH, TILECACHE_NULL_AREA);
        assert!(carved_cells(&layer).is_empty());

        // Partially outside is clamped
        let geom = ObstacleGeometry::aabb([-5.0, 0.0, -5.0], [0.5, 2.0, 0.5]);
        carve_obstacle(&mut layer, &geom, CS, CH, TILECACHE_NULL_AREA);
        assert_eq!(carved_cells(&layer), vec![(0, 0)]);
    }

    #[test]
    fn test_oriented_box_follows_rotation() {
        // A 6x1 plank along X
        let mut layer = flat_layer();
        let geom = ObstacleGeometry::oriented_box([5.0, 1.0, 5.0], [3.0, 1.0, 0.5], 0.0);
        carve_obstacle(&mut layer, &geom, CS, CH, TILECACHE_NULL_AREA);
        let cells = carved_cells(&layer);
        assert!(cells.contains(&(2, 5)));
        assert!(cells.contains(&(7, 5)));
        assert!(!cells.contains(&(5, 2)));

        // The same plank turned a quarter lies along Z
        let mut layer = flat_layer();
        let geom = ObstacleGeometry::oriented_box(
            [5.0, 1.0, 5.0],
            [3.0, 1.0, 0.5],
            std::f32::consts::FRAC_PI_2,
        );
        carve_obstacle(&mut layer, &geom, CS, CH, TILECACHE_NULL_AREA);
        let cells = carved_cells(&layer);
        assert!(cells.contains(&(5, 2)));
        assert!(cells.contains(&(5, 7)));
        assert!(!cells.contains(&(2, 5)));
    }
}
