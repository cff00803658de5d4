//! Temporary obstacles and their slot storage

use glam::Vec3;
use tilecache_common::{is_finite3, Result, Status};

use crate::refs::{
    decode_obstacle_index, decode_obstacle_salt, encode_obstacle_ref, next_obstacle_salt,
    CompressedTileRef, ObstacleRef, MAX_OBSTACLE_SLOTS,
};

/// Maximum number of tiles a single obstacle can affect
pub const MAX_TOUCHED_TILES: usize = 8;

/// Obstacle type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum ObstacleType {
    /// Cylinder obstacle
    Cylinder,
    /// Axis-aligned bounding box
    Box,
    /// Oriented bounding box (rotated in Y axis)
    OrientedBox,
}

/// Obstacle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum ObstacleState {
    /// Slot is free
    Empty,
    /// Added, waiting for its tiles to be rebuilt with it carved in
    Processing,
    /// Carved into every tile it touches
    Processed,
    /// Removed, waiting for its tiles to be rebuilt without it
    Removing,
}

/// Shape of an obstacle
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum ObstacleGeometry {
    /// Vertical cylinder standing on `pos`
    Cylinder {
        pos: [f32; 3],
        radius: f32,
        height: f32,
    },
    /// Axis-aligned box
    Box { bmin: [f32; 3], bmax: [f32; 3] },
    /// Box rotated around the Y axis
    OrientedBox {
        center: [f32; 3],
        half_extents: [f32; 3],
        /// `[sin(yaw), cos(yaw)]`
        rot_aux: [f32; 2],
    },
}

impl ObstacleGeometry {
    pub fn cylinder(pos: [f32; 3], radius: f32, height: f32) -> Self {
        ObstacleGeometry::Cylinder {
            pos,
            radius,
            height,
        }
    }

    pub fn aabb(bmin: [f32; 3], bmax: [f32; 3]) -> Self {
        ObstacleGeometry::Box { bmin, bmax }
    }

    /// Box centred on `center`, rotated by `y_radians` around the Y axis
    pub fn oriented_box(center: [f32; 3], half_extents: [f32; 3], y_radians: f32) -> Self {
        let (sin, cos) = y_radians.sin_cos();
        ObstacleGeometry::OrientedBox {
            center,
            half_extents,
            rot_aux: [sin, cos],
        }
    }

    pub fn obstacle_type(&self) -> ObstacleType {
        match self {
            ObstacleGeometry::Cylinder { .. } => ObstacleType::Cylinder,
            ObstacleGeometry::Box { .. } => ObstacleType::Box,
            ObstacleGeometry::OrientedBox { .. } => ObstacleType::OrientedBox,
        }
    }

    /// Rejects non-finite or negative dimensions
    pub fn validate(&self) -> Result<()> {
        let ok = match self {
            ObstacleGeometry::Cylinder {
                pos,
                radius,
                height,
            } => is_finite3(pos) && radius.is_finite() && *radius >= 0.0 && height.is_finite() && *height >= 0.0,
            ObstacleGeometry::Box { bmin, bmax } => {
                is_finite3(bmin)
                    && is_finite3(bmax)
                    && bmin.iter().zip(bmax.iter()).all(|(a, b)| a <= b)
            }
            ObstacleGeometry::OrientedBox {
                center,
                half_extents,
                rot_aux,
            } => {
                is_finite3(center)
                    && is_finite3(half_extents)
                    && half_extents.iter().all(|&h| h >= 0.0)
                    && rot_aux.iter().all(|v| v.is_finite())
            }
        };
        if ok {
            Ok(())
        } else {
            Err(Status::InvalidParam.into())
        }
    }

    /// World-space AABB enclosing the obstacle
    pub fn bounds(&self) -> ([f32; 3], [f32; 3]) {
        match *self {
            ObstacleGeometry::Cylinder {
                pos,
                radius,
                height,
            } => (
                [pos[0] - radius, pos[1], pos[2] - radius],
                [pos[0] + radius, pos[1] + height, pos[2] + radius],
            ),
            ObstacleGeometry::Box { bmin, bmax } => (bmin, bmax),
            ObstacleGeometry::OrientedBox {
                center,
                half_extents,
                rot_aux,
            } => {
                let (sin, cos) = (rot_aux[0].abs(), rot_aux[1].abs());
                let extent = Vec3::new(
                    cos * half_extents[0] + sin * half_extents[2],
                    half_extents[1],
                    sin * half_extents[0] + cos * half_extents[2],
                );
                let center = Vec3::from_array(center);
                ((center - extent).to_array(), (center + extent).to_array())
            }
        }
    }
}

/// Obstacle in the tile cache
#[derive(Debug, Clone)]
pub struct Obstacle {
    geometry: ObstacleGeometry,
    state: ObstacleState,
    salt: u16,
    /// Tiles currently carved with this obstacle
    pub(crate) touched: Vec<CompressedTileRef>,
    /// Tiles that still need a rebuild before the next state change
    pub(crate) pending: Vec<CompressedTileRef>,
    next: Option<usize>,
}

impl Obstacle {
    fn empty(next: Option<usize>) -> Self {
        Self {
            geometry: ObstacleGeometry::cylinder([0.0; 3], 0.0, 0.0),
            state: ObstacleState::Empty,
            salt: 1,
            touched: Vec::new(),
            pending: Vec::new(),
            next,
        }
    }

    pub fn geometry(&self) -> &ObstacleGeometry {
        &self.geometry
    }

    pub fn obstacle_type(&self) -> ObstacleType {
        self.geometry.obstacle_type()
    }

    pub fn state(&self) -> ObstacleState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ObstacleState) {
        self.state = state;
    }

    pub fn salt(&self) -> u16 {
        self.salt
    }

    pub fn touched(&self) -> &[CompressedTileRef] {
        &self.touched
    }

    pub fn pending(&self) -> &[CompressedTileRef] {
        &self.pending
    }

    /// Whether rebuilds of `tile_ref` must carve this obstacle
    pub fn carves(&self, tile_ref: CompressedTileRef) -> bool {
        matches!(
            self.state,
            ObstacleState::Processing | ObstacleState::Processed
        ) && self.touched.contains(&tile_ref)
    }
}

/// Fixed-capacity obstacle storage
#[derive(Debug)]
pub struct ObstacleStore {
    obstacles: Vec<Obstacle>,
    next_free: Option<usize>,
    count: usize,
}

impl ObstacleStore {
    /// Creates a store with `max_obstacles` slots
    pub fn new(max_obstacles: usize) -> Result<Self> {
        if max_obstacles == 0 || max_obstacles > MAX_OBSTACLE_SLOTS {
            return Err(Status::InvalidParam.into());
        }

        let obstacles = (0..max_obstacles)
            .map(|i| Obstacle::empty(if i + 1 < max_obstacles { Some(i + 1) } else { None }))
            .collect();

        Ok(Self {
            obstacles,
            next_free: Some(0),
            count: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.obstacles.len()
    }

    /// Number of obstacles not in the `Empty` state
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn has_free_slot(&self) -> bool {
        self.next_free.is_some()
    }

    /// Takes a free slot for `geometry` and moves it to `Processing`
    pub fn allocate(&mut self, geometry: ObstacleGeometry) -> Result<ObstacleRef> {
        let index = self.next_free.ok_or(Status::OutOfMemory)?;
        let ob = &mut self.obstacles[index];
        self.next_free = ob.next.take();

        ob.geometry = geometry;
        ob.state = ObstacleState::Processing;
        ob.salt = next_obstacle_salt(ob.salt);
        ob.touched.clear();
        ob.pending.clear();

        self.count += 1;
        Ok(encode_obstacle_ref(ob.salt, index))
    }

    /// Returns a slot to the freelist and invalidates its references
    pub fn release(&mut self, index: usize) {
        let ob = &mut self.obstacles[index];
        if ob.state == ObstacleState::Empty {
            return;
        }
        ob.state = ObstacleState::Empty;
        ob.salt = next_obstacle_salt(ob.salt);
        ob.touched.clear();
        ob.pending.clear();
        ob.next = self.next_free;
        self.next_free = Some(index);
        self.count -= 1;
    }

    /// Validates index and salt of a reference.
    ///
    /// Unlike [`ObstacleStore::get`] this accepts slots in the `Empty` state.
    pub fn index_of(&self, obstacle_ref: ObstacleRef) -> Result<usize> {
        let index = decode_obstacle_index(obstacle_ref);
        let salt = decode_obstacle_salt(obstacle_ref);
        match self.obstacles.get(index) {
            Some(ob) if ob.salt == salt => Ok(index),
            _ => Err(Status::InvalidParam.into()),
        }
    }

    /// Live obstacle for a reference
    pub fn get(&self, obstacle_ref: ObstacleRef) -> Option<&Obstacle> {
        let index = self.index_of(obstacle_ref).ok()?;
        let ob = &self.obstacles[index];
        (ob.state != ObstacleState::Empty).then_some(ob)
    }

    /// Slot at `index`, live or not
    pub fn obstacle(&self, index: usize) -> Option<&Obstacle> {
        self.obstacles.get(index)
    }

    pub(crate) fn obstacle_mut(&mut self, index: usize) -> &mut Obstacle {
        &mut self.obstacles[index]
    }

    /// Reference to the live obstacle at `index`
    pub fn obstacle_ref(&self, index: usize) -> Option<ObstacleRef> {
        let ob = self.obstacles.get(index)?;
        (ob.state != ObstacleState::Empty).then(|| encode_obstacle_ref(ob.salt, index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Obstacle> + '_ {
        self.obstacles.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Obstacle)> + '_ {
        self.obstacles.iter_mut().enumerate()
    }
}
