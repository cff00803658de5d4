//! End-to-end scenarios across the stores, the scheduler and the pipeline

use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

use crate::compressor::Lz4Compressor;
use crate::layer::LAYER_HEADER_STRIDE;
use crate::obstacle::ObstacleState;
use crate::test_helpers::{flat_layer_data, CellMeshBuilder, FlakyAlloc, MemoryNavMesh};
use crate::tile_cache::{TileCache, TileCacheParams};
use crate::tile_store::CompressedTileFlags;
use tilecache_common::Status;

const TILE_SIZE: i32 = 10;

fn params() -> TileCacheParams {
    TileCacheParams::default()
        .with_cell_size(1.0, 0.5)
        .with_tile_size(TILE_SIZE, TILE_SIZE)
        .with_capacity(64, 32)
}

fn new_cache() -> TileCache {
    TileCache::new(
        params(),
        Box::new(Lz4Compressor),
        Box::new(CellMeshBuilder::default()),
    )
    .unwrap()
}

/// Stores flat tiles for a `columns` x `columns` grid and builds them
fn populate(cache: &mut TileCache, nav_mesh: &mut MemoryNavMesh, columns: i32) {
    for ty in 0..columns {
        for tx in 0..columns {
            let data = flat_layer_data(&Lz4Compressor, tx, ty, 0, TILE_SIZE, 1.0);
            cache.add_tile(data, CompressedTileFlags::FREE_DATA).unwrap();
            cache.build_nav_mesh_tiles_at(tx, ty, nav_mesh).unwrap();
        }
    }
}

fn run_until_up_to_date(cache: &mut TileCache, nav_mesh: &mut MemoryNavMesh) -> usize {
    let mut ticks = 1;
    while !cache.update(0.016, nav_mesh).up_to_date {
        ticks += 1;
        assert!(ticks < 100, "cache never settled");
    }
    ticks
}

#[test]
fn test_carve_and_restore_single_tile() {
    let mut cache = new_cache();
    let mut nav_mesh = MemoryNavMesh::default();
    populate(&mut cache, &mut nav_mesh, 1);
    assert_eq!(nav_mesh.poly_count_at(0, 0, 0), Some(100));

    let obstacle = cache.add_obstacle([5.0, 0.0, 5.0], 1.0, 2.0).unwrap();
    let outcome = cache.update(0.016, &mut nav_mesh);
    assert!(outcome.up_to_date);
    assert_eq!(outcome.tiles_rebuilt, 1);

    // The four cells around the centre are blocked
    assert_eq!(nav_mesh.poly_count_at(0, 0, 0), Some(96));
    assert_eq!(
        cache.get_obstacle_by_ref(obstacle).unwrap().state(),
        ObstacleState::Processed
    );

    cache.remove_obstacle(obstacle).unwrap();
    let outcome = cache.update(0.016, &mut nav_mesh);
    assert!(outcome.up_to_date);
    assert_eq!(nav_mesh.poly_count_at(0, 0, 0), Some(100));
    assert!(cache.get_obstacle_by_ref(obstacle).is_none());
    assert_eq!(cache.obstacle_count(), 0);
}

#[test]
fn test_cylinder_in_the_middle_of_a_large_grid() {
    let mut cache = TileCache::new(
        params().with_capacity(128, 32),
        Box::new(Lz4Compressor),
        Box::new(CellMeshBuilder::default()),
    )
    .unwrap();
    let mut nav_mesh = MemoryNavMesh::default();
    populate(&mut cache, &mut nav_mesh, 10);
    assert_eq!(nav_mesh.tile_count(), 100);
    let baseline = nav_mesh.poly_counts();
    nav_mesh.added_at.clear();

    // Centre of the world, on the corner shared by four tiles
    let obstacle = cache.add_obstacle([50.0, 0.0, 50.0], 1.0, 2.0).unwrap();
    run_until_up_to_date(&mut cache, &mut nav_mesh);

    let ob = cache.get_obstacle_by_ref(obstacle).unwrap();
    assert_eq!(ob.state(), ObstacleState::Processed);
    let (bmin, bmax) = cache.get_obstacle_bounds(ob);
    let overlapped: BTreeSet<_> = cache
        .query_tiles(&bmin, &bmax, 100)
        .into_iter()
        .map(|r| {
            let header = cache.get_tile_by_ref(r).unwrap().header().unwrap();
            (header.tx, header.ty, header.tlayer)
        })
        .collect();
    assert_eq!(
        overlapped,
        BTreeSet::from([(4, 4, 0), (5, 4, 0), (4, 5, 0), (5, 5, 0)])
    );

    // Exactly the overlapped tiles were rebuilt and lost polygons
    let rebuilt: BTreeSet<_> = nav_mesh.added_at.drain(..).collect();
    assert_eq!(rebuilt, overlapped);
    let carved = nav_mesh.poly_counts();
    let reduced: BTreeSet<_> = baseline
        .iter()
        .filter(|&(key, polys)| carved[key] < *polys)
        .map(|(key, _)| *key)
        .collect();
    assert_eq!(reduced, overlapped);
    assert!(overlapped.iter().all(|key| carved[key] == 99));

    cache.remove_obstacle(obstacle).unwrap();
    run_until_up_to_date(&mut cache, &mut nav_mesh);

    let restored: BTreeSet<_> = nav_mesh.added_at.drain(..).collect();
    assert_eq!(restored, overlapped);
    assert_eq!(nav_mesh.poly_counts(), baseline);
    assert_eq!(cache.obstacle_count(), 0);
}

#[test]
fn test_overlapping_obstacles_keep_cells_blocked() {
    let mut cache = new_cache();
    let mut nav_mesh = MemoryNavMesh::default();
    populate(&mut cache, &mut nav_mesh, 1);

    let a = cache.add_box_obstacle([2.0, 0.0, 2.0], [4.0, 2.0, 4.0]).unwrap();
    let b = cache.add_box_obstacle([3.0, 0.0, 3.0], [6.0, 2.0, 6.0]).unwrap();
    run_until_up_to_date(&mut cache, &mut nav_mesh);
    let both = nav_mesh.poly_count_at(0, 0, 0).unwrap();

    cache.remove_obstacle(a).unwrap();
    run_until_up_to_date(&mut cache, &mut nav_mesh);
    let only_b = nav_mesh.poly_count_at(0, 0, 0).unwrap();
    assert!(only_b > both && only_b < 100, "{} {}", both, only_b);

    cache.remove_obstacle(b).unwrap();
    run_until_up_to_date(&mut cache, &mut nav_mesh);
    assert_eq!(nav_mesh.poly_count_at(0, 0, 0), Some(100));
}

#[test]
fn test_add_then_remove_leaves_navmesh_untouched() {
    let mut cache = new_cache();
    let mut nav_mesh = MemoryNavMesh::default();
    populate(&mut cache, &mut nav_mesh, 2);
    let added = nav_mesh.added;
    let polys = nav_mesh.total_poly_count();

    let obstacle = cache.add_obstacle([10.0, 0.0, 10.0], 2.0, 2.0).unwrap();
    cache.remove_obstacle(obstacle).unwrap();
    run_until_up_to_date(&mut cache, &mut nav_mesh);

    assert_eq!(nav_mesh.added, added);
    assert_eq!(nav_mesh.total_poly_count(), polys);
    assert_eq!(cache.obstacle_count(), 0);
    assert_eq!(
        cache.remove_obstacle(obstacle).unwrap_err().status(),
        Status::InvalidParam
    );
}

#[test]
fn test_rebuild_budget_per_tick() {
    let mut cache = TileCache::new(
        params().with_max_rebuilds_per_update(2),
        Box::new(Lz4Compressor),
        Box::new(CellMeshBuilder::default()),
    )
    .unwrap();
    let mut nav_mesh = MemoryNavMesh::default();
    populate(&mut cache, &mut nav_mesh, 3);

    // Overlaps all nine tiles; only the first eight are tracked
    cache
        .add_box_obstacle([5.0, 0.0, 5.0], [25.0, 2.0, 25.0])
        .unwrap();

    let mut rebuilt = 0;
    loop {
        let outcome = cache.update(0.016, &mut nav_mesh);
        assert!(outcome.tiles_rebuilt <= 2);
        rebuilt += outcome.tiles_rebuilt;
        if outcome.up_to_date {
            break;
        }
    }
    assert_eq!(rebuilt, 8);
}

#[test]
fn test_out_of_memory_is_retried() {
    let builder_calls = Rc::new(Cell::new(0));
    let mut cache = TileCache::new(
        params(),
        Box::new(Lz4Compressor),
        Box::new(CellMeshBuilder::counting(builder_calls.clone())),
    )
    .unwrap();
    let mut nav_mesh = MemoryNavMesh::default();
    populate(&mut cache, &mut nav_mesh, 1);

    let mut cache = cache.with_alloc(Box::new(FlakyAlloc::failing(1)));
    let obstacle = cache.add_obstacle([5.0, 0.0, 5.0], 1.0, 2.0).unwrap();

    let outcome = cache.update(0.016, &mut nav_mesh);
    assert_eq!(outcome.tiles_retried, 1);
    assert_eq!(outcome.tiles_rebuilt, 0);
    assert!(!outcome.up_to_date);
    assert_eq!(cache.dirty_tile_count(), 1);
    assert_eq!(
        cache.get_obstacle_by_ref(obstacle).unwrap().state(),
        ObstacleState::Processing
    );
    assert_eq!(nav_mesh.poly_count_at(0, 0, 0), Some(100));

    let outcome = cache.update(0.016, &mut nav_mesh);
    assert_eq!(outcome.tiles_rebuilt, 1);
    assert!(outcome.up_to_date);
    assert_eq!(nav_mesh.poly_count_at(0, 0, 0), Some(96));
    assert_eq!(
        cache.get_obstacle_by_ref(obstacle).unwrap().state(),
        ObstacleState::Processed
    );
    assert_eq!(builder_calls.get(), 2);
}

#[test]
fn test_corrupt_tile_is_dropped() {
    let mut cache = new_cache();
    let mut nav_mesh = MemoryNavMesh::default();

    let mut data = flat_layer_data(&Lz4Compressor, 0, 0, 0, TILE_SIZE, 1.0);
    data.truncate(LAYER_HEADER_STRIDE);
    data.extend_from_slice(&[0xff; 4]);
    cache.add_tile(data, CompressedTileFlags::FREE_DATA).unwrap();

    let obstacle = cache.add_obstacle([5.0, 0.0, 5.0], 1.0, 2.0).unwrap();
    let outcome = cache.update(0.016, &mut nav_mesh);
    assert_eq!(outcome.tiles_dropped, 1);
    assert!(outcome.up_to_date);
    assert_eq!(nav_mesh.tile_count(), 0);

    // The obstacle does not wait forever on a tile that cannot be built
    let ob = cache.get_obstacle_by_ref(obstacle).unwrap();
    assert_eq!(ob.state(), ObstacleState::Processed);
    assert!(ob.pending().is_empty());
}

#[test]
fn test_navmesh_failure_drops_tile() {
    let mut cache = new_cache();
    let mut nav_mesh = MemoryNavMesh::default();
    populate(&mut cache, &mut nav_mesh, 1);

    nav_mesh.fail_adds = Some(Status::Failure);
    cache.add_obstacle([5.0, 0.0, 5.0], 1.0, 2.0).unwrap();
    let outcome = cache.update(0.016, &mut nav_mesh);
    assert_eq!(outcome.tiles_dropped, 1);
    assert!(outcome.up_to_date);
}

#[test]
fn test_removed_tile_under_obstacle() {
    let mut cache = new_cache();
    let mut nav_mesh = MemoryNavMesh::default();
    populate(&mut cache, &mut nav_mesh, 1);

    let obstacle = cache.add_obstacle([5.0, 0.0, 5.0], 1.0, 2.0).unwrap();
    run_until_up_to_date(&mut cache, &mut nav_mesh);

    let tile = cache.get_tile_ref_at(0, 0, 0).unwrap();
    cache.remove_tile(tile).unwrap();
    assert!(cache.get_tile_by_ref(tile).is_none());

    // The stale touched tile fails to rebuild and is skipped
    cache.remove_obstacle(obstacle).unwrap();
    let outcome = cache.update(0.016, &mut nav_mesh);
    assert_eq!(outcome.tiles_dropped, 1);
    assert!(outcome.up_to_date);
    assert_eq!(cache.obstacle_count(), 0);
}

#[test]
fn test_stale_obstacle_ref_after_slot_reuse() {
    let mut cache = TileCache::new(
        params().with_capacity(64, 1),
        Box::new(Lz4Compressor),
        Box::new(CellMeshBuilder::default()),
    )
    .unwrap();
    let mut nav_mesh = MemoryNavMesh::default();
    populate(&mut cache, &mut nav_mesh, 1);

    let first = cache.add_obstacle([5.0, 0.0, 5.0], 1.0, 2.0).unwrap();
    cache.remove_obstacle(first).unwrap();
    run_until_up_to_date(&mut cache, &mut nav_mesh);

    let second = cache.add_obstacle([2.0, 0.0, 2.0], 1.0, 2.0).unwrap();
    assert_ne!(first, second);
    assert!(cache.get_obstacle_by_ref(first).is_none());
    assert_eq!(
        cache.remove_obstacle(first).unwrap_err().status(),
        Status::InvalidParam
    );
    assert_eq!(
        cache.get_obstacle_by_ref(second).unwrap().state(),
        ObstacleState::Processing
    );
}

#[test]
fn test_obstacle_across_tile_border() {
    let mut cache = new_cache();
    let mut nav_mesh = MemoryNavMesh::default();
    populate(&mut cache, &mut nav_mesh, 2);

    let obstacle = cache.add_obstacle([10.0, 0.0, 5.0], 1.0, 2.0).unwrap();
    run_until_up_to_date(&mut cache, &mut nav_mesh);

    let ob = cache.get_obstacle_by_ref(obstacle).unwrap();
    assert_eq!(ob.touched().len(), 2);
    assert_eq!(nav_mesh.poly_count_at(0, 0, 0), Some(98));
    assert_eq!(nav_mesh.poly_count_at(1, 0, 0), Some(98));
    assert_eq!(nav_mesh.poly_count_at(0, 1, 0), Some(100));
}
