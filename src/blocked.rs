use std::time::Instant;

use rayon::prelude::*;

use crate::graph::RatingsGraph;
use crate::kernel::gradient_update;
use crate::plan::{advance_edge_cursors, plan_blocks, WorkItem};
use crate::schedule::StepFunction;
use crate::store::{FactorStore, SharedFactors};
use crate::train::{TrainConfig, MAX_MOVIE_UPDATES};
use crate::verify::rmse;

/// Which of the three rectangle executors the driver dispatches to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BlockKind {
    Plain,
    SliceUsers,
    SliceBoth,
}

/// Walk one movie's edges from its saved cursor, applying the kernel until
/// the destination leaves the current user range (`dst > end_user_id`).
/// The cursor tracks every processed edge, so a later slice resumes where
/// this one stopped.
///
/// # Safety
/// The caller must hold exclusive claim over movie `m` and over every user
/// row inside the range, or knowingly accept races (simple baselines).
#[inline]
pub(crate) unsafe fn sweep_movie(
    g: &RatingsGraph,
    shared: SharedFactors,
    m: usize,
    end_user_id: u32,
    step_size: f64,
) -> u64 {
    let movie_latent = shared.row(m);
    let offset = shared.edge_offset_mut(m);
    let range = g.edge_range(m);
    let mut e = range.start + *offset as usize;
    let mut updates = 0u64;
    while e < range.end {
        let user = g.edge_dst(e);
        if user > end_user_id {
            break;
        }
        gradient_update(
            movie_latent,
            shared.row(user as usize),
            g.edge_rating(e),
            step_size,
        );
        *shared.updates_mut(m) += 1;
        *offset += 1;
        e += 1;
        updates += 1;
    }
    updates
}

// ── block: one rectangle per worker, no internal tiling ───────────────────
fn block_pass(
    g: &RatingsGraph,
    shared: SharedFactors,
    wi: &mut WorkItem,
    step_size: f64,
    num_movies: u32,
    num_users: u32,
) {
    let timer = Instant::now();
    let mut updates = 0u64;
    let end_user_id = wi.user_range_end + num_movies;
    for movie in wi.movie_range_start..wi.movie_range_end {
        updates += unsafe { sweep_movie(g, shared, movie as usize, end_user_id, step_size) };
        // we just looked at the last user; restart from the first edge
        if wi.user_range_end == num_users {
            unsafe { *shared.edge_offset_mut(movie as usize) = 0 };
        }
    }
    wi.updates = updates;
    wi.time_taken = timer.elapsed().as_secs_f64();
}

// ── blockAndSliceUsers: rectangle tiled into vertical user slices ─────────
fn block_slice_users_pass(
    g: &RatingsGraph,
    shared: SharedFactors,
    wi: &mut WorkItem,
    step_size: f64,
    num_movies: u32,
    num_users: u32,
) {
    let timer = Instant::now();
    let mut updates = 0u64;
    let width = wi.users_per_block_slice;
    let user_range_end = wi.user_range_end;
    let mut slice_end = wi.user_range_start;

    while slice_end < user_range_end {
        slice_end = (slice_end + width).min(user_range_end);
        let end_user_id = slice_end + num_movies;
        for movie in wi.movie_range_start..wi.movie_range_end {
            updates += unsafe { sweep_movie(g, shared, movie as usize, end_user_id, step_size) };
            if slice_end == num_users {
                unsafe { *shared.edge_offset_mut(movie as usize) = 0 };
            }
        }
    }

    wi.updates = updates;
    wi.time_taken = timer.elapsed().as_secs_f64();
}

// ── blockAndSliceBoth: user slices x movie slices, the cache-friendly
//    default ──────────────────────────────────────────────────────────────
fn block_slice_both_pass(
    g: &RatingsGraph,
    shared: SharedFactors,
    wi: &mut WorkItem,
    step_size: f64,
    num_movies: u32,
    num_users: u32,
) {
    let timer = Instant::now();
    let mut updates = 0u64;
    let user_width = wi.users_per_block_slice;
    let movie_width = wi.movies_per_block_slice;
    let user_range_end = wi.user_range_end;
    let mut slice_end = wi.user_range_start;

    while slice_end < user_range_end {
        slice_end = (slice_end + user_width).min(user_range_end);
        let end_user_id = slice_end + num_movies;

        let mut movie_slice_end = wi.movie_range_start;
        while movie_slice_end < wi.movie_range_end {
            let movie_slice_start = movie_slice_end;
            movie_slice_end = (movie_slice_end + movie_width).min(wi.movie_range_end);

            for movie in movie_slice_start..movie_slice_end {
                updates +=
                    unsafe { sweep_movie(g, shared, movie as usize, end_user_id, step_size) };
                if slice_end == num_users {
                    unsafe { *shared.edge_offset_mut(movie as usize) = 0 };
                }
            }
        }
    }

    wi.updates = updates;
    wi.time_taken = timer.elapsed().as_secs_f64();
}

/// Outer driver for the three blocked variants: `MAX_MOVIE_UPDATES` epochs
/// of `W` lockstep rotation steps. Every rotation runs all workers over
/// their current rectangles, then shifts each worker's user range one
/// position to the right through the planner's start/end point tables, so
/// one epoch visits every (movie range x user range) rectangle exactly
/// once per worker.
///
/// Returns the RMSE recorded at the top of each epoch when
/// `verify_per_iter` is set (empty otherwise).
pub(crate) fn run_block_slices(
    g: &RatingsGraph,
    store: &mut FactorStore,
    kind: BlockKind,
    lf: StepFunction,
    cfg: &TrainConfig,
) -> Vec<f64> {
    let workers = cfg.workers;
    let (mut items, start_points, end_points) = plan_blocks(
        workers,
        g.num_movies(),
        g.num_users(),
        cfg.users_per_block_slice,
        cfg.movies_per_block_slice,
    );

    // move each movie's cursor to the start of its worker's first rectangle
    advance_edge_cursors(g, store, &items);

    let num_movies = g.num_movies() as u32;
    let num_users = g.num_users() as u32;
    let mut rmse_trace = Vec::new();
    let mut rotation_millis = vec![vec![0u64; workers]; workers];

    for epoch in 0..MAX_MOVIE_UPDATES {
        if cfg.verify_per_iter {
            if cfg.verbose {
                println!("Step size: {}", lf.step_size(epoch));
            }
            let (_, per_epoch) = rmse(g, store);
            rmse_trace.push(per_epoch);
        }
        let step_size = lf.step_size(epoch);

        for rotation in 0..workers {
            let shared = SharedFactors::new(store);
            items.par_iter_mut().for_each(|wi| match kind {
                BlockKind::Plain => block_pass(g, shared, wi, step_size, num_movies, num_users),
                BlockKind::SliceUsers => {
                    block_slice_users_pass(g, shared, wi, step_size, num_movies, num_users)
                }
                BlockKind::SliceBoth => {
                    block_slice_both_pass(g, shared, wi, step_size, num_movies, num_users)
                }
            });

            // move each worker's assignment of user nodes one block to the
            // right; movie ranges stay pinned
            for k in 0..workers {
                let wi = &mut items[k];
                let column = (rotation + k) % workers;
                rotation_millis[k][column] = (wi.time_taken * 1e3) as u64;
                let next_column = (rotation + 1 + k) % workers;
                wi.user_range_start = start_points[next_column];
                wi.user_range_end = end_points[next_column];
            }
        }
    }

    if cfg.verbose {
        for row in &rotation_millis {
            let cells: Vec<String> = row.iter().map(|t| t.to_string()).collect();
            println!("{}", cells.join(" "));
        }
    }

    rmse_trace
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashSet;

    fn four_user_chain() -> RatingsGraph {
        // one movie rated by every user
        RatingsGraph::from_ratings(1, 4, &[(0, 0, 5), (0, 1, 3), (0, 2, 4), (0, 3, 2)])
    }

    #[test]
    fn rotation_visits_every_rectangle_once_per_worker() {
        let workers = 3;
        let (mut items, starts, ends) = plan_blocks(workers, 9, 9, 4, 4);
        let mut seen: Vec<AHashSet<(u32, u32)>> = vec![AHashSet::new(); workers];

        for rotation in 0..workers {
            // during any parallel step the assigned user ranges are
            // pairwise disjoint
            let mut live: Vec<(u32, u32)> = items
                .iter()
                .map(|wi| (wi.user_range_start, wi.user_range_end))
                .collect();
            live.sort_unstable();
            for pair in live.windows(2) {
                assert!(pair[0].1 <= pair[1].0);
            }

            for k in 0..workers {
                let wi = &items[k];
                assert!(
                    seen[k].insert((wi.user_range_start, wi.user_range_end)),
                    "worker {k} revisited a rectangle"
                );
            }
            for k in 0..workers {
                let next_column = (rotation + 1 + k) % workers;
                items[k].user_range_start = starts[next_column];
                items[k].user_range_end = ends[next_column];
            }
        }

        for s in &seen {
            assert_eq!(s.len(), workers);
        }
        // and the rotation cycle is closed: back to the initial assignment
        for (k, wi) in items.iter().enumerate() {
            assert_eq!(wi.user_range_start, starts[k]);
            assert_eq!(wi.user_range_end, ends[k]);
        }
    }

    #[test]
    fn single_worker_epoch_resets_cursor_and_counts_updates() {
        let g = four_user_chain();
        let mut store = FactorStore::init(&g);
        let mut wi = WorkItem {
            movie_range_end: 1,
            user_range_end: 4,
            users_per_block_slice: 1,
            movies_per_block_slice: 1,
            ..WorkItem::default()
        };
        let shared = SharedFactors::new(&mut store);
        block_slice_users_pass(&g, shared, &mut wi, 0.001, 1, 4);

        assert_eq!(store.edge_offset(0), 0);
        assert_eq!(store.updates(0), 4);
        assert_eq!(wi.updates, 4);
    }

    #[test]
    fn zero_step_leaves_latents_bit_identical() {
        let g = four_user_chain();
        let mut store = FactorStore::init(&g);
        let before = store.latent.clone();
        let mut wi = WorkItem {
            movie_range_end: 1,
            user_range_end: 4,
            users_per_block_slice: 2,
            movies_per_block_slice: 1,
            ..WorkItem::default()
        };
        let shared = SharedFactors::new(&mut store);
        block_slice_both_pass(&g, shared, &mut wi, 0.0, 1, 4);
        assert_eq!(wi.updates, 4);
        assert_eq!(store.latent, before);
    }

    #[test]
    fn oversized_slice_widths_clamp_to_the_range() {
        let g = four_user_chain();
        let mut store = FactorStore::init(&g);
        let mut wi = WorkItem {
            movie_range_end: 1,
            user_range_end: 4,
            users_per_block_slice: 1000,
            movies_per_block_slice: 1000,
            ..WorkItem::default()
        };
        let shared = SharedFactors::new(&mut store);
        block_slice_both_pass(&g, shared, &mut wi, 0.001, 1, 4);
        assert_eq!(wi.updates, 4);
        assert_eq!(store.edge_offset(0), 0);
    }
}
