use std::time::Instant;

use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, MutexGuard};
use rayon::prelude::*;

use crate::blocked::sweep_movie;
use crate::graph::RatingsGraph;
use crate::plan::{advance_edge_cursors, WorkItem};
use crate::schedule::StepFunction;
use crate::store::{FactorStore, SharedFactors};
use crate::train::{TrainConfig, MAX_MOVIE_UPDATES};

/// Flat array of cache-line-padded locks, one per user slice of the march
/// ring. Padding keeps two neighbouring locks out of the same cache line.
pub struct SliceLockTable {
    locks: Vec<CachePadded<Mutex<()>>>,
}

impl SliceLockTable {
    pub fn new(num_slices: usize) -> Self {
        Self {
            locks: (0..num_slices)
                .map(|_| CachePadded::new(Mutex::new(())))
                .collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Non-blocking acquire first; on contention bump `conflicts` and fall
    /// back to the blocking acquire.
    pub fn acquire(&self, slice: usize, conflicts: &mut u32) -> MutexGuard<'_, ()> {
        let lock = &self.locks[slice];
        match lock.try_lock() {
            Some(guard) => guard,
            None => {
                *conflicts += 1;
                lock.lock()
            }
        }
    }
}

// ── sliceMarch: every worker walks the global slice ring under the lock
//    table, wrapping at the last user ──────────────────────────────────────
fn march_pass(
    g: &RatingsGraph,
    shared: SharedFactors,
    locks: &SliceLockTable,
    wi: &mut WorkItem,
    step_size: f64,
    num_movies: u32,
    num_users: u32,
) {
    let timer = Instant::now();
    let mut updates = 0u64;
    let mut conflicts = 0u32;

    let width = wi.users_per_block_slice;
    let user_range_end = wi.user_range_end;
    let mut slice_end = wi.user_range_start;
    let mut slice_id = wi.slice_start as usize;

    let total_visits = MAX_MOVIE_UPDATES as u64 * wi.num_slices as u64;
    let mut visits = 0u64;

    while visits < total_visits {
        let guard = locks.acquire(slice_id % locks.len(), &mut conflicts);

        slice_end = (slice_end + width).min(user_range_end);
        let end_user_id = slice_end + num_movies;
        for movie in wi.movie_range_start..wi.movie_range_end {
            updates += unsafe { sweep_movie(g, shared, movie as usize, end_user_id, step_size) };
            if slice_end == num_users {
                unsafe { *shared.edge_offset_mut(movie as usize) = 0 };
            }
        }

        drop(guard);
        slice_id += 1;
        visits += 1;

        if slice_end == user_range_end {
            // hit the last user: wrap to the front of the ring
            slice_id = 0;
            slice_end = 0;
        }
    }

    wi.updates = updates;
    wi.conflicts = conflicts;
    wi.time_taken = timer.elapsed().as_secs_f64();
}

/// Driver for the march variant: a single parallel launch; each worker
/// internally performs `MAX_MOVIE_UPDATES * numSlices` slice visits.
///
/// The whole run uses `step_size(1)`.
/// FIXME: thread the round index into the march so the schedule actually
/// decays across its internal epochs.
pub(crate) fn run_slice_march(
    g: &RatingsGraph,
    store: &mut FactorStore,
    lf: StepFunction,
    cfg: &TrainConfig,
) -> Vec<f64> {
    assert!(cfg.users_per_block_slice > 0);
    let workers = cfg.workers;
    let num_movies = g.num_movies();
    let num_users = g.num_users();
    let movies_per_thread = num_movies / workers;
    let users_per_thread = num_users / workers;

    let width = cfg.users_per_block_slice as usize;
    let num_slices = (num_users + width - 1) / width;
    let locks = SliceLockTable::new(num_slices);
    let slices_per_thread = num_slices / workers;
    if cfg.verbose {
        println!("numSlices: {num_slices} slicesPerThread: {slices_per_thread}");
    }

    let mut items = Vec::with_capacity(workers);
    for i in 0..workers {
        items.push(WorkItem {
            id: i,
            movie_range_start: (movies_per_thread * i) as u32,
            movie_range_end: if i == workers - 1 {
                num_movies as u32
            } else {
                ((i + 1) * movies_per_thread) as u32
            },
            user_range_start: (users_per_thread * i) as u32,
            user_range_end: num_users as u32,
            users_per_block_slice: cfg.users_per_block_slice,
            movies_per_block_slice: cfg.movies_per_block_slice,
            slice_start: (slices_per_thread * i) as u32,
            num_slices: num_slices as u32,
            ..WorkItem::default()
        });
    }

    let step_size = lf.step_size(1);

    advance_edge_cursors(g, store, &items);
    let shared = SharedFactors::new(store);
    let nm = num_movies as u32;
    let nu = num_users as u32;
    items
        .par_iter_mut()
        .for_each(|wi| march_pass(g, shared, &locks, wi, step_size, nm, nu));

    if cfg.verbose {
        for wi in &items {
            println!("{} {} {:.3} {}", wi.id, wi.updates, wi.time_taken, wi.conflicts);
        }
    }

    Vec::new()
}
