use rayon::prelude::*;

use crate::graph::RatingsGraph;
use crate::store::{FactorStore, SharedFactors};

/// One worker's assignment: a movie range it owns for the whole run and a
/// user range that rotates between parallel steps, plus the slice widths
/// the tiled executors subdivide the rectangle with.
#[derive(Clone, Debug, Default)]
pub struct WorkItem {
    pub id: usize,
    pub movie_range_start: u32,
    pub movie_range_end: u32,
    pub user_range_start: u32,
    pub user_range_end: u32,
    pub users_per_block_slice: u32,
    pub movies_per_block_slice: u32,

    // march variant only
    pub slice_start: u32,
    pub num_slices: u32,

    // per-pass diagnostics
    pub updates: u64,
    pub conflicts: u32,
    pub time_taken: f64,
}

/// Split `[0, M)` and `[0, U)` into `workers` contiguous ranges, the last
/// taking the remainder. Also returns the user-range start and end points
/// indexed by range position, which the driver uses to rotate assignments
/// cyclically without threading pointers between items.
pub fn plan_blocks(
    workers: usize,
    num_movies: usize,
    num_users: usize,
    users_per_block_slice: u32,
    movies_per_block_slice: u32,
) -> (Vec<WorkItem>, Vec<u32>, Vec<u32>) {
    assert!(workers > 0);
    let movies_per_thread = num_movies / workers;
    let users_per_thread = num_users / workers;

    let mut items = Vec::with_capacity(workers);
    let mut user_range_start_points = Vec::with_capacity(workers);
    let mut user_range_end_points = Vec::with_capacity(workers);

    for i in 0..workers {
        let mut wi = WorkItem {
            id: i,
            movie_range_start: (movies_per_thread * i) as u32,
            user_range_start: (users_per_thread * i) as u32,
            users_per_block_slice,
            movies_per_block_slice,
            ..WorkItem::default()
        };
        if i == workers - 1 {
            // last block takes the rest
            wi.movie_range_end = num_movies as u32;
            wi.user_range_end = num_users as u32;
        } else {
            wi.movie_range_end = wi.movie_range_start + movies_per_thread as u32;
            wi.user_range_end = ((i + 1) * users_per_thread) as u32;
        }
        user_range_start_points.push(wi.user_range_start);
        user_range_end_points.push(wi.user_range_end);
        items.push(wi);
    }

    (items, user_range_start_points, user_range_end_points)
}

/// One-shot cursor alignment run after planning and before the first pass:
/// every movie's cursor is advanced past the edges below its worker's
/// starting user range, i.e. to the first edge whose destination exceeds
/// `userRangeStart + M`.
pub(crate) fn advance_edge_cursors(g: &RatingsGraph, store: &mut FactorStore, items: &[WorkItem]) {
    let shared = SharedFactors::new(store);
    let num_movies = g.num_movies() as u32;
    items.par_iter().for_each(|wi| {
        let boundary = wi.user_range_start + num_movies;
        for movie in wi.movie_range_start..wi.movie_range_end {
            let m = movie as usize;
            let range = g.edge_range(m);
            let offset = unsafe { shared.edge_offset_mut(m) };
            let mut e = range.start + *offset as usize;
            while e < range.end && g.edge_dst(e) <= boundary {
                e += 1;
                *offset += 1;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RatingsGraph;
    use crate::store::FactorStore;

    #[test]
    fn three_workers_partition_both_axes() {
        let (items, starts, ends) = plan_blocks(3, 10, 7, 2048, 512);
        assert_eq!(items.len(), 3);

        // movie axis: [0,3) [3,6) [6,10)
        assert_eq!(
            items
                .iter()
                .map(|w| (w.movie_range_start, w.movie_range_end))
                .collect::<Vec<_>>(),
            vec![(0, 3), (3, 6), (6, 10)]
        );
        // user axis: [0,2) [2,4) [4,7)
        assert_eq!(
            items
                .iter()
                .map(|w| (w.user_range_start, w.user_range_end))
                .collect::<Vec<_>>(),
            vec![(0, 2), (2, 4), (4, 7)]
        );

        // contiguous cover of [0, M) and [0, U)
        for pair in items.windows(2) {
            assert_eq!(pair[0].movie_range_end, pair[1].movie_range_start);
            assert_eq!(pair[0].user_range_end, pair[1].user_range_start);
        }
        assert_eq!(items[0].movie_range_start, 0);
        assert_eq!(items[2].movie_range_end, 10);
        assert_eq!(items[2].user_range_end, 7);

        // rotation tables mirror the initial assignment
        assert_eq!(starts, vec![0, 2, 4]);
        assert_eq!(ends, vec![2, 4, 7]);
    }

    #[test]
    fn more_workers_than_rows_degenerates_to_last_block() {
        let (items, _, _) = plan_blocks(4, 2, 2, 1, 1);
        for wi in &items[..3] {
            assert_eq!(wi.movie_range_start, wi.movie_range_end);
        }
        assert_eq!(items[3].movie_range_end, 2);
        assert_eq!(items[3].user_range_end, 2);
    }

    #[test]
    fn advancer_aligns_cursors_to_starting_user_range() {
        // Two movies, both rated by users 0..4 (node ids 2..6).
        let triples: Vec<(u32, u32, u32)> = (0..4u32)
            .flat_map(|u| [(0u32, u, 3u32), (1u32, u, 4u32)])
            .collect();
        let g = RatingsGraph::from_ratings(2, 4, &triples);
        let mut store = FactorStore::init(&g);
        let (items, _, _) = plan_blocks(2, 2, 4, 1, 1);
        advance_edge_cursors(&g, &mut store, &items);

        // worker 0 (movies [0,1), users from 0): skips dsts <= 0 + 2,
        // i.e. the single edge at user node 2.
        assert_eq!(store.edge_offset(0), 1);
        // worker 1 (movies [1,2), users from 2): skips dsts <= 2 + 2.
        assert_eq!(store.edge_offset(1), 3);
    }
}
