use rayon::prelude::*;

use crate::graph::RatingsGraph;
use crate::kernel::gradient_update;
use crate::schedule::StepFunction;
use crate::store::{FactorStore, SharedFactors, XorShift64, SEED};
use crate::train::TrainConfig;
use crate::verify::rmse;

/// The two baseline variants run more, cheaper epochs than the blocked
/// family.
const SIMPLE_EPOCHS: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SimpleKind {
    NodeMovie,
    EdgeMovie,
}

fn movie_worklist(g: &RatingsGraph) -> Vec<u32> {
    (0..g.num_movies() as u32)
        .filter(|&m| g.degree(m as usize) > 0)
        .collect()
}

// Fisher-Yates, fresh generator per epoch
fn shuffle(movies: &mut [u32], epoch: u32) {
    let mut rng = XorShift64::new(SEED.wrapping_add(epoch as u64).wrapping_add(999));
    for i in (1..movies.len()).rev() {
        let j = (rng.next() as usize) % (i + 1);
        movies.swap(i, j);
    }
}

// ── nodeMovie: a movie is a work unit; all of its edges in one go.
//    Concurrent movies may share a user, so user-side updates race; the
//    baseline accepts that imprecision ────────────────────────────────────
fn node_movie_pass(g: &RatingsGraph, shared: SharedFactors, movies: &[u32], step_size: f64) {
    movies.par_iter().for_each(|&movie| {
        let m = movie as usize;
        let movie_latent = unsafe { shared.row(m) };
        for e in g.edge_range(m) {
            gradient_update(
                movie_latent,
                unsafe { shared.row(g.edge_dst(e) as usize) },
                g.edge_rating(e),
                step_size,
            );
            unsafe { *shared.updates_mut(m) += 1 };
        }
    });
}

// ── edgeMovie: at most one edge per movie in flight. Each pop handles the
//    edge at the cursor and re-queues the movie while edges remain ────────
fn edge_movie_pass(g: &RatingsGraph, shared: SharedFactors, movies: &[u32], step_size: f64) {
    let mut queue: Vec<u32> = movies.to_vec();
    while !queue.is_empty() {
        let survivors: Vec<u32> = queue
            .par_iter()
            .filter_map(|&movie| {
                let m = movie as usize;
                let range = g.edge_range(m);
                let offset = unsafe { shared.edge_offset_mut(m) };
                let e = range.start + *offset as usize;
                if e >= range.end {
                    *offset = 0;
                    return None;
                }
                gradient_update(
                    unsafe { shared.row(m) },
                    unsafe { shared.row(g.edge_dst(e) as usize) },
                    g.edge_rating(e),
                    step_size,
                );
                unsafe { *shared.updates_mut(m) += 1 };
                *offset += 1;
                if range.start + *offset as usize == range.end {
                    *offset = 0;
                    None
                } else {
                    Some(movie)
                }
            })
            .collect();
        queue = survivors;
    }
}

/// Driver for the two baselines: 10 epochs over the movie worklist,
/// shuffled between epochs (not before the first).
pub(crate) fn run_simple(
    g: &RatingsGraph,
    store: &mut FactorStore,
    kind: SimpleKind,
    lf: StepFunction,
    cfg: &TrainConfig,
) -> Vec<f64> {
    let mut movies = movie_worklist(g);
    let mut rmse_trace = Vec::new();

    for epoch in 0..SIMPLE_EPOCHS {
        if cfg.verify_per_iter {
            let (_, per_epoch) = rmse(g, store);
            rmse_trace.push(per_epoch);
        }
        let step_size = lf.step_size(epoch);
        if cfg.verbose {
            println!("Step Size: {step_size}");
        }
        if epoch != 0 {
            shuffle(&mut movies, epoch);
        }

        let shared = SharedFactors::new(store);
        match kind {
            SimpleKind::NodeMovie => node_movie_pass(g, shared, &movies, step_size),
            SimpleKind::EdgeMovie => edge_movie_pass(g, shared, &movies, step_size),
        }
    }

    rmse_trace
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_edge_movie() -> RatingsGraph {
        RatingsGraph::from_ratings(1, 3, &[(0, 0, 5), (0, 1, 3), (0, 2, 1)])
    }

    #[test]
    fn node_movie_applies_one_update_per_edge_per_pass() {
        let g = three_edge_movie();
        let mut store = FactorStore::init(&g);
        let shared = SharedFactors::new(&mut store);
        node_movie_pass(&g, shared, &[0], 0.001);
        assert_eq!(store.updates(0), 3);
        node_movie_pass(&g, shared, &[0], 0.001);
        assert_eq!(store.updates(0), 6);
    }

    #[test]
    fn edge_movie_drains_one_edge_at_a_time_and_resets_the_cursor() {
        let g = three_edge_movie();
        let mut store = FactorStore::init(&g);
        let shared = SharedFactors::new(&mut store);
        edge_movie_pass(&g, shared, &[0], 0.001);
        assert_eq!(store.updates(0), 3);
        assert_eq!(store.edge_offset(0), 0);
    }

    #[test]
    fn both_baselines_move_latents_identically_on_one_movie() {
        // with a single movie there is no interleaving, so the two
        // baselines perform the same sequence of kernel steps
        let g = three_edge_movie();
        let mut a = FactorStore::init(&g);
        let mut b = FactorStore::init(&g);
        node_movie_pass(&g, SharedFactors::new(&mut a), &[0], 0.01);
        edge_movie_pass(&g, SharedFactors::new(&mut b), &[0], 0.01);
        assert_eq!(a.latent, b.latent);
    }

    #[test]
    fn zero_step_pass_is_identity_on_latents() {
        let g = three_edge_movie();
        let mut store = FactorStore::init(&g);
        let before = store.latent.clone();
        let shared = SharedFactors::new(&mut store);
        node_movie_pass(&g, shared, &[0], 0.0);
        assert_eq!(store.latent, before);
    }

    #[test]
    fn shuffle_permutes_without_losing_movies() {
        let mut movies: Vec<u32> = (0..100).collect();
        shuffle(&mut movies, 3);
        let mut sorted = movies.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..100).collect::<Vec<u32>>());
        assert_ne!(movies, sorted);
    }
}
