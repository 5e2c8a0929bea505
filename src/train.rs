use std::time::Instant;

use crate::blocked::{run_block_slices, BlockKind};
use crate::graph::RatingsGraph;
use crate::march::run_slice_march;
use crate::schedule::StepFunction;
use crate::simple::{run_simple, SimpleKind};
use crate::store::FactorStore;
use crate::verify::rmse;

/// Outer epochs for the blocked family; the march variant performs this
/// many ring traversals per worker instead.
pub const MAX_MOVIE_UPDATES: u32 = 5;

/// Partitioning strategy for the parallel SGD pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algo {
    /// one movie per work unit; user rows may race
    NodeMovie,
    /// one edge per work unit, at most one in flight per movie
    EdgeMovie,
    /// rectangle per worker, rotated each step
    Block,
    /// rectangle tiled into user slices
    BlockAndSliceUsers,
    /// rectangle tiled into user x movie slices
    BlockAndSliceBoth,
    /// lock-guarded march over a global user-slice ring
    SliceMarch,
}

#[derive(Clone, Debug)]
pub struct TrainConfig {
    pub algo: Algo,
    pub learn: StepFunction,
    pub users_per_block_slice: u32,
    pub movies_per_block_slice: u32,
    /// Record (and, with `verbose`, print) RMSE at the top of every epoch.
    pub verify_per_iter: bool,
    pub verbose: bool,
    /// Parallel work items per pass; rectangles are planned for exactly
    /// this many workers.
    pub workers: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            algo: Algo::BlockAndSliceBoth,
            learn: StepFunction::Intel,
            users_per_block_slice: 2048,
            movies_per_block_slice: 512,
            verify_per_iter: false,
            verbose: false,
            workers: rayon::current_num_threads(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TrainSummary {
    pub num_movies: usize,
    pub num_users: usize,
    pub num_ratings: usize,
    pub users_per_block_slice: u32,
    pub movies_per_block_slice: u32,
    pub seconds: f64,
    pub sum_squared_error: f64,
    pub rmse: f64,
    /// RMSE at the top of each epoch; empty unless `verify_per_iter`.
    pub rmse_per_epoch: Vec<f64>,
}

/// Train latent factors for `g`: initialize the store, run the selected
/// executor to completion and verify. The graph itself is never mutated.
pub fn train(g: &RatingsGraph, cfg: &TrainConfig) -> (FactorStore, TrainSummary) {
    assert!(cfg.workers > 0);
    let mut store = FactorStore::init(g);
    if cfg.verbose {
        println!(
            "Input initialized, num users = {}, num movies = {}",
            g.num_users(),
            g.num_movies()
        );
    }

    let timer = Instant::now();
    let rmse_per_epoch = match cfg.algo {
        Algo::NodeMovie => run_simple(g, &mut store, SimpleKind::NodeMovie, cfg.learn, cfg),
        Algo::EdgeMovie => run_simple(g, &mut store, SimpleKind::EdgeMovie, cfg.learn, cfg),
        Algo::Block => run_block_slices(g, &mut store, BlockKind::Plain, cfg.learn, cfg),
        Algo::BlockAndSliceUsers => {
            run_block_slices(g, &mut store, BlockKind::SliceUsers, cfg.learn, cfg)
        }
        Algo::BlockAndSliceBoth => {
            run_block_slices(g, &mut store, BlockKind::SliceBoth, cfg.learn, cfg)
        }
        Algo::SliceMarch => run_slice_march(g, &mut store, cfg.learn, cfg),
    };
    let seconds = timer.elapsed().as_secs_f64();

    let (sum_squared_error, root) = rmse(g, &store);
    if cfg.verbose {
        println!("Root Mean Square Error after training: {sum_squared_error} {root}");
        println!(
            "SUMMARY Movies {} Users {} Ratings {} usersPerBlockSlice {} moviesPerBlockSlice {} Time {:.3}",
            g.num_movies(),
            g.num_users(),
            g.num_ratings(),
            cfg.users_per_block_slice,
            cfg.movies_per_block_slice,
            seconds,
        );
    }

    let summary = TrainSummary {
        num_movies: g.num_movies(),
        num_users: g.num_users(),
        num_ratings: g.num_ratings(),
        users_per_block_slice: cfg.users_per_block_slice,
        movies_per_block_slice: cfg.movies_per_block_slice,
        seconds,
        sum_squared_error,
        rmse: root,
        rmse_per_epoch,
    };
    (store, summary)
}
