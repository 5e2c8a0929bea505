use std::time::Instant;

use sgdmf::{train, Algo, RatingsGraph, StepFunction, TrainConfig};

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 0xbad5eed } else { seed },
        }
    }

    #[inline(always)]
    fn next(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }
}

fn synthetic_ratings(num_movies: u32, num_users: u32, per_movie: u32, seed: u64) -> RatingsGraph {
    let mut rng = XorShift64::new(seed);
    let mut triples = Vec::with_capacity((num_movies * per_movie) as usize);
    for m in 0..num_movies {
        for _ in 0..per_movie {
            let u = (rng.next() % num_users as u64) as u32;
            let r = 1 + (rng.next() % 5) as u32;
            triples.push((m, u, r));
        }
    }
    RatingsGraph::from_ratings(num_movies as usize, num_users as usize, &triples)
}

fn main() {
    let num_movies = 2_000;
    let num_users = 20_000;
    let per_movie = 50;

    let build_start = Instant::now();
    let g = synthetic_ratings(num_movies, num_users, per_movie, 77);
    println!(
        "graph: {} movies, {} users, {} ratings ({:.2}s)",
        g.num_movies(),
        g.num_users(),
        g.num_ratings(),
        build_start.elapsed().as_secs_f64()
    );

    println!("  ALGO               |     RMSE     | TIME");
    println!("  ------------------------------------------");
    for (name, algo) in [
        ("nodeMovie", Algo::NodeMovie),
        ("edgeMovie", Algo::EdgeMovie),
        ("block", Algo::Block),
        ("blockAndSliceUsers", Algo::BlockAndSliceUsers),
        ("blockAndSliceBoth", Algo::BlockAndSliceBoth),
        ("sliceMarch", Algo::SliceMarch),
    ] {
        let cfg = TrainConfig {
            algo,
            learn: StepFunction::Intel,
            users_per_block_slice: 2048,
            movies_per_block_slice: 512,
            ..TrainConfig::default()
        };
        let (_, summary) = train(&g, &cfg);
        println!(
            "  {:<18} | {:>12.6} | {:>6.2}s",
            name, summary.rmse, summary.seconds
        );
    }
}
