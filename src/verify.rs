use rayon::prelude::*;

use crate::graph::RatingsGraph;
use crate::kernel::calc_prediction;
use crate::store::FactorStore;

/// Parallel RMSE reduction over every rating edge.
///
/// Returns `(sum of squared errors, sqrt(sum / NUM_RATINGS))`, using the
/// clamped prediction. An edgeless graph reports 0 rather than 0/0.
pub fn rmse(g: &RatingsGraph, store: &FactorStore) -> (f64, f64) {
    if g.num_ratings() == 0 {
        return (0.0, 0.0);
    }

    let total: f64 = (0..g.num_movies())
        .into_par_iter()
        .map(|m| {
            let movie_latent = store.latent(m);
            let mut local = 0.0f64;
            for e in g.edge_range(m) {
                let user_latent = store.latent(g.edge_dst(e) as usize);
                let pred = calc_prediction(movie_latent, user_latent);
                if !pred.is_normal() {
                    println!("denormal warning");
                }
                let rating = g.edge_rating(e) as f64;
                local += (pred - rating) * (pred - rating);
            }
            local
        })
        .sum();

    (total, (total / g.num_ratings() as f64).sqrt())
}
