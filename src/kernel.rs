// ── Gradient kernel: the one hot loop every executor funnels into ─────────

pub const LATENT_VECTOR_SIZE: usize = 20;
pub const MINVAL: f64 = -1e100;
pub const MAXVAL: f64 = 1e100;
pub const LAMBDA: f64 = 0.001;

// ── 8-wide unrolled dot product (compiler vectorizes at opt-level 3) ──────
#[inline(always)]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let k = a.len();
    let chunks = k / 8;
    let (mut s0, mut s1, mut s2, mut s3) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
    let (mut s4, mut s5, mut s6, mut s7) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
    let mut idx = 0;
    for _ in 0..chunks {
        unsafe {
            s0 += *a.get_unchecked(idx) * *b.get_unchecked(idx);
            s1 += *a.get_unchecked(idx + 1) * *b.get_unchecked(idx + 1);
            s2 += *a.get_unchecked(idx + 2) * *b.get_unchecked(idx + 2);
            s3 += *a.get_unchecked(idx + 3) * *b.get_unchecked(idx + 3);
            s4 += *a.get_unchecked(idx + 4) * *b.get_unchecked(idx + 4);
            s5 += *a.get_unchecked(idx + 5) * *b.get_unchecked(idx + 5);
            s6 += *a.get_unchecked(idx + 6) * *b.get_unchecked(idx + 6);
            s7 += *a.get_unchecked(idx + 7) * *b.get_unchecked(idx + 7);
        }
        idx += 8;
    }
    while idx < k {
        unsafe {
            s0 += *a.get_unchecked(idx) * *b.get_unchecked(idx);
        }
        idx += 1;
    }
    let dp = (s0 + s1 + s2 + s3) + (s4 + s5 + s6 + s7);
    debug_assert!(dp.is_normal(), "non-normal dot product: {dp}");
    dp
}

/// Rating prediction as reported to the verifier: the dot product clamped
/// into `[MINVAL, MAXVAL]`. The gradient step uses the raw dot instead.
#[inline]
pub fn calc_prediction(movie_latent: &[f64], user_latent: &[f64]) -> f64 {
    let mut pred = dot(movie_latent, user_latent);
    pred = pred.min(MAXVAL);
    pred = pred.max(MINVAL);
    pred
}

/// One gradient step over a single (movie, user, rating) triple.
///
/// Both rows are updated from a snapshot of the previous values, so the
/// movie update never sees the half-written user row and vice versa.
/// Callers are responsible for making sure no other thread touches either
/// row while the step runs.
#[inline]
pub fn gradient_update(
    movie_latent: &mut [f64],
    user_latent: &mut [f64],
    edge_rating: u32,
    step_size: f64,
) {
    let cur_error = edge_rating as f64 - dot(movie_latent, user_latent);
    for i in 0..LATENT_VECTOR_SIZE {
        let prev_movie_val = movie_latent[i];
        let prev_user_val = user_latent[i];
        movie_latent[i] += step_size * (cur_error * prev_user_val - LAMBDA * prev_movie_val);
        user_latent[i] += step_size * (cur_error * prev_movie_val - LAMBDA * prev_user_val);
    }
}
