//! Candidate path generation by recursive midpoint deviation.
//!
//! Paths are synthetic: each one bisects the start→end segment recursively and
//! pushes every midpoint a short distance in a random direction. The deviation
//! shrinks geometrically with the recursion level. Inputs are assumed to be
//! validated by the caller (`planner` rejects bad counts and depths).

use std::f64::consts::TAU;

use rand::Rng;

use crate::path::{CandidatePath, Coordinate};

/// Generate `path_count` independent candidate paths.
///
/// Every path has `2^recursion_depth + 1` points and starts/ends exactly at
/// `start`/`end`. All randomness comes from `rng`, so a seeded generator
/// yields reproducible paths.
pub fn generate_paths<R: Rng + ?Sized>(
    start: Coordinate,
    end: Coordinate,
    path_count: usize,
    recursion_depth: u32,
    deviation_factor: f64,
    rng: &mut R,
) -> Vec<CandidatePath> {
    (0..path_count)
        .map(|_| generate_path(start, end, recursion_depth, deviation_factor, rng))
        .collect()
}

/// Generate a single deviated path.
pub fn generate_path<R: Rng + ?Sized>(
    start: Coordinate,
    end: Coordinate,
    recursion_depth: u32,
    deviation_factor: f64,
    rng: &mut R,
) -> CandidatePath {
    let mut points = Vec::with_capacity((1usize << recursion_depth) + 1);
    points.push(start);
    deviate(start, end, recursion_depth, deviation_factor, rng, &mut points);
    CandidatePath::from_vertices(points)
}

/// Appends the points of the (start, end] part of the deviated segment.
///
/// `start` is expected to already be in `out`, so joins never duplicate the
/// shared midpoint.
fn deviate<R: Rng + ?Sized>(
    start: Coordinate,
    end: Coordinate,
    level: u32,
    deviation_factor: f64,
    rng: &mut R,
    out: &mut Vec<Coordinate>,
) {
    if level == 0 {
        out.push(end);
        return;
    }

    let magnitude = deviation_factor / 2f64.powi(level as i32);
    let angle = rng.gen_range(0.0..TAU);
    let mid = start.midpoint(&end);
    let displaced = Coordinate::new(mid.lat + magnitude * angle.sin(), mid.lon + magnitude * angle.cos());

    deviate(start, displaced, level - 1, deviation_factor, rng, out);
    deviate(displaced, end, level - 1, deviation_factor, rng, out);
}
