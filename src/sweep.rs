use serde::{Deserialize, Serialize};


/// blocking-factor ladder bounds, inclusive
pub const NB_MIN: usize = 96;
pub const NB_MAX: usize = 256;
pub const NB_STEP: usize = 8;

const GIB: f64 = (1u64 << 30) as f64;

/// fraction of the memory-derived problem size actually used, leaving
/// headroom for working buffers
const SAFETY_FACTOR: f64 = 0.90;

/// one candidate run: a blocking factor and the problem size tuned to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub nb: usize,
    pub n: usize,
}

/// blocking factors in ladder order
pub fn nb_ladder() -> impl Iterator<Item = usize> {
    (NB_MIN..=NB_MAX).step_by(NB_STEP)
}

/// largest problem size whose N x N matrix of 8-byte elements fits the
/// cluster memory, scaled back by the safety factor
pub fn baseline_problem_size(nodes: usize, mem_per_node_gib: f64) -> usize {
    let total_bytes = mem_per_node_gib * GIB * nodes as f64;
    let n = (total_bytes / 8.0).sqrt().round();
    (n * SAFETY_FACTOR) as usize
}

/// one problem size per blocking factor, snapped down to the nearest
/// multiple of NB so the blocked algorithm tiles evenly. A baseline smaller
/// than NB yields a zero-size point; callers report those rather than drop
/// them.
pub fn sweep_points(baseline: usize) -> Vec<SweepPoint> {
    nb_ladder()
        .map(|nb| SweepPoint {
            nb,
            n: (baseline / nb) * nb,
        })
        .collect()
}
