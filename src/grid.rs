use serde::{Deserialize, Serialize};

use crate::error::{HplTuneError, Result};


/// 2-D process grid, normalized so that p <= q. The product p * q always
/// equals the core count the grid was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub p: usize,
    pub q: usize,
}

/// finds the divisor pair of `total_cores` closest to a square
pub fn find_grid(total_cores: usize) -> Result<GridShape> {
    if total_cores < 1 {
        return Err(HplTuneError::InvalidInput(format!(
            "total core count must be positive, got {}",
            total_cores
        )));
    }

    let divisors = all_divisors(total_cores);

    let mut best: Option<(usize, usize)> = None;
    for i in 0..divisors.len() {
        let d1 = divisors[i];
        if d1 * d1 == total_cores {
            consider(&mut best, (d1, d1));
        }
        for j in i + 1..divisors.len() {
            let d2 = divisors[j];
            if d1 * d2 == total_cores {
                consider(&mut best, (d1, d2));
            }
        }
    }

    // the divisor set always contains total_cores and 1, so a pair exists
    let (a, b) = best.expect("divisor pairing produced no candidates");
    Ok(GridShape {
        p: a.min(b),
        q: a.max(b),
    })
}

// replacement only on a strictly smaller difference, so the first minimal
// pair in enumeration order wins near-ties
fn consider(best: &mut Option<(usize, usize)>, pair: (usize, usize)) {
    match best {
        None => *best = Some(pair),
        Some(current) => {
            if pair.0.abs_diff(pair.1) < current.0.abs_diff(current.1) {
                *best = Some(pair);
            }
        }
    }
}

// every divisor of n, collected as the complements of trial division up to
// n/2 (a proper divisor can't exceed half the number), with 1 appended to
// complete the set
fn all_divisors(n: usize) -> Vec<usize> {
    let mut divisors = vec![];
    for i in 1..=(n / 2) {
        if n % i == 0 {
            divisors.push(n / i);
        }
    }
    divisors.push(1);
    divisors
}
