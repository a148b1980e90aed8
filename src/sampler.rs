use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::filter::WorkingSet;

/// Bounds the rows handed to a chart.
///
/// At most `threshold` rows are returned. Larger inputs are reduced to a
/// uniform sample drawn from an RNG seeded with `seed`, so the same input
/// always yields the same sample. Sampled rows keep their input order.
pub fn sample(working: &WorkingSet, threshold: usize, seed: u64) -> WorkingSet {
    if working.len() <= threshold {
        return working.clone();
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = rand::seq::index::sample(&mut rng, working.len(), threshold).into_vec();
    picked.sort_unstable();

    debug!(
        input = working.len(),
        output = picked.len(),
        seed,
        "sampled rows for chart"
    );

    let indices = working.indices();
    WorkingSet::from_indices(picked.into_iter().map(|i| indices[i]).collect())
}
