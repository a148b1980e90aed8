/// Tunables for the recompute driver.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExplorerConfig {
    /// Max rows handed to the chart; larger results are sampled down.
    pub sample_threshold: usize,
    /// RNG seed for the chart sample.
    pub sample_seed: u64,
    /// Rows shown in the table preview.
    pub preview_rows: usize,
    /// Entries kept per memo table before the oldest is evicted.
    pub cache_capacity: usize,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            sample_threshold: 4000,
            sample_seed: 42,
            preview_rows: 20,
            cache_capacity: 64,
        }
    }
}
