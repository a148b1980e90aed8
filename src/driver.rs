//! Owns the filter state and the loaded dataset, and re-runs the pipeline
//! whenever a filter changes.
//!
//! Each stage result is memoized under a [`StageKey`] built from content
//! fingerprints, so the catalog dedup and the aggregation only run again when
//! the raw dataset changes, and an unchanged filter state reuses its chain
//! output and sample.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::{aggregate, AggregatedRecord, Aggregation};
use crate::cache::{CacheStats, MemoCache, StageId, StageKey};
use crate::catalog::AttributeTable;
use crate::config::ExplorerConfig;
use crate::error::FilterError;
use crate::filter::{ChainOutput, DateRange, DimensionOptions, FilterChain, FilterState, Selection, WorkingSet};
use crate::fingerprint::fingerprint_of;
use crate::records::{RawDataset, RawRecord};
use crate::sampler;
use crate::schema::{Dimension, Schema};

/// A user edit to the filter state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterEvent {
    SetDateRange(Option<DateRange>),
    Select {
        dimension: Dimension,
        selection: Selection,
    },
    /// Clears every filter.
    Reset,
}

/// Results of the stages that run once per raw dataset.
#[derive(Debug)]
pub struct Prepared {
    pub schema: Schema,
    pub attributes: AttributeTable,
    pub aggregation: Aggregation,
}

fn prepare(dataset: &RawDataset) -> Prepared {
    info!(rows = dataset.records().len(), "preparing dataset");
    let attributes = AttributeTable::build(dataset.records().iter().map(RawRecord::catalog_row));
    let aggregation = aggregate(dataset.records(), &attributes);
    Prepared {
        schema: dataset.schema().clone(),
        attributes,
        aggregation,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub prepare: CacheStats,
    pub chain: CacheStats,
    pub sample: CacheStats,
}

/// Everything a renderer needs after one recompute.
#[derive(Debug, Clone)]
pub struct RecomputeOutput {
    prepared: Arc<Prepared>,
    chain: Arc<ChainOutput>,
    sample: Arc<WorkingSet>,
    preview_rows: usize,
}

impl RecomputeOutput {
    fn records(&self) -> &[AggregatedRecord] {
        self.prepared.aggregation.records()
    }

    pub fn filtered(&self) -> impl Iterator<Item = &AggregatedRecord> {
        self.chain.working.rows(self.records())
    }

    pub fn filtered_len(&self) -> usize {
        self.chain.working.len()
    }

    /// Leading filtered rows for a table view.
    pub fn preview(&self) -> impl Iterator<Item = &AggregatedRecord> {
        self.filtered().take(self.preview_rows)
    }

    /// Rows for the chart, at most the configured sample threshold.
    pub fn sample(&self) -> impl Iterator<Item = &AggregatedRecord> {
        self.sample.rows(self.records())
    }

    pub fn sample_len(&self) -> usize {
        self.sample.len()
    }

    pub fn is_sampled(&self) -> bool {
        self.sample.len() < self.chain.working.len()
    }

    pub fn options(&self) -> &[DimensionOptions] {
        &self.chain.options
    }

    /// The effective state: stale selections reset, date range clamped.
    pub fn state(&self) -> &FilterState {
        &self.chain.state
    }

    pub fn date_error(&self) -> Option<&FilterError> {
        self.chain.date_error.as_ref()
    }

    pub fn data_range(&self) -> Option<DateRange> {
        self.prepared
            .aggregation
            .period_bounds()
            .map(|(start, end)| DateRange::new(start, end))
    }

    pub fn prepared(&self) -> &Prepared {
        &self.prepared
    }

    pub fn view(&self) -> RenderView {
        RenderView {
            filtered_rows: self.filtered_len(),
            sampled_rows: self.sample_len(),
            data_range: self.data_range(),
            state: self.state().clone(),
            date_error: self.date_error().map(ToString::to_string),
            preview: self.preview().cloned().collect(),
            filters: self
                .options()
                .iter()
                .map(|o| FilterView {
                    dimension: o.dimension,
                    label: o.dimension.label(),
                    options: o.labels(),
                    selected: o.selected.to_string(),
                })
                .collect(),
        }
    }
}

/// Serializable summary of a recompute for a rendering layer.
#[derive(Debug, Clone, Serialize)]
pub struct RenderView {
    pub filtered_rows: usize,
    pub sampled_rows: usize,
    pub data_range: Option<DateRange>,
    pub state: FilterState,
    pub date_error: Option<String>,
    pub preview: Vec<AggregatedRecord>,
    pub filters: Vec<FilterView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterView {
    pub dimension: Dimension,
    pub label: &'static str,
    pub options: Vec<String>,
    pub selected: String,
}

pub struct RecomputeDriver {
    config: ExplorerConfig,
    chain: FilterChain,
    dataset: RawDataset,
    state: FilterState,
    prepared: MemoCache<StageKey, Prepared>,
    chains: MemoCache<StageKey, ChainOutput>,
    samples: MemoCache<StageKey, WorkingSet>,
}

impl RecomputeDriver {
    pub fn new(dataset: RawDataset, config: ExplorerConfig) -> Self {
        let capacity = config.cache_capacity;
        Self {
            config,
            chain: FilterChain::default(),
            dataset,
            state: FilterState::default(),
            prepared: MemoCache::new(capacity),
            chains: MemoCache::new(capacity),
            samples: MemoCache::new(capacity),
        }
    }

    pub fn with_state(mut self, state: FilterState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn stats(&self) -> DriverStats {
        DriverStats {
            prepare: self.prepared.stats(),
            chain: self.chains.stats(),
            sample: self.samples.stats(),
        }
    }

    /// Applies one user edit and recomputes.
    pub fn handle(&mut self, event: FilterEvent) -> RecomputeOutput {
        debug!(?event, "filter event");
        match event {
            FilterEvent::SetDateRange(range) => self.state.set_date_range(range),
            FilterEvent::Select {
                dimension,
                selection,
            } => self.state.select(dimension, selection),
            FilterEvent::Reset => self.state = FilterState::default(),
        }
        self.recompute()
    }

    /// Swaps in a new raw dataset. Aggregation only reruns if its content
    /// differs from anything seen before.
    pub fn replace_dataset(&mut self, dataset: RawDataset) -> RecomputeOutput {
        self.dataset = dataset;
        self.recompute()
    }

    pub fn recompute(&mut self) -> RecomputeOutput {
        let dataset = &self.dataset;
        let prepared = self.prepared.get_or_insert_with(
            StageKey {
                stage: StageId::Prepare,
                input: dataset.fingerprint(),
                rows: dataset.records().len(),
                state: 0,
            },
            || prepare(dataset),
        );

        let records = prepared.aggregation.records();
        let chain_key = StageKey {
            stage: StageId::Chain,
            input: fingerprint_of(&(prepared.aggregation.fingerprint(), &prepared.schema)),
            rows: records.len(),
            state: self.state.fingerprint(),
        };
        let (filters, schema, state) = (&self.chain, &prepared.schema, &self.state);
        let chain = self
            .chains
            .get_or_insert_with(chain_key, || filters.run(records, schema, state));

        if chain.state != self.state {
            if !chain.resets.is_empty() {
                info!(dimensions = ?chain.resets, "reset stale selections to ALL");
            }
            self.state = chain.state.clone();
        }
        if let Some(err) = &chain.date_error {
            debug!(%err, "date range rejected");
        }

        let (threshold, seed) = (self.config.sample_threshold, self.config.sample_seed);
        let sample_key = StageKey {
            stage: StageId::Sample,
            input: fingerprint_of(&(prepared.aggregation.fingerprint(), &chain.working)),
            rows: chain.working.len(),
            state: fingerprint_of(&(threshold, seed)),
        };
        let working = &chain.working;
        let sample = self
            .samples
            .get_or_insert_with(sample_key, || sampler::sample(working, threshold, seed));

        RecomputeOutput {
            prepared,
            chain,
            sample,
            preview_rows: self.config.preview_rows,
        }
    }
}
