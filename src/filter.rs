//! The cascading filter chain.
//!
//! A date-range stage runs first, then one categorical stage per dimension in
//! [`Dimension::CASCADE`] order. Every categorical stage derives its option
//! domain from the rows left by the stages before it, so narrowing an early
//! dimension shrinks the options of every later one and never the reverse.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::AggregatedRecord;
use crate::error::FilterError;
use crate::fingerprint::fingerprint_of;
use crate::period::Period;
use crate::schema::{Dimension, Schema};

/// Label shown for the "no filter" choice.
pub const ALL_LABEL: &str = "--- All ---";

static ALL: Selection = Selection::All;

/// The selected value of one categorical filter. Serialized as `null` for
/// ALL and as the plain value otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    #[default]
    All,
    Value(String),
}

impl Selection {
    pub fn value(value: impl Into<String>) -> Self {
        Selection::Value(value.into())
    }

    /// Parses a user supplied choice; `*` and the ALL label select everything.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "*" | ALL_LABEL => Selection::All,
            other => Selection::Value(other.to_owned()),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::All => f.write_str(ALL_LABEL),
            Selection::Value(v) => f.write_str(v),
        }
    }
}

/// Inclusive period bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Period,
    pub end: Period,
}

impl DateRange {
    pub fn new(start: Period, end: Period) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, period: Period) -> bool {
        self.start <= period && period <= self.end
    }

    /// Clamps both ends into `[lo, hi]`. `lo` must not exceed `hi`.
    pub fn clamp(self, lo: Period, hi: Period) -> Self {
        Self {
            start: self.start.clamp(lo, hi),
            end: self.end.clamp(lo, hi),
        }
    }
}

/// User-controlled filter selections. `None` for the date range means the
/// full range of the data; a dimension without an entry means ALL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterState {
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    selections: BTreeMap<Dimension, Selection>,
}

impl FilterState {
    pub fn selection(&self, dimension: Dimension) -> &Selection {
        self.selections.get(&dimension).unwrap_or(&ALL)
    }

    pub fn select(&mut self, dimension: Dimension, selection: Selection) {
        if selection.is_all() {
            self.selections.remove(&dimension);
        } else {
            self.selections.insert(dimension, selection);
        }
    }

    pub fn set_date_range(&mut self, range: Option<DateRange>) {
        self.date_range = range;
    }

    pub fn fingerprint(&self) -> u64 {
        // ALL entries are never stored, so equal states hash equally.
        fingerprint_of(self)
    }
}

/// Indices into the aggregated records that survive the stages run so far.
/// Only built inside the crate, always against the slice it indexes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct WorkingSet(Vec<usize>);

impl WorkingSet {
    pub(crate) fn full(len: usize) -> Self {
        WorkingSet((0..len).collect())
    }

    pub(crate) fn from_indices(indices: Vec<usize>) -> Self {
        WorkingSet(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn rows<'a>(
        &'a self,
        records: &'a [AggregatedRecord],
    ) -> impl Iterator<Item = &'a AggregatedRecord> + 'a {
        self.0.iter().map(move |&i| &records[i])
    }

    fn retain(self, records: &[AggregatedRecord], keep: impl Fn(&AggregatedRecord) -> bool) -> Self {
        WorkingSet(self.0.into_iter().filter(|&i| keep(&records[i])).collect())
    }
}

/// Option list of one categorical filter, ALL first when not empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionOptions {
    pub dimension: Dimension,
    pub options: Vec<Selection>,
    pub selected: Selection,
}

impl DimensionOptions {
    pub fn labels(&self) -> Vec<String> {
        self.options.iter().map(ToString::to_string).collect()
    }

    pub fn contains(&self, selection: &Selection) -> bool {
        self.options.contains(selection)
    }
}

pub struct DateStageOutcome {
    pub working: WorkingSet,
    pub effective: Option<DateRange>,
    pub error: Option<FilterError>,
}

/// Narrows rows to an inclusive period range.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRangeStage;

impl DateRangeStage {
    pub fn apply(&self, records: &[AggregatedRecord], requested: Option<DateRange>) -> DateStageOutcome {
        let working = WorkingSet::full(records.len());
        let Some(range) = requested else {
            return DateStageOutcome {
                working,
                effective: None,
                error: None,
            };
        };

        if range.start > range.end {
            // Leave the rows untouched and keep the request so it can be fixed.
            return DateStageOutcome {
                working,
                effective: Some(range),
                error: Some(FilterError::InvertedDateRange {
                    start: range.start,
                    end: range.end,
                }),
            };
        }

        let Some((lo, hi)) = period_bounds(records) else {
            return DateStageOutcome {
                working,
                effective: Some(range),
                error: None,
            };
        };
        // Rows are matched against the requested bounds. Only a range that
        // overlaps the data is clamped, so writing it back selects the same rows.
        let overlaps = range.start <= hi && lo <= range.end;
        let effective = if overlaps { range.clamp(lo, hi) } else { range };
        DateStageOutcome {
            working: working.retain(records, |r| range.contains(r.period)),
            effective: Some(effective),
            error: None,
        }
    }
}

pub struct StageOutcome {
    pub working: WorkingSet,
    pub options: DimensionOptions,
    /// True when the prior selection was not in the option domain.
    pub reset: bool,
}

/// One cascading categorical filter.
#[derive(Debug, Clone, Copy)]
pub struct CategoricalStage {
    pub dimension: Dimension,
}

impl CategoricalStage {
    pub fn new(dimension: Dimension) -> Self {
        Self { dimension }
    }

    /// Computes the option domain from `working`, validates `prior` against
    /// it, and narrows `working` to the effective selection.
    pub fn apply(
        &self,
        records: &[AggregatedRecord],
        schema: &Schema,
        working: WorkingSet,
        prior: &Selection,
    ) -> StageOutcome {
        let options = if working.is_empty() {
            Vec::new()
        } else if !schema.has(self.dimension) {
            vec![Selection::All]
        } else {
            let values: BTreeSet<&str> = working
                .rows(records)
                .filter_map(|r| r.value(self.dimension))
                .collect();
            std::iter::once(Selection::All)
                .chain(values.into_iter().map(Selection::value))
                .collect()
        };

        let reset = !prior.is_all() && !options.contains(prior);
        let selected = if reset { Selection::All } else { prior.clone() };
        if reset {
            debug!(dimension = %self.dimension, previous = %prior, "selection no longer available, reset to ALL");
        }

        let working = match &selected {
            Selection::All => working,
            Selection::Value(value) => {
                let dimension = self.dimension;
                working.retain(records, |r| r.value(dimension) == Some(value.as_str()))
            }
        };

        StageOutcome {
            working,
            options: DimensionOptions {
                dimension: self.dimension,
                options,
                selected,
            },
            reset,
        }
    }
}

/// Result of one full pass of the chain.
#[derive(Debug, Clone)]
pub struct ChainOutput {
    pub working: WorkingSet,
    pub options: Vec<DimensionOptions>,
    /// The input state with stale selections reset and the date range clamped.
    pub state: FilterState,
    pub date_error: Option<FilterError>,
    pub resets: Vec<Dimension>,
}

/// Ordered filter stages: the date range, then the categorical cascade.
#[derive(Debug, Clone)]
pub struct FilterChain {
    date: DateRangeStage,
    stages: Vec<CategoricalStage>,
}

impl Default for FilterChain {
    fn default() -> Self {
        Self {
            date: DateRangeStage,
            stages: Dimension::CASCADE.into_iter().map(CategoricalStage::new).collect(),
        }
    }
}

impl FilterChain {
    pub fn run(&self, records: &[AggregatedRecord], schema: &Schema, state: &FilterState) -> ChainOutput {
        let date = self.date.apply(records, state.date_range);

        let mut effective = FilterState {
            date_range: date.effective,
            selections: BTreeMap::new(),
        };
        let mut working = date.working;
        let mut options = Vec::with_capacity(self.stages.len());
        let mut resets = Vec::new();

        for stage in &self.stages {
            let outcome = stage.apply(records, schema, working, state.selection(stage.dimension));
            if outcome.reset {
                resets.push(stage.dimension);
            }
            effective.select(stage.dimension, outcome.options.selected.clone());
            options.push(outcome.options);
            working = outcome.working;
        }

        ChainOutput {
            working,
            options,
            state: effective,
            date_error: date.error,
            resets,
        }
    }
}

fn period_bounds(records: &[AggregatedRecord]) -> Option<(Period, Period)> {
    let lo = records.iter().map(|r| r.period).min()?;
    let hi = records.iter().map(|r| r.period).max()?;
    Some((lo, hi))
}
