//! Aggregation, cascading filters and chart sampling over per-transaction
//! sales records.

pub mod aggregate;
pub mod cache;
pub mod catalog;
pub mod coerce;
pub mod config;
pub mod driver;
pub mod error;
pub mod filter;
mod fingerprint;
pub mod master;
pub mod period;
pub mod records;
pub mod sampler;
pub mod schema;

pub use aggregate::{aggregate, AggregatedRecord, Aggregation, AggregationReport};
pub use catalog::{AttributeRow, AttributeTable};
pub use config::ExplorerConfig;
pub use driver::{FilterEvent, RecomputeDriver, RecomputeOutput, RenderView};
pub use error::{ExplorerError, FilterError};
pub use filter::{
    CategoricalStage, DateRange, DateRangeStage, DimensionOptions, FilterChain, FilterState, Selection,
    WorkingSet, ALL_LABEL,
};
pub use period::Period;
pub use records::{read_catalog, read_sales, Attributes, CatalogRow, RawDataset, RawRecord};
pub use schema::{Dimension, Schema};
