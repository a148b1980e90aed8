//! Column layout of the sales tables: which fields are required, which
//! dimensions are optional, and which of them a given file actually carries.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use csv::StringRecord;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ExplorerError;

pub const PERIOD_HEADERS: &[&str] = &["period", "periodo"];
pub const MEASURE_HEADERS: &[&str] = &["tn", "measure"];

/// A categorical column that can be filtered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Dimension {
    #[serde(rename = "customer_id")]
    Customer,
    #[serde(rename = "cat1")]
    Cat1,
    #[serde(rename = "cat2")]
    Cat2,
    #[serde(rename = "cat3")]
    Cat3,
    #[serde(rename = "brand")]
    Brand,
    #[serde(rename = "sku_size")]
    SkuSize,
    #[serde(rename = "product_id")]
    Product,
}

impl Dimension {
    /// Evaluation order of the cascading filters.
    pub const CASCADE: [Dimension; 7] = [
        Dimension::Customer,
        Dimension::Cat1,
        Dimension::Cat2,
        Dimension::Cat3,
        Dimension::Brand,
        Dimension::SkuSize,
        Dimension::Product,
    ];

    /// Dimensions that describe a product and come from the catalog.
    pub const PRODUCT_ATTRIBUTES: [Dimension; 5] = [
        Dimension::Cat1,
        Dimension::Cat2,
        Dimension::Cat3,
        Dimension::Brand,
        Dimension::SkuSize,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            Dimension::Customer => "customer_id",
            Dimension::Cat1 => "cat1",
            Dimension::Cat2 => "cat2",
            Dimension::Cat3 => "cat3",
            Dimension::Brand => "brand",
            Dimension::SkuSize => "sku_size",
            Dimension::Product => "product_id",
        }
    }

    /// Human readable label for a filter widget.
    pub fn label(&self) -> &'static str {
        match self {
            Dimension::Customer => "Customer",
            Dimension::Cat1 => "Category 1",
            Dimension::Cat2 => "Category 2",
            Dimension::Cat3 => "Category 3",
            Dimension::Brand => "Brand",
            Dimension::SkuSize => "SKU size",
            Dimension::Product => "Product",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Dimension {
    type Err = ExplorerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Dimension::CASCADE
            .into_iter()
            .find(|d| d.column().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ExplorerError::UnknownDimension(s.to_owned()))
    }
}

/// Which optional dimensions a sales table carries. `period` and `measure`
/// are always present once a schema has been built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Schema {
    present: BTreeSet<Dimension>,
}

impl Schema {
    /// Schema with every dimension present.
    pub fn full() -> Self {
        Self {
            present: Dimension::CASCADE.into_iter().collect(),
        }
    }

    pub fn with_dimensions(dimensions: impl IntoIterator<Item = Dimension>) -> Self {
        Self {
            present: dimensions.into_iter().collect(),
        }
    }

    /// Validates a header row. A missing required column is fatal; missing
    /// optional columns are logged and backfilled with empty values.
    pub fn from_headers(headers: &StringRecord) -> Result<Self, ExplorerError> {
        let has = |names: &[&str]| {
            headers
                .iter()
                .any(|h| names.iter().any(|name| *name == h.trim()))
        };

        if !has(PERIOD_HEADERS) {
            return Err(ExplorerError::MissingColumn {
                column: "period",
                accepted: PERIOD_HEADERS.join(", "),
            });
        }
        if !has(MEASURE_HEADERS) {
            return Err(ExplorerError::MissingColumn {
                column: "measure",
                accepted: MEASURE_HEADERS.join(", "),
            });
        }

        let mut present = BTreeSet::new();
        for dimension in Dimension::CASCADE {
            if has(&[dimension.column()]) {
                present.insert(dimension);
            } else {
                warn!(column = dimension.column(), "column not found, it will be left empty");
            }
        }

        Ok(Self { present })
    }

    pub fn has(&self, dimension: Dimension) -> bool {
        self.present.contains(&dimension)
    }

    pub fn dimensions(&self) -> impl Iterator<Item = Dimension> + '_ {
        self.present.iter().copied()
    }
}
