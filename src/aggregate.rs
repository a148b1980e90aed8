use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::hash::Hash;
use tracing::{info, warn};

use crate::catalog::AttributeTable;
use crate::coerce::{canonical, reconcile};
use crate::fingerprint::{feed_f64, feed_slice, fingerprint_with};
use crate::period::Period;
use crate::records::{Attributes, RawRecord};
use crate::schema::Dimension;

/// Summed sales for one (period, product, customer) key with the product's
/// catalog attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedRecord {
    pub period: Period,
    pub product_id: Option<String>,
    pub customer_id: Option<String>,
    #[serde(rename = "tn", serialize_with = "serialize_measure")]
    pub measure: f64,
    pub cat1: Option<String>,
    pub cat2: Option<String>,
    pub cat3: Option<String>,
    pub brand: Option<String>,
    pub sku_size: Option<String>,
}

impl AggregatedRecord {
    pub fn value(&self, dimension: Dimension) -> Option<&str> {
        match dimension {
            Dimension::Customer => self.customer_id.as_deref(),
            Dimension::Product => self.product_id.as_deref(),
            Dimension::Cat1 => self.cat1.as_deref(),
            Dimension::Cat2 => self.cat2.as_deref(),
            Dimension::Cat3 => self.cat3.as_deref(),
            Dimension::Brand => self.brand.as_deref(),
            Dimension::SkuSize => self.sku_size.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregationReport {
    pub input_rows: usize,
    pub missing_measure: usize,
    pub invalid_period: usize,
    pub unmatched_rows: usize,
    pub output_rows: usize,
}

/// Output of [`aggregate`]: records ordered by (period, product, customer).
#[derive(Debug, Clone)]
pub struct Aggregation {
    records: Vec<AggregatedRecord>,
    report: AggregationReport,
    fingerprint: u64,
}

impl Aggregation {
    pub fn records(&self) -> &[AggregatedRecord] {
        &self.records
    }

    pub fn report(&self) -> AggregationReport {
        self.report
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Earliest and latest period present.
    pub fn period_bounds(&self) -> Option<(Period, Period)> {
        let first = self.records.first()?.period;
        let last = self.records.last()?.period;
        Some((first, last))
    }
}

type GroupKey = (Period, Option<String>, Option<String>);

struct Group {
    measure: f64,
    attributes: Attributes,
}

/// Joins catalog attributes onto `records`, sums the measure per
/// (period, product, customer) and parses periods.
///
/// Rows with no measure or an unparseable period are dropped. Products
/// missing from the catalog keep their rows with `unknown` attributes.
pub fn aggregate(records: &[RawRecord], table: &AttributeTable) -> Aggregation {
    let repr = reconcile(
        "sales/catalog product_id",
        records.iter().filter_map(|r| r.product_id.as_deref()),
        table.product_ids(),
    );
    let attributes = table.keyed(repr);

    let mut report = AggregationReport {
        input_rows: records.len(),
        ..AggregationReport::default()
    };
    let mut groups: BTreeMap<GroupKey, Group> = BTreeMap::new();

    for record in records {
        let Some(measure) = record.measure else {
            report.missing_measure += 1;
            continue;
        };
        let Some(period) = Period::parse(&record.period) else {
            report.invalid_period += 1;
            continue;
        };

        let product_id = record
            .product_id
            .as_deref()
            .map(|id| canonical(id, repr).into_owned());
        let joined = product_id
            .as_deref()
            .and_then(|id| attributes.get(id))
            .map(|&a| a.clone());
        if joined.is_none() {
            report.unmatched_rows += 1;
        }

        groups
            .entry((period, product_id, record.customer_id.clone()))
            .and_modify(|g| g.measure += measure)
            .or_insert_with(|| Group {
                measure,
                attributes: joined.unwrap_or_else(Attributes::unknown),
            });
    }

    let records: Vec<AggregatedRecord> = groups
        .into_iter()
        .map(|((period, product_id, customer_id), group)| AggregatedRecord {
            period,
            product_id,
            customer_id,
            measure: group.measure,
            cat1: group.attributes.cat1,
            cat2: group.attributes.cat2,
            cat3: group.attributes.cat3,
            brand: group.attributes.brand,
            sku_size: group.attributes.sku_size,
        })
        .collect();
    report.output_rows = records.len();

    if report.invalid_period > 0 {
        warn!(
            rows = report.invalid_period,
            "dropped rows whose period is not in YYYYMM form"
        );
    }
    info!(
        input = report.input_rows,
        output = report.output_rows,
        missing_measure = report.missing_measure,
        unmatched = report.unmatched_rows,
        "aggregated sales"
    );

    let fingerprint = fingerprint_with(|hasher| {
        feed_slice(hasher, &records, |h, r| {
            r.period.hash(h);
            r.product_id.hash(h);
            r.customer_id.hash(h);
            feed_f64(h, r.measure);
            for dimension in Dimension::PRODUCT_ATTRIBUTES {
                r.value(dimension).hash(h);
            }
        })
    });

    Aggregation {
        records,
        report,
        fingerprint,
    }
}

/// Rounds away float noise left by summation before writing.
fn serialize_measure<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let rounded = (value * 1_000_000.0).round() / 1_000_000.0;
    serializer.serialize_f64(rounded)
}
