//! Product catalog deduplication: one attribute row per product id.

use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::debug;

use crate::coerce::{canonical, IdRepr};
use crate::records::{Attributes, CatalogRow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRow {
    pub product_id: String,
    pub attributes: Attributes,
}

/// Deduplicated catalog. Row order follows first appearance in the input.
#[derive(Debug, Clone, Default)]
pub struct AttributeTable {
    rows: Vec<AttributeRow>,
    index: HashMap<String, usize>,
    discarded: usize,
}

impl AttributeTable {
    /// Keeps the first row seen for every product id; later duplicates and
    /// rows without a product id are discarded.
    pub fn build(rows: impl IntoIterator<Item = CatalogRow>) -> Self {
        let mut table = AttributeTable::default();
        for row in rows {
            let Some(product_id) = row.product_id else {
                continue;
            };
            match table.index.entry(product_id) {
                Entry::Occupied(_) => table.discarded += 1,
                Entry::Vacant(slot) => {
                    let product_id = slot.key().clone();
                    slot.insert(table.rows.len());
                    table.rows.push(AttributeRow {
                        product_id,
                        attributes: row.attributes,
                    });
                }
            }
        }
        if table.discarded > 0 {
            debug!(
                products = table.rows.len(),
                discarded = table.discarded,
                "resolved duplicate catalog rows, first occurrence kept"
            );
        }
        table
    }

    pub fn get(&self, product_id: &str) -> Option<&Attributes> {
        self.index.get(product_id).map(|&i| &self.rows[i].attributes)
    }

    pub fn rows(&self) -> &[AttributeRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of duplicate rows dropped while building.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn product_ids(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.product_id.as_str())
    }

    /// Lookup keyed by canonical id. When canonicalization folds two ids
    /// together the earlier row still wins.
    pub fn keyed(&self, repr: IdRepr) -> HashMap<Cow<'_, str>, &Attributes> {
        let mut keyed = HashMap::with_capacity(self.rows.len());
        for row in &self.rows {
            keyed
                .entry(canonical(&row.product_id, repr))
                .or_insert(&row.attributes);
        }
        keyed
    }
}

/// Every row whose product id occurs more than once, ordered by id and then
/// by input position.
pub fn duplicated_rows(rows: &[CatalogRow]) -> Vec<&CatalogRow> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for id in rows.iter().filter_map(|r| r.product_id.as_deref()) {
        *counts.entry(id).or_default() += 1;
    }
    let mut duplicated: Vec<&CatalogRow> = rows
        .iter()
        .filter(|r| {
            r.product_id
                .as_deref()
                .is_some_and(|id| counts.get(id).is_some_and(|&n| n > 1))
        })
        .collect();
    duplicated.sort_by(|a, b| a.product_id.cmp(&b.product_id));
    duplicated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, brand: &str) -> CatalogRow {
        CatalogRow {
            product_id: Some(id.to_owned()),
            attributes: Attributes {
                brand: Some(brand.to_owned()),
                ..Attributes::default()
            },
        }
    }

    #[test]
    fn first_occurrence_wins() {
        let table = AttributeTable::build(vec![row("P1", "A"), row("P1", "B")]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("P1").unwrap().brand.as_deref(), Some("A"));
        assert_eq!(table.discarded(), 1);
    }

    #[test]
    fn one_row_per_distinct_product() {
        let rows = vec![
            row("P1", "A"),
            row("P2", "B"),
            row("P1", "C"),
            row("P3", "D"),
            row("P2", "E"),
            row("P2", "F"),
        ];
        let table = AttributeTable::build(rows);
        let ids: Vec<_> = table.product_ids().collect();
        assert_eq!(ids, vec!["P1", "P2", "P3"]);
        assert_eq!(table.discarded(), 3);
    }

    #[test]
    fn rows_without_product_id_are_skipped() {
        let mut orphan = row("X", "Z");
        orphan.product_id = None;
        let table = AttributeTable::build(vec![orphan, row("P1", "A")]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.discarded(), 0);
    }

    #[test]
    fn keyed_lookup_uses_canonical_ids() {
        let table = AttributeTable::build(vec![row("001", "A"), row("1", "B"), row("2", "C")]);
        let keyed = table.keyed(IdRepr::Integer);
        assert_eq!(keyed.len(), 2);
        assert_eq!(keyed["1"].brand.as_deref(), Some("A"));

        let keyed = table.keyed(IdRepr::Text);
        assert_eq!(keyed.len(), 3);
    }

    #[test]
    fn duplicated_rows_are_grouped_by_id() {
        let rows = vec![row("P2", "A"), row("P1", "B"), row("P2", "C"), row("P3", "D")];
        let duplicated = duplicated_rows(&rows);
        let brands: Vec<_> = duplicated
            .iter()
            .map(|r| r.attributes.brand.as_deref().unwrap())
            .collect();
        assert_eq!(brands, vec!["A", "C"]);
    }
}
