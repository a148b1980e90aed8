//! Builds the master sales file the explorer reads: sell-in rows with catalog
//! attributes joined on, optionally restricted to a list of products.
//!
//! Rows travel as raw CSV records, so every input column and value reaches the
//! output untouched apart from the catalog attributes.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;
use tracing::{info, warn};

use crate::catalog::{duplicated_rows, AttributeTable};
use crate::coerce::{canonical, reconcile};
use crate::error::ExplorerError;
use crate::records::{create_output, read_catalog, read_text, Attributes};
use crate::schema::Dimension;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MasterSummary {
    pub sales_rows: usize,
    pub catalog_rows: usize,
    pub duplicated_catalog_rows: usize,
    pub unmatched_rows: usize,
    pub written: usize,
}

/// A delimited file held as its header row plus raw records.
#[derive(Debug, Clone)]
struct Table {
    headers: StringRecord,
    rows: Vec<StringRecord>,
}

impl Table {
    fn read(path: &Path, delimiter: u8) -> Result<Self, ExplorerError> {
        let text = read_text(path)?;
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::Headers)
            .from_reader(text.as_bytes());
        let headers = rdr.headers()?.clone();
        let rows = rdr.records().collect::<Result<Vec<_>, _>>()?;
        Ok(Self { headers, rows })
    }

    fn product_column(&self) -> Result<usize, ExplorerError> {
        let column = Dimension::Product.column();
        self.headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| ExplorerError::MissingColumn {
                column: "product_id",
                accepted: column.to_owned(),
            })
    }

    fn write(path: &Path, headers: &StringRecord, rows: &[StringRecord]) -> Result<usize, ExplorerError> {
        let mut wtr = csv::Writer::from_writer(create_output(path)?);
        wtr.write_record(headers)?;
        for row in rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        info!(path = %path.display(), rows = rows.len(), "wrote csv");
        Ok(rows.len())
    }
}

fn product_id(row: &StringRecord, column: usize) -> Option<&str> {
    row.get(column).map(str::trim).filter(|id| !id.is_empty())
}

/// Joins deduplicated catalog attributes onto `sales` (tab separated) and
/// writes the result as CSV to `output`.
pub fn build_master(sales: &Path, products: &Path, output: &Path) -> Result<MasterSummary, ExplorerError> {
    let sales = Table::read(sales, b'\t')?;
    let product = sales.product_column()?;
    let catalog = read_catalog(products, b'\t')?;

    let duplicated = duplicated_rows(&catalog);
    for row in &duplicated {
        info!(
            product_id = row.product_id.as_deref().unwrap_or_default(),
            cat1 = row.attributes.cat1.as_deref().unwrap_or_default(),
            brand = row.attributes.brand.as_deref().unwrap_or_default(),
            sku_size = row.attributes.sku_size.as_deref().unwrap_or_default(),
            "duplicated catalog row"
        );
    }
    let duplicated_catalog_rows = duplicated.len();
    let catalog_rows = catalog.len();

    let table = AttributeTable::build(catalog);
    let (headers, joined, unmatched_rows) = join_attributes(&sales, product, &table);
    let written = Table::write(output, &headers, &joined)?;

    Ok(MasterSummary {
        sales_rows: sales.rows.len(),
        catalog_rows,
        duplicated_catalog_rows,
        unmatched_rows,
        written,
    })
}

/// Output header plus the position of each product attribute in it. Attribute
/// columns the sales file already has are overwritten in place, the rest are
/// appended.
fn attribute_slots(headers: &StringRecord) -> (StringRecord, [usize; 5]) {
    let mut joined = headers.clone();
    let slots = Dimension::PRODUCT_ATTRIBUTES.map(|dimension| {
        match headers.iter().position(|h| h == dimension.column()) {
            Some(slot) => slot,
            None => {
                joined.push_field(dimension.column());
                joined.len() - 1
            }
        }
    });
    (joined, slots)
}

fn join_row(row: &StringRecord, slots: &[usize; 5], width: usize, attributes: Option<&Attributes>) -> StringRecord {
    let mut fields: Vec<&str> = row.iter().collect();
    fields.resize(width, "");
    for (&slot, dimension) in slots.iter().zip(Dimension::PRODUCT_ATTRIBUTES) {
        fields[slot] = attributes.and_then(|a| a.get(dimension)).unwrap_or_default();
    }
    StringRecord::from(fields)
}

/// Left join by product id. Rows without a catalog match get empty
/// attributes. Returns the output header, the joined rows and the number of
/// unmatched rows.
fn join_attributes(sales: &Table, product: usize, table: &AttributeTable) -> (StringRecord, Vec<StringRecord>, usize) {
    let repr = reconcile(
        "sales/catalog product_id",
        sales.rows.iter().filter_map(|r| product_id(r, product)),
        table.product_ids(),
    );
    let keyed = table.keyed(repr);
    let (headers, slots) = attribute_slots(&sales.headers);

    let mut unmatched = 0;
    let mut joined = Vec::with_capacity(sales.rows.len());
    for row in &sales.rows {
        let attributes = product_id(row, product)
            .and_then(|id| keyed.get(&*canonical(id, repr)))
            .copied();
        if attributes.is_none() {
            unmatched += 1;
        }
        joined.push(join_row(row, &slots, headers.len(), attributes));
    }
    (headers, joined, unmatched)
}

/// Reads a one-column list of product ids. A file whose only header is not
/// `product_id` is assumed to hold product ids anyway.
pub fn read_product_list(path: &Path) -> Result<Vec<String>, ExplorerError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(File::open(path)?);

    let headers = rdr.headers()?.clone();
    let column = match headers.iter().position(|h| h == Dimension::Product.column()) {
        Some(column) => column,
        None if headers.len() == 1 => {
            warn!(
                path = %path.display(),
                header = &headers[0],
                "product list has no product_id header, using its only column"
            );
            0
        }
        None => return Err(ExplorerError::MissingProductList(path.display().to_string())),
    };

    let mut ids = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if let Some(id) = record.get(column).filter(|id| !id.is_empty()) {
            ids.push(id.to_owned());
        }
    }
    Ok(ids)
}

/// Keeps the rows whose product id (at `column`) is in `wanted`.
fn retain_products(rows: Vec<StringRecord>, column: usize, wanted: &[String]) -> Vec<StringRecord> {
    let repr = reconcile(
        "master/product list product_id",
        rows.iter().filter_map(|r| product_id(r, column)),
        wanted.iter().map(String::as_str),
    );
    let wanted: HashSet<String> = wanted.iter().map(|id| canonical(id, repr).into_owned()).collect();

    rows.into_iter()
        .filter(|r| product_id(r, column).is_some_and(|id| wanted.contains(&*canonical(id, repr))))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProductFilterSummary {
    pub input_rows: usize,
    pub wanted_products: usize,
    pub written: usize,
}

/// Restricts the master CSV at `master` to the products listed in `list`.
/// Only a `product_id` column is required; kept rows are written verbatim.
pub fn filter_products(master: &Path, list: &Path, output: &Path) -> Result<ProductFilterSummary, ExplorerError> {
    let master = Table::read(master, b',')?;
    let product = master.product_column()?;
    let wanted = read_product_list(list)?;
    let wanted_products = wanted.iter().collect::<HashSet<_>>().len();

    let input_rows = master.rows.len();
    let kept = retain_products(master.rows, product, &wanted);
    info!(
        input_rows,
        wanted_products,
        kept = kept.len(),
        "filtered master file by product list"
    );
    let written = Table::write(output, &master.headers, &kept)?;

    Ok(ProductFilterSummary {
        input_rows,
        wanted_products,
        written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::read_sales;
    use std::fs;

    fn read_back(path: &Path) -> Table {
        Table::read(path, b',').unwrap()
    }

    fn column(table: &Table, name: &str) -> usize {
        table.headers.iter().position(|h| h == name).unwrap()
    }

    #[test]
    fn test_build_master() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out/master.csv");
        let summary = build_master(
            Path::new("test-inputs/sell_in.tsv"),
            Path::new("test-inputs/products.tsv"),
            &output,
        )
        .unwrap();

        assert_eq!(
            summary,
            MasterSummary {
                sales_rows: 5,
                catalog_rows: 4,
                duplicated_catalog_rows: 2,
                unmatched_rows: 1,
                written: 5,
            }
        );

        let master = read_sales(&output, b',').unwrap();
        let rows = master.records();
        assert_eq!(rows[0].brand.as_deref(), Some("ARIEL"));
        assert_eq!(rows[0].cat1.as_deref(), Some("HC"));
        // 20004 is not in the catalog.
        let orphan = rows.iter().find(|r| r.product_id.as_deref() == Some("20004")).unwrap();
        assert_eq!(orphan.brand, None);
    }

    #[test]
    fn master_keeps_every_sell_in_column() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("master.csv");
        build_master(
            Path::new("test-inputs/sell_in.tsv"),
            Path::new("test-inputs/products.tsv"),
            &output,
        )
        .unwrap();

        let master = read_back(&output);
        let headers: Vec<_> = master.headers.iter().collect();
        assert_eq!(
            headers,
            [
                "periodo",
                "customer_id",
                "product_id",
                "plan_precios_cuidados",
                "cust_request_qty",
                "cust_request_tn",
                "tn",
                "cat1",
                "cat2",
                "cat3",
                "brand",
                "sku_size",
            ]
        );
        let row = &master.rows[1];
        assert_eq!(&row[column(&master, "cust_request_qty")], "4");
        assert_eq!(&row[column(&master, "tn")], "2.25");
        assert_eq!(&row[column(&master, "brand")], "SKIP");
    }

    #[test]
    fn existing_attribute_columns_are_overwritten_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let sales = dir.path().join("sell_in.tsv");
        fs::write(&sales, "brand\tproduct_id\ttn\nSTALE\t20002\tn/a\nSTALE\t99999\t1\n").unwrap();
        let output = dir.path().join("master.csv");

        let summary = build_master(&sales, Path::new("test-inputs/products.tsv"), &output).unwrap();
        assert_eq!(summary.unmatched_rows, 1);

        let master = read_back(&output);
        let headers: Vec<_> = master.headers.iter().collect();
        assert_eq!(headers, ["brand", "product_id", "tn", "cat1", "cat2", "cat3", "sku_size"]);
        assert_eq!(&master.rows[0][0], "SKIP");
        // Measures are not parsed on the way through.
        assert_eq!(&master.rows[0][2], "n/a");
        assert_eq!(&master.rows[1][0], "");
        assert_eq!(&master.rows[1][3], "");
    }

    #[test]
    fn sell_in_without_product_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sales = dir.path().join("sell_in.tsv");
        fs::write(&sales, "periodo\ttn\n201701\t1\n").unwrap();

        let result = build_master(&sales, Path::new("test-inputs/products.tsv"), &dir.path().join("m.csv"));
        assert!(matches!(
            result,
            Err(ExplorerError::MissingColumn { column: "product_id", .. })
        ));
    }

    #[test]
    fn product_list_filters_master_rows() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("filtered.csv");
        let summary = filter_products(
            Path::new("test-inputs/sales_master.csv"),
            Path::new("test-inputs/products_to_predict.txt"),
            &output,
        )
        .unwrap();

        assert_eq!(summary.input_rows, 11);
        assert_eq!(summary.wanted_products, 2);
        let kept = read_back(&output);
        assert_eq!(kept.rows.len(), summary.written);
        let product = column(&kept, "product_id");
        assert!(kept.rows.iter().all(|r| matches!(&r[product], "20001" | "20003")));
        // The unparseable period and the blank measure are carried as written.
        assert!(kept.rows.iter().any(|r| &r[1] == "2017-03"));
        assert_eq!(kept.headers.len(), 13);
    }

    #[test]
    fn product_filter_needs_only_a_product_id_column() {
        let dir = tempfile::tempdir().unwrap();
        let master = dir.path().join("master.csv");
        fs::write(&master, "note,product_id\nkeep me,20001\ndrop me,20002\nalso kept,20003\n").unwrap();
        let output = dir.path().join("filtered.csv");

        let summary = filter_products(&master, Path::new("test-inputs/products_to_predict.txt"), &output).unwrap();
        assert_eq!(summary.written, 2);
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "note,product_id\nkeep me,20001\nalso kept,20003\n"
        );
    }

    #[test]
    fn product_list_without_header_name_uses_only_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        fs::write(&path, "ids\n20001\n\n20002\n").unwrap();
        assert_eq!(read_product_list(&path).unwrap(), vec!["20001", "20002"]);
    }

    #[test]
    fn product_list_with_several_unknown_columns_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        fs::write(&path, "a,b\n1,2\n").unwrap();
        assert!(matches!(
            read_product_list(&path),
            Err(ExplorerError::MissingProductList(_))
        ));
    }

    fn rows(ids: &[&str]) -> Vec<StringRecord> {
        ids.iter().map(|id| StringRecord::from(vec!["201701", *id])).collect()
    }

    #[test]
    fn integer_ids_match_across_formatting() {
        let kept = retain_products(rows(&["20001", "20002"]), 1, &["020001.0".to_owned()]);
        assert_eq!(kept, rows(&["20001"]));
    }

    #[test]
    fn mixed_ids_compare_as_text() {
        let kept = retain_products(
            rows(&["20001", "X1"]),
            1,
            &["20001".to_owned(), "020001".to_owned()],
        );
        // The master side has a non-integer id, so "020001" is not folded.
        assert_eq!(kept, rows(&["20001"]));
    }
}
