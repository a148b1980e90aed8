use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::{fs, fs::File, io, path::Path};
use tracing::{debug, info};

use crate::error::ExplorerError;
use crate::fingerprint::{feed_f64, feed_slice, fingerprint_with};
use crate::schema::{Dimension, Schema};

/// Categorical product attributes joined onto sales rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attributes {
    pub cat1: Option<String>,
    pub cat2: Option<String>,
    pub cat3: Option<String>,
    pub brand: Option<String>,
    pub sku_size: Option<String>,
}

pub const UNKNOWN_ATTRIBUTE: &str = "unknown";

impl Attributes {
    /// Placeholder attributes for a product missing from the catalog.
    pub fn unknown() -> Self {
        let unknown = || Some(UNKNOWN_ATTRIBUTE.to_owned());
        Self {
            cat1: unknown(),
            cat2: unknown(),
            cat3: unknown(),
            brand: unknown(),
            sku_size: unknown(),
        }
    }

    pub fn get(&self, dimension: Dimension) -> Option<&str> {
        match dimension {
            Dimension::Cat1 => self.cat1.as_deref(),
            Dimension::Cat2 => self.cat2.as_deref(),
            Dimension::Cat3 => self.cat3.as_deref(),
            Dimension::Brand => self.brand.as_deref(),
            Dimension::SkuSize => self.sku_size.as_deref(),
            Dimension::Customer | Dimension::Product => None,
        }
    }
}

/// One transaction line from a sales file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(alias = "periodo", deserialize_with = "trim_string")]
    pub period: String,
    #[serde(default, deserialize_with = "trim_optional")]
    pub customer_id: Option<String>,
    #[serde(default, deserialize_with = "trim_optional")]
    pub product_id: Option<String>,
    #[serde(rename = "tn", alias = "measure", deserialize_with = "trim_and_parse_measure")]
    pub measure: Option<f64>,
    #[serde(default, deserialize_with = "trim_optional")]
    pub cat1: Option<String>,
    #[serde(default, deserialize_with = "trim_optional")]
    pub cat2: Option<String>,
    #[serde(default, deserialize_with = "trim_optional")]
    pub cat3: Option<String>,
    #[serde(default, deserialize_with = "trim_optional")]
    pub brand: Option<String>,
    #[serde(default, deserialize_with = "trim_optional")]
    pub sku_size: Option<String>,
}

impl RawRecord {
    pub fn attributes(&self) -> Attributes {
        Attributes {
            cat1: self.cat1.clone(),
            cat2: self.cat2.clone(),
            cat3: self.cat3.clone(),
            brand: self.brand.clone(),
            sku_size: self.sku_size.clone(),
        }
    }

    pub fn catalog_row(&self) -> CatalogRow {
        CatalogRow {
            product_id: self.product_id.clone(),
            attributes: self.attributes(),
        }
    }

    fn feed(&self, hasher: &mut DefaultHasher) {
        self.period.hash(hasher);
        self.customer_id.hash(hasher);
        self.product_id.hash(hasher);
        self.measure.is_some().hash(hasher);
        if let Some(measure) = self.measure {
            feed_f64(hasher, measure);
        }
        self.attributes().hash(hasher);
    }
}

/// One line of the product catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub product_id: Option<String>,
    pub attributes: Attributes,
}

#[derive(Debug, Deserialize)]
struct CatalogLine {
    #[serde(default, deserialize_with = "trim_optional")]
    product_id: Option<String>,
    #[serde(default, deserialize_with = "trim_optional")]
    cat1: Option<String>,
    #[serde(default, deserialize_with = "trim_optional")]
    cat2: Option<String>,
    #[serde(default, deserialize_with = "trim_optional")]
    cat3: Option<String>,
    #[serde(default, deserialize_with = "trim_optional")]
    brand: Option<String>,
    #[serde(default, deserialize_with = "trim_optional")]
    sku_size: Option<String>,
}

impl From<CatalogLine> for CatalogRow {
    fn from(line: CatalogLine) -> Self {
        CatalogRow {
            product_id: line.product_id,
            attributes: Attributes {
                cat1: line.cat1,
                cat2: line.cat2,
                cat3: line.cat3,
                brand: line.brand,
                sku_size: line.sku_size,
            },
        }
    }
}

/// A loaded sales table together with its schema and content fingerprint.
#[derive(Debug, Clone)]
pub struct RawDataset {
    schema: Schema,
    records: Vec<RawRecord>,
    fingerprint: u64,
}

impl RawDataset {
    pub fn new(schema: Schema, records: Vec<RawRecord>) -> Self {
        let fingerprint = fingerprint_with(|hasher| {
            for dimension in schema.dimensions() {
                dimension.hash(hasher);
            }
            feed_slice(hasher, &records, |h, r| r.feed(h));
        });
        Self {
            schema,
            records,
            fingerprint,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

pub fn read_sales<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<RawDataset, ExplorerError> {
    let path = path.as_ref();
    let text = read_text(path)?;
    let dataset = read_sales_from_reader(text.as_bytes(), delimiter)?;
    info!(
        path = %path.display(),
        rows = dataset.records.len(),
        "loaded sales file"
    );
    Ok(dataset)
}

pub fn read_sales_from_reader<R: io::Read>(
    reader: R,
    delimiter: u8,
) -> Result<RawDataset, ExplorerError> {
    // The CSV reader is buffered automatically.
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let schema = Schema::from_headers(rdr.headers()?)?;
    let records = rdr.deserialize::<RawRecord>().collect::<Result<Vec<_>, _>>()?;

    Ok(RawDataset::new(schema, records))
}

pub fn read_catalog<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Vec<CatalogRow>, ExplorerError> {
    let text = read_text(path.as_ref())?;
    read_catalog_from_reader(text.as_bytes(), delimiter)
}

pub fn read_catalog_from_reader<R: io::Read>(
    reader: R,
    delimiter: u8,
) -> Result<Vec<CatalogRow>, ExplorerError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    if !rdr.headers()?.iter().any(|h| h == Dimension::Product.column()) {
        return Err(ExplorerError::MissingColumn {
            column: "product_id",
            accepted: Dimension::Product.column().to_owned(),
        });
    }

    let rows = rdr
        .deserialize::<CatalogLine>()
        .map(|line| line.map(CatalogRow::from))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Creates `path` for writing, along with any missing parent directories.
pub(crate) fn create_output(path: &Path) -> Result<File, ExplorerError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
            debug!(dir = %dir.display(), "created output directory");
        }
    }
    Ok(File::create(path)?)
}

pub fn write_csv_to<W, T, I>(writer: W, rows: I) -> Result<usize, ExplorerError>
where
    W: io::Write,
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    let mut written = 0;
    for row in rows {
        wtr.serialize(row)?;
        written += 1;
    }
    wtr.flush()?;
    Ok(written)
}

/// Reads a text file as UTF-8, falling back to Latin-1 for legacy exports.
pub(crate) fn read_text(path: &Path) -> Result<String, ExplorerError> {
    let bytes = fs::read(path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            debug!(path = %path.display(), "file is not valid UTF-8, decoding as Latin-1");
            err.into_bytes().iter().map(|&b| char::from(b)).collect()
        }
    })
}

fn trim_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = String::deserialize(deserializer)?;
    Ok(s.trim().to_owned())
}

fn trim_optional<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = String::deserialize(deserializer)?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_owned()))
    }
}

/// Empty, non-numeric, and non-finite quantities all count as missing.
fn trim_and_parse_measure<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = String::deserialize(deserializer)?;
    Ok(s.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_sales() {
        let dataset = read_sales("test-inputs/sales_master.csv", b',').unwrap();
        assert_eq!(dataset.schema(), &Schema::full());

        let first = &dataset.records()[0];
        assert_eq!(
            first,
            &RawRecord {
                period: "201701".into(),
                customer_id: Some("10001".into()),
                product_id: Some("20001".into()),
                measure: Some(5.0),
                cat1: Some("HC".into()),
                cat2: Some("ROPA LAVADO".into()),
                cat3: Some("Liquido".into()),
                brand: Some("ARIEL".into()),
                sku_size: Some("3000".into()),
            }
        );
    }

    #[test]
    fn blank_and_garbage_measures_are_missing() {
        let input = "periodo,customer_id,product_id,tn\n201701,1,2,\n201701,1,2,abc\n201701,1,2,NaN\n201701,1,2, 1.5 \n";
        let dataset = read_sales_from_reader(input.as_bytes(), b',').unwrap();
        let measures: Vec<_> = dataset.records().iter().map(|r| r.measure).collect();
        assert_eq!(measures, vec![None, None, None, Some(1.5)]);
    }

    #[test]
    fn absent_optional_columns_are_backfilled() {
        let input = "period\ttn\n201701\t2\n";
        let dataset = read_sales_from_reader(input.as_bytes(), b'\t').unwrap();
        let record = &dataset.records()[0];
        assert_eq!(record.customer_id, None);
        assert_eq!(record.product_id, None);
        assert_eq!(record.attributes(), Attributes::default());
        assert!(!dataset.schema().has(Dimension::Brand));
    }

    #[test]
    fn missing_required_column_is_reported_before_reading_rows() {
        let input = "customer_id,product_id\n1,2\n";
        let err = read_sales_from_reader(input.as_bytes(), b',').unwrap_err();
        assert!(matches!(err, ExplorerError::MissingColumn { column: "period", .. }));
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = "period,tn\n201701,1\n";
        let b = "period,tn\n201701,2\n";
        let first = read_sales_from_reader(a.as_bytes(), b',').unwrap();
        let again = read_sales_from_reader(a.as_bytes(), b',').unwrap();
        let other = read_sales_from_reader(b.as_bytes(), b',').unwrap();
        assert_eq!(first.fingerprint(), again.fingerprint());
        assert_ne!(first.fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_read_catalog() {
        let rows = read_catalog("test-inputs/products.tsv", b'\t').unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].product_id.as_deref(), Some("20001"));
        assert_eq!(rows[0].attributes.brand.as_deref(), Some("ARIEL"));
    }

    #[test]
    fn catalog_without_product_id_is_rejected() {
        let err = read_catalog_from_reader("cat1\tbrand\nA\tB\n".as_bytes(), b'\t').unwrap_err();
        assert!(matches!(err, ExplorerError::MissingColumn { column: "product_id", .. }));
    }

    #[test]
    fn latin1_files_are_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.csv");
        let mut bytes = b"period,tn,brand\n201701,1,".to_vec();
        bytes.push(0xD1); // 'Ñ' in Latin-1
        bytes.extend_from_slice(b"ANDU\n");
        fs::write(&path, bytes).unwrap();

        let dataset = read_sales(&path, b',').unwrap();
        assert_eq!(dataset.records()[0].brand.as_deref(), Some("ÑANDU"));
    }

    #[test]
    fn output_parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.csv");
        let dataset = read_sales("test-inputs/sales_master.csv", b',').unwrap();

        let written = write_csv_to(create_output(&path).unwrap(), dataset.records()).unwrap();
        assert_eq!(written, dataset.records().len());

        let reread = read_sales(&path, b',').unwrap();
        assert_eq!(reread.records(), dataset.records());
    }
}
