// Flat CSV export of collected records, and reading such a file back in for the loader and the
// call sheet.

use crate::models::{BusinessRecord, SourceKind};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};
use tracing::{debug, info};

pub const COLUMNS: &[&str] = &[
    "name",
    "address",
    "category",
    "phone",
    "website",
    "rating",
    "rating_count",
    "latitude",
    "longitude",
    "source",
    "types",
    "hours",
    "identifier",
];

/// One CSV line. Field order is column order.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
struct Row {
    name: String,
    address: String,
    category: String,
    phone: Option<String>,
    website: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    rating: Option<f64>,
    // older exports used the Places API field names
    #[serde(alias = "total_ratings", deserialize_with = "csv::invalid_option")]
    rating_count: Option<u64>,
    #[serde(alias = "lat", deserialize_with = "csv::invalid_option")]
    latitude: Option<f64>,
    #[serde(alias = "lng", alias = "lon", deserialize_with = "csv::invalid_option")]
    longitude: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    source: Option<SourceKind>,
    types: Option<String>,
    hours: Option<String>,
    #[serde(alias = "place_id")]
    identifier: String,
}

impl From<&BusinessRecord> for Row {
    fn from(r: &BusinessRecord) -> Self {
        Self {
            name: r.name.clone(),
            address: r.address.clone(),
            category: r.category.clone(),
            phone: r.phone.clone(),
            website: r.website.clone(),
            rating: Some(r.rating),
            rating_count: Some(r.rating_count),
            latitude: Some(r.lat),
            longitude: Some(r.lng),
            source: Some(r.source),
            types: r.types.clone(),
            hours: r.hours.clone(),
            identifier: r.key.clone(),
        }
    }
}

impl From<Row> for BusinessRecord {
    fn from(row: Row) -> Self {
        let source = row.source.unwrap_or_default();
        let identifier = row.identifier.trim().to_string();
        Self {
            external_id: (!source.is_html() && !identifier.is_empty())
                .then(|| identifier.clone()),
            key: identifier,
            name: row.name.trim().into(),
            address: row.address,
            category: row.category,
            phone: row.phone.filter(|v| !v.trim().is_empty()),
            website: row.website.filter(|v| !v.trim().is_empty()),
            rating: row.rating.filter(|v| v.is_finite()).unwrap_or(0.0),
            rating_count: row.rating_count.unwrap_or(0),
            lat: row.latitude.filter(|v| v.is_finite()).unwrap_or(0.0),
            lng: row.longitude.filter(|v| v.is_finite()).unwrap_or(0.0),
            source,
            types: row.types.filter(|v| !v.is_empty()),
            hours: row.hours.filter(|v| !v.is_empty()),
        }
    }
}

/// Write a header and one row per record, in the given order
pub fn write_records<W: Write>(w: W, records: &[BusinessRecord]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(w);
    wtr.write_record(COLUMNS)?;
    for r in records {
        wtr.serialize(Row::from(r))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_file<P: AsRef<Path>>(path: P, records: &[BusinessRecord]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let f = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_records(BufWriter::new(f), records)?;
    info!(path = %path.display(), rows = records.len(), "CSV written");
    Ok(())
}

/// Read records back from an export. Unparsable numbers read as 0.
pub fn read_records<R: Read>(r: R) -> Result<Vec<BusinessRecord>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(r);
    let mut records = Vec::new();
    for (i, row) in rdr.deserialize::<Row>().enumerate() {
        let row = row.with_context(|| format!("bad CSV row {}", i + 1))?;
        records.push(BusinessRecord::from(row));
    }
    debug!(rows = records.len(), "CSV read");
    Ok(records)
}

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<BusinessRecord>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_records(BufReader::new(f))
}
