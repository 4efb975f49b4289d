// BusinessRecord is the one normalized entity every source is mapped into, and the shape the
// exporter, the call sheet and the DB loader consume. RawRecord is the loose intermediate the
// source parsers emit before normalization.

use chrono::{DateTime, Local};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

/// Where a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
pub enum SourceKind {
    /// Google Places text search
    #[default]
    #[serde(rename = "api-primary")]
    #[value(name = "places")]
    Places,
    /// REST contact table
    #[serde(rename = "api-secondary")]
    #[value(name = "contacts")]
    Contacts,
    /// Yelp search pages
    #[serde(rename = "html-scrape-a")]
    #[value(name = "yelp")]
    Yelp,
    /// Yellow Pages search pages
    #[serde(rename = "html-scrape-b")]
    #[value(name = "yellow-pages")]
    YellowPages,
    /// OpenStreetMap, via Overpass
    #[serde(rename = "geo-index")]
    #[value(name = "osm")]
    Osm,
}

impl SourceKind {
    /// Sources whose fields are pulled out of rendered HTML, and may carry markup
    pub fn is_html(&self) -> bool {
        matches!(self, Self::Yelp | Self::YellowPages)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Places => "api-primary",
            Self::Contacts => "api-secondary",
            Self::Yelp => "html-scrape-a",
            Self::YellowPages => "html-scrape-b",
            Self::Osm => "geo-index",
        }
    }
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// How a source describes the category of a record, before translation into the controlled
/// vocabulary.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CategoryHint {
    #[default]
    None,
    /// Source tags, in priority order. The first one found in the vocabulary wins.
    Tags(Vec<String>),
    /// The free-text search term that produced the record
    Term(String),
    /// Free-text niche/industry description
    Niche(String),
}

/// Source-specific record, as parsed from a payload. Everything is optional; the normalizer
/// decides what is required and what gets coerced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawRecord {
    pub source: SourceKind,
    pub external_id: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub category: CategoryHint,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub rating: Option<f64>,
    pub rating_count: Option<u64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Comma separated source type tags
    pub types: Option<String>,
    pub hours: Option<String>,
}

impl RawRecord {
    pub fn new(source: SourceKind) -> Self {
        Self {
            source,
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct BusinessRecord {
    /// Identity key: the external id if the source has one, otherwise a hash of name and
    /// address
    pub key: String,
    /// Source assigned id, absent for scraped HTML
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub name: String,
    /// Street address, or a coarse city level fallback
    pub address: String,
    /// Label from the controlled vocabulary
    pub category: String,
    pub phone: Option<String>,
    pub website: Option<String>,
    /// 0.0 - 5.0, 0.0 when unknown
    pub rating: f64,
    pub rating_count: u64,
    pub lat: f64,
    pub lng: f64,
    pub source: SourceKind,
    pub types: Option<String>,
    /// JSON list of weekday opening hours
    pub hours: Option<String>,
}

impl BusinessRecord {
    pub fn has_phone(&self) -> bool {
        self.phone.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    pub fn has_website(&self) -> bool {
        self.website.as_deref().is_some_and(|v| !v.trim().is_empty())
    }
}

impl Display for BusinessRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} ({}), {}", self.name, self.category, self.address)
    }
}

/// BusinessRows maps a list of BusinessRecord into lists of all its DB columns.
/// The intended use is together with Postgres' UNNEST, to be able to do batch insert of many
/// records in one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusinessRows {
    pub ids: Vec<Uuid>,
    pub names: Vec<String>,
    pub addresses: Vec<String>,
    pub categories: Vec<String>,
    pub phones: Vec<Option<String>>,
    pub websites: Vec<Option<String>>,
    pub cities: Vec<String>,
    pub states: Vec<String>,
    pub ratings: Vec<f32>,
    pub rating_counts: Vec<i32>,
    pub lats: Vec<f64>,
    pub lngs: Vec<f64>,
    pub created_ats: Vec<DateTime<Local>>,
}

impl BusinessRows {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            ids: Vec::with_capacity(cap),
            names: Vec::with_capacity(cap),
            addresses: Vec::with_capacity(cap),
            categories: Vec::with_capacity(cap),
            phones: Vec::with_capacity(cap),
            websites: Vec::with_capacity(cap),
            cities: Vec::with_capacity(cap),
            states: Vec::with_capacity(cap),
            ratings: Vec::with_capacity(cap),
            rating_counts: Vec::with_capacity(cap),
            lats: Vec::with_capacity(cap),
            lngs: Vec::with_capacity(cap),
            created_ats: Vec::with_capacity(cap),
        }
    }

    pub fn push(&mut self, r: &BusinessRecord, city: &str, state: &str) {
        let now = Local::now();
        self.ids.push(Uuid::new_v4());
        self.names.push(r.name.clone());
        self.addresses.push(r.address.clone());
        self.categories.push(r.category.clone());
        self.phones.push(r.phone.clone().filter(|v| !v.is_empty()));
        self.websites.push(r.website.clone().filter(|v| !v.is_empty()));
        self.cities.push(city.into());
        self.states.push(state.into());
        self.ratings.push(r.rating as f32);
        // saturate rather than wrap, the column is a plain integer
        self.rating_counts
            .push(i32::try_from(r.rating_count).unwrap_or(i32::MAX));
        self.lats.push(r.lat);
        self.lngs.push(r.lng);
        self.created_ats.push(now);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Build rows for the given records, all placed in the same city
    pub fn from_records(records: &[BusinessRecord], city: &str, state: &str) -> Self {
        let mut rows = Self::with_capacity(records.len());
        records.iter().for_each(|r| rows.push(r, city, state));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> BusinessRecord {
        BusinessRecord {
            key: name.to_lowercase(),
            name: name.into(),
            address: "1 Main St".into(),
            category: "Plumbing".into(),
            ..Default::default()
        }
    }

    #[test]
    fn source_kind_serializes_to_tag() {
        let j = serde_json::to_value(SourceKind::YellowPages).unwrap();
        assert_eq!(j, serde_json::json!("html-scrape-b"));
        let k: SourceKind = serde_json::from_value(serde_json::json!("geo-index")).unwrap();
        assert_eq!(k, SourceKind::Osm);
        assert_eq!("api-primary", SourceKind::Places.to_string());
    }

    #[test]
    fn html_sources() {
        assert!(SourceKind::Yelp.is_html());
        assert!(SourceKind::YellowPages.is_html());
        assert!(!SourceKind::Places.is_html());
        assert!(!SourceKind::Osm.is_html());
    }

    #[test]
    fn has_phone_ignores_blank() {
        let mut r = record("Joe's HVAC");
        assert!(!r.has_phone());
        r.phone = Some("  ".into());
        assert!(!r.has_phone());
        r.phone = Some("(863) 555-0101".into());
        assert!(r.has_phone());
    }

    #[test]
    fn rows_are_columnar() {
        let mut a = record("A");
        a.phone = Some(String::new());
        a.rating_count = u64::MAX;
        let mut b = record("B");
        b.website = Some("https://b.example".into());
        b.rating = 4.5;

        let rows = BusinessRows::from_records(&[a, b], "Lakeland", "FL");
        assert_eq!(2, rows.len());
        assert_eq!(vec!["A", "B"], rows.names);
        assert_eq!(vec![None, None], rows.phones);
        assert_eq!(Some("https://b.example".to_string()), rows.websites[1]);
        assert_eq!(i32::MAX, rows.rating_counts[0]);
        assert_eq!(4.5, rows.ratings[1]);
        assert_eq!(vec!["Lakeland", "Lakeland"], rows.cities);
        assert_ne!(rows.ids[0], rows.ids[1]);
    }
}
