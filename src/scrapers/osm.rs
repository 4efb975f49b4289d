// OpenStreetMap businesses through the Overpass API. One query covers the whole bounding box, so
// this source runs a single area query and never paginates.

use crate::{
    cache::Client,
    category::OSM_KEYS,
    config::BoundingBox,
    models::{CategoryHint, RawRecord, SourceKind},
    scrape::{Outcome, Page, Request, Source, SourceError},
    util::non_blank,
};
use lazy_static::lazy_static;
use reqwest::StatusCode;
use serde::Deserialize;
use std::{collections::HashMap, time::Duration};
use tracing::debug;
use url::Url;

/// Overpass answers big boxes slowly
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

lazy_static! {
    static ref INTERPRETER_URL: Url =
        Url::parse("https://overpass-api.de/api/interpreter").unwrap();
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
struct Element {
    #[serde(rename = "type")]
    kind: String,
    id: u64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<Center>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Center {
    lat: f64,
    lon: f64,
}

/// Named nodes and ways carrying any of the business keys
pub fn overpass_query(bbox: &BoundingBox) -> String {
    let mut q = String::from("[out:json][timeout:120];\n(\n");
    for key in OSM_KEYS {
        for kind in ["node", "way"] {
            q.push_str(&format!("  {kind}[\"name\"][\"{key}\"]({bbox});\n"));
        }
    }
    q.push_str(");\nout center body;\n");
    q
}

impl Element {
    fn tag(&self, key: &str) -> Option<String> {
        non_blank(self.tags.get(key).map(String::as_str))
    }

    fn first_tag(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.tag(k))
    }

    fn address(&self, city: &str, state: &str) -> Option<String> {
        let street = self.tag("addr:street")?;
        let city = self.tag("addr:city").unwrap_or_else(|| city.into());
        let state = self.tag("addr:state").unwrap_or_else(|| state.into());
        Some(match self.tag("addr:housenumber") {
            Some(no) => {
                let postcode = self.tag("addr:postcode").unwrap_or_default();
                format!("{no} {street}, {city}, {state} {postcode}")
                    .trim()
                    .to_string()
            }
            None => format!("{street}, {city}, {state}"),
        })
    }

    fn into_raw(self, city: &str, state: &str) -> RawRecord {
        let tags = OSM_KEYS.iter().filter_map(|k| self.tag(k)).collect();
        let (lat, lng) = match (&self.lat, &self.lon, &self.center) {
            (Some(lat), Some(lon), _) => (Some(*lat), Some(*lon)),
            (_, _, Some(c)) => (Some(c.lat), Some(c.lon)),
            _ => (None, None),
        };
        RawRecord {
            external_id: Some(format!("osm:{}/{}", self.kind, self.id)),
            name: self.tag("name"),
            address: self.address(city, state),
            category: CategoryHint::Tags(tags),
            phone: self.first_tag(&["phone", "contact:phone"]),
            website: self.first_tag(&["website", "contact:website", "url"]),
            lat,
            lng,
            ..RawRecord::new(SourceKind::Osm)
        }
    }
}

/// Elements to records. `city` and `state` fill in what the address tags leave out.
pub fn parse(body: &str, city: &str, state: &str) -> Result<Vec<RawRecord>, SourceError> {
    let resp: Response = serde_json::from_str(body)?;
    Ok(resp
        .elements
        .into_iter()
        .map(|e| e.into_raw(city, state))
        .collect())
}

#[derive(Clone)]
pub struct Osm {
    client: Client,
    url: Url,
    bbox: BoundingBox,
    city: String,
    state: String,
}

impl Osm {
    pub fn new(client: Client, bbox: BoundingBox, city: &str, state: &str) -> Self {
        Self {
            client,
            url: INTERPRETER_URL.clone(),
            bbox,
            city: city.into(),
            state: state.into(),
        }
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = url;
        self
    }
}

impl Source for Osm {
    fn kind(&self) -> SourceKind {
        SourceKind::Osm
    }

    fn name(&self) -> &'static str {
        "Overpass"
    }

    async fn fetch(&self, _req: &Request<'_>) -> Result<Outcome, SourceError> {
        let query = overpass_query(&self.bbox);
        let resp = self
            .client
            .post_form(self.url.clone(), &[("data", query.as_str())], REQUEST_TIMEOUT)
            .await?;
        // 429 when this client has too many slots in use, 504 when the server is overloaded
        if resp.status == StatusCode::TOO_MANY_REQUESTS
            || resp.status == StatusCode::GATEWAY_TIMEOUT
        {
            return Ok(Outcome::QuotaExceeded);
        }
        let records = parse(&resp.into_success()?, &self.city, &self.state)?;
        debug!(elements = records.len(), bbox = %self.bbox, "Overpass answered");
        Ok(Outcome::Page(Page::new(records, None)))
    }
}
