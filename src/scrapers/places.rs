// Google Places text search, and place details for the enrichment pass.
//
// Text search answers with HTTP 200 for almost everything, including quota exhaustion, so the
// interesting status is the one in the JSON body.

use crate::{
    cache::Client,
    enrich::{DetailSource, Details},
    models::{RawRecord, SourceKind},
    scrape::{Outcome, Page, Request, Source, SourceError},
};
use lazy_static::lazy_static;
use reqwest::{StatusCode, header::HeaderMap};
use serde::Deserialize;
use tracing::trace;
use url::Url;

static DETAIL_FIELDS: &str = "formatted_phone_number,website,opening_hours";
/// How many of the place's type tags are kept
const MAX_TYPES: usize = 5;

lazy_static! {
    static ref BASE_URL: Url = Url::parse("https://maps.googleapis.com/maps/api/place/").unwrap();
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<PlaceResult>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaceResult {
    place_id: Option<String>,
    name: Option<String>,
    formatted_address: Option<String>,
    rating: Option<f64>,
    user_ratings_total: Option<u64>,
    geometry: Option<Geometry>,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Option<LatLng>,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    status: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    result: Option<DetailsResult>,
}

#[derive(Debug, Deserialize)]
struct DetailsResult {
    formatted_phone_number: Option<String>,
    website: Option<String>,
    opening_hours: Option<OpeningHours>,
}

#[derive(Debug, Deserialize)]
struct OpeningHours {
    #[serde(default)]
    weekday_text: Vec<String>,
}

impl PlaceResult {
    /// Results without a place id can't be looked up again, and are left out
    fn into_raw(self) -> Option<RawRecord> {
        let external_id = self.place_id.filter(|v| !v.is_empty())?;
        let loc = self.geometry.and_then(|g| g.location);
        let types = self
            .types
            .iter()
            .take(MAX_TYPES)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",");
        Some(RawRecord {
            external_id: Some(external_id),
            name: self.name,
            address: self.formatted_address,
            rating: self.rating,
            rating_count: self.user_ratings_total,
            lat: loc.as_ref().map(|l| l.lat),
            lng: loc.as_ref().map(|l| l.lng),
            types: Some(types).filter(|v| !v.is_empty()),
            ..RawRecord::new(SourceKind::Places)
        })
    }
}

pub fn parse_search(body: &str) -> Result<Outcome, SourceError> {
    let resp: SearchResponse = serde_json::from_str(body)?;
    match resp.status.as_str() {
        "OK" | "ZERO_RESULTS" => {}
        "OVER_QUERY_LIMIT" => return Ok(Outcome::QuotaExceeded),
        _ => {
            return Err(SourceError::Api {
                status: resp.status,
                message: resp.error_message.unwrap_or_default(),
            });
        }
    }
    let records = resp
        .results
        .into_iter()
        .filter_map(PlaceResult::into_raw)
        .collect();
    Ok(Outcome::Page(Page::new(
        records,
        resp.next_page_token.filter(|v| !v.is_empty()),
    )))
}

pub fn parse_details(body: &str) -> Result<Details, SourceError> {
    let resp: DetailsResponse = serde_json::from_str(body)?;
    if let Some(status) = resp.status.filter(|s| s != "OK") {
        return Err(SourceError::Api {
            status,
            message: resp.error_message.unwrap_or_default(),
        });
    }
    let Some(r) = resp.result else {
        return Ok(Details::default());
    };
    let hours = match r.opening_hours {
        Some(oh) => Some(serde_json::to_string(&oh.weekday_text)?),
        None => None,
    };
    Ok(Details {
        phone: r.formatted_phone_number.filter(|v| !v.is_empty()),
        website: r.website.filter(|v| !v.is_empty()),
        hours,
    })
}

#[derive(Clone)]
pub struct Places {
    client: Client,
    key: String,
    base: Url,
    /// Appended to every search term: "plumber in Lakeland FL"
    area: String,
}

impl Places {
    pub fn new(client: Client, key: &str, city: &str, state: &str) -> Self {
        Self {
            client,
            key: key.into(),
            base: BASE_URL.clone(),
            area: format!("{city} {state}"),
        }
    }

    /// Point at another host, e.g. a local mock. Must end with a slash.
    pub fn with_base(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn search_url(&self, req: &Request<'_>) -> Result<Url, SourceError> {
        let mut url = self.base.join("textsearch/json")?;
        {
            let mut q = url.query_pairs_mut();
            match req {
                Request::Initial(query) => {
                    q.append_pair("query", &format!("{} in {}", query.term, self.area))
                        .append_pair(
                            "location",
                            &format!("{},{}", query.anchor.lat, query.anchor.lng),
                        )
                        .append_pair("radius", &query.anchor.radius_m.to_string());
                }
                Request::Continue(token) => {
                    q.append_pair("pagetoken", token);
                }
            }
            q.append_pair("key", &self.key);
        }
        Ok(url)
    }
}

impl Source for Places {
    fn kind(&self) -> SourceKind {
        SourceKind::Places
    }

    fn name(&self) -> &'static str {
        "Places"
    }

    async fn fetch(&self, req: &Request<'_>) -> Result<Outcome, SourceError> {
        let url = self.search_url(req)?;
        let resp = self.client.get(url, HeaderMap::new()).await?;
        if resp.status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Outcome::QuotaExceeded);
        }
        let outcome = parse_search(&resp.into_success()?)?;
        if let Outcome::Page(p) = &outcome {
            trace!(
                records = p.records.len(),
                more = p.next.is_some(),
                "Text search page"
            );
        }
        Ok(outcome)
    }
}

impl DetailSource for Places {
    fn kind(&self) -> SourceKind {
        SourceKind::Places
    }

    async fn details(&self, external_id: &str) -> Result<Details, SourceError> {
        let mut url = self.base.join("details/json")?;
        url.query_pairs_mut()
            .append_pair("place_id", external_id)
            .append_pair("fields", DETAIL_FIELDS)
            .append_pair("key", &self.key);
        let body = self
            .client
            .get(url, HeaderMap::new())
            .await?
            .into_success()?;
        parse_details(&body)
    }
}
