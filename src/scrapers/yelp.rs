// Yelp public search pages. Listings come from the JSON-LD `ItemList` when the page has one;
// otherwise business links are paired by position with phone numbers and street addresses
// found anywhere in the page.

use crate::{
    cache::Client,
    models::{RawRecord, SourceKind},
    scrape::{Outcome, Page, Request, Source, SourceError},
    util::*,
};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

/// The positional fallback only trusts the top of the page
const MAX_FALLBACK: usize = 20;

lazy_static! {
    static ref SEARCH_URL: Url = Url::parse("https://www.yelp.com/search").unwrap();
    static ref SEL_JSON_LD: Selector = sel(r#"script[type="application/ld+json"]"#);
    static ref SEL_BIZ_LINK: Selector = sel(r#"a[href^="/biz/"]"#);
    static ref SEL_NEXT: Selector = sel(r#"link[rel="next"], a.next-link"#);
    static ref RE_PHONE: Regex = Regex::new(r"\((\d{3})\)\s*(\d{3})-(\d{4})").unwrap();
    static ref RE_STREET: Regex = Regex::new(
        r"(\d+\s+[A-Z][a-zA-Z\s]+(?:St|Ave|Blvd|Dr|Rd|Ln|Ct|Way|Hwy|Pkwy)[^<,]*)"
    )
    .unwrap();
}

/// Number, or a string starting with one ("4.5 star rating")
fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(parse_float(s)).filter(|v| *v > 0.0),
        _ => None,
    }
}

/// Listing items without a name are kept nameless, so they are counted when collected
fn from_item(item: &Value) -> Option<RawRecord> {
    if !item.is_object() {
        return None;
    }
    let rating = item.get("aggregateRating").filter(|v| v.is_object());
    Some(RawRecord {
        name: item.get("name").and_then(Value::as_str).map(String::from),
        address: item
            .get("address")
            .and_then(|a| a.get("streetAddress"))
            .and_then(Value::as_str)
            .map(String::from),
        phone: item
            .get("telephone")
            .and_then(Value::as_str)
            .map(String::from),
        rating: rating.and_then(|r| r.get("ratingValue")).and_then(as_f64),
        rating_count: rating
            .and_then(|r| r.get("reviewCount"))
            .and_then(as_f64)
            .map(|v| v.max(0.0) as u64),
        ..RawRecord::new(SourceKind::Yelp)
    })
}

fn from_json_ld(html: &Html) -> Vec<RawRecord> {
    let mut records = Vec::new();
    for script in html.select(&SEL_JSON_LD) {
        let text = script.text().collect::<String>();
        let Ok(data) = serde_json::from_str::<Value>(&text) else {
            trace!("Skipping unparsable JSON-LD block");
            continue;
        };
        if data.get("@type").and_then(Value::as_str) != Some("ItemList") {
            continue;
        }
        let Some(items) = data.get("itemListElement").and_then(Value::as_array) else {
            continue;
        };
        records.extend(
            items
                .iter()
                .filter_map(|e| e.get("item"))
                .filter_map(from_item),
        );
    }
    records
}

fn from_markup(html: &Html, raw: &str) -> Vec<RawRecord> {
    let phones: Vec<String> = RE_PHONE
        .captures_iter(raw)
        .map(|c| format!("({}) {}-{}", &c[1], &c[2], &c[3]))
        .collect();
    let streets: Vec<&str> = RE_STREET
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .collect();

    html.select(&SEL_BIZ_LINK)
        .map(|a| reduce_whitespace(&a.text().collect::<String>()))
        .filter(|name| name.chars().count() > 2)
        .take(MAX_FALLBACK)
        .enumerate()
        .map(|(i, name)| RawRecord {
            name: Some(name),
            phone: phones.get(i).cloned(),
            address: streets.get(i).map(|s| s.to_string()),
            ..RawRecord::new(SourceKind::Yelp)
        })
        .collect()
}

/// Listings on one search page
pub fn parse(html: &str) -> Vec<RawRecord> {
    let doc = Html::parse_document(html);
    parse_doc(&doc, html)
}

fn parse_doc(doc: &Html, raw: &str) -> Vec<RawRecord> {
    let records = from_json_ld(doc);
    if !records.is_empty() {
        return records;
    }
    from_markup(doc, raw)
}

/// Listings, and the absolute URL of the next page if the page links one
pub fn parse_page(html: &str, page_url: &Url) -> Page {
    let doc = Html::parse_document(html);
    let next = doc
        .select(&SEL_NEXT)
        .find_map(|e| e.attr("href"))
        .and_then(|href| page_url.join(href).ok())
        .map(String::from);
    Page::new(parse_doc(&doc, html), next)
}

#[derive(Clone)]
pub struct Yelp {
    client: Client,
    search: Url,
    location: String,
}

impl Yelp {
    pub fn new(client: Client, city: &str, state: &str) -> Self {
        Self {
            client,
            search: SEARCH_URL.clone(),
            location: format!("{city}, {state}"),
        }
    }

    /// Search somewhere else, e.g. a local mock
    pub fn with_search_url(mut self, url: Url) -> Self {
        self.search = url;
        self
    }
}

/// Category slugs are searched as plain words
fn search_url(search: &Url, term: &str, location: &str) -> Url {
    let mut url = search.clone();
    url.query_pairs_mut()
        .append_pair("find_desc", &term.replace('_', " "))
        .append_pair("find_loc", location);
    url
}

impl Source for Yelp {
    fn kind(&self) -> SourceKind {
        SourceKind::Yelp
    }

    fn name(&self) -> &'static str {
        "Yelp"
    }

    async fn fetch(&self, req: &Request<'_>) -> Result<Outcome, SourceError> {
        let url = match req {
            Request::Initial(q) => search_url(&self.search, &q.term, &self.location),
            Request::Continue(next) => Url::parse(next)?,
        };
        let resp = self.client.get_page(url.clone()).await?;
        if resp.status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Outcome::QuotaExceeded);
        }
        let page = parse_page(&resp.into_success()?, &url);
        if page.records.is_empty() {
            debug!(%url, "No listings found on page");
        }
        Ok(Outcome::Page(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static JSON_LD_PAGE: &str = r#"<html><head>
        <script type="application/ld+json">{"@type": "LocalBusiness", "name": "Ignored"}</script>
        <script type="application/ld+json">
        {
          "@context": "https://schema.org",
          "@type": "ItemList",
          "itemListElement": [
            { "item": {
                "name": "Swan City Cycles",
                "address": { "streetAddress": "120 S Kentucky Ave" },
                "telephone": "(863) 555-0133",
                "aggregateRating": { "ratingValue": 4.5, "reviewCount": "87" }
            } },
            { "item": { "name": "Quiet Bean &amp; Co", "address": "not an object" } },
            { "item": { "telephone": "no name" } }
          ]
        }
        </script>
        <link rel="next" href="/search?find_desc=bikes&amp;start=10">
        </head><body></body></html>"#;

    #[test]
    fn json_ld_listings() {
        let records = parse(JSON_LD_PAGE);
        assert_eq!(3, records.len());

        let a = &records[0];
        assert_eq!(SourceKind::Yelp, a.source);
        assert_eq!(Some("Swan City Cycles".to_string()), a.name);
        assert_eq!(Some("120 S Kentucky Ave".to_string()), a.address);
        assert_eq!(Some("(863) 555-0133".to_string()), a.phone);
        assert_eq!(Some(4.5), a.rating);
        assert_eq!(Some(87), a.rating_count);
        assert_eq!(None, a.external_id);

        let b = &records[1];
        assert_eq!(None, b.address);
        assert_eq!(None, b.rating);

        let c = &records[2];
        assert_eq!(None, c.name);
        assert_eq!(Some("no name".to_string()), c.phone);
    }

    #[test]
    fn next_link_is_absolute() {
        let url = Url::parse("https://www.yelp.com/search?find_desc=bikes").unwrap();
        let page = parse_page(JSON_LD_PAGE, &url);
        assert_eq!(
            Some("https://www.yelp.com/search?find_desc=bikes&start=10".to_string()),
            page.next
        );
    }

    #[test]
    fn markup_fallback_pairs_by_position() {
        let html = r#"<html><body>
            <div><a href="/biz/joes-hvac"><img src="x.jpg"></a>
                 <a href="/biz/joes-hvac" class="css-19v1rkv"><span>Joe's</span> HVAC</a>
                 <p>(863) 555-0101</p><p>123 Main St Suite 4</p></div>
            <div><a href="/biz/ab">AB</a></div>
            <div><a href="/biz/lake-air">Lake Air</a><p>(863)555-0102</p></div>
            <a href="/search?cflt=hvac">More HVAC</a>
        </body></html>"#;
        let records = parse(html);
        assert_eq!(2, records.len());
        assert_eq!(Some("Joe's HVAC".to_string()), records[0].name);
        assert_eq!(Some("(863) 555-0101".to_string()), records[0].phone);
        assert_eq!(Some("123 Main St Suite 4".to_string()), records[0].address);
        assert_eq!(Some("Lake Air".to_string()), records[1].name);
        assert_eq!(Some("(863) 555-0102".to_string()), records[1].phone);
        assert_eq!(None, records[1].address);
    }

    #[test]
    fn blocked_page_has_nothing() {
        assert!(parse("<html><body>Please verify you are human</body></html>").is_empty());
    }

    #[test]
    fn search_url_reads_slugs_as_words() {
        assert_eq!(
            "https://www.yelp.com/search?find_desc=pest+control&find_loc=Lakeland%2C+FL",
            search_url(&SEARCH_URL, "pest_control", "Lakeland, FL").as_str()
        );
    }
}
