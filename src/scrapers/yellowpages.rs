// Yellow Pages search results, one listing card at a time.

use crate::{
    cache::Client,
    models::{RawRecord, SourceKind},
    scrape::{Outcome, Page, Request, Source, SourceError},
    util::*,
};
use lazy_static::lazy_static;
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

static ATTR_HREF: &str = "href";
static ATTR_CLASS: &str = "class";

lazy_static! {
    static ref SEARCH_URL: Url = Url::parse("https://www.yellowpages.com/search").unwrap();
    static ref SEL_CARD: Selector = sel("div.result, div.v-card");
    static ref SEL_NAME: Selector = sel("a.business-name");
    static ref SEL_PHONE: Selector = sel("div.phones.phone.primary");
    static ref SEL_STREET: Selector = sel("div.street-address");
    static ref SEL_LOCALITY: Selector = sel("div.locality");
    static ref SEL_WEBSITE: Selector = sel("a.track-visit-website");
    static ref SEL_RATING: Selector = sel("div.result-rating");
    static ref SEL_COUNT: Selector = sel("div.ratings span.count, span.count");
    static ref SEL_CATEGORIES: Selector = sel("div.categories a");
    static ref SEL_NEXT: Selector = sel("div.pagination a.next");
}

/// Ratings are drawn with classes like `result-rating four half`
fn rating_from_class(class: &str) -> Option<f64> {
    let mut stars = None;
    let mut half = false;
    for c in class.split_whitespace() {
        match c {
            "one" => stars = Some(1.0),
            "two" => stars = Some(2.0),
            "three" => stars = Some(3.0),
            "four" => stars = Some(4.0),
            "five" => stars = Some(5.0),
            "half" => half = true,
            _ => {}
        }
    }
    stars.map(|s| if half { s + 0.5 } else { s })
}

/// A card without a business name still becomes a record, a nameless one that is counted as
/// skipped when collected
fn parse_card(card: &ElementRef) -> RawRecord {
    let street = get_text(card, &SEL_STREET);
    let locality = get_text(card, &SEL_LOCALITY);
    let address = match (street, locality) {
        (Some(s), Some(l)) => Some(format!("{s}, {l}")),
        (s, l) => s.or(l),
    };
    let rating = card
        .select(&SEL_RATING)
        .next()
        .and_then(|e| e.attr(ATTR_CLASS))
        .and_then(rating_from_class);
    // "(12)"
    let rating_count = get_text(card, &SEL_COUNT)
        .map(|v| v.trim_matches(|c: char| !c.is_ascii_digit()).to_string())
        .and_then(|v| v.parse().ok());
    let types = card
        .select(&SEL_CATEGORIES)
        .map(|a| reduce_whitespace(&a.text().collect::<String>()))
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(",");

    RawRecord {
        name: get_text(card, &SEL_NAME),
        address,
        phone: get_text(card, &SEL_PHONE),
        website: get_attr(card, &SEL_WEBSITE, ATTR_HREF),
        rating,
        rating_count,
        types: Some(types).filter(|v| !v.is_empty()),
        ..RawRecord::new(SourceKind::YellowPages)
    }
}

fn parse_doc(doc: &Html) -> Vec<RawRecord> {
    let mut records = Vec::new();
    for card in doc.select(&SEL_CARD) {
        // the outer result div also matches when it wraps a v-card
        if card
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| SEL_CARD.matches(&a))
        {
            continue;
        }
        records.push(parse_card(&card));
    }
    records
}

/// Listings on one search page
pub fn parse(html: &str) -> Vec<RawRecord> {
    parse_doc(&Html::parse_document(html))
}

/// Listings, and the absolute URL of the next page if there is one
pub fn parse_page(html: &str, page_url: &Url) -> Page {
    let doc = Html::parse_document(html);
    let next = doc
        .select(&SEL_NEXT)
        .find_map(|e| e.attr(ATTR_HREF))
        .and_then(|href| page_url.join(href).ok())
        .map(String::from);
    Page::new(parse_doc(&doc), next)
}

/// YP wants dashes where the category slugs have underscores
fn search_url(search: &Url, term: &str, location: &str) -> Url {
    let mut url = search.clone();
    url.query_pairs_mut()
        .append_pair("search_terms", &term.replace('_', "-"))
        .append_pair("geo_location_terms", location);
    url
}

#[derive(Clone)]
pub struct YellowPages {
    client: Client,
    search: Url,
    location: String,
}

impl YellowPages {
    pub fn new(client: Client, city: &str, state: &str) -> Self {
        Self {
            client,
            search: SEARCH_URL.clone(),
            location: format!("{city}, {state}"),
        }
    }

    pub fn with_search_url(mut self, url: Url) -> Self {
        self.search = url;
        self
    }
}

impl Source for YellowPages {
    fn kind(&self) -> SourceKind {
        SourceKind::YellowPages
    }

    fn name(&self) -> &'static str {
        "YellowPages"
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
        debug!(%url, records = page.records.len(), "Parsed listing page");
        Ok(Outcome::Page(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static PAGE: &str = r#"<html><body>
        <div class="search-results organic">
          <div class="result" id="lid-1">
            <div class="v-card">
              <div class="info">
                <h2 class="n"><a class="business-name" href="/lakeland-fl/mip/joes-1"><span>Joe&#39;s Plumbing</span></a></h2>
                <div class="ratings"><div class="result-rating four half "></div><span class="count">(12)</span></div>
                <div class="categories"><a href="/x">Plumbers</a><a href="/y">Water Heaters</a></div>
                <div class="phones phone primary">(863) 555-0110</div>
                <div class="adr">
                  <div class="street-address">500 E Main St</div>
                  <div class="locality">Lakeland, FL 33801</div>
                </div>
                <a class="track-visit-website" href="https://joesplumbing.example">Website</a>
              </div>
            </div>
          </div>
          <div class="result" id="lid-2">
            <div class="v-card">
              <a class="business-name" href="/lakeland-fl/mip/polk-2">Polk Drain Co</a>
              <div class="locality">Lakeland, FL</div>
            </div>
          </div>
          <div class="result"><div class="v-card"><div class="info">ad without a name</div></div></div>
        </div>
        <div class="pagination"><a class="next ajax-page" href="/search?search_terms=plumbers&amp;page=2">Next</a></div>
    </body></html>"#;

    #[test]
    fn cards() {
        let records = parse(PAGE);
        assert_eq!(3, records.len());

        let a = &records[0];
        assert_eq!(SourceKind::YellowPages, a.source);
        assert_eq!(Some("Joe's Plumbing".to_string()), a.name);
        assert_eq!(
            Some("500 E Main St, Lakeland, FL 33801".to_string()),
            a.address
        );
        assert_eq!(Some("(863) 555-0110".to_string()), a.phone);
        assert_eq!(Some("https://joesplumbing.example".to_string()), a.website);
        assert_eq!(Some(4.5), a.rating);
        assert_eq!(Some(12), a.rating_count);
        assert_eq!(Some("Plumbers,Water Heaters".to_string()), a.types);

        let b = &records[1];
        assert_eq!(Some("Lakeland, FL".to_string()), b.address);
        assert_eq!(None, b.phone);
        assert_eq!(None, b.rating);
        assert_eq!(None, b.types);

        // the ad card
        assert_eq!(None, records[2].name);
        assert_eq!(None, records[2].address);
    }

    #[test]
    fn next_page() {
        let url = Url::parse("https://www.yellowpages.com/search?search_terms=plumbers").unwrap();
        assert_eq!(
            Some("https://www.yellowpages.com/search?search_terms=plumbers&page=2".to_string()),
            parse_page(PAGE, &url).next
        );
        assert_eq!(None, parse_page("<html></html>", &url).next);
    }

    #[test]
    fn star_classes() {
        assert_eq!(Some(3.0), rating_from_class("result-rating three"));
        assert_eq!(Some(1.5), rating_from_class("result-rating one half"));
        assert_eq!(None, rating_from_class("result-rating"));
    }

    #[test]
    fn search_terms_use_dashes() {
        assert_eq!(
            "https://www.yellowpages.com/search?search_terms=pest-control&geo_location_terms=Lakeland%2C+FL",
            search_url(&SEARCH_URL, "pest_control", "Lakeland, FL").as_str()
        );
    }
}
