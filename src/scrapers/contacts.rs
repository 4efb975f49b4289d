// Contact rows from a PostgREST (Supabase) table. The whole table is one area query, paged with
// limit/offset until a short page; the offset of the next page is the continuation token. The
// table has no address column, so these records get the fallback address.

use crate::{
    cache::Client,
    models::{CategoryHint, RawRecord, SourceKind},
    scrape::{Outcome, Page, Request, Source, SourceError},
    util::non_blank,
};
use reqwest::{
    StatusCode,
    header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;
use url::Url;

static TABLE_PATH: &str = "rest/v1/contacts_master";
static SELECT: &str = "id,company_name,phone,website_url,niche";
/// Company names shorter than this are junk and count as missing
const MIN_NAME_LEN: usize = 3;

#[derive(Debug, Deserialize)]
struct Contact {
    id: Option<Value>,
    company_name: Option<String>,
    phone: Option<String>,
    website_url: Option<String>,
    niche: Option<String>,
}

impl Contact {
    /// Every row becomes a record. Rows without a usable name come out nameless, and are
    /// skipped and counted when collected.
    fn into_raw(self) -> RawRecord {
        let name = non_blank(self.company_name.as_deref())
            .filter(|n| n.chars().count() >= MIN_NAME_LEN);
        let external_id = match self.id {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        RawRecord {
            external_id,
            name,
            category: CategoryHint::Niche(self.niche.unwrap_or_default()),
            phone: non_blank(self.phone.as_deref()),
            website: non_blank(self.website_url.as_deref()),
            ..RawRecord::new(SourceKind::Contacts)
        }
    }
}

/// Records of one page, and the offset of the next one if this page was full
pub fn parse(body: &str, offset: u32, limit: u32) -> Result<Page, SourceError> {
    let rows: Vec<Contact> = serde_json::from_str(body)?;
    let full = rows.len() as u32 >= limit;
    let records = rows.into_iter().map(Contact::into_raw).collect();
    let next = full.then(|| (offset + limit).to_string());
    Ok(Page::new(records, next))
}

#[derive(Clone)]
pub struct Contacts {
    client: Client,
    base: Url,
    headers: HeaderMap,
    page_size: u32,
}

impl Contacts {
    pub fn new(
        client: Client,
        base: Url,
        key: &str,
        page_size: u32,
    ) -> Result<Self, InvalidHeaderValue> {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("apikey"), HeaderValue::from_str(key)?);
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
        Ok(Self {
            client,
            base,
            headers,
            page_size: page_size.max(1),
        })
    }

    fn url(&self, offset: u32) -> Result<Url, SourceError> {
        let mut url = self.base.join(TABLE_PATH)?;
        url.query_pairs_mut()
            .append_pair("select", SELECT)
            .append_pair("company_name", "not.is.null")
            .append_pair("order", "id")
            .append_pair("limit", &self.page_size.to_string())
            .append_pair("offset", &offset.to_string());
        Ok(url)
    }
}

impl Source for Contacts {
    fn kind(&self) -> SourceKind {
        SourceKind::Contacts
    }

    fn name(&self) -> &'static str {
        "Contacts"
    }

    fn exhaustive(&self) -> bool {
        true
    }

    async fn fetch(&self, req: &Request<'_>) -> Result<Outcome, SourceError> {
        let offset = match req {
            Request::Initial(_) => 0,
            Request::Continue(token) => token.parse().map_err(|_| SourceError::Api {
                status: "BAD_TOKEN".into(),
                message: format!("not an offset: {token}"),
            })?,
        };
        let resp = self
            .client
            .get(self.url(offset)?, self.headers.clone())
            .await?;
        if resp.status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Outcome::QuotaExceeded);
        }
        let page = parse(&resp.into_success()?, offset, self.page_size)?;
        trace!(offset, records = page.records.len(), "Contacts page");
        Ok(Outcome::Page(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collect::{MergePolicy, collect},
        normalize::Normalizer,
    };

    #[test]
    fn rows_to_records() {
        let body = r#"[
            { "id": "c-1", "company_name": " Cool Air LLC ", "phone": "863-555-0199",
              "website_url": "", "niche": "Heating and Air" },
            { "id": 7, "company_name": "AB", "niche": "plumbing" },
            { "id": "c-3", "company_name": null },
            { "id": 9, "company_name": "Polk Plumbing Pros", "niche": null }
        ]"#;
        let page = parse(body, 0, 1000).unwrap();
        assert_eq!(None, page.next);
        assert_eq!(4, page.records.len());

        let a = &page.records[0];
        assert_eq!(Some("c-1".to_string()), a.external_id);
        assert_eq!(Some("Cool Air LLC".to_string()), a.name);
        assert_eq!(None, a.website);
        assert_eq!(CategoryHint::Niche("Heating and Air".into()), a.category);

        // too short, and null
        assert_eq!(None, page.records[1].name);
        assert_eq!(None, page.records[2].name);

        let d = &page.records[3];
        assert_eq!(Some("9".to_string()), d.external_id);
        assert_eq!(CategoryHint::Niche(String::new()), d.category);
    }

    #[test]
    fn nameless_rows_are_counted_as_skipped() {
        let body = r#"[
            { "id": 1, "company_name": "Lakeland Lawn Care", "niche": "lawn care" },
            { "id": 2, "company_name": null, "phone": "863-555-0100" },
            { "id": 3, "company_name": "   " }
        ]"#;
        let page = parse(body, 0, 1000).unwrap();
        let input = page.records.len();
        let c = collect(
            page.records,
            &Normalizer::new("Lakeland, FL"),
            MergePolicy::FirstWins,
        );
        assert_eq!(1, c.records.len());
        assert_eq!(2, c.stats.skipped_unnamed);
        assert_eq!(input, c.records.len() + c.stats.skipped_unnamed);
        assert_eq!("Landscaping", c.records[0].category);
    }

    #[test]
    fn full_page_continues_at_next_offset() {
        let body = r#"[ { "id": "a", "company_name": "Alpha Co" }, { "id": "b", "company_name": "Beta Co" } ]"#;
        let page = parse(body, 4, 2).unwrap();
        assert_eq!(Some("6".to_string()), page.next);
    }

    #[test]
    fn error_object_is_payload_error() {
        assert!(matches!(
            parse(r#"{ "message": "JWT expired" }"#, 0, 10),
            Err(SourceError::Payload(_))
        ));
    }
}
