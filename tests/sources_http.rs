// Overpass, contacts and the directory sites against a local mock server: quota statuses,
// paging to the end of the contacts table, and nameless listings reaching the tally.

use localfinds::{
    cache::{Client, Opts},
    collect::{Collector, MergePolicy, drive},
    config::BoundingBox,
    normalize::Normalizer,
    plan::{AnchorPoint, Query},
    scrape::{ExecPolicy, Executor, Sleeper},
    scrapers::{contacts::Contacts, osm::Osm, yellowpages::YellowPages, yelp::Yelp},
    signals::Shutdown,
};
use std::{sync::Mutex, time::Duration};
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

#[derive(Default)]
struct NoSleep(Mutex<Vec<Duration>>);

impl NoSleep {
    fn slept(&self) -> Vec<Duration> {
        self.0.lock().unwrap().clone()
    }
}

impl Sleeper for NoSleep {
    async fn sleep(&self, d: Duration) {
        self.0.lock().unwrap().push(d);
    }
}

fn anchor() -> AnchorPoint {
    AnchorPoint::new("Downtown Lakeland", 28.0395, -81.9498, 8000)
}

fn policy() -> ExecPolicy {
    ExecPolicy {
        cooldown: Duration::from_secs(30),
        quota_retries: 1,
        max_pages: 2,
        page_delay: Duration::from_secs(2),
        query_delay: Duration::from_millis(200),
    }
}

async fn client() -> Client {
    Client::build(Opts::default()).await.unwrap()
}

fn at(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{p}", server.uri())).unwrap()
}

#[tokio::test]
async fn overpass_busy_statuses_are_quota() {
    for status in [429, 504] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/interpreter"))
            .respond_with(ResponseTemplate::new(status))
            .expect(2)
            .mount(&server)
            .await;

        let osm = Osm::new(client().await, BoundingBox::default(), "Lakeland", "FL")
            .with_url(at(&server, "/api/interpreter"));
        let exec = Executor::new(osm, NoSleep::default(), policy());
        let out = exec.run(&Query::area(anchor())).await;

        assert!(out.failed, "status {status}");
        assert_eq!(1, out.quota_retries, "status {status}");
        assert_eq!(vec![Duration::from_secs(30)], exec.sleeper().slept());
    }
}

#[tokio::test]
async fn overpass_server_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/interpreter"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let osm = Osm::new(client().await, BoundingBox::default(), "Lakeland", "FL")
        .with_url(at(&server, "/api/interpreter"));
    let exec = Executor::new(osm, NoSleep::default(), policy());
    let out = exec.run(&Query::area(anchor())).await;

    assert!(out.failed);
    assert_eq!(0, out.quota_retries);
    assert!(exec.sleeper().slept().is_empty());
}

#[tokio::test]
async fn directory_rate_limits_are_quota() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/yelp/search"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/yp/search"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&server)
        .await;
    let query = Query::new("plumbers", anchor());

    let yelp = Yelp::new(client().await, "Lakeland", "FL")
        .with_search_url(at(&server, "/yelp/search"));
    let exec = Executor::new(yelp, NoSleep::default(), policy());
    let out = exec.run(&query).await;
    assert!(out.failed);
    assert_eq!(1, out.quota_retries);

    let yp = YellowPages::new(client().await, "Lakeland", "FL")
        .with_search_url(at(&server, "/yp/search"));
    let exec = Executor::new(yp, NoSleep::default(), policy());
    let out = exec.run(&query).await;
    assert!(out.failed);
    assert_eq!(1, out.quota_retries);
}

#[tokio::test]
async fn contacts_page_past_max_pages() {
    let server = MockServer::start().await;
    let rows = [
        ("0", r#"[{ "id": 1, "company_name": "Lakeland Lawn Care", "niche": "lawn care" }]"#),
        ("1", r#"[{ "id": 2, "company_name": "Polk Plumbing", "niche": "plumbing" }]"#),
        ("2", "[]"),
    ];
    for (offset, body) in rows {
        Mock::given(method("GET"))
            .and(path("/rest/v1/contacts_master"))
            .and(query_param("limit", "1"))
            .and(query_param("offset", offset))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let contacts = Contacts::new(client().await, at(&server, "/"), "key", 1).unwrap();
    let exec = Executor::new(
        contacts,
        NoSleep::default(),
        ExecPolicy {
            max_pages: 1,
            ..policy()
        },
    );
    let out = exec.run(&Query::area(anchor())).await;

    assert!(!out.failed);
    assert_eq!(3, out.pages);
    assert_eq!(2, out.records.len());
    assert_eq!(2, exec.sleeper().slept().len());
}

#[tokio::test]
async fn nameless_cards_reach_the_tally() {
    let page = r#"<html><body><div class="search-results organic">
        <div class="result"><div class="v-card">
            <a class="business-name" href="/lakeland-fl/mip/joes-1">Joe's Plumbing</a>
            <div class="street-address">500 E Main St</div>
            <div class="locality">Lakeland, FL 33801</div>
        </div></div>
        <div class="result"><div class="v-card"><div class="info">sponsored</div></div></div>
        <div class="result"><div class="v-card">
            <a class="business-name" href="/lakeland-fl/mip/polk-2">  </a>
        </div></div>
    </div></body></html>"#;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&server)
        .await;

    let yp = YellowPages::new(client().await, "Lakeland", "FL")
        .with_search_url(at(&server, "/search"));
    let exec = Executor::new(yp, NoSleep::default(), policy());
    let normalizer = Normalizer::new("Lakeland, FL");
    let mut collector = Collector::new(MergePolicy::FirstWins);
    let stats = drive(
        &exec,
        [Query::new("plumbers", anchor())],
        &normalizer,
        &mut collector,
        &Shutdown::default(),
    )
    .await;

    assert_eq!(3, stats.raw_records);
    let c = collector.stats();
    assert_eq!(1, c.unique);
    assert_eq!(2, c.skipped_unnamed);
    assert_eq!(stats.raw_records, c.unique + c.skipped_unnamed);
}
