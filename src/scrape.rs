// The contract every listing source implements, and the executor that drives one query against
// a source: bounded retry when the source says its quota is exhausted, and a bounded number of
// continuation pages.

use crate::{
    models::{CategoryHint, RawRecord, SourceKind},
    plan::Query,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest_middleware::Error),
    #[error("failed to read response: {0}")]
    Body(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(StatusCode),
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("source returned {status}: {message}")]
    Api { status: String, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request<'a> {
    Initial(&'a Query),
    /// Opaque continuation token from a previous page
    Continue(&'a str),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    pub records: Vec<RawRecord>,
    pub next: Option<String>,
}

impl Page {
    pub fn new(records: Vec<RawRecord>, next: Option<String>) -> Self {
        Self { records, next }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Page(Page),
    QuotaExceeded,
}

pub trait Source {
    fn kind(&self) -> SourceKind;

    fn name(&self) -> &'static str;

    /// Follow every continuation, ignoring `max_pages`. For sources that walk a finite table
    /// rather than a ranked result list.
    fn exhaustive(&self) -> bool {
        false
    }

    async fn fetch(&self, req: &Request<'_>) -> Result<Outcome, SourceError>;
}

/// Delays between network calls go through this, so tests can run without real sleeps
pub trait Sleeper {
    async fn sleep(&self, d: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecPolicy {
    /// Wait before retrying a request that hit the quota
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub cooldown: Duration,
    /// How many times the same request is retried after a quota signal
    pub quota_retries: u32,
    /// Pages per query, including the first
    pub max_pages: u32,
    /// Wait before following a continuation token
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub page_delay: Duration,
    /// Wait between queries
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub query_delay: Duration,
}

impl Default for ExecPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(30),
            quota_retries: 1,
            max_pages: 2,
            page_delay: Duration::from_secs(2),
            query_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryOutcome {
    pub records: Vec<RawRecord>,
    pub pages: u32,
    pub quota_retries: u32,
    /// Some request for this query failed, or gave up on the quota
    pub failed: bool,
}

enum Fetched {
    Page(Page),
    Failed,
}

pub struct Executor<S, Z> {
    source: S,
    sleeper: Z,
    policy: ExecPolicy,
}

impl<S: Source, Z: Sleeper> Executor<S, Z> {
    pub fn new(source: S, sleeper: Z, policy: ExecPolicy) -> Self {
        Self {
            source,
            sleeper,
            policy,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sleeper(&self) -> &Z {
        &self.sleeper
    }

    pub fn policy(&self) -> &ExecPolicy {
        &self.policy
    }

    /// Run one query. Never fails: anything that goes wrong degrades to fewer records.
    /// Records that came back without a category hint get the query's search term.
    pub async fn run(&self, query: &Query) -> QueryOutcome {
        let mut out = QueryOutcome::default();

        let mut next = match self.fetch_bounded(&Request::Initial(query), &mut out).await {
            Fetched::Page(page) => {
                out.pages += 1;
                out.records.extend(page.records);
                page.next
            }
            Fetched::Failed => {
                out.failed = true;
                return out;
            }
        };

        while let Some(token) = next.take() {
            if out.pages >= self.policy.max_pages && !self.source.exhaustive() {
                trace!(
                    source = self.source.name(),
                    %query,
                    "Page limit reached, not following continuation"
                );
                break;
            }
            self.sleeper.sleep(self.policy.page_delay).await;
            match self
                .fetch_bounded(&Request::Continue(&token), &mut out)
                .await
            {
                Fetched::Page(page) => {
                    out.pages += 1;
                    out.records.extend(page.records);
                    next = page.next;
                }
                Fetched::Failed => out.failed = true,
            }
        }

        if !query.is_area() {
            for r in out
                .records
                .iter_mut()
                .filter(|r| r.category == CategoryHint::None)
            {
                r.category = CategoryHint::Term(query.term.clone());
            }
        }

        debug!(
            source = self.source.name(),
            %query,
            pages = out.pages,
            records = out.records.len(),
            "Query done"
        );
        out
    }

    async fn fetch_bounded(&self, req: &Request<'_>, out: &mut QueryOutcome) -> Fetched {
        let mut retries = 0;
        loop {
            match self.source.fetch(req).await {
                Ok(Outcome::Page(page)) => return Fetched::Page(page),
                Ok(Outcome::QuotaExceeded) if retries < self.policy.quota_retries => {
                    retries += 1;
                    out.quota_retries += 1;
                    warn!(
                        source = self.source.name(),
                        cooldown = ?self.policy.cooldown,
                        "Quota exceeded, waiting before retry"
                    );
                    self.sleeper.sleep(self.policy.cooldown).await;
                }
                Ok(Outcome::QuotaExceeded) => {
                    warn!(
                        source = self.source.name(),
                        retries, "Quota still exceeded, giving up on request"
                    );
                    return Fetched::Failed;
                }
                Err(err) => {
                    warn!(source = self.source.name(), %err, ?req, "Request failed");
                    return Fetched::Failed;
                }
            }
        }
    }
}
