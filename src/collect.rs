// The merge step. Records are fed in query order and deduplicated on their identity key; which
// duplicate survives is decided by the merge policy.

use crate::{
    models::{BusinessRecord, RawRecord},
    normalize::Normalizer,
    plan::Query,
    scrape::{Executor, Sleeper, Source},
    signals::Shutdown,
};
use clap::ValueEnum;
use indexmap::{IndexMap, map::Entry};
use serde::{Deserialize, Serialize};
use tracing::{info, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// The first record seen for a key is kept as is; later duplicates are dropped, even when
    /// they carry more data
    #[default]
    FirstWins,
    /// The first record stays authoritative, but its empty fields are filled in from later
    /// duplicates
    FillMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectStats {
    /// Raw records offered to the collector
    pub seen: usize,
    /// Distinct keys kept
    pub unique: usize,
    /// Records dropped because their key was already present
    pub duplicates: usize,
    /// Records dropped for lack of a name
    pub skipped_unnamed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Collector {
    policy: MergePolicy,
    records: IndexMap<String, BusinessRecord>,
    stats: CollectStats,
}

impl Collector {
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> CollectStats {
        self.stats
    }

    /// Normalize and merge one raw record. Returns true if it added a new key.
    pub fn offer(&mut self, normalizer: &Normalizer, raw: RawRecord) -> bool {
        self.stats.seen += 1;
        match normalizer.normalize(raw) {
            Some(r) => self.insert(r),
            None => {
                self.stats.skipped_unnamed += 1;
                false
            }
        }
    }

    /// Merge an already normalized record. Returns true if it added a new key.
    pub fn insert(&mut self, record: BusinessRecord) -> bool {
        match self.records.entry(record.key.clone()) {
            Entry::Vacant(e) => {
                e.insert(record);
                self.stats.unique += 1;
                true
            }
            Entry::Occupied(mut e) => {
                self.stats.duplicates += 1;
                trace!(key = %record.key, name = %record.name, "Duplicate");
                if self.policy == MergePolicy::FillMissing {
                    fill_missing(e.get_mut(), record);
                }
                false
            }
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &BusinessRecord> {
        self.records.values()
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut BusinessRecord> {
        self.records.values_mut()
    }

    pub fn into_collection(self) -> Collection {
        Collection {
            records: self.records.into_values().collect(),
            stats: self.stats,
        }
    }
}

fn fill_missing(kept: &mut BusinessRecord, later: BusinessRecord) {
    fn fill(dst: &mut Option<String>, src: Option<String>) {
        if dst.as_deref().is_none_or(str::is_empty) {
            if let Some(v) = src.filter(|v| !v.is_empty()) {
                *dst = Some(v);
            }
        }
    }
    fill(&mut kept.phone, later.phone);
    fill(&mut kept.website, later.website);
    fill(&mut kept.hours, later.hours);
    fill(&mut kept.types, later.types);
    if kept.rating == 0.0 && later.rating > 0.0 {
        kept.rating = later.rating;
        kept.rating_count = later.rating_count;
    }
    if kept.lat == 0.0 && kept.lng == 0.0 {
        kept.lat = later.lat;
        kept.lng = later.lng;
    }
}

/// The merged output of a run, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    pub records: Vec<BusinessRecord>,
    pub stats: CollectStats,
}

/// Merge a finished sequence of raw records. Deterministic for a given input order.
pub fn collect<I>(records: I, normalizer: &Normalizer, policy: MergePolicy) -> Collection
where
    I: IntoIterator<Item = RawRecord>,
{
    let mut c = Collector::new(policy);
    for r in records {
        c.offer(normalizer, r);
    }
    c.into_collection()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecStats {
    pub queries: usize,
    pub failed_queries: usize,
    pub pages: usize,
    pub quota_retries: usize,
    pub raw_records: usize,
    pub interrupted: bool,
}

impl ExecStats {
    pub fn merge(&mut self, other: ExecStats) {
        self.queries += other.queries;
        self.failed_queries += other.failed_queries;
        self.pages += other.pages;
        self.quota_retries += other.quota_retries;
        self.raw_records += other.raw_records;
        self.interrupted |= other.interrupted;
    }
}

/// Run every query through the executor, one after the other, feeding the collector in query
/// order. Stops before the next query once shutdown is requested.
pub async fn drive<S, Z, I>(
    exec: &Executor<S, Z>,
    queries: I,
    normalizer: &Normalizer,
    collector: &mut Collector,
    shutdown: &Shutdown,
) -> ExecStats
where
    S: Source,
    Z: Sleeper,
    I: IntoIterator<Item = Query>,
{
    let mut stats = ExecStats::default();
    let name = exec.source().name();

    for (i, q) in queries.into_iter().enumerate() {
        if shutdown.is_triggered() {
            info!(source = name, "Shutdown requested, stopping before next query");
            stats.interrupted = true;
            break;
        }
        if i > 0 {
            exec.sleeper().sleep(exec.policy().query_delay).await;
        }

        let out = exec.run(&q).await;
        stats.queries += 1;
        stats.pages += out.pages as usize;
        stats.quota_retries += out.quota_retries as usize;
        stats.raw_records += out.records.len();
        if out.failed {
            stats.failed_queries += 1;
        }

        let found = out.records.len();
        let mut new = 0;
        for r in out.records {
            if collector.offer(normalizer, r) {
                new += 1;
            }
        }
        info!(
            source = name,
            query = %q,
            found,
            new,
            unique = collector.len(),
            "Query merged"
        );
    }

    stats
}

/// Several sources run one after another into one collector. A source reached after shutdown
/// was requested is skipped and the run is marked interrupted.
pub struct Batch<'a> {
    normalizer: &'a Normalizer,
    collector: &'a mut Collector,
    shutdown: &'a Shutdown,
    pub stats: ExecStats,
}

impl<'a> Batch<'a> {
    pub fn new(
        normalizer: &'a Normalizer,
        collector: &'a mut Collector,
        shutdown: &'a Shutdown,
    ) -> Self {
        Self {
            normalizer,
            collector,
            shutdown,
            stats: ExecStats::default(),
        }
    }

    pub async fn run<S, Z, I>(&mut self, exec: &Executor<S, Z>, queries: I)
    where
        S: Source,
        Z: Sleeper,
        I: IntoIterator<Item = Query>,
    {
        let name = exec.source().name();
        if self.shutdown.is_triggered() {
            info!(source = name, "Shutdown requested, skipping source");
            self.stats.interrupted = true;
            return;
        }
        let before = self.collector.len();
        let stats = drive(exec, queries, self.normalizer, self.collector, self.shutdown).await;
        info!(
            source = name,
            queries = stats.queries,
            failed = stats.failed_queries,
            new = self.collector.len() - before,
            "Source done"
        );
        self.stats.merge(stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        export,
        models::SourceKind,
        plan::{AnchorPoint, QueryPlan},
        scrape::{
            ExecPolicy,
            testing::{RecordingSleeper, ScriptedSource, page},
        },
    };

    fn normalizer() -> Normalizer {
        Normalizer::new("Lakeland, FL")
    }

    fn raw(id: &str, name: &str) -> RawRecord {
        RawRecord {
            external_id: Some(id.into()),
            name: Some(name.into()),
            ..RawRecord::new(SourceKind::Places)
        }
    }

    #[test]
    fn first_occurrence_wins() {
        let a = raw("A1", "Joe's HVAC");
        let b = RawRecord {
            rating: Some(4.8),
            phone: Some("863-555-0101".into()),
            ..raw("A1", "Joe's HVAC LLC")
        };
        let c = collect(vec![a, b], &normalizer(), MergePolicy::FirstWins);

        assert_eq!(1, c.records.len());
        assert_eq!("Joe's HVAC", c.records[0].name);
        assert_eq!(0.0, c.records[0].rating);
        assert_eq!(None, c.records[0].phone);
        assert_eq!(1, c.stats.duplicates);
    }

    #[test]
    fn fill_missing_keeps_first_but_fills_blanks() {
        let a = RawRecord {
            website: Some("https://joes.example".into()),
            ..raw("A1", "Joe's HVAC")
        };
        let b = RawRecord {
            rating: Some(4.8),
            rating_count: Some(12),
            phone: Some("863-555-0101".into()),
            website: Some("https://other.example".into()),
            ..raw("A1", "Joe's HVAC LLC")
        };
        let c = collect(vec![a, b], &normalizer(), MergePolicy::FillMissing);

        let r = &c.records[0];
        assert_eq!("Joe's HVAC", r.name);
        assert_eq!(4.8, r.rating);
        assert_eq!(12, r.rating_count);
        assert_eq!(Some("863-555-0101".to_string()), r.phone);
        assert_eq!(Some("https://joes.example".to_string()), r.website);
    }

    #[test]
    fn keys_are_unique() {
        let input: Vec<RawRecord> = (0..50)
            .map(|i| raw(&format!("id{}", i % 7), &format!("Biz {i}")))
            .collect();
        let c = collect(input, &normalizer(), MergePolicy::FirstWins);

        let mut keys: Vec<&str> = c.records.iter().map(|r| r.key.as_str()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(7, keys.len());
        assert_eq!(7, c.records.len());
        assert_eq!(50, c.stats.seen);
        assert_eq!(43, c.stats.duplicates);
    }

    #[test]
    fn unnamed_are_counted() {
        let input = vec![
            raw("1", "A"),
            RawRecord {
                external_id: Some("2".into()),
                ..RawRecord::new(SourceKind::Places)
            },
            raw("3", "C"),
            raw("4", "  "),
        ];
        let n = input.len();
        let c = collect(input, &normalizer(), MergePolicy::FirstWins);
        assert_eq!(2, c.stats.skipped_unnamed);
        assert_eq!(n, c.records.len() + c.stats.skipped_unnamed);
    }

    #[test]
    fn insertion_order_is_kept() {
        let c = collect(
            vec![raw("z", "Zed"), raw("a", "Ay"), raw("m", "Em"), raw("a", "Ay2")],
            &normalizer(),
            MergePolicy::FirstWins,
        );
        let names: Vec<&str> = c.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(vec!["Zed", "Ay", "Em"], names);
    }

    #[test]
    fn same_input_same_export() {
        let input = || {
            vec![
                raw("1", "A"),
                raw("2", "B"),
                raw("1", "A again"),
                RawRecord {
                    name: Some("Scraped".into()),
                    address: Some("1 Main St".into()),
                    ..RawRecord::new(SourceKind::Yelp)
                },
            ]
        };
        let render = |c: Collection| {
            let mut buf = Vec::new();
            export::write_records(&mut buf, &c.records).unwrap();
            buf
        };
        let first = render(collect(input(), &normalizer(), MergePolicy::FirstWins));
        let second = render(collect(input(), &normalizer(), MergePolicy::FirstWins));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn drive_merges_in_query_order() {
        let src = ScriptedSource::new(vec![
            page(&["A", "B"], None),
            page(&["B", "C"], None),
            page(&[], None),
            page(&["D"], None),
        ]);
        let sleeper = RecordingSleeper::default();
        let exec = Executor::new(&src, &sleeper, ExecPolicy::default());
        let plan = QueryPlan::new(
            &["plumber", "electrician"],
            &[
                AnchorPoint::new("P1", 28.0, -81.9, 8000),
                AnchorPoint::new("P2", 28.1, -81.9, 8000),
            ],
        );
        let mut collector = Collector::new(MergePolicy::FirstWins);

        let stats = drive(
            &exec,
            plan.iter(),
            &normalizer(),
            &mut collector,
            &Shutdown::default(),
        )
        .await;

        assert_eq!(4, stats.queries);
        assert_eq!(5, stats.raw_records);
        assert!(!stats.interrupted);
        assert_eq!(4, collector.len());
        assert_eq!(1, collector.stats().duplicates);
        // query delay between queries, none before the first
        assert_eq!(3, sleeper.count());
        let names: Vec<String> = collector.records().map(|r| r.name.clone()).collect();
        assert_eq!(vec!["A", "B", "C", "D"], names);
    }

    #[tokio::test]
    async fn drive_stops_on_shutdown() {
        let src = ScriptedSource::new(vec![page(&["A"], None)]);
        let sleeper = RecordingSleeper::default();
        let exec = Executor::new(&src, &sleeper, ExecPolicy::default());
        let plan = QueryPlan::new(&["a", "b"], &[AnchorPoint::default()]);
        let mut collector = Collector::default();
        let shutdown = Shutdown::default();
        shutdown.trigger();

        let stats = drive(&exec, plan.iter(), &normalizer(), &mut collector, &shutdown).await;
        assert!(stats.interrupted);
        assert_eq!(0, stats.queries);
        assert_eq!(0, src.calls());
    }

    #[tokio::test]
    async fn sources_after_shutdown_are_skipped() {
        let first = ScriptedSource::new(vec![page(&["A", "B"], None)]);
        let second = ScriptedSource::new(vec![page(&["C"], None)]);
        let sleeper = RecordingSleeper::default();
        let mut collector = Collector::default();
        let normalizer = normalizer();
        let shutdown = Shutdown::default();
        let query = || [Query::area(AnchorPoint::default())];

        let mut batch = Batch::new(&normalizer, &mut collector, &shutdown);
        batch
            .run(&Executor::new(&first, &sleeper, ExecPolicy::default()), query())
            .await;
        assert!(!batch.stats.interrupted);

        shutdown.trigger();
        batch
            .run(&Executor::new(&second, &sleeper, ExecPolicy::default()), query())
            .await;
        let stats = batch.stats;

        assert!(stats.interrupted);
        assert_eq!(1, stats.queries);
        assert_eq!(2, stats.raw_records);
        assert_eq!(0, second.calls());
        assert_eq!(2, collector.len());
    }
}
