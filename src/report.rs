// End of run summary. This is what the operator reads to decide whether a run is good enough to
// seed from, and what the exit code is derived from.

use crate::{
    collect::{CollectStats, Collection, ExecStats},
    enrich::EnrichStats,
};
use chrono::{DateTime, Local};
use indexmap::IndexMap;
use std::fmt::Display;

/// Categories listed in the summary
const TOP_CATEGORIES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    /// Something was lost along the way: failed queries, failed lookups or an interrupt
    Partial,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub exec: ExecStats,
    pub collect: CollectStats,
    pub enrich: Option<EnrichStats>,
    pub with_phone: usize,
    pub with_website: usize,
    /// Largest first, ties in order of first appearance
    pub categories: Vec<(String, usize)>,
}

impl RunReport {
    pub fn new(
        started_at: DateTime<Local>,
        exec: ExecStats,
        collection: &Collection,
        enrich: Option<EnrichStats>,
    ) -> Self {
        let mut counts: IndexMap<&str, usize> = IndexMap::new();
        for r in &collection.records {
            *counts.entry(r.category.as_str()).or_default() += 1;
        }
        let mut categories: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(c, n)| (c.to_string(), n))
            .collect();
        // stable, so equal counts keep first-seen order
        categories.sort_by(|a, b| b.1.cmp(&a.1));

        Self {
            started_at,
            finished_at: Local::now(),
            exec,
            collect: collection.stats,
            enrich,
            with_phone: collection.records.iter().filter(|r| r.has_phone()).count(),
            with_website: collection
                .records
                .iter()
                .filter(|r| r.has_website())
                .count(),
            categories,
        }
    }

    pub fn outcome(&self) -> Outcome {
        let enrich_lost = self
            .enrich
            .is_some_and(|e| e.failed > 0 || e.interrupted);
        if self.exec.failed_queries > 0 || self.exec.interrupted || enrich_lost {
            Outcome::Partial
        } else {
            Outcome::Complete
        }
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let took = (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default();
        writeln!(f, "Run finished in {}", humantime::format_duration(round_secs(took)))?;
        writeln!(
            f,
            "  Queries:      {} ({} failed, {} pages, {} quota retries){}",
            self.exec.queries,
            self.exec.failed_queries,
            self.exec.pages,
            self.exec.quota_retries,
            if self.exec.interrupted { ", interrupted" } else { "" }
        )?;
        writeln!(f, "  Raw records:  {}", self.collect.seen)?;
        writeln!(f, "  Unique:       {}", self.collect.unique)?;
        writeln!(f, "  Duplicates:   {}", self.collect.duplicates)?;
        writeln!(f, "  Skipped:      {} (no name)", self.collect.skipped_unnamed)?;
        if let Some(e) = &self.enrich {
            writeln!(
                f,
                "  Enriched:     {} of {} ({} failed)",
                e.enriched, e.attempted, e.failed
            )?;
        }
        writeln!(f, "  With phone:   {}", self.with_phone)?;
        writeln!(f, "  With website: {}", self.with_website)?;
        if !self.categories.is_empty() {
            writeln!(f, "Top categories:")?;
            for (c, n) in self.categories.iter().take(TOP_CATEGORIES) {
                writeln!(f, "  {c}: {n}")?;
            }
        }
        Ok(())
    }
}

fn round_secs(d: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_secs(d.as_secs())
}
