// Optional second pass: one detail request per record, for sources whose list results lack
// phone, website and opening hours.

use crate::{
    models::{BusinessRecord, SourceKind},
    scrape::{Sleeper, SourceError},
    signals::Shutdown,
};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Details {
    pub phone: Option<String>,
    pub website: Option<String>,
    pub hours: Option<String>,
}

pub trait DetailSource {
    /// Records of this kind are the ones this source can look up
    fn kind(&self) -> SourceKind;

    async fn details(&self, external_id: &str) -> Result<Details, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnrichStats {
    pub attempted: usize,
    pub enriched: usize,
    pub failed: usize,
    pub interrupted: bool,
}

/// Look up details for every record the source knows about. A failed lookup empties the
/// record's detail fields and the pass goes on with the next one.
pub async fn enrich<'a, D, Z, I>(
    records: I,
    source: &D,
    sleeper: &Z,
    delay: Duration,
    shutdown: &Shutdown,
) -> EnrichStats
where
    D: DetailSource,
    Z: Sleeper,
    I: IntoIterator<Item = &'a mut BusinessRecord>,
{
    let mut stats = EnrichStats::default();
    let kind = source.kind();

    for r in records.into_iter().filter(|r| r.source == kind) {
        let Some(id) = r.external_id.clone() else {
            continue;
        };
        if shutdown.is_triggered() {
            stats.interrupted = true;
            break;
        }
        if stats.attempted > 0 {
            sleeper.sleep(delay).await;
        }
        stats.attempted += 1;

        match source.details(&id).await {
            Ok(d) => {
                r.phone = d.phone;
                r.website = d.website;
                r.hours = d.hours;
                stats.enriched += 1;
            }
            Err(err) => {
                warn!(%err, id = %id, name = %r.name, "Detail lookup failed");
                r.phone = None;
                r.website = None;
                r.hours = None;
                stats.failed += 1;
            }
        }
        if stats.attempted % 50 == 0 {
            info!(done = stats.attempted, "Detail lookups progress");
        }
    }

    info!(
        attempted = stats.attempted,
        enriched = stats.enriched,
        failed = stats.failed,
        "Detail lookups done"
    );
    stats
}
