// Loading an export into the businesses table. Each batch goes in with one unnest insert inside a
// transaction; a batch that fails is rolled back and retried one row at a time, so a single bad
// row only costs itself. The table is expected to exist already.

use crate::models::{BusinessRecord, BusinessRows};
use anyhow::Result;
use sqlx::{Executor, PgPool, Postgres};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone)]
pub struct SeedOpts {
    pub batch_size: usize,
    /// Delete everything in the table first
    pub replace: bool,
    pub city: String,
    pub state: String,
}

impl Default for SeedOpts {
    fn default() -> Self {
        Self {
            batch_size: 100,
            replace: false,
            city: "Lakeland".into(),
            state: "FL".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeedStats {
    pub deleted: u64,
    pub inserted: u64,
    pub skipped: u64,
    /// Rows in the table afterwards
    pub total: i64,
}

/// Records that can be inserted at all, and how many were left out for lacking a name
pub fn insertable(records: &[BusinessRecord]) -> (Vec<BusinessRecord>, u64) {
    let (ok, bad): (Vec<_>, Vec<_>) = records
        .iter()
        .cloned()
        .partition(|r| !r.name.trim().is_empty());
    (ok, bad.len() as u64)
}

async fn insert_rows<'e, E>(executor: E, rs: &BusinessRows) -> Result<u64>
where
    E: Executor<'e, Database = Postgres>,
{
    let res = sqlx::query(
        r#"
            insert into businesses (id, name, address, category, phone, website_url, city, state,
                                    rating, total_ratings, lat, lng, created_at)
            select * from unnest($1::uuid[], $2::text[], $3::text[], $4::text[], $5::text[],
                                 $6::text[], $7::text[], $8::text[], $9::real[], $10::int[],
                                 $11::float8[], $12::float8[], $13::timestamptz[])
        "#,
    )
    .bind(&rs.ids[..])
    .bind(&rs.names[..])
    .bind(&rs.addresses[..])
    .bind(&rs.categories[..])
    .bind(&rs.phones[..])
    .bind(&rs.websites[..])
    .bind(&rs.cities[..])
    .bind(&rs.states[..])
    .bind(&rs.ratings[..])
    .bind(&rs.rating_counts[..])
    .bind(&rs.lats[..])
    .bind(&rs.lngs[..])
    .bind(&rs.created_ats[..])
    .execute(executor)
    .await?;
    Ok(res.rows_affected())
}

/// Where seeded rows go
pub trait RowSink {
    /// All rows of the batch or none of them
    async fn insert_batch(&self, batch: &[BusinessRecord]) -> Result<u64>;
    async fn insert_one(&self, record: &BusinessRecord) -> Result<u64>;
}

pub struct PgSink<'a> {
    pg: &'a PgPool,
    city: &'a str,
    state: &'a str,
}

impl<'a> PgSink<'a> {
    pub fn new(pg: &'a PgPool, opts: &'a SeedOpts) -> Self {
        Self {
            pg,
            city: &opts.city,
            state: &opts.state,
        }
    }
}

impl RowSink for PgSink<'_> {
    async fn insert_batch(&self, batch: &[BusinessRecord]) -> Result<u64> {
        let rs = BusinessRows::from_records(batch, self.city, self.state);
        let mut tx = self.pg.begin().await?;
        let n = insert_rows(&mut *tx, &rs).await?;
        tx.commit().await?;
        Ok(n)
    }

    async fn insert_one(&self, record: &BusinessRecord) -> Result<u64> {
        let rs = BusinessRows::from_records(std::slice::from_ref(record), self.city, self.state);
        insert_rows(self.pg, &rs).await
    }
}

/// Insert in batches, falling back to one row at a time for a batch that fails. Returns the
/// inserted and skipped counts.
pub async fn insert_all<T: RowSink>(
    sink: &T,
    records: &[BusinessRecord],
    batch_size: usize,
) -> (u64, u64) {
    let (mut inserted, mut skipped) = (0, 0);
    for (i, batch) in records.chunks(batch_size.max(1)).enumerate() {
        match sink.insert_batch(batch).await {
            Ok(n) => {
                trace!(batch = i, rows = n, "Batch inserted");
                inserted += n;
            }
            Err(err) => {
                warn!(%err, batch = i, "Batch insert failed, retrying row by row");
                for r in batch {
                    match sink.insert_one(r).await {
                        Ok(n) => inserted += n,
                        Err(err) => {
                            warn!(%err, name = %r.name, "Skipping row");
                            skipped += 1;
                        }
                    }
                }
            }
        }
    }
    (inserted, skipped)
}

pub async fn count(pg: &PgPool) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("select count(*) from businesses")
        .fetch_one(pg)
        .await?;
    Ok(n)
}

/// Category counts in the table, largest first
pub async fn top_categories(pg: &PgPool, limit: i64) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query_as::<_, (Option<String>, i64)>(
        r#"
            select category, count(*) as cnt from businesses
            group by category order by cnt desc, category limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(pg)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(c, n)| (c.unwrap_or_default(), n))
        .collect())
}

pub async fn seed(pg: &PgPool, records: &[BusinessRecord], opts: &SeedOpts) -> Result<SeedStats> {
    let mut stats = SeedStats::default();
    let (records, unnamed) = insertable(records);
    stats.skipped += unnamed;

    if opts.replace {
        stats.deleted = sqlx::query("delete from businesses")
            .execute(pg)
            .await?
            .rows_affected();
        info!(deleted = stats.deleted, "Cleared businesses table");
    }

    let start = Instant::now();
    let (inserted, skipped) =
        insert_all(&PgSink::new(pg, opts), &records, opts.batch_size).await;
    stats.inserted += inserted;
    stats.skipped += skipped;
    debug!("Inserts done in {:?}", start.elapsed());

    stats.total = count(pg).await?;
    info!(
        inserted = stats.inserted,
        skipped = stats.skipped,
        total = stats.total,
        "Seeding complete"
    );
    Ok(stats)
}
