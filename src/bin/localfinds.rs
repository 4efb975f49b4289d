use anyhow::{Context, Result, bail};
use chrono::Local;
use localfinds::{
    cache::Client,
    callsheet::{self, Pitch},
    cli::{Cli, CollectArgs, Commands},
    collect::{Batch, Collector},
    config::Config,
    db::{self, SeedOpts},
    enrich::enrich,
    export,
    models::SourceKind,
    normalize::Normalizer,
    plan::{Query, QueryPlan},
    report::{Outcome, RunReport},
    scrape::{ExecPolicy, Executor, Source, TokioSleeper},
    scrapers::{contacts::Contacts, osm::Osm, places::Places, yellowpages::YellowPages, yelp::Yelp},
    signals::{self, Shutdown},
};
use sqlx::postgres::PgPoolOptions;
use std::{path::Path, process::ExitCode};
use tracing::{debug, info, warn};
use url::Url;

#[cfg(all(target_env = "musl", target_pointer_width = "64"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> ExitCode {
    // dotenvy never overwrites, so the local file has to go first
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    if let Err(e) = cli.init_logger() {
        eprintln!("Error: {e:#}");
        return ExitCode::from(1);
    }

    match run(cli).await {
        Ok(Outcome::Complete) => ExitCode::SUCCESS,
        Ok(Outcome::Partial) => ExitCode::from(2),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<Outcome> {
    let config = Config::load_or_default(cli.config.as_deref())?;
    debug!(city = %config.city, anchors = config.anchors.len(), "Config loaded");

    match cli.command {
        Commands::Collect(args) => collect(&config, args).await,
        Commands::Seed {
            input,
            database_url,
            replace,
            batch_size,
        } => {
            let opts = SeedOpts {
                batch_size,
                replace,
                city: config.city.clone(),
                state: config.state.clone(),
            };
            seed(&input, database_url, &opts).await?;
            Ok(Outcome::Complete)
        }
        Commands::CallSheet { input, output } => {
            call_sheet(&config, &input, &output)?;
            Ok(Outcome::Complete)
        }
    }
}

/// Runs each source with the shared policy and real sleeps
struct Run<'a> {
    policy: ExecPolicy,
    batch: Batch<'a>,
}

impl Run<'_> {
    async fn source<S, I>(&mut self, source: S, queries: I)
    where
        S: Source,
        I: IntoIterator<Item = Query>,
    {
        let exec = Executor::new(source, TokioSleeper, self.policy.clone());
        self.batch.run(&exec, queries).await;
    }
}

async fn collect(config: &Config, args: CollectArgs) -> Result<Outcome> {
    args.credentials().check(&args.sources)?;
    let started_at = Local::now();

    let client = Client::build(args.cache_opts())
        .await
        .context("failed to build HTTP client")?;
    let shutdown = Shutdown::default();
    signals::listen(shutdown.clone())?;

    let mut policy = config.policy.clone();
    if let Some(n) = args.max_pages {
        policy.max_pages = n.max(1);
    }
    let normalizer = Normalizer::new(&config.fallback_address());
    let mut collector = Collector::new(args.merge);
    // validated non-empty
    let first_anchor = config.anchors[0].clone();

    // the directory sites search by city name, one anchor is enough
    let directory_plan = QueryPlan::new(
        config.directory_terms.as_slice(),
        std::slice::from_ref(&first_anchor),
    );
    let places = args
        .places_key
        .as_deref()
        .map(|key| Places::new(client.clone(), key, &config.city, &config.state));

    let mut run = Run {
        policy,
        batch: Batch::new(&normalizer, &mut collector, &shutdown),
    };
    for kind in &args.sources {
        info!(source = %kind, "Starting source");
        match kind {
            SourceKind::Places => {
                // credentials were checked above
                let Some(places) = places.clone() else {
                    bail!("GOOGLE_PLACES_API_KEY is required for source {kind}");
                };
                let plan = QueryPlan::new(config.terms.as_slice(), &config.anchors);
                run.source(places, plan.iter()).await;
            }
            SourceKind::Contacts => {
                let (Some(url), Some(key)) = (&args.contacts_url, &args.contacts_key) else {
                    bail!("CONTACTS_API_URL and CONTACTS_API_KEY are required for source {kind}");
                };
                let base = Url::parse(url).context("invalid CONTACTS_API_URL")?;
                let contacts = Contacts::new(client.clone(), base, key, config.contacts_page_size)
                    .context("invalid CONTACTS_API_KEY")?;
                run.source(contacts, [Query::area(first_anchor.clone())]).await;
            }
            SourceKind::Yelp => {
                run.source(
                    Yelp::new(client.clone(), &config.city, &config.state),
                    directory_plan.iter(),
                )
                .await;
            }
            SourceKind::YellowPages => {
                run.source(
                    YellowPages::new(client.clone(), &config.city, &config.state),
                    directory_plan.iter(),
                )
                .await;
            }
            SourceKind::Osm => {
                let osm = Osm::new(client.clone(), config.bbox, &config.city, &config.state);
                run.source(osm, [Query::area(first_anchor.clone())]).await;
            }
        }
    }
    let exec_stats = run.batch.stats;

    let enrich_stats = match (&places, args.enrich) {
        (Some(places), true) if args.sources.contains(&SourceKind::Places) => {
            info!(records = collector.len(), "Looking up place details");
            Some(
                enrich(
                    collector.records_mut(),
                    places,
                    &TokioSleeper,
                    config.detail_delay,
                    &shutdown,
                )
                .await,
            )
        }
        (_, true) => {
            info!("Nothing to enrich, places is not among the sources");
            None
        }
        _ => None,
    };

    let collection = collector.into_collection();
    export::write_file(&args.output, &collection.records)?;
    if let Err(err) = client.save().await {
        warn!(error = %err, "Failed to save the page cache");
    }

    let report = RunReport::new(started_at, exec_stats, &collection, enrich_stats);
    print!("{report}");
    Ok(report.outcome())
}

async fn seed(input: &Path, database_url: Option<String>, opts: &SeedOpts) -> Result<()> {
    let Some(database_url) = database_url else {
        bail!("DATABASE_URL must be set");
    };
    let records = export::read_file(input)?;
    info!(records = records.len(), path = %input.display(), "Export loaded");

    let pg = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .context("failed to connect to database")?;

    let stats = db::seed(&pg, &records, opts).await?;
    println!(
        "Inserted {} rows, skipped {}, deleted {}. {} rows in table.",
        stats.inserted, stats.skipped, stats.deleted, stats.total
    );
    let top = db::top_categories(&pg, 10).await?;
    if !top.is_empty() {
        println!("Top categories:");
        for (c, n) in top {
            println!("  {c}: {n}");
        }
    }
    pg.close().await;
    Ok(())
}

fn call_sheet(config: &Config, input: &Path, output: &Path) -> Result<()> {
    let records = export::read_file(input)?;
    let pitch = Pitch {
        city: config.city.clone(),
        directory_name: config.directory_name.clone(),
    };
    let sheet = callsheet::build(&records, &pitch);
    callsheet::write_file(output, &sheet)?;
    let s = sheet.stats;
    println!(
        "{} calls from {} records: {} high, {} medium, {} warm, {} standard",
        s.total(),
        s.considered,
        s.high,
        s.medium,
        s.warm,
        s.standard
    );
    Ok(())
}
