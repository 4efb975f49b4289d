use crate::{cache, collect::MergePolicy, config::Credentials, models::SourceKind};
use anyhow::{Error, Result};
use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::log::LevelFilter;
use clap_verbosity_flag::{ErrorLevel, Verbosity};
use std::{io, path::PathBuf, time::Duration};
use tracing_subscriber::filter::LevelFilter as TFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Default, ValueEnum)]
pub enum LogFormat {
    Normal,
    Compact,
    Pretty,
    #[default]
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None, propagate_version = true)]
pub struct Cli {
    /// Log level verbosity
    #[command(flatten)]
    pub verbosity: Verbosity<ErrorLevel>,

    /// Which log formatter to use
    // env will pick up the value if the field name is given as the key in uppercase
    #[arg(short = 'f', long, env, default_value_t, value_enum)]
    pub log_format: LogFormat,

    /// JSON file with city, anchors, search terms and timing. Built-in defaults when not given.
    #[arg(short, long, env = "LOCALFINDS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Query the given sources and export the merged listing to CSV
    Collect(CollectArgs),
    /// Load an exported CSV into the businesses table
    Seed {
        /// Exported CSV to load
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
        database_url: Option<String>,

        /// Delete all existing rows first
        #[arg(long)]
        replace: bool,

        /// Rows per insert statement
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
    },
    /// Turn an exported CSV into a prioritized cold call sheet
    CallSheet {
        /// Exported CSV to read
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the call sheet
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, clap::Args)]
pub struct CollectArgs {
    /// Sources to query, in order
    #[arg(short, long, required = true, value_delimiter = ',', value_enum)]
    pub sources: Vec<SourceKind>,

    /// Where to write the CSV export
    #[arg(short, long)]
    pub output: PathBuf,

    /// Look up phone, website and hours for each Places record
    #[arg(long)]
    pub enrich: bool,

    /// What to do with a record whose identity was already collected
    #[arg(long, default_value_t, value_enum)]
    pub merge: MergePolicy,

    /// Pages per query, overriding the config file
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Keep fetched listing pages in this file between runs
    #[arg(long)]
    pub cache_file: Option<PathBuf>,

    /// How long fetched listing pages stay fresh, e.g. "6h". Zero turns caching off.
    #[arg(long, default_value = "0s", value_parser = humantime::parse_duration)]
    pub cache_ttl: Duration,

    #[arg(long, default_value = "15s", value_parser = humantime::parse_duration)]
    pub request_timeout: Duration,

    #[arg(long, env = "GOOGLE_PLACES_API_KEY", hide_env_values = true)]
    pub places_key: Option<String>,

    #[arg(long, env = "CONTACTS_API_URL")]
    pub contacts_url: Option<String>,

    #[arg(long, env = "CONTACTS_API_KEY", hide_env_values = true)]
    pub contacts_key: Option<String>,
}

impl CollectArgs {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            places_key: self.places_key.clone(),
            contacts_url: self.contacts_url.clone(),
            contacts_key: self.contacts_key.clone(),
        }
    }

    pub fn cache_opts(&self) -> cache::Opts {
        cache::Opts {
            request_timeout: self.request_timeout,
            cache_ttl: self.cache_ttl,
            cache_path: self.cache_file.clone(),
            ..Default::default()
        }
    }
}

impl Cli {
    /// Wrapper for clap::Parser::try_parse_from
    pub fn try_parse_opts<I, T>(itr: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from(itr).map_err(Error::from)
    }

    // this thin wrapper makes it possible to do the parsing without importing clap::Parser at the
    // call site
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Maps clap_verbosity_flag::LevelFilter values to tracing_subscriber::filter::LevelFilter
    /// values
    fn tracing_level_filter(&self) -> TFilter {
        match self.verbosity.log_level_filter() {
            LevelFilter::Off => TFilter::OFF,
            LevelFilter::Error => TFilter::ERROR,
            LevelFilter::Warn => TFilter::WARN,
            LevelFilter::Info => TFilter::INFO,
            LevelFilter::Debug => TFilter::DEBUG,
            LevelFilter::Trace => TFilter::TRACE,
        }
    }

    /// Logs go to stderr, stdout is kept for the run report
    pub fn init_logger(&self) -> Result<()> {
        let layer = match self.log_format {
            LogFormat::Json => fmt::layer().json().with_writer(io::stderr).boxed(),
            LogFormat::Pretty => fmt::layer().pretty().with_writer(io::stderr).boxed(),
            LogFormat::Compact => fmt::layer()
                .without_time()
                .compact()
                .with_writer(io::stderr)
                .boxed(),
            LogFormat::Normal => fmt::layer().with_writer(io::stderr).boxed(),
        };
        tracing_subscriber::registry()
            .with(
                EnvFilter::builder()
                    .with_default_directive(self.tracing_level_filter().into())
                    .from_env()?,
            )
            .with(layer)
            .init();
        Ok(())
    }
}
