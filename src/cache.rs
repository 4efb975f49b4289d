// Shared HTTP client. HTML directory pages go through an in-memory response cache that can be
// saved to and loaded from a file between runs; API calls always bypass it, since quota signals
// and continuation tokens have to be fresh.

use crate::scrape::SourceError;
use http_cache_reqwest::{
    Cache, CacheMode, HttpCache, HttpCacheOptions, MokaCache, MokaCacheBuilder, MokaManager,
};
use reqwest::{
    StatusCode,
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue},
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::{
    collections::hash_map::RandomState,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, error, trace};
use url::Url;

static APP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

type MCache = MokaCache<String, Arc<Vec<u8>>, RandomState>;

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    value: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    store: Vec<CacheEntry>,
}

impl CacheFile {
    fn with_capacity(cap: usize) -> Self {
        Self {
            store: Vec::with_capacity(cap),
        }
    }

    /// Try to populate the given cache with contents of the given file.
    /// If it fails to load the file, an error will be logged, and the cache will be returned
    /// unmodified.
    async fn populate_cache<P: AsRef<Path>>(path: P, cache: MCache) -> MCache {
        let this = match Self::load(path) {
            Ok(v) => v,
            Err(err) => {
                error!(%err, "Failed to load cache file");
                return cache;
            }
        };
        let cnt = this.store.len();
        for e in this.store {
            cache.insert(e.key, Arc::new(e.value)).await;
        }
        trace!("Loaded {} values into cache", cnt);
        cache
    }

    async fn from_cache(cache: MCache) -> Self {
        cache.run_pending_tasks().await;
        let mut this = Self::with_capacity(cache.entry_count() as usize);
        for (k, v) in cache.iter() {
            this.store.push(CacheEntry {
                key: (*k).clone(),
                value: (*v).clone(),
            });
        }
        trace!("Loaded {} values from cache", this.store.len());
        this
    }

    fn save<P: AsRef<Path>>(self, path: P) -> anyhow::Result<()> {
        let mut f = BufWriter::new(File::create(path)?);
        bincode::serde::encode_into_std_write(&self.store, &mut f, bincode::config::standard())?;
        f.flush()?;
        Ok(())
    }

    fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let mut f = BufReader::new(File::open(path)?);
        let store = bincode::serde::decode_from_std_read(&mut f, bincode::config::standard())?;
        Ok(Self { store })
    }
}

#[derive(Clone, Debug)]
pub struct Opts {
    pub request_timeout: Duration,
    /// Zero disables caching
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub cache_path: Option<PathBuf>,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            cache_ttl: Duration::ZERO,
            cache_capacity: 2000,
            cache_path: None,
        }
    }
}

impl Opts {
    fn cache_mode(&self) -> CacheMode {
        if self.cache_ttl.is_zero() {
            return CacheMode::NoStore;
        }
        // the directory sites send no-cache headers, so honouring them would never hit
        CacheMode::ForceCache
    }

    fn build_cache(&self) -> MCache {
        MokaCacheBuilder::new(self.cache_capacity as u64)
            .name("ListingPageCache")
            .time_to_live(self.cache_ttl.max(Duration::from_secs(1)))
            .build()
    }

    fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/json"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        reqwest::ClientBuilder::new()
            .user_agent(APP_USER_AGENT)
            .default_headers(headers)
            .timeout(self.request_timeout)
            .build()
    }
}

/// A fetched body with its status. Non-success statuses are not errors here; sources decide
/// what a 429 or a 403 means for them.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub status: StatusCode,
    pub body: String,
}

impl Fetched {
    /// The body, or a status error for anything but 2xx
    pub fn into_success(self) -> Result<String, SourceError> {
        if self.status.is_success() {
            Ok(self.body)
        } else {
            Err(SourceError::Status(self.status))
        }
    }
}

#[derive(Clone)]
pub struct Client {
    cached: ClientWithMiddleware,
    direct: ClientWithMiddleware,
    cache: MCache,
    cache_path: Option<PathBuf>,
}

impl Client {
    pub async fn build(opts: Opts) -> reqwest::Result<Self> {
        // if a file path is set, try to populate the cache from the file,
        // otherwise create empty cache
        let cache = match opts.cache_path.as_ref() {
            Some(p) if p.exists() && !opts.cache_ttl.is_zero() => {
                CacheFile::populate_cache(p, opts.build_cache()).await
            }
            _ => opts.build_cache(),
        };
        let client = opts.build_client()?;
        Ok(Self {
            cached: ClientBuilder::new(client.clone())
                .with(Cache(HttpCache {
                    mode: opts.cache_mode(),
                    manager: MokaManager::new(cache.clone()),
                    options: HttpCacheOptions::default(),
                }))
                .build(),
            direct: ClientBuilder::new(client).build(),
            cache,
            cache_path: opts.cache_path.filter(|_| !opts.cache_ttl.is_zero()),
        })
    }

    pub async fn save(self) -> anyhow::Result<()> {
        match self.cache_path {
            Some(p) => {
                debug!(path = %p.display(), "Saving response cache");
                CacheFile::from_cache(self.cache).await.save(p)
            }
            None => {
                debug!("No cache file path set, unable to save");
                Ok(())
            }
        }
    }

    /// GET through the page cache
    pub async fn get_page(&self, url: Url) -> Result<Fetched, SourceError> {
        trace!(%url, "Fetching page...");
        Self::send(self.cached.get(url)).await
    }

    /// GET straight to the network
    pub async fn get(&self, url: Url, headers: HeaderMap) -> Result<Fetched, SourceError> {
        trace!(url = %url.path(), "Fetching...");
        Self::send(self.direct.get(url).headers(headers)).await
    }

    /// POST straight to the network, with a timeout of its own for slow query endpoints
    pub async fn post_form(
        &self,
        url: Url,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Fetched, SourceError> {
        trace!(%url, "Posting form...");
        Self::send(self.direct.post(url).form(form).timeout(timeout)).await
    }

    async fn send(req: RequestBuilder) -> Result<Fetched, SourceError> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok(Fetched { status, body })
    }
}
