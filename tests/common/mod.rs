//! Shared fixtures: a scripted catalog, a stub poster fetcher and a service
//! wired to a temporary SQLite database.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use vod_collector::application::{CollectorContext, CollectorService, UpsertLocks};
use vod_collector::domain::{
    CatalogTransport, FetchError, ImageFetcher, NewSource, RequestOptions, WireFormat,
};
use vod_collector::infrastructure::config::{CollectorConfig, LocalizerConfig};
use vod_collector::infrastructure::{
    DatabaseConnection, SqliteEventLog, SqliteSourceRegistry, SqliteVideoRepository,
};

pub const SOURCE_URL: &str = "https://catalog.example/api.php/provide/vod/";

/// Serves canned bodies keyed by the `pg` query parameter
#[derive(Default)]
pub struct ScriptedCatalog {
    pages: Mutex<HashMap<u32, String>>,
    requested: Mutex<Vec<u32>>,
    queries: Mutex<Vec<HashMap<String, String>>>,
    delay: Mutex<Duration>,
}

impl ScriptedCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_page(&self, page: u32, body: impl Into<String>) {
        self.pages.lock().unwrap().insert(page, body.into());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn requested_pages(&self) -> Vec<u32> {
        let mut pages = self.requested.lock().unwrap().clone();
        pages.sort_unstable();
        pages
    }

    /// Query parameters of every request, in arrival order
    pub fn queries(&self) -> Vec<HashMap<String, String>> {
        self.queries.lock().unwrap().clone()
    }

    pub fn clear_requests(&self) {
        self.requested.lock().unwrap().clear();
        self.queries.lock().unwrap().clear();
    }
}

#[async_trait]
impl CatalogTransport for ScriptedCatalog {
    async fn get_text(&self, url: &str, _options: RequestOptions) -> Result<String, FetchError> {
        let query: HashMap<String, String> = url::Url::parse(url)
            .map(|u| u.query_pairs().into_owned().collect())
            .unwrap_or_default();
        let page = query.get("pg").and_then(|v| v.parse().ok()).unwrap_or(1);
        self.requested.lock().unwrap().push(page);
        self.queries.lock().unwrap().push(query);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.pages
            .lock()
            .unwrap()
            .get(&page)
            .cloned()
            .ok_or_else(|| FetchError::status(url, 404))
    }
}

/// JSON page with one record per name; ids are left out so they get derived
pub fn json_page(page: u32, pagecount: u32, names: &[String]) -> String {
    let list: Vec<_> = names
        .iter()
        .map(|name| {
            json!({
                "vod_name": name,
                "type_id": 1,
                "type_name": "Movie",
                "vod_pic": format!("https://img.example/{name}.jpg"),
                "vod_play_from": "m3u8",
                "vod_play_url": format!("EP1$https:\\/\\/cdn.example\\/{name}\\/1.m3u8"),
            })
        })
        .collect();
    json!({
        "code": 1,
        "msg": "ok",
        "page": page,
        "pagecount": pagecount,
        "limit": 20,
        "total": u64::from(pagecount) * names.len() as u64,
        "list": list,
    })
    .to_string()
}

/// XML listing in the `rss/list/video` layout with one `dd` play source
pub fn xml_page(page: u32, pagecount: u32, names: &[String]) -> String {
    let videos: String = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            format!(
                "<video><id>{}</id><tid>1</tid><name><![CDATA[{name}]]></name><type>Movie</type>\
                 <pic>https://img.example/{i}.jpg</pic>\
                 <dl><dd flag=\"m3u8\"><![CDATA[EP1$https://cdn.example/{i}/1.m3u8]]></dd></dl></video>",
                u64::from(page) * 1000 + i as u64
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><rss version=\"5.1\">\
         <list page=\"{page}\" pagecount=\"{pagecount}\" pagesize=\"20\" recordcount=\"{}\">{videos}</list></rss>",
        u64::from(pagecount) * names.len() as u64
    )
}

pub fn names(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{prefix} {i}")).collect()
}

/// Writes a small file for every URL that is not marked as failing
#[derive(Default)]
pub struct StubImages {
    failing: Mutex<HashSet<String>>,
    downloads: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
}

impl StubImages {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_url(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageFetcher for StubImages {
    async fn download(&self, url: &str, dest: &Path, _timeout: Duration) -> Result<u64, FetchError> {
        self.downloads.lock().unwrap().push(url.to_string());
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(url) {
            return Err(FetchError::status(url, 404));
        }
        let bytes = b"poster-bytes";
        tokio::fs::write(dest, bytes)
            .await
            .map_err(|e| FetchError::io(dest, &e))?;
        Ok(bytes.len() as u64)
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub service: CollectorService,
    pub catalog: Arc<ScriptedCatalog>,
    pub images: Arc<StubImages>,
    pub source_id: i64,
}

impl Harness {
    pub async fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let url = format!("sqlite:{}", dir.path().join("catalog.db").display());
        let db = DatabaseConnection::new(&url).await?;
        db.migrate().await?;
        let pool = db.pool().clone();

        let catalog = ScriptedCatalog::new();
        let images = StubImages::new();
        let ctx = CollectorContext {
            videos: Arc::new(SqliteVideoRepository::new(pool.clone())),
            events: Arc::new(SqliteEventLog::new(pool.clone())),
            sources: Arc::new(SqliteSourceRegistry::new(pool)),
            transport: catalog.clone(),
            images: images.clone(),
            upsert_locks: Arc::new(UpsertLocks::new(8)),
            collector: CollectorConfig {
                retry_base_delay_ms: 0,
                ..CollectorConfig::default()
            },
            localizer: LocalizerConfig {
                poster_dir: dir.path().join("posters"),
                retry_step_ms: 0,
                max_retries: 2,
                ..LocalizerConfig::default()
            },
        };
        let service = CollectorService::new(ctx);
        let source_id = service
            .add_source(&NewSource::new("Primary", SOURCE_URL, WireFormat::Json))
            .await?;

        Ok(Self {
            dir,
            service,
            catalog,
            images,
            source_id,
        })
    }

    pub fn poster_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("posters")
    }
}
