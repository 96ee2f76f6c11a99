//! Catalog API client: URL construction plus the fetch-and-parse retry loop
//!
//! The transport already retries individual requests on 429/5xx and
//! connection failures. This layer wraps the whole fetch, parse and status
//! check in a second, exponential retry loop.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::domain::collection::{Category, CollectAction, CollectionParams, PageResult, RawRecord};
use crate::domain::constants::probe;
use crate::domain::services::{CatalogTransport, FetchError, RequestOptions};
use crate::domain::source::WireFormat;
use crate::infrastructure::parsing::{ParsingError, parse_page};
use crate::infrastructure::retry_manager::RetryPolicy;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("invalid source URL {url}: {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParsingError),

    #[error("upstream returned code {code}: {msg}")]
    Upstream { code: i64, msg: String },

    #[error("giving up on {url} after {attempts} attempt(s): {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

/// Query parameters of one catalog request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogQuery {
    pub action: CollectAction,
    pub format: WireFormat,
    pub category_id: Option<i64>,
    pub page: Option<u32>,
    pub ids: Option<String>,
    pub keyword: Option<String>,
    pub recent_hours: Option<u32>,
}

impl CatalogQuery {
    /// Query for `page` of a collection run
    pub fn for_page(params: &CollectionParams, format: WireFormat, page: u32) -> Self {
        Self {
            action: params.action,
            format,
            category_id: params.category_id,
            page: Some(page),
            ids: params.ids.clone(),
            keyword: params.keyword.clone(),
            recent_hours: params.recent_hours,
        }
    }
}

/// Appends the non-blank parameters of `query` to `base`.
pub fn build_url(base: &str, query: &CatalogQuery) -> Result<Url, CatalogError> {
    let mut url = Url::parse(base.trim()).map_err(|e| CatalogError::InvalidBaseUrl {
        url: base.to_string(),
        message: e.to_string(),
    })?;

    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("ac", query.action.as_str());
        if query.format == WireFormat::Xml {
            pairs.append_pair("at", WireFormat::Xml.as_str());
        }
        if let Some(category_id) = query.category_id {
            pairs.append_pair("t", &category_id.to_string());
        }
        if let Some(page) = query.page {
            pairs.append_pair("pg", &page.to_string());
        }
        let text_params = [
            ("ids", query.ids.as_deref()),
            ("wd", query.keyword.as_deref()),
        ];
        for (key, value) in text_params {
            if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
                pairs.append_pair(key, value);
            }
        }
        if let Some(hours) = query.recent_hours.filter(|h| *h > 0) {
            pairs.append_pair("h", &hours.to_string());
        }
    }
    Ok(url)
}

/// Result of testing a source URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProbe {
    pub total: u64,
    pub pagecount: u32,
    pub limit: u32,
    pub categories: Vec<Category>,
    pub samples: Vec<RawRecord>,
}

#[derive(Clone)]
pub struct CatalogClient {
    transport: Arc<dyn CatalogTransport>,
    retry_base_delay: Duration,
}

impl CatalogClient {
    pub fn new(transport: Arc<dyn CatalogTransport>, retry_base_delay: Duration) -> Self {
        Self {
            transport,
            retry_base_delay,
        }
    }

    /// Fetches and parses one page, retrying up to `options.max_retries`
    /// attempts. A non-success `code` counts as a failed attempt.
    pub async fn fetch_page(
        &self,
        base_url: &str,
        query: &CatalogQuery,
        options: RequestOptions,
    ) -> Result<PageResult, CatalogError> {
        let url = build_url(base_url, query)?.to_string();
        let policy = RetryPolicy::exponential(options.max_retries, self.retry_base_delay);

        policy
            .run(&url, |_| self.fetch_once(&url, query.format, options))
            .await
            .map_err(|err| CatalogError::Exhausted {
                url: url.clone(),
                attempts: policy.max_attempts,
                last_error: err.to_string(),
            })
    }

    async fn fetch_once(
        &self,
        url: &str,
        format: WireFormat,
        options: RequestOptions,
    ) -> Result<PageResult, CatalogError> {
        let body = self.transport.get_text(url, options).await?;
        let page = parse_page(&body, format)?;
        if !page.is_success() {
            return Err(CatalogError::Upstream {
                code: page.code,
                msg: page.msg,
            });
        }
        debug!(url, records = page.list.len(), "Parsed catalog page");
        Ok(page)
    }

    /// Category list advertised by the source (`ac=list`)
    pub async fn fetch_categories(
        &self,
        base_url: &str,
        format: WireFormat,
        options: RequestOptions,
    ) -> Result<Vec<Category>, CatalogError> {
        let query = CatalogQuery {
            action: CollectAction::List,
            format,
            ..CatalogQuery::default()
        };
        Ok(self.fetch_page(base_url, &query, options).await?.class)
    }

    /// Keyword search without persisting anything
    pub async fn search(
        &self,
        base_url: &str,
        format: WireFormat,
        keyword: &str,
        page: u32,
        category_id: Option<i64>,
        options: RequestOptions,
    ) -> Result<PageResult, CatalogError> {
        let query = CatalogQuery {
            action: CollectAction::VideoList,
            format,
            category_id,
            page: Some(page.max(1)),
            keyword: Some(keyword.to_string()),
            ..CatalogQuery::default()
        };
        self.fetch_page(base_url, &query, options).await
    }

    /// Fetches page 1 with a short timeout and summarizes what came back.
    pub async fn probe(&self, base_url: &str, format: WireFormat) -> Result<SourceProbe, CatalogError> {
        let query = CatalogQuery {
            action: CollectAction::List,
            format,
            page: Some(1),
            ..CatalogQuery::default()
        };
        let options = RequestOptions::new(Duration::from_secs(probe::TIMEOUT_SECS), probe::MAX_RETRIES);
        let page = self.fetch_page(base_url, &query, options).await?;

        Ok(SourceProbe {
            total: page.total,
            pagecount: page.pagecount,
            limit: page.limit,
            categories: page.class.into_iter().take(probe::MAX_CATEGORIES).collect(),
            samples: page.list.into_iter().take(probe::MAX_SAMPLES).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    const BASE: &str = "https://api.example/api.php/provide/vod/";

    /// Replays canned bodies in order, repeating the last one
    struct Replay {
        bodies: Mutex<Vec<Result<String, FetchError>>>,
        calls: AtomicU32,
    }

    impl Replay {
        fn new(bodies: Vec<Result<String, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                bodies: Mutex::new(bodies),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl CatalogTransport for Replay {
        async fn get_text(&self, _url: &str, _options: RequestOptions) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut bodies = self.bodies.lock().unwrap();
            if bodies.len() > 1 { bodies.remove(0) } else { bodies[0].clone() }
        }
    }

    fn options(retries: u32) -> RequestOptions {
        RequestOptions::new(Duration::from_secs(1), retries)
    }

    #[test]
    fn url_carries_only_non_blank_params() {
        let query = CatalogQuery {
            action: CollectAction::Detail,
            format: WireFormat::Json,
            page: Some(2),
            ids: Some("  ".into()),
            keyword: Some("星 球".into()),
            ..CatalogQuery::default()
        };
        let url = build_url(BASE, &query).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("ac".to_string(), "detail".to_string()),
                ("pg".to_string(), "2".to_string()),
                ("wd".to_string(), "星 球".to_string()),
            ]
        );
        assert!(!url.as_str().contains(' '));
    }

    #[test]
    fn xml_sources_send_at_and_filters() {
        let query = CatalogQuery {
            format: WireFormat::Xml,
            category_id: Some(6),
            recent_hours: Some(24),
            ..CatalogQuery::default()
        };
        let url = build_url(BASE, &query).unwrap();
        assert_eq!(url.query(), Some("ac=videolist&at=xml&t=6&h=24"));
    }

    #[test]
    fn invalid_base_url_is_reported() {
        let err = build_url("not a url", &CatalogQuery::default()).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidBaseUrl { .. }));
    }

    #[tokio::test]
    async fn non_success_code_is_retried() {
        let transport = Replay::new(vec![
            Ok(r#"{"code": 0, "msg": "busy"}"#.into()),
            Ok(r#"{"code": 1, "pagecount": 4, "list": [{"vod_name": "A"}]}"#.into()),
        ]);
        let client = CatalogClient::new(transport.clone(), Duration::ZERO);
        let page = tokio_test::assert_ok!(client.fetch_page(BASE, &CatalogQuery::default(), options(3)).await);
        assert_eq!(page.pagecount, 4);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_attempts_report_last_error() {
        let transport = Replay::new(vec![Ok("   ".into())]);
        let client = CatalogClient::new(transport.clone(), Duration::ZERO);
        let err = client
            .fetch_page(BASE, &CatalogQuery::default(), options(3))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Exhausted { attempts: 3, .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn probe_truncates_categories_and_samples() {
        let class: Vec<_> = (1..=15)
            .map(|i| serde_json::json!({"type_id": i, "type_name": format!("C{i}")}))
            .collect();
        let list: Vec<_> = (1..=20)
            .map(|i| serde_json::json!({"vod_id": i, "vod_name": format!("V{i}")}))
            .collect();
        let body = serde_json::json!({"code": 1, "total": 20, "pagecount": 1, "list": list, "class": class});
        let client = CatalogClient::new(Replay::new(vec![Ok(body.to_string())]), Duration::ZERO);

        let probe = client.probe(BASE, WireFormat::Json).await.unwrap();
        assert_eq!(probe.total, 20);
        assert_eq!(probe.categories.len(), 10);
        assert_eq!(probe.samples.len(), 12);
    }
}
