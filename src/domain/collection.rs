//! Collection request parameters and the canonical page model
//!
//! `PageResult` is what both wire formats parse into. `RawRecord` keeps the
//! upstream record as an ordered key/value map until the normalizer picks the
//! fields it knows about.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::domain::constants::{collection, page_defaults};
use crate::domain::source::WireFormat;

/// The `ac` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectAction {
    /// Category listing (records carry only summary fields)
    List,
    #[default]
    #[serde(rename = "videolist")]
    VideoList,
    Detail,
}

impl CollectAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::VideoList => "videolist",
            Self::Detail => "detail",
        }
    }
}

impl fmt::Display for CollectAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "list" => Ok(Self::List),
            "videolist" => Ok(Self::VideoList),
            "detail" => Ok(Self::Detail),
            other => Err(format!("unknown collect action: {other}")),
        }
    }
}

/// Parameters of one collection run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionParams {
    pub action: CollectAction,
    /// Overrides the source's own wire format when set
    pub format: Option<WireFormat>,
    pub category_id: Option<i64>,
    pub start_page: u32,
    /// Clamped to the discovered page count; `None` means "all pages"
    pub end_page: Option<u32>,
    pub ids: Option<String>,
    pub keyword: Option<String>,
    pub recent_hours: Option<u32>,
    pub update_existing: bool,
    pub workers: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for CollectionParams {
    fn default() -> Self {
        Self {
            action: CollectAction::default(),
            format: None,
            category_id: None,
            start_page: 1,
            end_page: None,
            ids: None,
            keyword: None,
            recent_hours: None,
            update_existing: false,
            workers: collection::DEFAULT_WORKERS,
            timeout_secs: collection::DEFAULT_TIMEOUT_SECS,
            max_retries: collection::DEFAULT_MAX_RETRIES,
        }
    }
}

impl CollectionParams {
    /// Guards against zero values coming from callers
    pub fn sanitized(mut self) -> Self {
        self.start_page = self.start_page.max(1);
        self.workers = self.workers.max(1);
        self.timeout_secs = self.timeout_secs.max(1);
        self.max_retries = self.max_retries.max(1);
        self
    }
}

/// A category advertised by the upstream `class` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub type_id: i64,
    #[serde(default)]
    pub type_pid: i64,
    pub type_name: String,
}

/// One page of upstream results in canonical shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub code: i64,
    pub msg: String,
    pub page: u32,
    pub pagecount: u32,
    pub limit: u32,
    pub total: u64,
    pub list: Vec<RawRecord>,
    pub class: Vec<Category>,
}

impl Default for PageResult {
    fn default() -> Self {
        Self {
            code: page_defaults::CODE,
            msg: String::new(),
            page: page_defaults::PAGE,
            pagecount: page_defaults::PAGE_COUNT,
            limit: page_defaults::LIMIT,
            total: page_defaults::TOTAL,
            list: Vec::new(),
            class: Vec::new(),
        }
    }
}

impl PageResult {
    pub const fn is_success(&self) -> bool {
        self.code == page_defaults::SUCCESS_CODE
    }
}

/// An upstream record after wire-format flattening
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Field as text; numbers are rendered, `null` is absent.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Field as an integer; accepts numbers and numeric strings.
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => parse_lenient_int(s),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

pub(crate) fn parse_lenient_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
}
