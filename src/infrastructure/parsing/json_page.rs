//! JSON listing parser
//!
//! Header fields default when missing and may arrive as numbers or numeric
//! strings. A `vod_play_url` delivered as a `{source: urls}` object is
//! flattened into the `$$$`-joined `vod_play_from`/`vod_play_url` pair.

use serde_json::{Map, Value};

use super::{PagePayloadParser, payload_text};
use crate::domain::collection::{Category, PageResult, RawRecord, parse_lenient_int};
use crate::domain::constants::{page_defaults, play_url};
use crate::domain::source::WireFormat;
use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPageParser;

impl PagePayloadParser for JsonPageParser {
    fn format(&self) -> WireFormat {
        WireFormat::Json
    }

    fn parse(&self, body: &str) -> ParsingResult<PageResult> {
        let text = payload_text(body).ok_or(ParsingError::empty_body(WireFormat::Json))?;
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ParsingError::malformed(WireFormat::Json, e.to_string()))?;
        let Value::Object(root) = value else {
            return Err(ParsingError::unexpected_shape(
                WireFormat::Json,
                "top-level value is not an object",
            ));
        };

        let list = match root.get("list") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_object)
                .map(|item| flatten_record(item.clone()))
                .collect(),
            _ => Vec::new(),
        };

        let class = match root.get("class") {
            Some(Value::Array(items)) => items.iter().filter_map(parse_category).collect(),
            _ => Vec::new(),
        };

        Ok(PageResult {
            code: header_int(&root, "code").unwrap_or(page_defaults::CODE),
            msg: root
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            page: header_u32(&root, "page").unwrap_or(page_defaults::PAGE),
            pagecount: header_u32(&root, "pagecount").unwrap_or(page_defaults::PAGE_COUNT),
            limit: header_u32(&root, "limit").unwrap_or(page_defaults::LIMIT),
            total: header_int(&root, "total")
                .and_then(|v| u64::try_from(v).ok())
                .unwrap_or(page_defaults::TOTAL),
            list,
            class,
        })
    }
}

fn lenient_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => parse_lenient_int(s),
        _ => None,
    }
}

fn header_int(root: &Map<String, Value>, key: &str) -> Option<i64> {
    root.get(key).and_then(lenient_int)
}

fn header_u32(root: &Map<String, Value>, key: &str) -> Option<u32> {
    header_int(root, key).and_then(|v| u32::try_from(v).ok())
}

fn parse_category(value: &Value) -> Option<Category> {
    let item = value.as_object()?;
    let type_id = item.get("type_id").and_then(lenient_int)?;
    Some(Category {
        type_id,
        type_pid: item.get("type_pid").and_then(lenient_int).unwrap_or(0),
        type_name: match item.get("type_name") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        },
    })
}

fn flatten_record(mut item: Map<String, Value>) -> RawRecord {
    match item.remove("vod_play_url") {
        Some(Value::Object(sources)) => {
            let mut from = Vec::with_capacity(sources.len());
            let mut urls = Vec::with_capacity(sources.len());
            for (name, value) in sources {
                urls.push(match value {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                });
                from.push(name);
            }
            item.insert(
                "vod_play_from".to_string(),
                Value::String(from.join(play_url::SOURCE_SEPARATOR)),
            );
            item.insert(
                "vod_play_url".to_string(),
                Value::String(urls.join(play_url::SOURCE_SEPARATOR)),
            );
        }
        Some(other) => {
            item.insert("vod_play_url".to_string(), other);
        }
        None => {}
    }
    RawRecord::from_map(item)
}
