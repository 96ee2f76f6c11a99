//! XML listing parser
//!
//! Reads the `rss/list` layout: list attributes form the page header,
//! `video` children map field by field into records, `dl/dd[@flag]` becomes
//! the `$$$`-joined play pair and `class/ty` becomes the category list.

use roxmltree::{Document, Node, ParsingOptions};

use super::{PagePayloadParser, payload_text};
use crate::domain::collection::{Category, PageResult, RawRecord, parse_lenient_int};
use crate::domain::constants::{page_defaults, play_url};
use crate::domain::source::WireFormat;
use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};

/// `video` child tag to canonical field
const FIELD_MAP: &[(&str, &str)] = &[
    ("id", "vod_id"),
    ("tid", "type_id"),
    ("name", "vod_name"),
    ("type", "type_name"),
    ("pic", "vod_pic"),
    ("lang", "vod_lang"),
    ("area", "vod_area"),
    ("year", "vod_year"),
    ("note", "vod_remarks"),
    ("actor", "vod_actor"),
    ("director", "vod_director"),
    ("des", "vod_content"),
    ("last", "vod_time"),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct XmlPageParser;

impl PagePayloadParser for XmlPageParser {
    fn format(&self) -> WireFormat {
        WireFormat::Xml
    }

    fn parse(&self, body: &str) -> ParsingResult<PageResult> {
        let text = payload_text(body).ok_or(ParsingError::empty_body(WireFormat::Xml))?;
        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let doc = Document::parse_with_options(text, options)
            .map_err(|e| ParsingError::malformed(WireFormat::Xml, e.to_string()))?;
        let root = doc.root_element();

        let mut result = PageResult {
            msg: "xml".to_string(),
            ..PageResult::default()
        };

        if let Some(list) = root.descendants().find(|n| n.has_tag_name("list")) {
            result.page = attr_u32(list, "page").unwrap_or(page_defaults::PAGE);
            result.pagecount = attr_u32(list, "pagecount").unwrap_or(page_defaults::PAGE_COUNT);
            result.limit = attr_u32(list, "pagesize").unwrap_or(page_defaults::LIMIT);
            result.total = attr_int(list, "recordcount")
                .and_then(|v| u64::try_from(v).ok())
                .unwrap_or(page_defaults::TOTAL);
            result.list = list
                .children()
                .filter(|n| n.has_tag_name("video"))
                .map(video_record)
                .collect();
        }

        if let Some(class) = root.descendants().find(|n| n.has_tag_name("class")) {
            result.class = class
                .children()
                .filter(|n| n.has_tag_name("ty"))
                .filter_map(|ty| {
                    Some(Category {
                        type_id: attr_int(ty, "id")?,
                        type_pid: 0,
                        type_name: node_text(ty),
                    })
                })
                .collect();
        }

        Ok(result)
    }
}

fn attr_int(node: Node<'_, '_>, name: &str) -> Option<i64> {
    node.attribute(name).and_then(parse_lenient_int)
}

fn attr_u32(node: Node<'_, '_>, name: &str) -> Option<u32> {
    attr_int(node, name).and_then(|v| u32::try_from(v).ok())
}

/// Concatenated text and CDATA content, trimmed
fn node_text(node: Node<'_, '_>) -> String {
    node.children()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

fn video_record(video: Node<'_, '_>) -> RawRecord {
    let mut record = RawRecord::new();
    for child in video.children().filter(Node::is_element) {
        let tag = child.tag_name().name();
        if tag == "dl" {
            let (from, urls): (Vec<String>, Vec<String>) = child
                .children()
                .filter(|n| n.has_tag_name("dd"))
                .map(|dd| (dd.attribute("flag").unwrap_or_default().to_string(), node_text(dd)))
                .unzip();
            if !from.is_empty() {
                record.insert("vod_play_from", from.join(play_url::SOURCE_SEPARATOR));
                record.insert("vod_play_url", urls.join(play_url::SOURCE_SEPARATOR));
            }
        } else if let Some((_, field)) = FIELD_MAP.iter().find(|(xml_tag, _)| *xml_tag == tag) {
            record.insert(*field, node_text(child));
        }
    }
    record
}
