//! Catalog payload parsing
//!
//! Both wire formats parse into the canonical `PageResult`. Parsers are
//! stateless; `parse_page` picks one by the declared format.

pub mod json_page;
pub mod xml_page;

pub use json_page::JsonPageParser;
pub use xml_page::XmlPageParser;

pub use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};

use crate::domain::collection::PageResult;
use crate::domain::source::WireFormat;

/// A parser for one wire format
pub trait PagePayloadParser {
    fn format(&self) -> WireFormat;

    fn parse(&self, body: &str) -> ParsingResult<PageResult>;
}

/// Parses `body` using the parser for `format`.
pub fn parse_page(body: &str, format: WireFormat) -> ParsingResult<PageResult> {
    match format {
        WireFormat::Json => JsonPageParser.parse(body),
        WireFormat::Xml => XmlPageParser.parse(body),
    }
}

/// Strips a UTF-8 byte order mark and surrounding whitespace; `None` when
/// nothing is left.
pub(crate) fn payload_text(body: &str) -> Option<&str> {
    let trimmed = body.trim_start_matches('\u{feff}').trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
