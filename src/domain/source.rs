//! Catalog sources as maintained by the administrator

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Payload format a source answers in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Json,
    Xml,
}

impl WireFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "" => Ok(Self::Json),
            "xml" => Ok(Self::Xml),
            other => Err(format!("unknown wire format: {other}")),
        }
    }
}

/// A configured upstream listing API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    pub format: WireFormat,
    pub is_active: bool,
    pub sort_order: i64,
    pub note: String,
}

/// Input for registering a new source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSource {
    pub name: String,
    pub base_url: String,
    pub format: WireFormat,
    pub is_active: bool,
    pub sort_order: i64,
    pub note: String,
}

impl NewSource {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, format: WireFormat) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            format,
            is_active: true,
            sort_order: 0,
            note: String::new(),
        }
    }
}
