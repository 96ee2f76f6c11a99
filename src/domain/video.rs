//! Canonical video entity
//!
//! The descriptive columns are declared once in `video_fields!`; the macro
//! generates the entity struct, the per-sighting patch, the SQL column list,
//! row decoding and parameter binding from that single list. Unknown upstream
//! keys never reach the store because nothing outside this list is copied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};

use crate::domain::collection::RawRecord;

macro_rules! video_fields {
    (
        text: { $($text:ident = $text_default:literal),* $(,)? }
        int: { $($int:ident = $int_default:literal),* $(,)? }
    ) => {
        /// Descriptive columns copied from upstream records
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct VideoFields {
            $(pub $text: String,)*
            $(pub $int: i64,)*
        }

        impl Default for VideoFields {
            fn default() -> Self {
                Self {
                    $($text: String::from($text_default),)*
                    $($int: $int_default,)*
                }
            }
        }

        /// Values supplied by one upstream sighting; `None` means the key was absent
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct VideoPatch {
            $(pub $text: Option<String>,)*
            $(pub $int: Option<i64>,)*
        }

        impl VideoFields {
            pub const COLUMNS: &'static [&'static str] = &[
                $(stringify!($text),)*
                $(stringify!($int),)*
            ];

            /// Binds every column in `COLUMNS` order.
            pub fn bind_to<'q>(
                &self,
                mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
            ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
                $(query = query.bind(self.$text.clone());)*
                $(query = query.bind(self.$int);)*
                query
            }

            pub fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
                Ok(Self {
                    $($text: row.try_get(stringify!($text))?,)*
                    $($int: row.try_get(stringify!($int))?,)*
                })
            }

            /// Column definitions for `CREATE TABLE`
            pub fn column_definitions() -> Vec<String> {
                let mut defs = Vec::with_capacity(Self::COLUMNS.len());
                $(defs.push(format!("{} TEXT NOT NULL DEFAULT '{}'", stringify!($text), $text_default));)*
                $(defs.push(format!("{} INTEGER NOT NULL DEFAULT {}", stringify!($int), $int_default));)*
                defs
            }
        }

        impl VideoPatch {
            pub fn from_record(record: &RawRecord) -> Self {
                Self {
                    $($text: record.text(stringify!($text)),)*
                    $($int: record.int(stringify!($int)),)*
                }
            }

            /// Supplied values over the column defaults.
            pub fn to_fields(&self) -> VideoFields {
                let mut fields = VideoFields::default();
                $(if let Some(value) = &self.$text { fields.$text.clone_from(value); })*
                $(if let Some(value) = self.$int { fields.$int = value; })*
                fields
            }

            /// Copies non-empty, non-zero values onto `target` and returns how
            /// many columns changed. Empty strings and zeros never overwrite.
            pub fn apply_to(&self, target: &mut VideoFields) -> usize {
                let mut changed = 0;
                $(
                    if let Some(value) = self.$text.as_deref().filter(|v| !v.is_empty()) {
                        if target.$text != value {
                            target.$text = value.to_string();
                            changed += 1;
                        }
                    }
                )*
                $(
                    if let Some(value) = self.$int.filter(|v| *v != 0) {
                        if target.$int != value {
                            target.$int = value;
                            changed += 1;
                        }
                    }
                )*
                changed
            }
        }
    };
}

video_fields! {
    text: {
        vod_sub = "",
        vod_en = "",
        vod_letter = "",
        vod_color = "",
        vod_tag = "",
        vod_class = "",
        vod_pic = "",
        vod_pic_thumb = "",
        vod_pic_slide = "",
        vod_pic_screenshot = "",
        vod_actor = "",
        vod_director = "",
        vod_writer = "",
        vod_behind = "",
        vod_blurb = "",
        vod_remarks = "",
        vod_pubdate = "",
        vod_serial = "0",
        vod_tv = "",
        vod_weekday = "",
        vod_area = "",
        vod_lang = "",
        vod_year = "",
        vod_version = "",
        vod_state = "",
        vod_author = "",
        vod_jumpurl = "",
        vod_tpl = "",
        vod_tpl_play = "",
        vod_tpl_down = "",
        vod_duration = "",
        vod_score = "0.0",
        vod_time = "",
        vod_douban_score = "0.0",
        vod_reurl = "",
        vod_rel_vod = "",
        vod_rel_art = "",
        vod_content = "",
        vod_play_from = "",
        vod_play_server = "",
        vod_play_note = "",
        vod_play_url = "",
        vod_down_from = "",
        vod_down_server = "",
        vod_down_note = "",
        vod_down_url = "",
        vod_pwd = "",
        vod_pwd_url = "",
        vod_pwd_play = "",
        vod_pwd_play_url = "",
        vod_pwd_down = "",
        vod_pwd_down_url = "",
    }
    int: {
        type_id_1 = 0,
        group_id = 0,
        vod_status = 1,
        vod_total = 0,
        vod_isend = 0,
        vod_lock = 0,
        vod_level = 0,
        vod_copyright = 0,
        vod_points = 0,
        vod_points_play = 0,
        vod_points_down = 0,
        vod_hits = 0,
        vod_hits_day = 0,
        vod_hits_week = 0,
        vod_hits_month = 0,
        vod_up = 0,
        vod_down = 0,
        vod_score_all = 0,
        vod_score_num = 0,
        vod_time_add = 0,
        vod_time_hits = 0,
        vod_time_make = 0,
        vod_trysee = 0,
        vod_douban_id = 0,
    }
}

/// A stored video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Store row id
    pub id: i64,
    pub vod_id: i64,
    pub vod_name: String,
    pub type_id: i64,
    pub type_name: String,
    #[serde(flatten)]
    pub fields: VideoFields,
    pub is_localized: bool,
    pub local_pic: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoRecord {
    pub fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            vod_id: row.try_get("vod_id")?,
            vod_name: row.try_get("vod_name")?,
            type_id: row.try_get("type_id")?,
            type_name: row.try_get("type_name")?,
            fields: VideoFields::from_row(row)?,
            is_localized: row.try_get("is_localized")?,
            local_pic: row.try_get("local_pic")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Remote poster URL when it is an http(s) link
    pub fn remote_picture(&self) -> Option<&str> {
        let pic = self.fields.vod_pic.trim();
        (pic.starts_with("http://") || pic.starts_with("https://")).then_some(pic)
    }

    /// Public picture URL: the localized file first, then the remote link,
    /// then `placeholder`.
    pub fn picture_url(&self, public_prefix: &str, placeholder: &str) -> String {
        if self.is_localized && !self.local_pic.is_empty() {
            return format!("{}/{}", public_prefix.trim_end_matches('/'), self.local_pic);
        }
        let pic = self.fields.vod_pic.trim();
        if pic.is_empty() {
            placeholder.to_string()
        } else {
            pic.to_string()
        }
    }
}

/// A video about to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVideo {
    pub vod_id: i64,
    pub vod_name: String,
    pub type_id: i64,
    pub type_name: String,
    pub fields: VideoFields,
}

/// Store-side filter for counting and listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFilter {
    pub type_id: Option<i64>,
    pub type_name: Option<String>,
    pub localized: Option<bool>,
}

impl VideoFilter {
    pub fn category_name(name: impl Into<String>) -> Self {
        Self {
            type_name: Some(name.into()),
            ..Self::default()
        }
    }
}
