//! Record normalization: identity, category remap and play-url cleaning
//!
//! Turns a `RawRecord` into the values the upserter writes. Nothing here
//! touches the store.

use thiserror::Error;

use crate::domain::collection::RawRecord;
use crate::domain::constants::{collection, play_url};
use crate::domain::repositories::CategoryBindings;
use crate::domain::video::{NewVideo, VideoPatch};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("record has no display name")]
    BlankName,
}

/// A record ready for create-or-update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedVideo {
    pub vod_id: i64,
    pub vod_name: String,
    pub type_id: i64,
    pub type_name: String,
    pub patch: VideoPatch,
}

impl NormalizedVideo {
    pub fn into_new_video(self) -> NewVideo {
        NewVideo {
            fields: self.patch.to_fields(),
            vod_id: self.vod_id,
            vod_name: self.vod_name,
            type_id: self.type_id,
            type_name: self.type_name,
        }
    }
}

pub fn normalize(record: &RawRecord, bindings: &CategoryBindings) -> Result<NormalizedVideo, NormalizeError> {
    let vod_name = record
        .text("vod_name")
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or(NormalizeError::BlankName)?;

    let vod_id = record
        .int("vod_id")
        .filter(|id| *id > 0)
        .unwrap_or_else(|| derive_vod_id(&vod_name));

    let remote_type = record.int("type_id").unwrap_or_default();
    let type_id = bindings.get(&remote_type).copied().unwrap_or(remote_type);

    // The default only applies to records that carry a category id
    let type_name = if record.contains_key("type_name") {
        record.text("type_name").unwrap_or_default()
    } else if record.contains_key("type_id") {
        collection::UNCATEGORIZED.to_string()
    } else {
        String::new()
    };

    let mut patch = VideoPatch::from_record(record);
    patch.vod_play_url = patch.vod_play_url.map(|raw| clean_play_urls(&raw));

    Ok(NormalizedVideo {
        vod_id,
        vod_name,
        type_id,
        type_name,
        patch,
    })
}

/// Stable pseudo id for records without an upstream numeric id
pub fn derive_vod_id(name: &str) -> i64 {
    let hash = blake3::hash(name.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    (u64::from_le_bytes(prefix) % collection::DERIVED_ID_MODULUS) as i64
}

/// Strips episode labels from a `label$url#label$url$$$...` play list.
///
/// Empty episodes and empty sources are dropped; escaped slashes are
/// unescaped.
pub fn clean_play_urls(raw: &str) -> String {
    raw.split(play_url::SOURCE_SEPARATOR)
        .filter_map(|source| {
            let episodes: Vec<String> = source
                .split(play_url::EPISODE_SEPARATOR)
                .filter_map(clean_episode)
                .collect();
            (!episodes.is_empty()).then(|| episodes.join(play_url::EPISODE_SEPARATOR))
        })
        .collect::<Vec<_>>()
        .join(play_url::SOURCE_SEPARATOR)
}

fn clean_episode(episode: &str) -> Option<String> {
    if episode.trim().is_empty() {
        return None;
    }
    let url = episode
        .split_once(play_url::LABEL_SEPARATOR)
        .map_or(episode, |(_, url)| url);
    let url = url.replace(play_url::ESCAPED_SLASH, "/");
    let url = url.trim();
    (!url.is_empty()).then(|| url.to_string())
}
