//! Catalog protocol and pipeline constants
//!
//! Values shared by the collection pipeline and the poster localizer.
//! Anything an operator may want to tune lives in `infrastructure::config`
//! instead; these are protocol facts and fallbacks.

/// Separators used by the MacCMS play/download URL encoding
pub mod play_url {
    /// Joins alternate sources (`from` names and their URL lists)
    pub const SOURCE_SEPARATOR: &str = "$$$";

    /// Joins episodes inside one source
    pub const EPISODE_SEPARATOR: &str = "#";

    /// Separates an episode label from its URL (`label$url`)
    pub const LABEL_SEPARATOR: char = '$';

    /// Escaped slash as emitted by some PHP JSON encoders
    pub const ESCAPED_SLASH: &str = "\\/";
}

/// Defaults for the page header when the upstream omits a field
pub mod page_defaults {
    pub const CODE: i64 = 1;
    pub const PAGE: u32 = 1;
    pub const PAGE_COUNT: u32 = 1;
    pub const LIMIT: u32 = 20;
    pub const TOTAL: u64 = 0;

    /// Status code for a successful listing response
    pub const SUCCESS_CODE: i64 = 1;
}

/// Collection job limits
pub mod collection {
    /// Consecutive update/skip outcomes after which a job stops itself
    pub const DUPLICATE_STREAK_THRESHOLD: u32 = 20;

    /// Number of recent errors retained per job
    pub const MAX_RECENT_ERRORS: usize = 50;

    pub const DEFAULT_WORKERS: usize = 3;
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Category name stored when the upstream record carries none
    pub const UNCATEGORIZED: &str = "Uncategorized";

    /// Derived identities fall in `0..DERIVED_ID_MODULUS` (8 digits)
    pub const DERIVED_ID_MODULUS: u64 = 100_000_000;
}

/// Poster localization limits
pub mod localization {
    pub const DEFAULT_WORKERS: usize = 10;
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Extensions kept as-is in local file names; anything else becomes `.jpg`
    pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];
    pub const FALLBACK_EXTENSION: &str = "jpg";

    /// Length of the URL hash fragment in local file names
    pub const URL_HASH_CHARS: usize = 8;

    pub const MAX_RECENT_ERRORS: usize = 50;
}

/// Source probing (`probe` in the CLI)
pub mod probe {
    pub const TIMEOUT_SECS: u64 = 15;
    pub const MAX_RETRIES: u32 = 2;
    pub const MAX_CATEGORIES: usize = 10;
    pub const MAX_SAMPLES: usize = 12;
}
