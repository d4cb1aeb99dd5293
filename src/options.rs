#![forbid(unsafe_code)]

//! User-chosen options for a single fetch.

use serde::{Deserialize, Serialize};

/// Browsers yt-dlp can lift cookies from via `--cookies-from-browser`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    Firefox,
    Chrome,
    Chromium,
    Edge,
    Brave,
    Safari,
}

impl Browser {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "firefox" => Some(Self::Firefox),
            "chrome" => Some(Self::Chrome),
            "chromium" => Some(Self::Chromium),
            "edge" => Some(Self::Edge),
            "brave" => Some(Self::Brave),
            "safari" => Some(Self::Safari),
            _ => None,
        }
    }

    /// The name yt-dlp expects on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Firefox => "firefox",
            Self::Chrome => "chrome",
            Self::Chromium => "chromium",
            Self::Edge => "edge",
            Self::Brave => "brave",
            Self::Safari => "safari",
        }
    }
}

/// Everything the form lets the user tweak about a fetch.
///
/// Cookies only affect the yt-dlp attempts; the in-process YouTube extractor
/// has no cookie support and never sees them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub audio_only: bool,
    pub cookies_from: Option<Browser>,
    pub list_formats_on_error: bool,
}
