#![forbid(unsafe_code)]

//! URL classification.
//!
//! The only decision the fallback chain needs up front is "is this a YouTube
//! URL or not": YouTube URLs get the in-process extractor first, everything
//! else goes straight to yt-dlp. The pattern accepts the usual watch, short
//! link, embed and `/v/` forms and anchors an 11-character video id.

use regex::Regex;
use std::sync::LazyLock;

static YOUTUBE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.)?(youtube\.com|youtu\.be)/(watch\?v=|embed/|v/|.+\?v=)?([^&=%\?]{11})",
    )
    .expect("static pattern compiles")
});

/// Returns true when the URL points at YouTube and carries a video id.
pub fn is_youtube_url(url: &str) -> bool {
    YOUTUBE_PATTERN.is_match(url.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_youtube_forms() {
        let samples = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "http://youtube.com/watch?v=dQw4w9WgXcQ",
            "youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/v/dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10s",
        ];
        for url in samples {
            assert!(is_youtube_url(url), "should classify as YouTube: {url}");
        }
    }

    #[test]
    fn rejects_other_platforms() {
        let samples = [
            "https://vimeo.com/123456789",
            "https://www.facebook.com/watch/?v=1234567890",
            "https://www.instagram.com/reel/Cxyz1234/",
            "https://example.com/video.mp4",
            "not a url at all",
            "",
        ];
        for url in samples {
            assert!(!is_youtube_url(url), "should not classify as YouTube: {url}");
        }
    }

    #[test]
    fn requires_a_video_id() {
        assert!(!is_youtube_url("https://www.youtube.com/"));
        assert!(!is_youtube_url("https://youtu.be/short"));
    }

    #[test]
    fn ignores_surrounding_whitespace() {
        assert!(is_youtube_url("  https://youtu.be/dQw4w9WgXcQ  "));
    }
}
