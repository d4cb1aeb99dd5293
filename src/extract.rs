#![forbid(unsafe_code)]

//! The extraction fallback chain.
//!
//! Two extractors do all the real work. For YouTube URLs we first try the
//! in-process `rustube` extractor and grab the best progressive (muxed
//! audio+video) MP4 stream. When that finds nothing usable, or the URL is
//! not YouTube at all, we shell out to yt-dlp: once with a preferred format
//! selector and once with a looser one. The chain is fixed depth and fixed
//! order; the first attempt that lands a file wins and nothing retries.
//!
//! The worker records the result as `outcome.json` in the job directory so
//! the server can report filenames, MIME types and failure details without
//! parsing subprocess output.

use anyhow::{Context, Result, anyhow, bail};
use mime_guess::MimeGuess;
use rustube::{Id, VideoFetcher};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
#[cfg(test)]
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use crate::classify::is_youtube_url;
use crate::options::FetchOptions;
use crate::progress::{ProgressWriter, update_progress};

/// File name used for the machine-readable result inside a job directory.
pub const OUTCOME_FILE: &str = "outcome.json";

/// Preferred selector: muxed MP4 if possible, mirroring what the in-process
/// extractor would have produced.
pub const VIDEO_SELECTOR_PREFERRED: &str =
    "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";
/// Loose selector used when the preferred one is rejected outright.
pub const VIDEO_SELECTOR_FALLBACK: &str = "best";
/// Audio jobs always recode to MP3; this only narrows the source stream.
pub const AUDIO_SELECTOR_PREFERRED: &str = "bestaudio[ext=m4a]/bestaudio";

const UNAVAILABLE_FORMAT_MARKER: &str = "requested format is not available";

#[cfg(test)]
static YT_DLP_STUB: Mutex<Option<PathBuf>> = Mutex::new(None);
#[cfg(test)]
static STUB_USE_LOCK: Mutex<()> = Mutex::new(());

fn yt_dlp_command() -> Command {
    #[cfg(test)]
    {
        if let Some(path) = YT_DLP_STUB.lock().unwrap().clone() {
            return Command::new(path);
        }
    }
    Command::new("yt-dlp")
}

#[cfg(test)]
pub(crate) fn set_yt_dlp_stub_path(path: PathBuf) -> YtDlpStubGuard {
    let guard = STUB_USE_LOCK.lock().unwrap();
    {
        let mut lock = YT_DLP_STUB.lock().unwrap();
        *lock = Some(path);
    }
    YtDlpStubGuard { lock: Some(guard) }
}

#[cfg(test)]
pub(crate) struct YtDlpStubGuard {
    lock: Option<MutexGuard<'static, ()>>,
}

#[cfg(test)]
impl Drop for YtDlpStubGuard {
    fn drop(&mut self) {
        *YT_DLP_STUB.lock().unwrap() = None;
        self.lock.take();
    }
}

/// Runs `yt-dlp --version` to fail loudly before a job is accepted rather
/// than halfway through the chain.
pub fn ensure_yt_dlp_available() -> Result<()> {
    let status = yt_dlp_command()
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => bail!("yt-dlp is installed but returned a failure status"),
        Err(err) => bail!("yt-dlp is not installed or not in PATH: {}", err),
    }
}

/// One step of the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// In-process rustube extraction, YouTube only.
    Rustube,
    /// yt-dlp with an optional `--format` selector.
    YtDlp(Option<&'static str>),
}

impl Attempt {
    fn describe(self) -> &'static str {
        match self {
            Attempt::Rustube => "Trying YouTube extractor",
            Attempt::YtDlp(Some(_)) => "Running yt-dlp",
            Attempt::YtDlp(None) => "Running yt-dlp (default format)",
        }
    }
}

/// Builds the ordered attempt list for a URL.
///
/// Audio jobs skip the rustube step: its streams are never MP3, and the
/// recode path only exists in yt-dlp.
pub fn plan_attempts(url: &str, options: &FetchOptions) -> Vec<Attempt> {
    let mut plan = Vec::new();
    if !options.audio_only && is_youtube_url(url) {
        plan.push(Attempt::Rustube);
    }
    if options.audio_only {
        plan.push(Attempt::YtDlp(Some(AUDIO_SELECTOR_PREFERRED)));
        plan.push(Attempt::YtDlp(None));
    } else {
        plan.push(Attempt::YtDlp(Some(VIDEO_SELECTOR_PREFERRED)));
        plan.push(Attempt::YtDlp(Some(VIDEO_SELECTOR_FALLBACK)));
    }
    plan
}

/// Result of a fetch, persisted as `outcome.json` next to the media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formats: Option<String>,
}

impl FetchOutcome {
    fn success(file: PathBuf, filename: String, mime_type: String, backend: &str) -> Self {
        Self {
            file: Some(file),
            filename: Some(filename),
            mime_type: Some(mime_type),
            backend: Some(backend.to_string()),
            error: None,
            formats: None,
        }
    }

    pub fn failure(error: String, formats: Option<String>) -> Self {
        Self {
            file: None,
            filename: None,
            mime_type: None,
            backend: None,
            error: Some(error),
            formats,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.file.is_some()
    }
}

pub fn write_outcome(dir: &Path, outcome: &FetchOutcome) -> Result<()> {
    let path = dir.join(OUTCOME_FILE);
    let tmp_path = path.with_extension("tmp");
    let payload = serde_json::to_vec_pretty(outcome)?;
    fs::write(&tmp_path, payload).with_context(|| format!("writing {}", tmp_path.display()))?;
    fs::rename(&tmp_path, &path).with_context(|| format!("finalizing {}", path.display()))?;
    Ok(())
}

pub fn read_outcome(dir: &Path) -> Option<FetchOutcome> {
    let raw = fs::read_to_string(dir.join(OUTCOME_FILE)).ok()?;
    serde_json::from_str(&raw).ok()
}

/// Walks the fallback chain until an attempt lands a file.
///
/// Never returns an Err: failure is part of the outcome so the worker can
/// persist it for the server. When every attempt failed, the last error that
/// mentions an unavailable format optionally triggers a `-F` listing.
pub async fn run_fetch(
    url: &str,
    dest: &Path,
    options: &FetchOptions,
    progress: Option<&ProgressWriter>,
) -> FetchOutcome {
    let plan = plan_attempts(url, options);
    let total = plan.len();
    let mut last_error: Option<String> = None;

    for (index, attempt) in plan.iter().enumerate() {
        let percent = (10 + (index * 80) / total.max(1)) as u8;
        update_progress(progress, percent, attempt.describe());

        let result = match attempt {
            Attempt::Rustube => fetch_with_rustube(url, dest).await,
            Attempt::YtDlp(selector) => fetch_with_yt_dlp(url, dest, *selector, options),
        };

        match result {
            Ok(outcome) => {
                update_progress(progress, 95, "Finalizing");
                return outcome;
            }
            Err(err) => {
                eprintln!("  Warning: extraction attempt failed: {err:#}");
                last_error = Some(format!("{err:#}"));
            }
        }
    }

    let message = last_error.unwrap_or_else(|| "no extraction attempt was possible".to_string());
    let formats = if options.list_formats_on_error && mentions_unavailable_format(&message) {
        match list_available_formats(url, options) {
            Ok(listing) => Some(listing),
            Err(err) => {
                eprintln!("  Warning: could not list formats: {err:#}");
                None
            }
        }
    } else {
        None
    };

    FetchOutcome::failure(message, formats)
}

/// In-process extraction of the best progressive MP4 stream.
async fn fetch_with_rustube(url: &str, dest: &Path) -> Result<FetchOutcome> {
    let id = Id::from_raw(url)
        .context("parsing YouTube video id")?
        .as_owned();
    let video = VideoFetcher::from_id(id)
        .context("building video fetcher")?
        .fetch()
        .await
        .context("fetching video metadata")?
        .descramble()
        .context("descrambling stream signatures")?;

    // Mirror the preferred selector: muxed MP4 at the highest resolution,
    // falling back to whatever muxed stream the library rates best.
    let stream = video
        .streams()
        .iter()
        .filter(|stream| {
            stream.includes_video_track
                && stream.includes_audio_track
                && stream.mime.subtype() == mime_guess::mime::MP4
        })
        .max_by_key(|stream| stream.width.unwrap_or(0))
        .or_else(|| video.best_quality())
        .ok_or_else(|| anyhow!("no muxed audio+video stream available"))?;

    let file = stream
        .download_to_dir(dest)
        .await
        .context("downloading stream")?;

    let ext = file
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("mp4");
    let filename = format!("{}.{}", sanitize_filename(video.title()), ext);
    let mime_type = infer_mime(&file, false);
    Ok(FetchOutcome::success(file, filename, mime_type, "rustube"))
}

/// One yt-dlp invocation with a given format selector.
fn fetch_with_yt_dlp(
    url: &str,
    dest: &Path,
    selector: Option<&str>,
    options: &FetchOptions,
) -> Result<FetchOutcome> {
    let output_template = dest.join("%(title)s.%(ext)s");

    let mut command = yt_dlp_command();
    command
        .arg("--no-playlist")
        .arg("--no-warnings")
        .arg("--no-progress");
    if let Some(selector) = selector {
        command.arg("--format").arg(selector);
    }
    if options.audio_only {
        command
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg("mp3");
    }
    if let Some(browser) = options.cookies_from {
        command.arg("--cookies-from-browser").arg(browser.as_str());
    }
    command
        .arg("--output")
        .arg(output_template.to_string_lossy().to_string())
        .arg(url);

    let output = command.output().context("launching yt-dlp")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("yt-dlp exited with {}: {}", output.status, stderr.trim());
    }

    let file = find_produced_file(dest)?;
    let filename = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("produced file has no name"))?;
    let mime_type = infer_mime(&file, options.audio_only);
    Ok(FetchOutcome::success(file, filename, mime_type, "yt-dlp"))
}

/// Runs `yt-dlp -F` and returns the human-readable listing.
pub fn list_available_formats(url: &str, options: &FetchOptions) -> Result<String> {
    let mut command = yt_dlp_command();
    command.arg("-F").arg("--no-warnings");
    if let Some(browser) = options.cookies_from {
        command.arg("--cookies-from-browser").arg(browser.as_str());
    }
    command.arg(url);

    let output = command
        .output()
        .with_context(|| format!("listing formats for {}", url))?;
    if !output.status.success() {
        bail!("format listing failed for {} (status {})", url, output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Matches the error yt-dlp emits when a selector cannot be satisfied.
pub fn mentions_unavailable_format(message: &str) -> bool {
    message.to_ascii_lowercase().contains(UNAVAILABLE_FORMAT_MARKER)
}

/// Locates the media file an attempt produced inside the job directory.
///
/// yt-dlp leaves droppings next to the payload (`.part` resume files, info
/// JSON, playlist fragments), and the job directory also carries our own
/// progress/outcome files. The newest surviving entry is the payload.
pub fn find_produced_file(dir: &Path) -> Result<PathBuf> {
    let mut best: Option<(SystemTime, PathBuf)> = None;
    for entry in
        fs::read_dir(dir).with_context(|| format!("reading job dir {}", dir.display()))?
    {
        let entry = entry?;
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let name = entry
            .file_name()
            .into_string()
            .unwrap_or_else(|os| os.to_string_lossy().into_owned());
        if name.ends_with(".part") {
            continue;
        }
        let ext = Path::new(&name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if matches!(
            ext.as_str(),
            "json" | "txt" | "tmp" | "mhtml" | "m3u8" | "mpd" | "ytdl" | "aria2" | "description"
                | "jpg" | "jpeg" | "png" | "webp"
        ) {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        match &best {
            Some((time, _)) if *time >= modified => {}
            _ => best = Some((modified, entry.path())),
        }
    }

    best.map(|(_, path)| path)
        .ok_or_else(|| anyhow!("no media file produced in {}", dir.display()))
}

/// MIME type offered to the browser. Audio jobs are always MP3; video jobs
/// trust the extension but never report a non-video type.
pub fn infer_mime(path: &Path, audio_only: bool) -> String {
    if audio_only {
        return "audio/mpeg".to_string();
    }
    MimeGuess::from_path(path)
        .first()
        .filter(|mime| mime.type_() == mime_guess::mime::VIDEO)
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| "video/mp4".to_string())
}

/// Makes a video title safe to use as a download filename.
fn sanitize_filename(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            _ => c,
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "video".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Browser;
    use anyhow::Result;
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn install_stub(dir: &Path, script: &str) -> Result<PathBuf> {
        let script_path = dir.join("yt-dlp");
        fs::write(&script_path, script)?;
        #[cfg(unix)]
        {
            let mut perms = fs::metadata(&script_path)?.permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&script_path, perms)?;
        }
        Ok(script_path)
    }

    /// Stub that rejects the preferred selector with yt-dlp's real error text
    /// and succeeds on anything else, recording the selector it was given.
    const SELECTIVE_STUB: &str = r#"#!/usr/bin/env bash
set -eu
args=("$@")
output=""
format_id=""
while [[ $# -gt 0 ]]; do
  case "$1" in
    --output)
      shift
      output="$1"
      ;;
    --format)
      shift
      format_id="$1"
      ;;
  esac
  shift
done

if printf '%s\n' "${args[@]}" | grep -q -- '^--version$'; then
  echo "2024.08.06"
  exit 0
fi

if [[ "$format_id" == bestvideo* ]]; then
  echo "ERROR: Requested format is not available." >&2
  exit 1
fi

dest="$(dirname "$output")"
printf '%s' "$format_id" > "$dest/clip.mp4"
exit 0
"#;

    /// Stub that always fails with the unavailable-format error but answers
    /// `-F` with a listing.
    const LISTING_STUB: &str = r#"#!/usr/bin/env bash
set -eu
args=("$@")

if printf '%s\n' "${args[@]}" | grep -q -- '^--version$'; then
  echo "2024.08.06"
  exit 0
fi

if printf '%s\n' "${args[@]}" | grep -q -- '^-F$'; then
  echo "ID  EXT RESOLUTION"
  echo "18  mp4 640x360"
  echo "22  mp4 1280x720"
  exit 0
fi

echo "ERROR: Requested format is not available." >&2
exit 1
"#;

    /// Stub that logs every invocation next to itself and always succeeds.
    const COUNTING_STUB: &str = r#"#!/usr/bin/env bash
set -eu
echo invoked >> "$(dirname "$0")/calls.log"
output=""
while [[ $# -gt 0 ]]; do
  case "$1" in
    --output)
      shift
      output="$1"
      ;;
  esac
  shift
done
dest="$(dirname "$output")"
printf 'bytes' > "$dest/clip.mp4"
exit 0
"#;

    #[test]
    fn plan_starts_with_rustube_for_youtube_urls() {
        let plan = plan_attempts(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            &FetchOptions::default(),
        );
        assert_eq!(
            plan,
            vec![
                Attempt::Rustube,
                Attempt::YtDlp(Some(VIDEO_SELECTOR_PREFERRED)),
                Attempt::YtDlp(Some(VIDEO_SELECTOR_FALLBACK)),
            ]
        );
    }

    #[test]
    fn plan_skips_rustube_for_other_platforms() {
        let plan = plan_attempts("https://vimeo.com/123456789", &FetchOptions::default());
        assert_eq!(
            plan,
            vec![
                Attempt::YtDlp(Some(VIDEO_SELECTOR_PREFERRED)),
                Attempt::YtDlp(Some(VIDEO_SELECTOR_FALLBACK)),
            ]
        );
    }

    #[test]
    fn plan_skips_rustube_for_audio_jobs() {
        let options = FetchOptions {
            audio_only: true,
            ..FetchOptions::default()
        };
        let plan = plan_attempts("https://youtu.be/dQw4w9WgXcQ", &options);
        assert_eq!(
            plan,
            vec![
                Attempt::YtDlp(Some(AUDIO_SELECTOR_PREFERRED)),
                Attempt::YtDlp(None),
            ]
        );
    }

    #[tokio::test]
    async fn chain_falls_through_to_loose_selector() -> Result<()> {
        let stub_dir = tempdir()?;
        let stub = install_stub(stub_dir.path(), SELECTIVE_STUB)?;
        let _guard = set_yt_dlp_stub_path(stub);
        let dest = tempdir()?;

        let outcome = run_fetch(
            "https://example.com/watch/123",
            dest.path(),
            &FetchOptions::default(),
            None,
        )
        .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.backend.as_deref(), Some("yt-dlp"));
        assert_eq!(outcome.filename.as_deref(), Some("clip.mp4"));
        assert_eq!(outcome.mime_type.as_deref(), Some("video/mp4"));
        // The recorded selector proves the second attempt was the one that
        // landed the file.
        let recorded = fs::read_to_string(dest.path().join("clip.mp4"))?;
        assert_eq!(recorded, VIDEO_SELECTOR_FALLBACK);
        Ok(())
    }

    #[tokio::test]
    async fn chain_stops_after_first_success() -> Result<()> {
        let stub_dir = tempdir()?;
        let stub = install_stub(stub_dir.path(), COUNTING_STUB)?;
        let _guard = set_yt_dlp_stub_path(stub);
        let dest = tempdir()?;

        let outcome = run_fetch(
            "https://example.com/watch/123",
            dest.path(),
            &FetchOptions::default(),
            None,
        )
        .await;

        assert!(outcome.is_success());
        // The preferred selector landed the file, so the loose selector was
        // never attempted.
        let calls = fs::read_to_string(stub_dir.path().join("calls.log"))?;
        assert_eq!(calls.lines().count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn chain_failure_lists_formats_when_asked() -> Result<()> {
        let stub_dir = tempdir()?;
        let stub = install_stub(stub_dir.path(), LISTING_STUB)?;
        let _guard = set_yt_dlp_stub_path(stub);
        let dest = tempdir()?;

        let options = FetchOptions {
            list_formats_on_error: true,
            ..FetchOptions::default()
        };
        let outcome = run_fetch("https://example.com/watch/123", dest.path(), &options, None).await;

        assert!(!outcome.is_success());
        assert!(
            outcome
                .error
                .as_deref()
                .unwrap()
                .contains("Requested format is not available")
        );
        assert!(outcome.formats.as_deref().unwrap().contains("1280x720"));
        Ok(())
    }

    #[tokio::test]
    async fn chain_failure_without_flag_skips_listing() -> Result<()> {
        let stub_dir = tempdir()?;
        let stub = install_stub(stub_dir.path(), LISTING_STUB)?;
        let _guard = set_yt_dlp_stub_path(stub);
        let dest = tempdir()?;

        let outcome = run_fetch(
            "https://example.com/watch/123",
            dest.path(),
            &FetchOptions::default(),
            None,
        )
        .await;

        assert!(!outcome.is_success());
        assert!(outcome.formats.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn audio_jobs_report_audio_mime() -> Result<()> {
        let stub_dir = tempdir()?;
        // Succeeds on any selector, writing an mp3.
        let stub = install_stub(
            stub_dir.path(),
            r#"#!/usr/bin/env bash
set -eu
output=""
while [[ $# -gt 0 ]]; do
  case "$1" in
    --output)
      shift
      output="$1"
      ;;
  esac
  shift
done
dest="$(dirname "$output")"
printf 'ID3' > "$dest/track.mp3"
exit 0
"#,
        )?;
        let _guard = set_yt_dlp_stub_path(stub);
        let dest = tempdir()?;

        let options = FetchOptions {
            audio_only: true,
            ..FetchOptions::default()
        };
        let outcome = run_fetch("https://example.com/watch/123", dest.path(), &options, None).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.mime_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(outcome.filename.as_deref(), Some("track.mp3"));
        Ok(())
    }

    #[test]
    fn ensure_yt_dlp_available_uses_stub() -> Result<()> {
        let stub_dir = tempdir()?;
        let stub = install_stub(stub_dir.path(), SELECTIVE_STUB)?;
        let _guard = set_yt_dlp_stub_path(stub);
        ensure_yt_dlp_available()
    }

    #[test]
    fn list_available_formats_forwards_cookies() -> Result<()> {
        let stub_dir = tempdir()?;
        // Echoes back whether the cookies flag arrived.
        let stub = install_stub(
            stub_dir.path(),
            r#"#!/usr/bin/env bash
set -eu
if printf '%s\n' "$@" | grep -q -- '^--cookies-from-browser$'; then
  echo "with-cookies"
else
  echo "without-cookies"
fi
exit 0
"#,
        )?;
        let _guard = set_yt_dlp_stub_path(stub);

        let options = FetchOptions {
            cookies_from: Some(Browser::Firefox),
            ..FetchOptions::default()
        };
        let listing = list_available_formats("https://example.com/v/1", &options)?;
        assert!(listing.contains("with-cookies"));
        Ok(())
    }

    #[test]
    fn find_produced_file_skips_droppings() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("clip.mp4.part"), "partial")?;
        fs::write(dir.path().join("clip.info.json"), "{}")?;
        fs::write(dir.path().join("progress.json"), "{}")?;
        fs::write(dir.path().join("clip.mp4"), "video")?;

        let found = find_produced_file(dir.path())?;
        assert_eq!(found.file_name().unwrap(), "clip.mp4");
        Ok(())
    }

    #[test]
    fn find_produced_file_errors_when_empty() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("outcome.json"), "{}").unwrap();
        assert!(find_produced_file(dir.path()).is_err());
    }

    #[test]
    fn infer_mime_matches_the_audio_flag() {
        assert_eq!(infer_mime(Path::new("song.mp3"), true), "audio/mpeg");
        assert_eq!(infer_mime(Path::new("clip.mp4"), false), "video/mp4");
        assert_eq!(infer_mime(Path::new("clip.webm"), false), "video/webm");
        // Unknown extensions still advertise a video payload.
        assert_eq!(infer_mime(Path::new("clip.weird"), false), "video/mp4");
    }

    #[test]
    fn mentions_unavailable_format_is_case_insensitive() {
        assert!(mentions_unavailable_format(
            "ERROR: Requested format is not available."
        ));
        assert!(mentions_unavailable_format(
            "yt-dlp exited with 1: requested format is not available"
        ));
        assert!(!mentions_unavailable_format("network timed out"));
    }

    #[test]
    fn sanitize_filename_replaces_separators() {
        assert_eq!(sanitize_filename("a/b:c\\d"), "a_b_c_d");
        assert_eq!(sanitize_filename("   "), "video");
        assert_eq!(sanitize_filename("Plain Title"), "Plain Title");
    }

    #[test]
    fn outcome_round_trips_through_disk() -> Result<()> {
        let dir = tempdir()?;
        let outcome = FetchOutcome::success(
            dir.path().join("clip.mp4"),
            "clip.mp4".into(),
            "video/mp4".into(),
            "yt-dlp",
        );
        write_outcome(dir.path(), &outcome)?;

        let loaded = read_outcome(dir.path()).expect("outcome readable");
        assert!(loaded.is_success());
        assert_eq!(loaded.filename.as_deref(), Some("clip.mp4"));
        assert_eq!(loaded.backend.as_deref(), Some("yt-dlp"));
        Ok(())
    }

    #[test]
    fn failed_outcome_is_not_success() {
        let outcome = FetchOutcome::failure("boom".into(), None);
        assert!(!outcome.is_success());
        assert_eq!(outcome.error.as_deref(), Some("boom"));
    }
}
