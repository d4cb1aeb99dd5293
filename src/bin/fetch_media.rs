#![forbid(unsafe_code)]

//! Worker binary that fetches a single media URL into a job directory.
//!
//! The server spawns one of these per job. Progress goes to a JSON file the
//! server polls, the result goes to `outcome.json`, and the exit status
//! mirrors whether the fallback chain landed a file.

use anyhow::{Result, bail};
use mediagrab::extract::{FetchOutcome, ensure_yt_dlp_available, run_fetch, write_outcome};
use mediagrab::options::{Browser, FetchOptions};
use mediagrab::progress::{PROGRESS_FILE, ProgressWriter, update_progress};
use mediagrab::security::ensure_not_root;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
struct WorkerArgs {
    url: String,
    dest: PathBuf,
    options: FetchOptions,
    progress_file: Option<PathBuf>,
}

fn print_usage(program: &str) {
    eprintln!(
        "Usage: {program} --url <URL> --dest <DIR> [--audio-only] \
         [--cookies-from <BROWSER>] [--list-formats] [--progress-file <PATH>]"
    );
    eprintln!();
    eprintln!("  --url <URL>              Media page URL to fetch");
    eprintln!("  --dest <DIR>             Directory the media file lands in");
    eprintln!("  --audio-only             Extract audio and recode to MP3");
    eprintln!("  --cookies-from <BROWSER> Read cookies from a local browser profile");
    eprintln!("  --list-formats           On failure, capture the available formats");
    eprintln!("  --progress-file <PATH>   Progress JSON path (default <DIR>/{PROGRESS_FILE})");
}

fn parse_args(args: &[String]) -> Result<WorkerArgs> {
    let mut url: Option<String> = None;
    let mut dest: Option<PathBuf> = None;
    let mut options = FetchOptions::default();
    let mut progress_file: Option<PathBuf> = None;

    let mut index = 0;
    while index < args.len() {
        let arg = &args[index];
        let (flag, inline_value) = match arg.split_once('=') {
            Some((flag, value)) => (flag, Some(value.to_string())),
            None => (arg.as_str(), None),
        };

        let mut take_value = |index: &mut usize| -> Result<String> {
            if let Some(value) = inline_value.clone() {
                return Ok(value);
            }
            *index += 1;
            match args.get(*index) {
                Some(value) => Ok(value.clone()),
                None => bail!("missing value for {flag}"),
            }
        };

        match flag {
            "--url" => url = Some(take_value(&mut index)?),
            "--dest" => dest = Some(PathBuf::from(take_value(&mut index)?)),
            "--progress-file" => progress_file = Some(PathBuf::from(take_value(&mut index)?)),
            "--cookies-from" => {
                let raw = take_value(&mut index)?;
                match Browser::parse(&raw) {
                    Some(browser) => options.cookies_from = Some(browser),
                    None => bail!("unknown browser {raw:?} for --cookies-from"),
                }
            }
            "--audio-only" => options.audio_only = true,
            "--list-formats" => options.list_formats_on_error = true,
            other => bail!("unknown argument {other:?}"),
        }
        index += 1;
    }

    let Some(url) = url else {
        bail!("--url is required");
    };
    let Some(dest) = dest else {
        bail!("--dest is required");
    };
    if url.trim().is_empty() {
        bail!("--url must not be empty");
    }

    Ok(WorkerArgs {
        url,
        dest,
        options,
        progress_file,
    })
}

/// Persists a failure so the server can show the reason even when the run
/// never reached the fallback chain.
fn record_failure(dest: &Path, progress: &ProgressWriter, message: String) -> Result<()> {
    write_outcome(dest, &FetchOutcome::failure(message, None))?;
    update_progress(Some(progress), 100, "Failed");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    ensure_not_root("fetch_media")?;

    let raw_args: Vec<String> = std::env::args().collect();
    let program = raw_args
        .first()
        .cloned()
        .unwrap_or_else(|| "fetch_media".to_string());
    if raw_args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_usage(&program);
        return Ok(());
    }

    let args = match parse_args(&raw_args[1..]) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("Error: {err:#}");
            eprintln!();
            print_usage(&program);
            std::process::exit(2);
        }
    };

    std::fs::create_dir_all(&args.dest)?;
    let progress_path = args
        .progress_file
        .clone()
        .unwrap_or_else(|| args.dest.join(PROGRESS_FILE));
    let progress = ProgressWriter::new(progress_path);

    update_progress(Some(&progress), 2, "Checking tools");
    if let Err(err) = ensure_yt_dlp_available() {
        record_failure(&args.dest, &progress, format!("{err:#}"))?;
        return Err(err);
    }

    println!("Fetching {}", args.url);
    update_progress(Some(&progress), 5, "Starting");
    let outcome = run_fetch(&args.url, &args.dest, &args.options, Some(&progress)).await;
    write_outcome(&args.dest, &outcome)?;

    if outcome.is_success() {
        update_progress(Some(&progress), 100, "Done");
        println!(
            "Fetched {} via {}",
            outcome.filename.as_deref().unwrap_or("<unnamed>"),
            outcome.backend.as_deref().unwrap_or("<unknown>"),
        );
        Ok(())
    } else {
        update_progress(Some(&progress), 100, "Failed");
        bail!(
            "fetch failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
}
