#![forbid(unsafe_code)]

//! Axum server behind the MediaGrab form.
//!
//! The page posts a URL plus a few options, the server spawns the
//! `fetch_media` worker binary into a per-job temp directory, and the browser
//! polls job status until the file is ready to hand over. Handing the file
//! over removes the job and its temp directory; nothing is kept after the
//! download.

use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow, bail};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path as AxumPath, State},
    http::{HeaderMap, Request, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use mediagrab::config::{RuntimeOverrides, resolve_runtime_paths};
use mediagrab::extract::{FetchOutcome, ensure_yt_dlp_available, read_outcome};
use mediagrab::options::{Browser, FetchOptions};
use mediagrab::progress::{PROGRESS_FILE, read_progress_report, write_progress_report};
use mediagrab::security::ensure_not_root;
use mime_guess::MimeGuess;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::{fs::File, signal};
use tokio_util::io::ReaderStream;

// Per-job temp directories live underneath the spool root so a single mount
// point holds all transient state.
const JOBS_SUBDIR: &str = "jobs";

// Served when the www root has no index.html, so the binary works standalone.
const BUILTIN_INDEX: &str = include_str!("../../www/index.html");

// How long a finished job waits for its file to be claimed. Submissions and
// status polls sweep anything older, so an abandoned tab cannot pin a video
// in the spool forever.
const FINISHED_JOB_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
struct ServerArgs {
    spool_root: PathBuf,
    www_root: PathBuf,
    port: u16,
    listen_host: IpAddr,
}

impl ServerArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(std::env::args().skip(1))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut spool_root_override: Option<PathBuf> = None;
        let mut www_root_override: Option<PathBuf> = None;
        let mut port_override: Option<u16> = None;
        let mut host_override: Option<IpAddr> = None;
        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--spool-root=") {
                spool_root_override = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--www-root=") {
                www_root_override = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--port=") {
                port_override = Some(parse_port_arg(value)?);
                continue;
            }
            if let Some(value) = arg.strip_prefix("--host=") {
                host_override = Some(parse_host_arg(value)?);
                continue;
            }

            match arg.as_str() {
                "--spool-root" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--spool-root requires a value"))?;
                    spool_root_override = Some(PathBuf::from(value));
                }
                "--www-root" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--www-root requires a value"))?;
                    www_root_override = Some(PathBuf::from(value));
                }
                "--port" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--port requires a value"))?;
                    port_override = Some(parse_port_arg(&value)?);
                }
                "--host" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--host requires a value"))?;
                    host_override = Some(parse_host_arg(&value)?);
                }
                _ => return Err(anyhow!("unknown argument: {arg}")),
            }
        }

        let runtime_paths = resolve_runtime_paths(RuntimeOverrides {
            spool_root: spool_root_override,
            www_root: www_root_override,
            port: port_override,
            host: None,
        })?;
        let runtime_host = parse_host_arg(&runtime_paths.host)?;
        let listen_host = host_override.unwrap_or(runtime_host);

        Ok(Self {
            spool_root: runtime_paths.spool_root,
            www_root: runtime_paths.www_root,
            port: runtime_paths.port,
            listen_host,
        })
    }
}

fn parse_port_arg(value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .context("expected a numeric port between 0 and 65535")
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/MEDIAGRAB_HOST")
}

#[derive(Clone)]
struct JobManager {
    inner: Arc<JobManagerInner>,
}

struct JobManagerInner {
    jobs: Mutex<HashMap<String, FetchJob>>,
    counter: AtomicUsize,
    jobs_root: PathBuf,
    worker: Option<PathBuf>,
    job_ttl: Duration,
}

/// One in-flight or finished fetch. The `TempDir` holds the job directory
/// alive; removing the job from the map is what deletes it from disk.
#[derive(Clone)]
struct FetchJob {
    id: String,
    status: JobStatus,
    dir: Arc<TempDir>,
    message: String,
    finished_at: Option<Instant>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobCreatedResponse {
    id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusResponse {
    id: String,
    status: String,
    progress: u8,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    formats: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobRequest {
    url: String,
    #[serde(default)]
    audio_only: bool,
    #[serde(default)]
    cookies_from: Option<String>,
    #[serde(default)]
    list_formats: bool,
}

impl JobManager {
    fn new(spool_root: &Path) -> Result<Self> {
        let jobs_root = spool_root.join(JOBS_SUBDIR);
        std::fs::create_dir_all(&jobs_root)
            .with_context(|| format!("creating {}", jobs_root.display()))?;
        let worker = find_fetch_media_executable().ok();
        Ok(Self {
            inner: Arc::new(JobManagerInner {
                jobs: Mutex::new(HashMap::new()),
                counter: AtomicUsize::new(1),
                jobs_root,
                worker,
                job_ttl: FINISHED_JOB_TTL,
            }),
        })
    }

    #[cfg(test)]
    fn with_worker(jobs_root: PathBuf, worker: Option<PathBuf>) -> Self {
        Self::with_worker_ttl(jobs_root, worker, FINISHED_JOB_TTL)
    }

    #[cfg(test)]
    fn with_worker_ttl(jobs_root: PathBuf, worker: Option<PathBuf>, job_ttl: Duration) -> Self {
        std::fs::create_dir_all(&jobs_root).unwrap();
        Self {
            inner: Arc::new(JobManagerInner {
                jobs: Mutex::new(HashMap::new()),
                counter: AtomicUsize::new(1),
                jobs_root,
                worker,
                job_ttl,
            }),
        }
    }

    fn start_fetch(&self, url: String, options: FetchOptions) -> Result<String> {
        self.sweep_expired();
        let worker = self
            .inner
            .worker
            .clone()
            .ok_or_else(|| anyhow!("fetch_media binary not found"))?;
        let job_id = self.next_job_id();

        let dir = tempfile::Builder::new()
            .prefix(&format!("{job_id}-"))
            .tempdir_in(&self.inner.jobs_root)
            .context("creating job directory")?;
        let dir = Arc::new(dir);
        let progress_file = dir.path().join(PROGRESS_FILE);
        write_progress_report(&progress_file, 0, "Queued");

        self.inner.jobs.lock().insert(
            job_id.clone(),
            FetchJob {
                id: job_id.clone(),
                status: JobStatus::Queued,
                dir: dir.clone(),
                message: "Queued".to_string(),
                finished_at: None,
            },
        );

        let inner = self.inner.clone();
        let job_id_clone = job_id.clone();
        tokio::spawn(async move {
            update_job_status(&inner, &job_id_clone, JobStatus::Running, "Running");

            let dest = dir.path().to_path_buf();
            let progress_for_run = progress_file.clone();
            let status = tokio::task::spawn_blocking(move || {
                let mut args = vec![
                    "--url".to_string(),
                    url,
                    "--dest".to_string(),
                    dest.to_string_lossy().into_owned(),
                    "--progress-file".to_string(),
                    progress_for_run.to_string_lossy().into_owned(),
                ];
                if options.audio_only {
                    args.push("--audio-only".to_string());
                }
                if options.list_formats_on_error {
                    args.push("--list-formats".to_string());
                }
                if let Some(browser) = options.cookies_from {
                    args.push("--cookies-from".to_string());
                    args.push(browser.as_str().to_string());
                }
                run_fetch_media(&worker, args)
            })
            .await;

            match status {
                Ok(Ok(())) => {
                    update_job_status(&inner, &job_id_clone, JobStatus::Completed, "Done");
                }
                Ok(Err(err)) => {
                    // The worker writes a richer error into the outcome file
                    // before exiting nonzero; prefer that over the exit status.
                    let detail = read_outcome(dir.path())
                        .and_then(|outcome| outcome.error)
                        .unwrap_or_else(|| err.to_string());
                    write_progress_report(&progress_file, 100, "Fetch failed");
                    update_job_status(
                        &inner,
                        &job_id_clone,
                        JobStatus::Failed,
                        &format!("Failed: {detail}"),
                    );
                }
                Err(err) => {
                    write_progress_report(&progress_file, 100, "Fetch failed");
                    update_job_status(
                        &inner,
                        &job_id_clone,
                        JobStatus::Failed,
                        &format!("Failed: {err}"),
                    );
                }
            }
        });

        Ok(job_id)
    }

    fn get(&self, job_id: &str) -> Option<FetchJob> {
        self.inner.jobs.lock().get(job_id).cloned()
    }

    fn remove(&self, job_id: &str) -> Option<FetchJob> {
        self.inner.jobs.lock().remove(job_id)
    }

    /// Drops terminal jobs nobody claimed within the TTL. Runs on every
    /// submission and status poll; claiming or deleting a job removes it
    /// immediately regardless.
    fn sweep_expired(&self) {
        let ttl = self.inner.job_ttl;
        self.inner.jobs.lock().retain(|_, job| match job.finished_at {
            Some(finished_at) => finished_at.elapsed() < ttl,
            None => true,
        });
    }

    fn get_status(&self, job_id: &str) -> Option<JobStatusResponse> {
        self.sweep_expired();
        let job = self.get(job_id)?;
        let report = read_progress_report(&job.dir.path().join(PROGRESS_FILE));
        let outcome = read_outcome(job.dir.path());

        let (progress, message) = report
            .map(|report| (report.progress, report.message))
            .unwrap_or((0, job.message.clone()));
        let message = match job.status {
            JobStatus::Failed | JobStatus::Completed => job.message.clone(),
            _ => message,
        };

        let (filename, mime_type, error, formats) = match outcome {
            Some(FetchOutcome {
                filename,
                mime_type,
                error,
                formats,
                ..
            }) => (filename, mime_type, error, formats),
            None => (None, None, None, None),
        };

        Some(JobStatusResponse {
            id: job.id,
            status: job.status.as_str().to_string(),
            progress,
            message,
            filename,
            mime_type,
            error,
            formats,
        })
    }

    fn next_job_id(&self) -> String {
        let id = self.inner.counter.fetch_add(1, Ordering::Relaxed);
        format!("job-{id}")
    }
}

fn update_job_status(inner: &JobManagerInner, job_id: &str, status: JobStatus, message: &str) {
    if let Some(job) = inner.jobs.lock().get_mut(job_id) {
        job.status = status;
        job.message = message.to_string();
        if matches!(status, JobStatus::Completed | JobStatus::Failed) {
            job.finished_at = Some(Instant::now());
        }
    }
}

fn run_fetch_media(binary: &Path, args: Vec<String>) -> Result<()> {
    let status = std::process::Command::new(binary)
        .args(args)
        .status()
        .context("launching fetch_media")?;
    if status.success() {
        Ok(())
    } else {
        bail!("fetch_media exited with {}", status)
    }
}

fn find_fetch_media_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("MEDIAGRAB_FETCH_BIN") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            let candidate = PathBuf::from(trimmed);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }

    if let Ok(path) = std::env::var("CARGO_BIN_EXE_fetch_media") {
        let candidate = PathBuf::from(path);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let docker_path = PathBuf::from("/usr/local/bin/fetch_media");
    if docker_path.exists() {
        return Ok(docker_path);
    }

    let mut sibling = std::env::current_exe().context("locating server executable")?;
    sibling.set_file_name("fetch_media");
    if sibling.exists() {
        return Ok(sibling);
    }

    bail!("fetch_media binary not found");
}

/// Shared state injected into every Axum handler.
#[derive(Clone)]
struct AppState {
    jobs: JobManager,
    www_root: Arc<PathBuf>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, headers, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    let ServerArgs {
        spool_root,
        www_root,
        port,
        listen_host,
    } = ServerArgs::parse()?;

    ensure_not_root("server")?;

    if let Err(err) = ensure_yt_dlp_available() {
        eprintln!("Warning: {err:#}");
        eprintln!("Warning: fetches will fail until yt-dlp is available");
    }

    std::fs::create_dir_all(&spool_root)
        .with_context(|| format!("creating {}", spool_root.display()))?;
    let jobs = JobManager::new(&spool_root)?;

    let state = AppState {
        jobs,
        www_root: Arc::new(www_root),
    };

    let app = Router::new()
        .route("/api/jobs", post(create_job))
        .route("/api/jobs/{id}", get(get_job).delete(delete_job))
        .route("/api/jobs/{id}/file", get(fetch_job_file))
        .fallback(static_fallback)
        .with_state(state);

    let addr = SocketAddr::new(listen_host, port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    println!("MediaGrab listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running server")?;

    Ok(())
}

async fn shutdown_signal() {
    // Ctrl+C failures only affect graceful shutdown; the process still dies.
    if let Err(err) = signal::ctrl_c().await {
        eprintln!("Failed to install Ctrl+C handler: {}", err);
    }
}

async fn create_job(
    State(state): State<AppState>,
    Json(payload): Json<CreateJobRequest>,
) -> ApiResult<Json<JobCreatedResponse>> {
    let url = payload.url.trim().to_string();
    if url.is_empty() {
        return Err(ApiError::bad_request("url must not be empty"));
    }

    let cookies_from = match payload.cookies_from.as_deref() {
        Some(raw) => match Browser::parse(raw) {
            Some(browser) => Some(browser),
            None => {
                return Err(ApiError::bad_request(format!("unknown browser: {raw}")));
            }
        },
        None => None,
    };

    let options = FetchOptions {
        audio_only: payload.audio_only,
        cookies_from,
        list_formats_on_error: payload.list_formats,
    };

    let job_id = state
        .jobs
        .start_fetch(url, options)
        .map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(Json(JobCreatedResponse { id: job_id }))
}

async fn get_job(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let status = state
        .jobs
        .get_status(&id)
        .ok_or_else(|| ApiError::not_found("job not found"))?;
    Ok(Json(status))
}

/// Streams the fetched file to the browser and deletes the job.
///
/// The file is opened before the job is removed; on Unix the unlinked fd
/// keeps streaming while the temp directory disappears from disk, so the
/// handoff and the cleanup do not race.
async fn fetch_job_file(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Response> {
    let job = state
        .jobs
        .get(&id)
        .ok_or_else(|| ApiError::not_found("job not found"))?;

    match job.status {
        JobStatus::Completed => {}
        JobStatus::Queued | JobStatus::Running => {
            return Err(ApiError::conflict("job is still running"));
        }
        JobStatus::Failed => {
            return Err(ApiError::conflict("job failed; no file to hand over"));
        }
    }

    let outcome =
        read_outcome(job.dir.path()).ok_or_else(|| ApiError::internal("job outcome missing"))?;
    let path = outcome
        .file
        .ok_or_else(|| ApiError::internal("job outcome has no file"))?;
    let filename = outcome.filename.unwrap_or_else(|| "download".to_string());
    let mime_type = outcome
        .mime_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::internal("fetched file missing"))?;
    let size = file
        .metadata()
        .await
        .map_err(|_| ApiError::internal("fetched file missing"))?
        .len();

    let stream = ReaderStream::new(file);
    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    if let Ok(value) = mime_type.parse() {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = size.to_string().parse() {
        headers.insert(header::CONTENT_LENGTH, value);
    }
    if let Ok(value) = content_disposition_for(&filename).parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    // Last reference to the TempDir goes away here; the directory is gone by
    // the time the response finishes streaming.
    drop(job);
    state.jobs.remove(&id);

    Ok(response)
}

async fn delete_job(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<StatusCode> {
    state
        .jobs
        .remove(&id)
        .ok_or_else(|| ApiError::not_found("job not found"))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn static_fallback(State(state): State<AppState>, req: Request<Body>) -> Response {
    let path = req.uri().path();
    if path == "/api" || path.starts_with("/api/") {
        return ApiError::not_found("endpoint not found").into_response();
    }

    match serve_www_path(&state.www_root, path).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn serve_www_path(root: &Path, request_path: &str) -> ApiResult<Response> {
    let target = resolve_www_path(root, request_path)?;
    let metadata = tokio::fs::metadata(&target).await;

    match metadata {
        Ok(meta) if meta.is_dir() => serve_index(root).await,
        Ok(_) => stream_static(target).await,
        Err(_) => {
            if should_fallback_to_index(request_path) {
                serve_index(root).await
            } else {
                Err(ApiError::not_found("file not found"))
            }
        }
    }
}

/// Serves `index.html` from the www root, or the compiled-in page when the
/// root has none.
async fn serve_index(root: &Path) -> ApiResult<Response> {
    let index = root.join("index.html");
    match stream_static(index).await {
        Ok(response) => Ok(response),
        Err(_) => Ok(Html(BUILTIN_INDEX).into_response()),
    }
}

async fn stream_static(path: PathBuf) -> ApiResult<Response> {
    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    let mime = MimeGuess::from_path(&path).first();

    let stream = ReaderStream::new(file);
    let mut response = Body::from_stream(stream).into_response();
    if let Some(mime) = mime
        && let Ok(value) = mime.to_string().parse()
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Ok(response)
}

/// Builds a `Content-Disposition` value that is always a valid ASCII header.
///
/// Video titles arrive in arbitrary scripts; the quoted `filename` gets an
/// ASCII-safe rendering and the exact UTF-8 name travels in the RFC 5987
/// `filename*` parameter browsers prefer.
fn content_disposition_for(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if filename.is_ascii() {
        format!("attachment; filename=\"{ascii}\"")
    } else {
        format!(
            "attachment; filename=\"{ascii}\"; filename*=UTF-8''{}",
            rfc5987_encode(filename)
        )
    }
}

fn rfc5987_encode(value: &str) -> String {
    let mut out = String::new();
    for byte in value.bytes() {
        // attr-char per RFC 5987.
        if byte.is_ascii_alphanumeric()
            || matches!(
                byte,
                b'!' | b'#' | b'$' | b'&' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~'
            )
        {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn resolve_www_path(root: &Path, request_path: &str) -> ApiResult<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(root.join("index.html"));
    }
    let candidate = Path::new(trimmed);
    if candidate
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(ApiError::not_found("file not found"));
    }
    Ok(root.join(candidate))
}

fn should_fallback_to_index(request_path: &str) -> bool {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return true;
    }
    let candidate = Path::new(trimmed);
    let has_extension = candidate.extension().is_some();
    !has_extension
}
