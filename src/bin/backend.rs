#![forbid(unsafe_code)]

//! Axum backend for the video catalog.
//!
//! Uploads are checked for duplicates before they are stored, and the admin
//! routes let an operator run a full-catalog scan and review what it flagged.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path as AxumPath, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use vidshare_tools::config::{RuntimeOverrides, resolve_runtime_config};
use vidshare_tools::duplicates::{
    DetectorLimits, DuplicateCandidate, DuplicateCheck, DuplicateDetector, ScanReport,
};
use vidshare_tools::metadata::{METADATA_DB_FILE, MetadataStore, NewVideo, VideoRecord};
use vidshare_tools::security::{AdminToken, ensure_not_root};

#[derive(Debug, Clone)]
struct BackendArgs {
    data_root: PathBuf,
    port: u16,
    listen_host: IpAddr,
    admin_token: Option<String>,
    limits: DetectorLimits,
}

impl BackendArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(std::env::args().skip(1))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut data_root_override: Option<PathBuf> = None;
        let mut port_override: Option<u16> = None;
        let mut host_override: Option<IpAddr> = None;
        let mut env_path: Option<PathBuf> = None;
        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--data-root=") {
                data_root_override = Some(PathBuf::from(value));
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
            if let Some(value) = arg.strip_prefix("--env-file=") {
                env_path = Some(PathBuf::from(value));
                continue;
            }

            match arg.as_str() {
                "--data-root" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--data-root requires a value"))?;
                    data_root_override = Some(PathBuf::from(value));
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
                "--env-file" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--env-file requires a value"))?;
                    env_path = Some(PathBuf::from(value));
                }
                _ => return Err(anyhow!("unknown argument: {arg}")),
            }
        }

        let runtime = resolve_runtime_config(RuntimeOverrides {
            data_root: data_root_override,
            vidshare_port: port_override,
            env_path,
            ..RuntimeOverrides::default()
        })?;
        let listen_host = match host_override {
            Some(host) => host,
            None => parse_host_arg(&runtime.vidshare_host)?,
        };

        Ok(Self {
            data_root: runtime.data_root,
            port: runtime.vidshare_port,
            listen_host,
            admin_token: runtime.admin_token,
            limits: runtime.limits,
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
        .context("expected a valid IPv4 or IPv6 address for --host/VIDSHARE_HOST")
}

/// Shared state injected into every Axum handler.
#[derive(Clone)]
struct AppState {
    store: Arc<MetadataStore>,
    detector: Arc<DuplicateDetector>,
    admin: Option<AdminToken>,
    last_scan: Arc<RwLock<Option<ScanRecord>>>,
}

/// Last completed scan, kept in memory for the admin dashboard.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanRecord {
    #[serde(flatten)]
    report: ScanReport,
    completed_at: String,
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

    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    /// Logs the full error chain and returns a generic 500.
    fn internal(context: &str, err: anyhow::Error) -> Self {
        error!("{context}: {err:#}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{context} failed"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    video: VideoRecord,
    duplicate_check: DuplicateCheck,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DeleteDuplicatesRequest {
    #[serde(default)]
    ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteDuplicatesResponse {
    deleted: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidshare_tools=info,backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let BackendArgs {
        data_root,
        port,
        listen_host,
        admin_token,
        limits,
    } = BackendArgs::parse()?;

    ensure_not_root("backend")?;

    let metadata_path = data_root.join(METADATA_DB_FILE);
    let store = MetadataStore::open(&metadata_path)
        .await
        .context("initializing metadata store")?;

    let admin = admin_token.as_deref().and_then(AdminToken::new);
    if admin.is_none() {
        warn!("VIDSHARE_ADMIN_TOKEN not set; admin routes are disabled");
    }

    let state = AppState {
        store: Arc::new(store),
        detector: Arc::new(DuplicateDetector::new(limits)),
        admin,
        last_scan: Arc::new(RwLock::new(None)),
    };

    let addr = SocketAddr::new(listen_host, port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!("API server listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/videos", get(list_videos).post(create_video))
        .route("/api/videos/check-duplicate", post(check_duplicate))
        .route("/api/videos/{id}", get(get_video))
        .route(
            "/api/admin/duplicates",
            get(list_duplicates).delete(delete_duplicates),
        )
        .route(
            "/api/admin/duplicates/scan",
            get(last_scan).post(run_scan),
        )
        .route("/api/admin/duplicates/{id}/keep", post(keep_duplicate))
        .route(
            "/api/admin/duplicates/{id}/make-public",
            post(make_duplicate_public),
        )
        .fallback(|| async { ApiError::not_found("endpoint not found") })
        .with_state(state)
}

async fn shutdown_signal() {
    // Only graceful shutdown depends on this; Ctrl+C still terminates.
    if let Err(err) = signal::ctrl_c().await {
        warn!("failed to install Ctrl+C handler: {err}");
    }
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(token) = &state.admin else {
        return Err(ApiError::forbidden("admin access is disabled"));
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing admin token"))?;
    if !token.verify_bearer(presented) {
        return Err(ApiError::unauthorized("invalid admin token"));
    }
    Ok(())
}

fn candidate_for(upload: &NewVideo) -> DuplicateCandidate {
    DuplicateCandidate {
        title: upload.title.clone(),
        duration_seconds: upload.duration_seconds,
        file_hash: upload.file_hash.clone(),
        file_code: upload.file_code.clone(),
        exclude_id: None,
    }
}

async fn create_video(
    State(state): State<AppState>,
    Json(payload): Json<NewVideo>,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::bad_request("title is required"));
    }

    let duplicate_check = state
        .detector
        .check(state.store.as_ref(), &candidate_for(&payload))
        .await;
    let video = state
        .store
        .insert_video(&payload, Some(&duplicate_check))
        .await
        .map_err(|err| ApiError::internal("storing video", err))?;

    if video.is_duplicate {
        info!(
            id = %video.id,
            duplicate_of = ?video.duplicate_of,
            reasons = ?video.duplicate_reasons,
            "upload flagged as duplicate"
        );
    }

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            video,
            duplicate_check,
        }),
    ))
}

async fn list_videos(State(state): State<AppState>) -> ApiResult<Json<Vec<VideoRecord>>> {
    let videos = state
        .store
        .list_videos()
        .await
        .map_err(|err| ApiError::internal("listing videos", err))?;
    Ok(Json(videos))
}

async fn get_video(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<VideoRecord>> {
    let video = state
        .store
        .get_video(&id)
        .await
        .map_err(|err| ApiError::internal("loading video", err))?
        .ok_or_else(|| ApiError::not_found("video not found"))?;
    Ok(Json(video))
}

async fn check_duplicate(
    State(state): State<AppState>,
    Json(candidate): Json<DuplicateCandidate>,
) -> Json<DuplicateCheck> {
    Json(state.detector.check(state.store.as_ref(), &candidate).await)
}

async fn list_duplicates(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<VideoRecord>>> {
    require_admin(&state, &headers)?;
    let videos = state
        .store
        .list_duplicates()
        .await
        .map_err(|err| ApiError::internal("listing duplicates", err))?;
    Ok(Json(videos))
}

async fn run_scan(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ScanRecord>> {
    require_admin(&state, &headers)?;
    let report = state
        .detector
        .scan(state.store.as_ref())
        .await
        .map_err(|err| ApiError::internal("duplicate scan", err))?;
    let record = ScanRecord {
        report,
        completed_at: Utc::now().to_rfc3339(),
    };
    state.last_scan.write().replace(record.clone());
    Ok(Json(record))
}

async fn last_scan(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ScanRecord>> {
    require_admin(&state, &headers)?;
    let record = state
        .last_scan
        .read()
        .clone()
        .ok_or_else(|| ApiError::not_found("no scan has run yet"))?;
    Ok(Json(record))
}

async fn keep_duplicate(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<VideoRecord>> {
    require_admin(&state, &headers)?;
    let video = state
        .store
        .keep_video(&id)
        .await
        .map_err(|err| ApiError::internal("keeping video", err))?
        .ok_or_else(|| ApiError::not_found("video not found"))?;
    Ok(Json(video))
}

async fn make_duplicate_public(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<VideoRecord>> {
    require_admin(&state, &headers)?;
    let video = state
        .store
        .make_public(&id)
        .await
        .map_err(|err| ApiError::internal("publishing video", err))?
        .ok_or_else(|| ApiError::not_found("video not found"))?;
    Ok(Json(video))
}

async fn delete_duplicates(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<DeleteDuplicatesResponse>> {
    require_admin(&state, &headers)?;
    // An empty body deletes every flagged record.
    let request: DeleteDuplicatesRequest = if body.iter().all(u8::is_ascii_whitespace) {
        DeleteDuplicatesRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::bad_request(format!("invalid request body: {err}")))?
    };
    let deleted = state
        .store
        .delete_duplicates(request.ids.as_deref())
        .await
        .map_err(|err| ApiError::internal("deleting duplicates", err))?;
    info!(deleted, "deleted flagged videos");
    Ok(Json(DeleteDuplicatesResponse { deleted }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::HeaderValue;
    use serde_json::Value;
    use tempfile::tempdir;
    use vidshare_tools::duplicates::DuplicateCatalog;
    use vidshare_tools::metadata::{DuplicateReason, VideoStatus};

    const TOKEN: &str = "s3cret";

    struct BackendTestContext {
        _temp: tempfile::TempDir,
        state: AppState,
    }

    impl BackendTestContext {
        async fn new() -> Self {
            Self::with_admin(AdminToken::new(TOKEN)).await
        }

        async fn with_admin(admin: Option<AdminToken>) -> Self {
            let temp = tempdir().unwrap();
            let store = MetadataStore::open(&temp.path().join(METADATA_DB_FILE))
                .await
                .unwrap();
            Self {
                state: AppState {
                    store: Arc::new(store),
                    detector: Arc::new(DuplicateDetector::default()),
                    admin,
                    last_scan: Arc::new(RwLock::new(None)),
                },
                _temp: temp,
            }
        }

        async fn insert(&self, title: &str, file_hash: Option<&str>) -> VideoRecord {
            self.state
                .store
                .insert_video(
                    &NewVideo {
                        title: title.into(),
                        file_hash: file_hash.map(str::to_owned),
                        ..NewVideo::default()
                    },
                    None,
                )
                .await
                .unwrap()
        }

        fn state(&self) -> State<AppState> {
            State(self.state.clone())
        }
    }

    fn admin_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {TOKEN}")).unwrap(),
        );
        headers
    }

    fn with_env_file(contents: &str) -> (tempfile::TempDir, String) {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, contents).unwrap();
        let path = path.to_string_lossy().into_owned();
        (dir, path)
    }

    #[test]
    fn backend_args_read_env_file() {
        let (_dir, env_path) = with_env_file(
            "DATA_ROOT=\"/srv/data\"\nVIDSHARE_PORT=\"4242\"\nVIDSHARE_HOST=\"127.0.0.1\"\n",
        );
        let args = BackendArgs::from_iter(["--env-file".to_string(), env_path]).unwrap();
        assert_eq!(args.data_root, PathBuf::from("/srv/data"));
        assert_eq!(args.port, 4242);
        assert_eq!(args.listen_host, "127.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn backend_args_flags_override_env_file() {
        let (_dir, env_path) = with_env_file("DATA_ROOT=\"/srv/data\"\nVIDSHARE_PORT=\"4242\"\n");
        let args = BackendArgs::from_iter(
            [
                format!("--env-file={env_path}"),
                "--data-root".into(),
                "/custom".into(),
                "--port=9000".into(),
                "--host".into(),
                "0.0.0.0".into(),
            ]
            .into_iter(),
        )
        .unwrap();
        assert_eq!(args.data_root, PathBuf::from("/custom"));
        assert_eq!(args.port, 9000);
        assert_eq!(args.listen_host, "0.0.0.0".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn backend_args_reject_unknown_flags() {
        let err = BackendArgs::from_iter(["--media-root".to_string()]).unwrap_err();
        assert!(err.to_string().contains("unknown argument"));
        assert!(BackendArgs::from_iter(["--port=abc".to_string()]).is_err());
    }

    #[tokio::test]
    async fn upload_flags_duplicate_and_forces_private() {
        let ctx = BackendTestContext::new().await;
        let original = ctx.insert("the great escape", None).await;

        let (status, Json(response)) = create_video(
            ctx.state(),
            Json(NewVideo {
                title: "The Great Escape!!".into(),
                status: Some(VideoStatus::Public),
                ..NewVideo::default()
            }),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert!(response.duplicate_check.is_duplicate);
        assert_eq!(response.duplicate_check.reasons, vec![DuplicateReason::Title]);
        assert!(response.video.is_duplicate);
        assert_eq!(response.video.duplicate_of.as_deref(), Some(original.id.as_str()));
        assert_eq!(response.video.status, VideoStatus::Private);
    }

    #[tokio::test]
    async fn unique_upload_keeps_requested_status() {
        let ctx = BackendTestContext::new().await;
        ctx.insert("Deep Sea Documentary", None).await;

        let (_, Json(response)) = create_video(
            ctx.state(),
            Json(NewVideo {
                title: "Morning Yoga Routine".into(),
                status: Some(VideoStatus::Unlisted),
                ..NewVideo::default()
            }),
        )
        .await
        .unwrap();

        assert!(!response.duplicate_check.is_duplicate);
        assert!(response.duplicate_check.matches.is_empty());
        assert_eq!(response.video.status, VideoStatus::Unlisted);
    }

    #[tokio::test]
    async fn upload_requires_title() {
        let ctx = BackendTestContext::new().await;
        let err = create_video(
            ctx.state(),
            Json(NewVideo {
                title: "   ".into(),
                ..NewVideo::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn check_endpoint_does_not_write() {
        let ctx = BackendTestContext::new().await;
        ctx.insert("Alpine Lake Timelapse", Some("bytes")).await;

        let Json(result) = check_duplicate(
            ctx.state(),
            Json(DuplicateCandidate {
                title: "Completely different".into(),
                file_hash: Some("bytes".into()),
                ..DuplicateCandidate::default()
            }),
        )
        .await;

        assert!(result.is_duplicate);
        assert_eq!(result.reasons, vec![DuplicateReason::File]);
        assert_eq!(ctx.state.store.list_videos().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_video_returns_not_found() {
        let ctx = BackendTestContext::new().await;
        let err = get_video(ctx.state(), AxumPath("ghost".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_routes_require_token() {
        let ctx = BackendTestContext::new().await;

        let err = list_duplicates(ctx.state(), HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let mut wrong = HeaderMap::new();
        wrong.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        let err = run_scan(ctx.state(), wrong).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        assert!(list_duplicates(ctx.state(), admin_headers()).await.is_ok());
    }

    #[tokio::test]
    async fn admin_routes_disabled_without_token() {
        let ctx = BackendTestContext::with_admin(None).await;
        let err = run_scan(ctx.state(), admin_headers()).await.unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn scan_reports_and_remembers_result() {
        let ctx = BackendTestContext::new().await;
        let err = last_scan(ctx.state(), admin_headers()).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let original = ctx.insert("Alpine Lake Timelapse", Some("same")).await;
        ctx.insert("Street Food Tour", Some("other")).await;
        let copy = ctx.insert("Renamed reupload", Some("same")).await;

        let Json(record) = run_scan(ctx.state(), admin_headers()).await.unwrap();
        assert_eq!(record.report.duplicates_found, 1);
        assert_eq!(record.report.total_scanned, 3);

        let Json(remembered) = last_scan(ctx.state(), admin_headers()).await.unwrap();
        assert_eq!(remembered.report, record.report);

        let Json(flagged) = list_duplicates(ctx.state(), admin_headers()).await.unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].id, copy.id);
        assert_eq!(flagged[0].duplicate_of.as_deref(), Some(original.id.as_str()));
    }

    #[tokio::test]
    async fn scan_record_serializes_flat() {
        let record = ScanRecord {
            report: ScanReport {
                duplicates_found: 2,
                total_scanned: 9,
            },
            completed_at: "2024-01-01T00:00:00+00:00".into(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["duplicatesFound"], 2);
        assert_eq!(value["totalScanned"], 9);
        assert!(value["completedAt"].is_string());
    }

    #[tokio::test]
    async fn keep_and_make_public_clear_flags() {
        let ctx = BackendTestContext::new().await;
        let original = ctx.insert("Original", None).await;
        let first = ctx.insert("First copy", None).await;
        let second = ctx.insert("Second copy", None).await;
        for id in [&first.id, &second.id] {
            ctx.state
                .store
                .mark_duplicate(id, &original.id, &[DuplicateReason::File])
                .await
                .unwrap();
        }

        let Json(kept) = keep_duplicate(ctx.state(), admin_headers(), AxumPath(first.id.clone()))
            .await
            .unwrap();
        assert!(!kept.is_duplicate);
        assert_eq!(kept.status, VideoStatus::Private);

        let Json(published) = make_duplicate_public(
            ctx.state(),
            admin_headers(),
            AxumPath(second.id.clone()),
        )
        .await
        .unwrap();
        assert!(!published.is_duplicate);
        assert_eq!(published.status, VideoStatus::Public);

        let err = keep_duplicate(ctx.state(), admin_headers(), AxumPath("ghost".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bulk_delete_with_and_without_ids() {
        let ctx = BackendTestContext::new().await;
        let original = ctx.insert("Original", None).await;
        let mut copies = Vec::new();
        for title in ["one", "two", "three"] {
            let copy = ctx.insert(title, None).await;
            ctx.state
                .store
                .mark_duplicate(&copy.id, &original.id, &[DuplicateReason::Title])
                .await
                .unwrap();
            copies.push(copy.id);
        }

        let body = serde_json::to_vec(&serde_json::json!({ "ids": [copies[0]] })).unwrap();
        let Json(response) = delete_duplicates(ctx.state(), admin_headers(), Bytes::from(body))
            .await
            .unwrap();
        assert_eq!(response.deleted, 1);

        let Json(response) = delete_duplicates(ctx.state(), admin_headers(), Bytes::new())
            .await
            .unwrap();
        assert_eq!(response.deleted, 2);

        let err = delete_duplicates(ctx.state(), admin_headers(), Bytes::from_static(b"{nope"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let remaining = ctx.state.store.list_videos().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, original.id);
    }

    #[tokio::test]
    async fn api_error_serializes_json() {
        let response = ApiError::not_found("missing").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], "missing");
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let response = ApiError::internal("storing video", anyhow!("disk full at /srv")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], "storing video failed");
    }
}
