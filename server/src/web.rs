use crate::{
    config::ServerConfig,
    database::{Benchmark, ConnectionError, GroupOverview, SharedConnection, ID},
    submit::{ingest_upload, SubmitError},
};
use askama::Template;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use fsbench_analysis::{chart_file_name, METRICS, SCENARIOS};
use itertools::iproduct;
use std::sync::Arc;
use thiserror::Error;
use tokio::{net::TcpListener, task::spawn_blocking};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub connection: SharedConnection,
    pub config: Arc<ServerConfig>,
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error("Database query failed: {0}")]
    Database(#[from] ConnectionError),
    #[error("Not found")]
    NotFound,
    #[error("Failed to read upload: {0}")]
    Upload(#[from] MultipartError),
    #[error("Failed to render page: {0}")]
    Template(#[from] askama::Error),
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl WebError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Submit(SubmitError::UnknownBenchmark(_)) | Self::NotFound => {
                StatusCode::NOT_FOUND
            }
            Self::Submit(error) if error.is_rejection() => StatusCode::BAD_REQUEST,
            Self::Upload(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(error = ?self, "Request failed: {self}");
        } else {
            warn!(status = %status, "Rejected request: {self}");
        }

        (status, self.to_string()).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/submit", post(submit))
        .route("/view/:group_id", get(view_group))
        .route("/view/bench/:benchmark_id", get(view_benchmark))
        .nest_service("/graphs", ServeDir::new(&state.config.storage.graphs))
        .layer(DefaultBodyLimit::max(state.config.server.upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(config: Arc<ServerConfig>, connection: SharedConnection) -> std::io::Result<()> {
    let bind = config.server.bind;
    let app = router(AppState { connection, config });
    let listener = TcpListener::bind(bind).await?;

    info!(address = %bind, "Serving benchmark history");

    axum::serve(listener, app).await
}

struct ChartView {
    title: String,
    // served below /graphs
    file: String,
}

struct BenchmarkView {
    id: ID,
    filesystem: String,
    bcache_commit: Option<String>,
    charts: Vec<ChartView>,
}

impl From<&Benchmark> for BenchmarkView {
    fn from(benchmark: &Benchmark) -> Self {
        Self {
            id: benchmark.id,
            filesystem: benchmark.filesystem.clone(),
            bcache_commit: benchmark.bcache_commit.clone(),
            charts: iproduct!(SCENARIOS.iter(), METRICS.iter())
                .map(|(scenario, metric)| ChartView {
                    title: format!("{} {}", scenario.title(), metric.display),
                    file: chart_file_name(benchmark.id, &benchmark.filesystem, scenario, metric),
                })
                .collect(),
        }
    }
}

struct GroupView {
    id: ID,
    date: String,
    disk_model: String,
    fdisk: String,
    bcache_commit: Option<String>,
    benchmarks: Vec<BenchmarkView>,
}

impl From<&GroupOverview> for GroupView {
    fn from(overview: &GroupOverview) -> Self {
        Self {
            id: overview.group.id,
            date: overview.group.date.format("%Y-%m-%d %H:%M:%S").to_string(),
            disk_model: overview.group.disk_model.clone(),
            fdisk: overview.group.fdisk.clone(),
            bcache_commit: overview.bcache_commit().map(str::to_owned),
            benchmarks: overview.benchmarks.iter().map(BenchmarkView::from).collect(),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    groups: Vec<GroupView>,
}

#[derive(Template)]
#[template(path = "view_group.html")]
struct GroupTemplate {
    group: GroupView,
}

#[derive(Template)]
#[template(path = "view_single.html")]
struct BenchmarkTemplate {
    group: GroupView,
    benchmark: BenchmarkView,
}

fn page<T: Template>(template: T) -> Result<Html<String>, WebError> {
    Ok(Html(template.render()?))
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, WebError> {
    let connection = state.connection.clone();
    let limit = state.config.server.listing_limit;
    let groups = spawn_blocking(move || connection.list_groups(limit)).await??;

    page(IndexTemplate {
        groups: groups.iter().map(GroupView::from).collect(),
    })
}

async fn submit(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Redirect, WebError> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("benchfile") {
            let file_name = field.file_name().unwrap_or_default().to_owned();
            upload = Some((file_name, field.bytes().await?));
            break;
        }
    }

    let (file_name, data) = upload.ok_or(SubmitError::NoFile)?;
    info!(file_name = %file_name, bytes = data.len(), "Received submission");

    // processing runs to completion before the response is sent
    let group_id = spawn_blocking(move || {
        ingest_upload(
            &state.connection,
            &state.config.storage,
            &file_name,
            data.to_vec(),
        )
    })
    .await??;

    Ok(Redirect::to(&format!("/view/{group_id}")))
}

async fn view_group(
    State(state): State<AppState>,
    Path(group_id): Path<ID>,
) -> Result<Html<String>, WebError> {
    let overview = spawn_blocking(move || state.connection.group(group_id))
        .await??
        .ok_or(WebError::NotFound)?;

    page(GroupTemplate {
        group: GroupView::from(&overview),
    })
}

async fn view_benchmark(
    State(state): State<AppState>,
    Path(benchmark_id): Path<ID>,
) -> Result<Html<String>, WebError> {
    let overview = spawn_blocking(move || -> Result<Option<GroupOverview>, ConnectionError> {
        match state.connection.benchmark(benchmark_id)? {
            Some(benchmark) => state.connection.group(benchmark.benchgroup_id),
            None => Ok(None),
        }
    })
    .await??
    .ok_or(WebError::NotFound)?;

    let benchmark = overview
        .benchmarks
        .iter()
        .find(|benchmark| benchmark.id == benchmark_id)
        .ok_or(WebError::NotFound)?;

    page(BenchmarkTemplate {
        benchmark: BenchmarkView::from(benchmark),
        group: GroupView::from(&overview),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        submit::ingest_upload,
        testing::{archive, Fixture},
    };
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
    };
    use tower::ServiceExt;

    const BOUNDARY: &str = "fsbench-test-boundary";

    fn app(fixture: &Fixture) -> Router {
        router(AppState {
            connection: fixture.connection.clone(),
            config: Arc::new(fixture.config.clone()),
        })
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, String::from_utf8_lossy(&body).into_owned())
    }

    fn multipart(field: &str, file_name: &str, data: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/zip\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/submit")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn empty_index() {
        let fixture = Fixture::new();
        let (status, body) = get(app(&fixture), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("No benchmarks"));
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let fixture = Fixture::new();

        assert_eq!(get(app(&fixture), "/view/7").await.0, StatusCode::NOT_FOUND);
        assert_eq!(
            get(app(&fixture), "/view/bench/7").await.0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get(app(&fixture), "/view/bench/seven").await.0,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn views_show_charts() {
        let fixture = Fixture::new();
        let group_id = ingest_upload(
            &fixture.connection,
            &fixture.config.storage,
            "run.zip",
            archive(&["bcache", "ext4"], &[]),
        )
        .unwrap();
        let overview = fixture.connection.group(group_id).unwrap().unwrap();
        let bcache = &overview.benchmarks[0];
        let chart = format!("/graphs/{}-bcache-seqread-bw.bw.png", bcache.id);

        let (status, body) = get(app(&fixture), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("INTEL SSDSC2BB240G4"));
        assert!(body.contains("0123abcd"));
        assert!(body.contains(&format!("/view/bench/{}", bcache.id)));

        let (status, body) = get(app(&fixture), &format!("/view/{group_id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(&chart));
        assert!(body.contains("70Mix-Write latency"));

        let (status, body) = get(app(&fixture), &format!("/view/bench/{}", bcache.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(&chart));
        assert!(!body.contains("-ext4-"));

        let response = app(&fixture)
            .oneshot(Request::builder().uri(&chart).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn upload_redirects_to_group() {
        let fixture = Fixture::new();
        let response = app(&fixture)
            .oneshot(multipart("benchfile", "run.zip", &archive(&["xfs"], &[])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/view/1");
        assert_eq!(fixture.connection.list_groups(10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upload_rejections() {
        let fixture = Fixture::new();

        let cases = [
            (
                multipart("otherfile", "run.zip", b"ignored"),
                "Bad request, no file",
            ),
            (
                multipart("benchfile", "run.tar", b"ignored"),
                "Wrong file extension. Not .zip",
            ),
            (
                multipart("benchfile", "run.zip", &archive(&["xfs"], &["fdisk.txt"])),
                "Missing files in ZIP: fdisk.txt",
            ),
        ];

        for (request, message) in cases {
            let response = app(&fixture).oneshot(request).await.unwrap();
            let status = response.status();
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(String::from_utf8_lossy(&body), message);
        }

        assert!(fixture.connection.list_groups(10).unwrap().is_empty());
    }
}
