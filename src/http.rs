//! HTTP routes: form upload, results listing, and the performance chart.

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::PipelineError;
use crate::intake::UploadedBlob;
use crate::models::{ChartBar, ReportOutcome, ResultRecord, SubmissionIdentity};
use crate::pipeline::Pipeline;

pub type AppState = Arc<Pipeline>;

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/evaluate", post(evaluate))
        .route("/results", get(results))
        .route("/graph", get(graph))
        .nest_service("/static/uploads", ServeDir::new(state.documents().dir()))
        .nest_service("/static/graphs", ServeDir::new(state.graph_dir()))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        match self {
            err if err.is_client_error() => {
                (StatusCode::BAD_REQUEST, "File upload failed!").into_response()
            }
            PipelineError::ScoringFailure(msg) => {
                (StatusCode::BAD_GATEWAY, format!("Scoring failed: {msg}")).into_response()
            }
            err => {
                error!("request failed: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Oversized uploads get 413 so clients can tell them apart from a missing file.
fn multipart_rejection(err: MultipartError) -> Response {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return (StatusCode::PAYLOAD_TOO_LARGE, "File too large!").into_response();
    }
    PipelineError::InvalidSubmission(err.body_text()).into_response()
}

async fn evaluate(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Redirect, Response> {
    let mut identity = SubmissionIdentity::default();
    let mut blob = UploadedBlob::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_rejection)?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                blob.file_name = field.file_name().unwrap_or_default().to_string();
                blob.bytes = field
                    .bytes()
                    .await
                    .map_err(multipart_rejection)?
                    .to_vec();
            }
            "name" | "roll_no" | "semester" => {
                let value = field
                    .text()
                    .await
                    .map_err(multipart_rejection)?;
                match name.as_str() {
                    "name" => identity.name = value,
                    "roll_no" => identity.roll_no = value,
                    _ => identity.semester = value,
                }
            }
            _ => {}
        }
    }

    state
        .submit(identity, &blob)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(Redirect::to("/results"))
}

async fn results(State(state): State<AppState>) -> Result<Json<Vec<ResultRecord>>, PipelineError> {
    Ok(Json(state.results().await?))
}

#[derive(Debug, Serialize)]
pub struct GraphResponse {
    pub graph: Option<String>,
    pub bars: Vec<ChartBar>,
}

async fn graph(State(state): State<AppState>) -> Result<Json<GraphResponse>, PipelineError> {
    let response = match state.report().await? {
        ReportOutcome::Empty => GraphResponse {
            graph: None,
            bars: Vec::new(),
        },
        ReportOutcome::Rendered { path, bars } => GraphResponse {
            graph: Some(path.display().to_string()),
            bars,
        },
    };
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    use crate::pipeline::tests::{pipeline_with, FixedScorer};

    const BOUNDARY: &str = "sheet-boundary";

    fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/evaluate")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn upload_redirects_and_lists_result() {
        let (_db, _files, pipeline) = pipeline_with(FixedScorer::new(Some(78.5))).await;
        let app = router(Arc::new(pipeline), 1024 * 1024);

        let body = multipart_body(
            &[("name", "Asha"), ("roll_no", "R1"), ("semester", "3")],
            Some(("asha.png", b"scan".as_slice())),
        );
        let response = app.clone().oneshot(upload(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/results");

        let listed = json(app.clone().oneshot(get("/results")).await.unwrap()).await;
        assert_eq!(listed[0]["id"], 1);
        assert_eq!(listed[0]["name"], "Asha");
        assert_eq!(listed[0]["roll_no"], "R1");
        assert_eq!(listed[0]["semester"], "3");
        assert_eq!(listed[0]["mark"], 78.5);

        let graph = json(app.oneshot(get("/graph")).await.unwrap()).await;
        assert!(graph["graph"].as_str().unwrap().ends_with("performance.svg"));
        assert_eq!(graph["bars"][0]["name"], "Asha");
    }

    #[tokio::test]
    async fn missing_file_is_bad_request() {
        let (_db, _files, pipeline) = pipeline_with(FixedScorer::new(Some(1.0))).await;
        let app = router(Arc::new(pipeline), 1024 * 1024);

        let body = multipart_body(&[("name", "Asha")], None);
        let response = app.clone().oneshot(upload(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"File upload failed!");

        let listed = json(app.oneshot(get("/results")).await.unwrap()).await;
        assert_eq!(listed, serde_json::json!([]));
    }

    #[tokio::test]
    async fn scorer_failure_is_bad_gateway() {
        let (_db, _files, pipeline) = pipeline_with(FixedScorer::new(None)).await;
        let app = router(Arc::new(pipeline), 1024 * 1024);

        let body = multipart_body(&[], Some(("sheet.png", b"scan".as_slice())));
        let response = app.oneshot(upload(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn empty_graph_reports_no_data() {
        let (_db, _files, pipeline) = pipeline_with(FixedScorer::new(Some(1.0))).await;
        let app = router(Arc::new(pipeline), 1024 * 1024);

        let graph = json(app.oneshot(get("/graph")).await.unwrap()).await;
        assert!(graph["graph"].is_null());
        assert_eq!(graph["bars"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn oversized_upload_is_payload_too_large() {
        let (_db, _files, pipeline) = pipeline_with(FixedScorer::new(Some(1.0))).await;
        let app = router(Arc::new(pipeline), 16);

        let body = multipart_body(&[], Some(("sheet.png", [7u8; 64].as_slice())));
        let response = app.clone().oneshot(upload(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let listed = json(app.oneshot(get("/results")).await.unwrap()).await;
        assert_eq!(listed, serde_json::json!([]));
    }

    #[tokio::test]
    async fn storage_failure_is_server_error() {
        let (_db, _files, pipeline) = pipeline_with(FixedScorer::new(Some(1.0))).await;
        std::fs::remove_dir_all(pipeline.documents().dir()).unwrap();
        let app = router(Arc::new(pipeline), 1024 * 1024);

        let body = multipart_body(&[("name", "Asha")], Some(("sheet.png", b"scan".as_slice())));
        let response = app.clone().oneshot(upload(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let listed = json(app.oneshot(get("/results")).await.unwrap()).await;
        assert_eq!(listed, serde_json::json!([]));
    }
}
