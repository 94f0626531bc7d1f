use std::{env, sync::Arc, time::Duration};

use aws_config::BehaviorVersion;
use aws_sdk_s3::presigning::PresigningConfig;
use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection,
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use domain::{
    extraction::{mime_type_from_file_name, normalize_mime_type, PrescriptionImage},
    reports::ReportStore,
    visitors::{DynamoVisitorLog, MemoryVisitorLog, VisitorLog, VisitorStatus},
    workflow::{
        new_run_id, services, Failure, FailureKind, FailureOutput, ManualReportInput, ReportOutput,
        UploadPrescriptionInput, UploadPrescriptionOutput, Workflow, GENERIC_FAILURE_MESSAGE,
    },
    Config, Error,
};
use tracing::{error, info, warn};
use ulid::Ulid;

const INDEX_HTML: &str = include_str!("index.html");
const VISITOR_COOKIE: &str = "visitor_id";
const PRESCRIPTION_FIELD: &str = "prescription";
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const UPLOAD_URL_TTL_SECS: u64 = 3600;

#[derive(Clone)]
struct AppState {
    workflow: Arc<Workflow>,
    visitors: Arc<dyn VisitorLog>,
    uploads: Option<Uploads>,
}

/// Bucket that the analyzer lambda watches for direct uploads
#[derive(Clone)]
struct Uploads {
    s3_client: aws_sdk_s3::Client,
    bucket: String,
}

type ApiError = (StatusCode, Json<FailureOutput>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let config = Config::from_env()?;
    let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let s3_client = aws_sdk_s3::Client::new(&aws_config);

    let store = services::init_store(&config, Some(s3_client.clone()))?;
    let workflow = services::init(&config, store)?;

    let visitors: Arc<dyn VisitorLog> = match &config.visitors_table {
        Some(table) => Arc::new(DynamoVisitorLog::new(
            aws_sdk_dynamodb::Client::new(&aws_config),
            table,
        )),
        None => Arc::new(MemoryVisitorLog::new()),
    };

    let uploads = config
        .prescriptions_bucket
        .clone()
        .map(|bucket| Uploads { s3_client, bucket });

    let app = router(AppState {
        workflow,
        visitors,
        uploads,
    });

    if env::var("AWS_LAMBDA_FUNCTION_NAME").is_ok() {
        let app = tower::ServiceBuilder::new()
            .layer(axum_aws_lambda::LambdaLayer::default())
            .service(app);

        lambda_http::run(app).await.map_err(|e| anyhow::anyhow!(e))?;
    } else {
        let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
        info!(addr = %config.bind_addr, "Listening");
        axum::serve(listener, app).await?;
    }
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/reports/image", post(report_from_image))
        .route("/reports/manual", post(report_from_text))
        .route("/reports/:id", get(download_report))
        .route("/prescriptions/upload-url", post(get_upload_url))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

fn failure_response(failure: Failure) -> ApiError {
    let status = match failure.kind {
        FailureKind::Input => StatusCode::BAD_REQUEST,
        FailureKind::ExternalService => StatusCode::BAD_GATEWAY,
        FailureKind::Io | FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(failure.into()))
}

/// Malformed request bodies answer with the same JSON failure as workflow errors
fn rejection_response(message: String) -> ApiError {
    failure_response(Failure::from_error(new_run_id(), &Error::input(message)))
}

// Form page, records the visit
async fn index(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let visitor_id = jar
        .get(VISITOR_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|id| Ulid::from_string(id).is_ok())
        .unwrap_or_else(|| Ulid::new().to_string());

    match state.visitors.record(&visitor_id).await {
        Ok(VisitorStatus::New) => info!(visitor_id = %visitor_id, "New visitor"),
        Ok(VisitorStatus::Returning { first_seen }) => {
            info!(visitor_id = %visitor_id, first_seen = %first_seen, "Returning visitor")
        }
        Err(e) => warn!(visitor_id = %visitor_id, error = %e, "Failed to record visit"),
    }

    let cookie = Cookie::build((VISITOR_COOKIE, visitor_id))
        .path("/")
        .http_only(true)
        .permanent();

    (jar.add(cookie), Html(INDEX_HTML))
}

// Generate report from an uploaded prescription
async fn report_from_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut multipart = multipart.map_err(|e| rejection_response(e.body_text()))?;
    let image = read_prescription(&mut multipart)
        .await
        .map_err(|e| failure_response(Failure::from_error(new_run_id(), &e)))?;

    let report = state
        .workflow
        .from_image(image)
        .await
        .map_err(failure_response)?;

    Ok(Json(ReportOutput::new(report)))
}

// Generate report from typed medicine names
async fn report_from_text(
    State(state): State<AppState>,
    input: Result<Json<ManualReportInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = input.map_err(|e| rejection_response(e.body_text()))?;
    let report = state
        .workflow
        .manual(&input.medicines)
        .await
        .map_err(failure_response)?;

    Ok(Json(ReportOutput::new(report)))
}

/// `None` when the form carried no file, which the workflow rejects
async fn read_prescription(multipart: &mut Multipart) -> Result<Option<PrescriptionImage>, Error> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::input(format!("malformed upload: {}", e)))?
    {
        if field.name() != Some(PRESCRIPTION_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let declared = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::input(format!("failed to read upload: {}", e)))?;

        // Browsers send an empty part when no file was chosen
        if bytes.is_empty() && file_name.is_empty() {
            return Ok(None);
        }

        let mime_type = match declared {
            Some(raw) if raw != "application/octet-stream" => raw,
            _ => mime_type_from_file_name(&file_name)
                .unwrap_or("application/octet-stream")
                .to_string(),
        };

        return PrescriptionImage::new(bytes.to_vec(), &mime_type).map(Some);
    }
    Ok(None)
}

// Download the stored report
async fn download_report(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let store = state.workflow.reports();

    let content = store.read(&id).await.map_err(|e| match e {
        Error::Input { message } => (StatusCode::BAD_REQUEST, message),
        Error::NotFound { .. } => (StatusCode::NOT_FOUND, "Not found".to_string()),
        e => {
            error!(run_id = %id, error = %e, "Failed to read report");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                GENERIC_FAILURE_MESSAGE.to_string(),
            )
        }
    })?;

    let disposition = format!("attachment; filename=\"{}\"", store.file_name());
    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    ))
}

// Get S3 presigned URL for a direct upload, picked up by the analyzer
async fn get_upload_url(
    State(state): State<AppState>,
    Json(input): Json<UploadPrescriptionInput>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let uploads = state.uploads.as_ref().ok_or((
        StatusCode::NOT_FOUND,
        "Direct uploads are not enabled".to_string(),
    ))?;

    let content_type = normalize_mime_type(&input.content_type)
        .or_else(|| mime_type_from_file_name(&input.file_name))
        .ok_or((
            StatusCode::BAD_REQUEST,
            format!(
                "unsupported image type '{}', expected one of: jpg, jpeg, png",
                input.content_type
            ),
        ))?;

    let run_id = new_run_id();
    let key = format!("prescriptions/{}/{}", run_id, PRESCRIPTION_FIELD);

    let presigning = PresigningConfig::expires_in(Duration::from_secs(UPLOAD_URL_TTL_SECS))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let presigned = uploads
        .s3_client
        .put_object()
        .bucket(&uploads.bucket)
        .key(&key)
        .content_type(content_type)
        .presigned(presigning)
        .await
        .map_err(|e| {
            error!(run_id = %run_id, error = %e, "Failed to presign upload");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                GENERIC_FAILURE_MESSAGE.to_string(),
            )
        })?;

    info!(run_id = %run_id, key = %key, "Upload URL issued");

    Ok(Json(UploadPrescriptionOutput {
        run_id,
        upload_url: presigned.uri().to_string(),
        key,
        expires_in_secs: UPLOAD_URL_TTL_SECS,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use domain::{
        config::default_pharmacies,
        extraction::{ImageExtractor, VisionService},
        reports::{FsReportStore, ReportCompiler},
        research::{LinkResearcher, SearchHit, SearchTool, ToolCapability},
    };
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "test-boundary";

    struct FixedVision;

    #[async_trait]
    impl VisionService for FixedVision {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn describe(&self, _image: &PrescriptionImage, _instruction: &str) -> Result<String, Error> {
            Ok("Aspirin, Cetirizine".to_string())
        }
    }

    struct PharmacySearch;

    #[async_trait]
    impl SearchTool for PharmacySearch {
        fn name(&self) -> &str {
            "pharmacy"
        }

        fn capability(&self) -> ToolCapability {
            ToolCapability::Search
        }

        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<SearchHit>, Error> {
            let slug = query.split_whitespace().nth(1).unwrap_or("x").to_lowercase();
            Ok(vec![SearchHit::new(
                format!("Buy {}", slug),
                format!("https://www.netmeds.com/p/{}", slug),
            )])
        }
    }

    struct TestApp {
        state: AppState,
        visitors: Arc<MemoryVisitorLog>,
        _dir: TempDir,
    }

    fn test_app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let workflow = Workflow::new(
            ImageExtractor::new(Arc::new(FixedVision)),
            LinkResearcher::new(vec![Arc::new(PharmacySearch)], default_pharmacies()),
            ReportCompiler::new(Arc::new(FsReportStore::new(dir.path(), "Links.md"))),
        );
        let visitors = Arc::new(MemoryVisitorLog::new());
        let state = AppState {
            workflow: Arc::new(workflow),
            visitors: visitors.clone(),
            uploads: None,
        };
        TestApp {
            state,
            visitors,
            _dir: dir,
        }
    }

    fn manual_request(medicines: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/reports/manual")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::json!({ "medicines": medicines }).to_string()))
            .unwrap()
    }

    fn multipart_request(parts: &[(&str, &str, &str, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, file_name, content_type, data) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    name, file_name, content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/reports/image")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn index_sets_a_visitor_cookie_and_records_the_visit() {
        let app = test_app();

        let response = router(app.state.clone()).oneshot(get("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(set_cookie.starts_with("visitor_id="));

        let visitor_id = set_cookie
            .trim_start_matches("visitor_id=")
            .split(';')
            .next()
            .unwrap()
            .to_string();
        assert_eq!(app.visitors.get(&visitor_id).await.unwrap().visits, 1);

        let request = Request::builder()
            .uri("/")
            .header(header::COOKIE, format!("visitor_id={}", visitor_id))
            .body(Body::empty())
            .unwrap();
        router(app.state.clone()).oneshot(request).await.unwrap();

        assert_eq!(app.visitors.get(&visitor_id).await.unwrap().visits, 2);
    }

    #[tokio::test]
    async fn manual_report_can_be_downloaded() {
        let app = test_app();

        let response = router(app.state.clone())
            .oneshot(manual_request("Aspirin"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let report = body["report"].as_str().unwrap().to_string();
        assert!(report.contains("https://www.netmeds.com/p/aspirin"));

        let download_url = body["download_url"].as_str().unwrap();
        let response = router(app.state.clone())
            .oneshot(get(download_url))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"Links.md\""
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), report);
    }

    #[tokio::test]
    async fn blank_manual_entry_is_a_bad_request() {
        let app = test_app();

        let response = router(app.state).oneshot(manual_request("   ")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "no medicines entered");
        assert!(body["run_id"].is_string());
    }

    #[tokio::test]
    async fn malformed_manual_body_is_a_json_bad_request() {
        let app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/reports/manual")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = router(app.state).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["kind"], "input");
        assert!(body["error"].as_str().unwrap().contains("medicines"));
        assert!(body["run_id"].is_string());
    }

    #[tokio::test]
    async fn image_upload_without_multipart_is_a_json_bad_request() {
        let app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/reports/image")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("not a form"))
            .unwrap();

        let response = router(app.state).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].is_string());
        assert!(body["run_id"].is_string());
    }

    #[tokio::test]
    async fn image_report_lists_extracted_medicines() {
        let app = test_app();
        let png: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A];

        let response = router(app.state)
            .oneshot(multipart_request(&[("prescription", "rx.png", "image/png", png)]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["medicine_count"], 2);
        let report = body["report"].as_str().unwrap();
        assert!(report.contains("Aspirin"));
        assert!(report.contains("Cetirizine"));
    }

    #[tokio::test]
    async fn missing_prescription_field_is_a_bad_request() {
        let app = test_app();

        let response = router(app.state)
            .oneshot(multipart_request(&[("notes", "notes.txt", "text/plain", b"hello")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "no prescription uploaded");
    }

    #[tokio::test]
    async fn unsupported_image_type_is_a_bad_request() {
        let app = test_app();

        let response = router(app.state)
            .oneshot(multipart_request(&[("prescription", "rx.pdf", "application/pdf", b"%PDF")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("unsupported image type"));
    }

    #[tokio::test]
    async fn download_rejects_bad_ids_and_unknown_runs() {
        let app = test_app();

        let response = router(app.state.clone())
            .oneshot(get("/reports/not-a-run"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router(app.state)
            .oneshot(get(&format!("/reports/{}", new_run_id())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_url_needs_a_bucket() {
        let app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/prescriptions/upload-url")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"file_name":"rx.jpg","content_type":"image/jpeg"}"#,
            ))
            .unwrap();

        let response = router(app.state).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
