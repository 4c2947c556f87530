//! HTTP server for the auditor UI and its JSON API
//!
//! HTML routes (form posts, each answered with a redirect back to `/`):
//! - GET  /            - Render the session's current page
//! - POST /analyze     - Upload a PDF and analyze it
//! - POST /report      - Go to the results page
//! - POST /new-upload  - Reset and go back to the upload page
//! - POST /chat        - Ask a question about the contract
//!
//! JSON routes mirror the actions under /api, plus GET /api/session and GET /health.

use axum::{
    extract::{DefaultBodyLimit, Form, Multipart, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::ai_client::CompletionService;
use crate::analysis::{self, AnalysisError, AnalysisOutcome};
use crate::chat::{self, ChatError};
use crate::document::{self, DocumentError, ExtractedDocument};
use crate::render;
use crate::session::{
    DocumentInfo, Message, NoticeKind, Page, SessionState, SessionStore, SharedSession,
};
use crate::settings;

pub const SESSION_COOKIE: &str = "legalize_session";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// AppState
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub completion: Arc<dyn CompletionService>,
    pub max_upload_bytes: usize,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(completion: Arc<dyn CompletionService>, max_upload_bytes: usize) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new()),
            completion,
            max_upload_bytes,
            start_time: Instant::now(),
        }
    }

    pub fn with_session_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.sessions = Arc::new(SessionStore::with_idle_timeout(idle_timeout));
        self
    }
}

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug)]
pub struct AppError(StatusCode, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({"error": self.1}))).into_response()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.1)
    }
}

fn bad_request(msg: impl Into<String>) -> AppError {
    AppError(StatusCode::BAD_REQUEST, msg.into())
}

impl From<DocumentError> for AppError {
    fn from(e: DocumentError) -> Self {
        let status = match e {
            DocumentError::Encrypted => StatusCode::UNPROCESSABLE_ENTITY,
            DocumentError::Unreadable(_) => StatusCode::BAD_REQUEST,
        };
        AppError(status, e.to_string())
    }
}

impl From<AnalysisError> for AppError {
    fn from(e: AnalysisError) -> Self {
        let status = match e {
            AnalysisError::NoText => StatusCode::UNPROCESSABLE_ENTITY,
            AnalysisError::Transition(_) => StatusCode::CONFLICT,
            AnalysisError::Completion(_) => StatusCode::BAD_GATEWAY,
        };
        AppError(status, e.to_string())
    }
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        let status = match e {
            ChatError::EmptyQuestion => StatusCode::BAD_REQUEST,
            ChatError::Transition(_) => StatusCode::CONFLICT,
            ChatError::Completion(_) => StatusCode::BAD_GATEWAY,
        };
        AppError(status, e.to_string())
    }
}

// ============================================================================
// Request / Response types
// ============================================================================

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
}

/// Session as exposed over the API (contract text reduced to its length)
#[derive(Serialize)]
struct SessionView {
    session_id: Uuid,
    current_page: Page,
    analysis_result: String,
    messages: Vec<Message>,
    contract_chars: usize,
    document: Option<DocumentInfo>,
}

impl SessionView {
    fn new(id: Uuid, session: &SessionState) -> Self {
        Self {
            session_id: id,
            current_page: session.current_page,
            analysis_result: session.analysis_result.clone(),
            messages: session.messages.clone(),
            contract_chars: session.contract_text.chars().count(),
            document: session.document.clone(),
        }
    }
}

#[derive(Serialize)]
struct AnalyzeResponse {
    session: SessionView,
    chars: usize,
    embedded_chars: usize,
    truncated: bool,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: Message,
    session: SessionView,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    model: String,
    sessions: usize,
    uptime_secs: u64,
}

// ============================================================================
// Helpers
// ============================================================================

fn cookie_session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

fn resolve_session(state: &AppState, headers: &HeaderMap) -> (Uuid, SharedSession, bool) {
    state.sessions.get_or_create(cookie_session_id(headers))
}

fn attach_cookie(mut response: Response, id: Uuid, created: bool) -> Response {
    if created {
        let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id);
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

/// JSON body on success, `{"error"}` otherwise; the cookie is set either way
fn api_response<T: Serialize>(result: Result<T, AppError>, id: Uuid, created: bool) -> Response {
    let response = match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    };
    attach_cookie(response, id, created)
}

fn redirect_home(id: Uuid, created: bool) -> Response {
    attach_cookie(Redirect::to("/").into_response(), id, created)
}

/// Pull the `file` field out of a multipart upload
async fn read_upload(mut multipart: Multipart) -> Result<(String, Vec<u8>), AppError> {
    while let Some(field) = multipart.next_field().await
        .map_err(|e| bad_request(format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("contract.pdf").to_string();
        let bytes = field.bytes().await
            .map_err(|e| bad_request(format!("Failed to read upload: {}", e)))?;

        if bytes.is_empty() {
            return Err(bad_request("Uploaded file is empty"));
        }
        if !bytes.starts_with(b"%PDF") && !file_name.to_lowercase().ends_with(".pdf") {
            return Err(AppError(StatusCode::UNSUPPORTED_MEDIA_TYPE, "Only PDF files are supported".to_string()));
        }
        return Ok((file_name, bytes.to_vec()));
    }
    Err(bad_request("Missing 'file' field"))
}

/// Extraction is CPU-bound, so it runs off the async workers
async fn extract(bytes: Vec<u8>) -> Result<ExtractedDocument, AppError> {
    let doc = tokio::task::spawn_blocking(move || document::extract_pages(&bytes))
        .await
        .map_err(|e| AppError(StatusCode::INTERNAL_SERVER_ERROR, format!("PDF extraction crashed: {}", e)))??;
    Ok(doc)
}

/// Upload, extract and analyze in one step
async fn analyze_upload(
    state: &AppState,
    session: &mut SessionState,
    multipart: Multipart,
) -> Result<AnalysisOutcome, AppError> {
    session.require_page(Page::Upload)
        .map_err(|e| AppError(StatusCode::CONFLICT, e.to_string()))?;

    let (file_name, bytes) = read_upload(multipart).await?;
    tracing::info!("Received '{}' ({} bytes)", file_name, bytes.len());

    let doc = extract(bytes).await?;
    tracing::info!(
        "Extracted {} chars from {} pages ({} skipped)",
        doc.text.chars().count(), doc.page_count, doc.skipped_pages.len()
    );

    let outcome = analysis::run_analysis(state.completion.as_ref(), session, &file_name, doc).await?;
    settings::persist_in_background(settings::record_analysis);
    Ok(outcome)
}

// ============================================================================
// HTML handlers
// ============================================================================

// GET /
async fn index_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, session, created) = resolve_session(&state, &headers);
    let mut session = session.lock().await;
    let notice = session.take_notice();
    let page = render::render_page(&session, notice.as_ref());
    attach_cookie(Html(page).into_response(), id, created)
}

// POST /analyze
async fn analyze_form_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let (id, session, created) = resolve_session(&state, &headers);
    let mut session = session.lock().await;

    match analyze_upload(&state, &mut session, multipart).await {
        Ok(_) => session.set_notice(NoticeKind::Success, "✅ Analysis Finished!"),
        Err(e) => {
            tracing::warn!("[POST /analyze] {}", e);
            session.set_notice(NoticeKind::Error, e.to_string());
        }
    }
    redirect_home(id, created)
}

// POST /report
async fn report_form_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, session, created) = resolve_session(&state, &headers);
    let mut session = session.lock().await;
    if let Err(e) = session.view_report() {
        session.set_notice(NoticeKind::Error, e.to_string());
    }
    redirect_home(id, created)
}

// POST /new-upload
async fn new_upload_form_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, session, created) = resolve_session(&state, &headers);
    session.lock().await.new_upload();
    redirect_home(id, created)
}

// POST /chat
async fn chat_form_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(req): Form<ChatRequest>,
) -> Response {
    let (id, session, created) = resolve_session(&state, &headers);
    let mut session = session.lock().await;

    match chat::ask(state.completion.as_ref(), &mut session, &req.question).await {
        Ok(_) => settings::persist_in_background(settings::record_chat),
        Err(e) => session.set_notice(NoticeKind::Error, e.to_string()),
    }
    redirect_home(id, created)
}

// ============================================================================
// JSON handlers
// ============================================================================

// GET /api/session
async fn session_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, session, created) = resolve_session(&state, &headers);
    let session = session.lock().await;
    attach_cookie(Json(SessionView::new(id, &session)).into_response(), id, created)
}

// POST /api/analyze
async fn analyze_api_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let (id, session, created) = resolve_session(&state, &headers);
    let mut session = session.lock().await;

    let result = analyze_upload(&state, &mut session, multipart).await
        .map(|outcome| AnalyzeResponse {
            session: SessionView::new(id, &session),
            chars: outcome.chars,
            embedded_chars: outcome.embedded_chars,
            truncated: outcome.truncated,
        });
    api_response(result, id, created)
}

// POST /api/report
async fn report_api_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, session, created) = resolve_session(&state, &headers);
    let mut session = session.lock().await;
    let result = session.view_report()
        .map(|_| SessionView::new(id, &session))
        .map_err(|e| AppError(StatusCode::CONFLICT, e.to_string()));
    api_response(result, id, created)
}

// POST /api/new-upload
async fn new_upload_api_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, session, created) = resolve_session(&state, &headers);
    let mut session = session.lock().await;
    session.new_upload();
    attach_cookie(Json(SessionView::new(id, &session)).into_response(), id, created)
}

// POST /api/chat
async fn chat_api_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Response {
    let (id, session, created) = resolve_session(&state, &headers);
    let mut session = session.lock().await;

    let result = match chat::ask(state.completion.as_ref(), &mut session, &req.question).await {
        Ok(answer) => {
            settings::persist_in_background(settings::record_chat);
            Ok(ChatResponse { answer, session: SessionView::new(id, &session) })
        }
        Err(e) => Err(AppError::from(e)),
    };
    api_response(result, id, created)
}

// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: VERSION.to_string(),
        model: state.completion.model().to_string(),
        sessions: state.sessions.len(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(index_handler))
        .route("/analyze", post(analyze_form_handler))
        .route("/report", post(report_form_handler))
        .route("/new-upload", post(new_upload_form_handler))
        .route("/chat", post(chat_form_handler))
        .route("/api/session", get(session_handler))
        .route("/api/analyze", post(analyze_api_handler))
        .route("/api/report", post(report_api_handler))
        .route("/api/new-upload", post(new_upload_api_handler))
        .route("/api/chat", post(chat_api_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Periodically drop sessions nobody has touched within the idle timeout
fn spawn_session_sweeper(sessions: Arc<SessionStore>) -> tokio::task::JoinHandle<()> {
    let period = sessions.idle_timeout().clamp(Duration::from_secs(1), SESSION_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let removed = sessions.prune_idle();
            if removed > 0 {
                tracing::info!("Dropped {} idle sessions ({} active)", removed, sessions.len());
            }
        }
    })
}

/// Bind and serve until the process receives Ctrl-C
pub async fn serve(state: AppState, bind_addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    let sweeper = spawn_session_sweeper(state.sessions.clone());
    let result = axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await;
    sweeper.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai_client::mock::MockCompletion;
    use crate::document::pdf_extractor::test_pdf;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const BOUNDARY: &str = "legalizetestboundary";

    fn app(service: MockCompletion) -> Router {
        router(AppState::new(Arc::new(service), 1024 * 1024))
    }

    fn multipart_body(file_name: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/pdf\r\n\r\n"
        ).into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload(uri: &str, cookie: Option<&str>, pdf: &[u8]) -> Request<Body> {
        let mut builder = Request::post(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"));
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(multipart_body("lease.pdf", pdf))).unwrap()
    }

    fn post_empty(uri: &str, cookie: &str) -> Request<Body> {
        Request::post(uri).header(header::COOKIE, cookie).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, cookie: &str, json: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    /// "name=value" from the Set-Cookie header
    fn session_cookie(response: &Response) -> String {
        let set_cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn text_body(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_cookie_parsing() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(&format!("theme=dark; {}={}", SESSION_COOKIE, id)).unwrap());
        assert_eq!(cookie_session_id(&headers), Some(id));

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("legalize_session=not-a-uuid"));
        assert_eq!(cookie_session_id(&headers), None);
    }

    #[tokio::test]
    async fn test_index_starts_on_upload_page() {
        let response = app(MockCompletion::replying("unused"))
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_some());
        let html = text_body(response).await;
        assert!(html.contains("Analyze Contract Now"));
        assert!(!html.contains("View Full Audit Report"));
    }

    #[tokio::test]
    async fn test_full_api_flow() {
        let app = app(MockCompletion::replying("SAFETY SCORE: 7"));
        let pdf = test_pdf::build(&["Clause A", ""]);

        let response = app.clone().oneshot(upload("/api/analyze", None, &pdf)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = session_cookie(&response);
        let body = json_body(response).await;
        assert_eq!(body["session"]["analysis_result"], "SAFETY SCORE: 7");
        assert_eq!(body["session"]["current_page"], "upload");
        assert_eq!(body["session"]["document"]["page_count"], 2);
        assert_eq!(body["truncated"], false);

        let response = app.clone().oneshot(post_empty("/api/report", &cookie)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["current_page"], "results");

        let response = app.clone()
            .oneshot(post_json("/api/chat", &cookie, serde_json::json!({"question": "What is the termination clause?"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["answer"]["role"], "assistant");
        assert_eq!(body["session"]["messages"].as_array().unwrap().len(), 2);

        let response = app.clone().oneshot(post_empty("/api/new-upload", &cookie)).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["current_page"], "upload");
        assert_eq!(body["analysis_result"], "");
        assert!(body["messages"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_report_without_analysis_conflicts() {
        let app = app(MockCompletion::replying("unused"));
        let response = app.clone()
            .oneshot(Request::get("/api/session").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let cookie = session_cookie(&response);

        let response = app.oneshot(post_empty("/api/report", &cookie)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_analysis_error_keeps_upload_page() {
        let app = app(MockCompletion::failing("quota exceeded"));
        let pdf = test_pdf::build(&["Clause A"]);

        let response = app.clone().oneshot(upload("/api/analyze", None, &pdf)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let cookie = session_cookie(&response);
        assert!(json_body(response).await["error"].as_str().unwrap().starts_with("AI Error:"));

        let response = app
            .oneshot(Request::get("/api/session").header(header::COOKIE, &cookie).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["analysis_result"], "");
        assert_eq!(body["current_page"], "upload");
    }

    #[tokio::test]
    async fn test_failed_api_calls_still_set_the_cookie() {
        let state = AppState::new(Arc::new(MockCompletion::replying("unused")), 1024 * 1024);
        let sessions = state.sessions.clone();
        let app = router(state);

        let response = app.clone()
            .oneshot(Request::post("/api/report").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let cookie = session_cookie(&response);

        // the same session is reused, not a new one per failure
        for _ in 0..2 {
            let response = app.clone().oneshot(post_empty("/api/report", &cookie)).await.unwrap();
            assert_eq!(response.status(), StatusCode::CONFLICT);
            assert!(response.headers().get(header::SET_COOKIE).is_none());
        }
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_chat_question_stays_reachable() {
        let state = AppState::new(Arc::new(MockCompletion::failing("backend unavailable")), 1024 * 1024);
        let (id, session, _) = state.sessions.get_or_create(None);
        {
            let mut session = session.lock().await;
            session.contract_text = "Clause A".to_string();
            session.analysis_result = "SAFETY SCORE: 7".to_string();
            session.view_report().unwrap();
        }
        let cookie = format!("{}={}", SESSION_COOKIE, id);
        let app = router(state);

        let response = app.clone()
            .oneshot(post_json("/api/chat", &cookie, serde_json::json!({"question": "Notice period?"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = app
            .oneshot(Request::get("/api/session").header(header::COOKIE, &cookie).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["session_id"], id.to_string());
        assert_eq!(body["messages"][0]["content"], "Notice period?");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_cookie_starts_over() {
        let state = AppState::new(Arc::new(MockCompletion::replying("unused")), 1024 * 1024)
            .with_session_idle_timeout(Duration::from_millis(1));
        let (stale, _, _) = state.sessions.get_or_create(None);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let response = router(state)
            .oneshot(Request::get("/api/session")
                .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, stale))
                .body(Body::empty())
                .unwrap())
            .await
            .unwrap();
        let cookie = session_cookie(&response);
        assert_ne!(cookie, format!("{}={}", SESSION_COOKIE, stale));
    }

    #[tokio::test]
    async fn test_blank_pdf_is_unprocessable() {
        let service = MockCompletion::replying("unused");
        let response = app(service)
            .oneshot(upload("/api/analyze", None, &test_pdf::build(&[""])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_form_flow_redirects_and_shows_notice() {
        let app = app(MockCompletion::failing("quota exceeded"));
        let pdf = test_pdf::build(&["Clause A"]);

        let response = app.clone().oneshot(upload("/analyze", None, &pdf)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");
        let cookie = session_cookie(&response);

        let page = |app: Router| {
            let cookie = cookie.clone();
            async move {
                let response = app
                    .oneshot(Request::get("/").header(header::COOKIE, cookie).body(Body::empty()).unwrap())
                    .await
                    .unwrap();
                text_body(response).await
            }
        };

        let html = page(app.clone()).await;
        assert!(html.contains("AI Error: API error 429: quota exceeded"));
        // notice is shown once
        let html = page(app).await;
        assert!(!html.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_health_reports_model() {
        let response = app(MockCompletion::replying("unused"))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model"], "mock-model");
    }
}
