//! Loopback stub of the indexer API and of the blob host serving artifacts.
//!
//! The stub account is `acc-1` in location `trial`. Account tokens are
//! `account-token-{allowEdit}`, video tokens `video-token-{id}`.

use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use indexer_client::gateway::SUBSCRIPTION_KEY_HEADER;
use indexer_client::{AccountConfig, HttpConfig, IndexerClient};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use uuid::Uuid;

pub const LOCATION: &str = "trial";
pub const ACCOUNT_ID: &str = "acc-1";
pub const SUBSCRIPTION_KEY: &str = "stub-subscription-key";

/// What the stub serves
#[derive(Debug, Clone, Default)]
pub struct StubConfig {
    /// Artifact kinds that resolve; every other kind answers 404
    pub available_artifacts: Vec<&'static str>,
    /// Videos listed by the account, with their keyword entries
    /// (name, number of appearances)
    pub videos: Vec<(&'static str, Vec<(&'static str, usize)>)>,
    /// Names of the account's person models; `None` answers 429 with
    /// `Retry-After: 30`
    pub person_models: Option<Vec<&'static str>>,
}

/// One request as seen by a stub server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub had_subscription_key: bool,
}

impl RecordedRequest {
    /// Decoded query pairs, in order
    pub fn params(&self) -> Vec<(String, String)> {
        let url = reqwest::Url::parse(&format!(
            "http://stub{}?{}",
            self.path,
            self.query.as_deref().unwrap_or_default()
        ))
        .unwrap();
        url.query_pairs().into_owned().collect()
    }

    /// First value of a query parameter
    pub fn param(&self, name: &str) -> Option<String> {
        self.params()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

/// One part of a multipart upload
#[derive(Debug, Clone)]
pub struct UploadedPart {
    pub name: String,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct RequestLog(Mutex<Vec<RecordedRequest>>);

struct ApiState {
    config: StubConfig,
    blob_url: String,
    log: RequestLog,
    json_bodies: Mutex<Vec<serde_json::Value>>,
    uploads: Mutex<Vec<UploadedPart>>,
}

pub struct StubIndexer {
    pub api_url: String,
    pub blob_url: String,
    api: Arc<ApiState>,
    blobs: Arc<RequestLog>,
}

/// Bytes the blob host serves for an artifact
pub fn blob_payload(video_id: &str, kind: &str) -> Vec<u8> {
    format!("{{\"videoId\":\"{}\",\"artifact\":\"{}\",\"data\":[1,2,3]}}", video_id, kind)
        .repeat(8)
        .into_bytes()
}

impl StubIndexer {
    pub async fn start(config: StubConfig) -> Self {
        let blobs = Arc::new(RequestLog::default());
        let blob_router = Router::new()
            .route("/blobs/:video_id/:kind", get(blob))
            .layer(middleware::from_fn_with_state(blobs.clone(), record_blob));
        let blob_url = serve(blob_router).await;

        let api = Arc::new(ApiState {
            config,
            blob_url: blob_url.clone(),
            log: RequestLog::default(),
            json_bodies: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        });

        let account = format!("/{}/Accounts/{}", LOCATION, ACCOUNT_ID);
        let auth = format!("/Auth/{}/Accounts/{}", LOCATION, ACCOUNT_ID);
        let api_router = Router::new()
            .route(&format!("{}/AccessToken", auth), get(account_token))
            .route(&format!("{}/Videos/:video_id/AccessToken", auth), get(video_token))
            .route(&format!("{}/Videos", account), get(list_videos).post(upload_video))
            // Search shares the id slot with single-video routes
            .route(
                &format!("{}/Videos/:video_id", account),
                get(search_videos).delete(delete_video),
            )
            .route(&format!("{}/Customization/PersonModels", account), get(person_models))
            .route(
                &format!("{}/Customization/PersonModels/:model_id/Persons/:person_id/Faces", account),
                post(create_faces),
            )
            .route(&format!("{}/Projects", account), post(create_project))
            .route(&format!("{}/Projects/:project_id/render", account), post(render_project))
            .route(&format!("{}/Videos/:video_id/Index", account), get(video_index))
            .route(&format!("{}/Videos/:video_id/ArtifactUrl", account), get(artifact_url))
            .route(&format!("{}/Videos/:video_id/InsightsWidget", account), get(insights_widget))
            .route(&format!("{}/Videos/:video_id/streaming-url", account), get(broken))
            .layer(middleware::from_fn_with_state(api.clone(), record_api))
            .with_state(api.clone());
        let api_url = serve(api_router).await;

        Self {
            api_url,
            blob_url,
            api,
            blobs,
        }
    }

    /// Client bound to the stub account
    pub fn client(&self) -> IndexerClient {
        let account = AccountConfig::new(LOCATION, ACCOUNT_ID, SUBSCRIPTION_KEY)
            .with_api_url(self.api_url.as_str());
        IndexerClient::new(account, HttpConfig::default()).unwrap()
    }

    pub fn api_requests(&self) -> Vec<RecordedRequest> {
        self.api.log.0.lock().unwrap().clone()
    }

    pub fn blob_requests(&self) -> Vec<RecordedRequest> {
        self.blobs.0.lock().unwrap().clone()
    }

    /// JSON bodies posted to the API, in arrival order
    pub fn json_bodies(&self) -> Vec<serde_json::Value> {
        self.api.json_bodies.lock().unwrap().clone()
    }

    /// Multipart parts received by the upload route
    pub fn uploads(&self) -> Vec<UploadedPart> {
        self.api.uploads.lock().unwrap().clone()
    }
}

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", address)
}

fn recorded(request: &Request) -> RecordedRequest {
    RecordedRequest {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        query: request.uri().query().map(str::to_string),
        had_subscription_key: request.headers().contains_key(SUBSCRIPTION_KEY_HEADER),
    }
}

async fn record_api(State(api): State<Arc<ApiState>>, request: Request, next: Next) -> Response {
    api.log.0.lock().unwrap().push(recorded(&request));
    next.run(request).await
}

async fn record_blob(State(log): State<Arc<RequestLog>>, request: Request, next: Next) -> Response {
    log.0.lock().unwrap().push(recorded(&request));
    next.run(request).await
}

async fn account_token(Query(query): Query<HashMap<String, String>>) -> Json<String> {
    let allow_edit = query.get("allowEdit").cloned().unwrap_or_default();
    Json(format!("account-token-{}", allow_edit))
}

async fn video_token(Path(video_id): Path<String>) -> Json<String> {
    Json(format!("video-token-{}", video_id))
}

fn has_video_token(query: &HashMap<String, String>, video_id: &str) -> bool {
    query.get("accessToken") == Some(&format!("video-token-{}", video_id))
}

async fn list_videos(
    State(api): State<Arc<ApiState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !query.contains_key("accessToken") {
        return (StatusCode::UNAUTHORIZED, "missing token").into_response();
    }

    let results: Vec<_> = api
        .config
        .videos
        .iter()
        .map(|(id, _)| json!({ "accountId": ACCOUNT_ID, "id": id, "name": id, "state": "Processed" }))
        .collect();

    Json(json!({
        "results": results,
        "nextPage": { "pageSize": 25, "skip": 0, "done": true }
    }))
    .into_response()
}

async fn search_videos(
    Path(video_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if video_id != "Search" {
        return StatusCode::NOT_FOUND.into_response();
    }
    if !query.contains_key("accessToken") {
        return (StatusCode::UNAUTHORIZED, "missing token").into_response();
    }

    Json(json!({
        "results": [],
        "nextPage": { "pageSize": 25, "skip": 0, "done": true }
    }))
    .into_response()
}

async fn delete_video(
    Path(video_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !has_video_token(&query, &video_id) {
        return (StatusCode::UNAUTHORIZED, "wrong token").into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn upload_video(
    State(api): State<Arc<ApiState>>,
    Query(query): Query<HashMap<String, String>>,
    request: Request,
) -> Response {
    if !query.contains_key("accessToken") {
        return (StatusCode::UNAUTHORIZED, "missing token").into_response();
    }

    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if is_multipart {
        let mut multipart = match Multipart::from_request(request, &()).await {
            Ok(multipart) => multipart,
            Err(rejection) => return rejection.into_response(),
        };
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let bytes = field.bytes().await.unwrap().to_vec();
            api.uploads.lock().unwrap().push(UploadedPart {
                name,
                file_name,
                bytes,
            });
        }
    }

    Json(json!({
        "accountId": ACCOUNT_ID,
        "id": "vid-new",
        "name": query.get("name"),
        "state": "Uploaded"
    }))
    .into_response()
}

async fn person_models(
    State(api): State<Arc<ApiState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let Some(names) = &api.config.person_models else {
        return throttled().await;
    };
    if !query.contains_key("accessToken") {
        return (StatusCode::UNAUTHORIZED, "missing token").into_response();
    }

    let models: Vec<_> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            json!({
                "id": Uuid::from_u128(i as u128 + 1),
                "name": name,
                "isDefault": i == 0,
                "personsCount": 0
            })
        })
        .collect();
    Json(models).into_response()
}

async fn create_faces(
    State(api): State<Arc<ApiState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    api.json_bodies.lock().unwrap().push(body);
    Json(json!(["face-1", "face-2"])).into_response()
}

async fn create_project(
    State(api): State<Arc<ApiState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let name = body["name"].clone();
    api.json_bodies.lock().unwrap().push(body);
    Json(json!({
        "accountId": ACCOUNT_ID,
        "id": "proj-1",
        "name": name,
        "state": "Uploaded"
    }))
    .into_response()
}

async fn render_project(Path(project_id): Path<String>) -> Response {
    if project_id != "proj-1" {
        return StatusCode::NOT_FOUND.into_response();
    }
    StatusCode::ACCEPTED.into_response()
}

async fn insights_widget(
    Path(video_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !has_video_token(&query, &video_id) {
        return (StatusCode::UNAUTHORIZED, "wrong token").into_response();
    }
    let allow_edit = query.get("allowEdit").cloned().unwrap_or_default();
    format!("<iframe data-video=\"{}\" data-allow-edit=\"{}\"></iframe>", video_id, allow_edit)
        .into_response()
}

async fn video_index(
    State(api): State<Arc<ApiState>>,
    Path(video_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !has_video_token(&query, &video_id) {
        return (StatusCode::UNAUTHORIZED, "wrong token").into_response();
    }

    let Some((_, keywords)) = api.config.videos.iter().find(|(id, _)| *id == video_id) else {
        return (StatusCode::NOT_FOUND, r#"{"ErrorType":"VIDEO_NOT_FOUND"}"#).into_response();
    };

    let keywords: Vec<_> = keywords
        .iter()
        .enumerate()
        .map(|(i, (name, appearances))| {
            let appearances: Vec<_> = (0..*appearances)
                .map(|n| json!({ "startTime": format!("0:00:{:02}", n), "endTime": format!("0:00:{:02}", n + 1) }))
                .collect();
            json!({ "id": i, "name": name, "isTranscript": true, "appearances": appearances })
        })
        .collect();

    Json(json!({
        "id": video_id,
        "summarizedInsights": { "id": video_id, "keywords": keywords }
    }))
    .into_response()
}

async fn artifact_url(
    State(api): State<Arc<ApiState>>,
    Path(video_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !has_video_token(&query, &video_id) {
        return (StatusCode::UNAUTHORIZED, "wrong token").into_response();
    }

    let kind = query.get("type").cloned().unwrap_or_default();
    if api.config.available_artifacts.iter().any(|k| *k == kind) {
        Json(format!(
            "{}/blobs/{}/{}?sv=2020-08-04&sig=c2lnbmF0dXJl",
            api.blob_url, video_id, kind
        ))
        .into_response()
    } else {
        (StatusCode::NOT_FOUND, r#"{"ErrorType":"ARTIFACT_NOT_FOUND"}"#).into_response()
    }
}

async fn blob(Path((video_id, kind)): Path<(String, String)>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    (headers, blob_payload(&video_id, &kind)).into_response()
}

async fn throttled() -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::RETRY_AFTER, HeaderValue::from_static("30"));
    (
        StatusCode::TOO_MANY_REQUESTS,
        headers,
        r#"{"ErrorType":"USER_THROTTLED","Message":"Too many requests"}"#,
    )
        .into_response()
}

async fn broken() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "streaming backend unavailable").into_response()
}
