//! The document HTTP service implementing hyper's `Service` trait.
//!
//! [`DocumentService`] handles, in order:
//!
//! 1. CORS preflight (`OPTIONS`)
//! 2. Health check (`GET /health`)
//! 3. Route resolution under `/api/documents`
//! 4. Upload authorization and size-limited body collection
//! 5. Dispatch to the [`DocumentManager`]
//! 6. CORS response headers and one request log event per response

use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, HeaderValue, USER_AGENT,
};
use http::{Method, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::Service;
use serde::{Deserialize, Serialize};
use tempvault_documents::{
    DocumentError, DocumentManager, DocumentView, DownloadedDocument, NewDocument,
};
use tracing::field::display;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{UploadAuthError, authorize_upload};
use crate::body::{ResponseBody, empty_response, full_body, json_response, message_response};
use crate::config::ServerConfig;
use crate::multipart::{extract_boundary, parse_file_part};

const DOCUMENTS_PREFIX: &str = "/api/documents";

/// A resolved request target.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route<'a> {
    Preflight,
    Health,
    List,
    Upload { permanent: bool },
    Download(&'a str),
    Extend(&'a str),
    MethodNotAllowed,
    NotFound,
}

impl<'a> Route<'a> {
    fn resolve(method: &Method, path: &'a str) -> Self {
        if *method == Method::OPTIONS {
            return Self::Preflight;
        }
        if path == "/health" {
            return if *method == Method::GET {
                Self::Health
            } else {
                Self::MethodNotAllowed
            };
        }

        let Some(rest) = path.strip_prefix(DOCUMENTS_PREFIX) else {
            return Self::NotFound;
        };
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        if !rest.is_empty() && !rest.starts_with('/') {
            return Self::NotFound;
        }

        match (method, segments.as_slice()) {
            (&Method::GET, []) => Self::List,
            (&Method::POST, []) => Self::Upload { permanent: false },
            (&Method::POST, ["permanent"]) => Self::Upload { permanent: true },
            (&Method::GET, [id]) => Self::Download(id),
            (&Method::POST, [id, "extend"]) => Self::Extend(id),
            (_, [] | ["permanent"] | [_] | [_, "extend"]) => Self::MethodNotAllowed,
            _ => Self::NotFound,
        }
    }
}

/// Shared state behind every connection.
#[derive(Debug)]
pub struct AppState {
    manager: Arc<DocumentManager>,
    config: ServerConfig,
}

impl AppState {
    /// Bundle the manager with the server settings.
    #[must_use]
    pub fn new(manager: Arc<DocumentManager>, config: ServerConfig) -> Self {
        Self { manager, config }
    }
}

/// Address of the connection a request arrived on, stored in request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

/// Who sent a request, as recorded in the request log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RequestOrigin {
    ip: Option<IpAddr>,
    user_agent: Option<String>,
}

impl RequestOrigin {
    /// The first `X-Forwarded-For` hop wins over the socket peer.
    fn of<B>(req: &Request<B>) -> Self {
        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|hop| hop.trim().parse().ok());
        let peer = req.extensions().get::<PeerAddr>().map(|peer| peer.0.ip());
        let user_agent = req
            .headers()
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        Self {
            ip: forwarded.or(peer),
            user_agent,
        }
    }
}

/// Hyper service serving the document API.
#[derive(Debug, Clone)]
pub struct DocumentService {
    state: Arc<AppState>,
    peer: Option<SocketAddr>,
}

impl DocumentService {
    /// Create the service over shared state.
    #[must_use]
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state, peer: None }
    }

    /// The same service bound to one accepted connection.
    #[must_use]
    pub fn for_peer(&self, peer: SocketAddr) -> Self {
        Self {
            state: Arc::clone(&self.state),
            peer: Some(peer),
        }
    }
}

impl Service<Request<Incoming>> for DocumentService {
    type Response = Response<ResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, mut req: Request<Incoming>) -> Self::Future {
        if let Some(peer) = self.peer {
            req.extensions_mut().insert(PeerAddr(peer));
        }
        let state = Arc::clone(&self.state);
        Box::pin(async move { Ok(handle(&state, req).await) })
    }
}

/// Serve one request end to end.
pub async fn handle<B>(state: &AppState, req: Request<B>) -> Response<ResponseBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let started = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let origin = RequestOrigin::of(&req);
    debug!(%method, %path, request_id, "processing request");

    let mut response = dispatch(state, req).await;
    apply_cors(&mut response, &state.config.cors_origin);
    log_request(&RequestLog {
        method: &method,
        path: &path,
        status: response.status(),
        elapsed: started.elapsed(),
        request_id: &request_id,
        origin: &origin,
    });
    response
}

async fn dispatch<B>(state: &AppState, req: Request<B>) -> Response<ResponseBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let path = req.uri().path().to_owned();
    match Route::resolve(req.method(), &path) {
        Route::Preflight => empty_response(StatusCode::NO_CONTENT),
        Route::Health => json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" })),
        Route::List => match state.manager.list().await {
            Ok(items) => json_response(StatusCode::OK, &ListResponse { items: &items }),
            Err(err) => document_error_response(&err),
        },
        Route::Upload { permanent } => upload(state, req, permanent).await,
        Route::Download(id) => match state.manager.download(id).await {
            Ok(document) => download_response(document),
            Err(err) => document_error_response(&err),
        },
        Route::Extend(id) => extend(state, req, id).await,
        Route::MethodNotAllowed => {
            message_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed.")
        }
        Route::NotFound => message_response(StatusCode::NOT_FOUND, "Not found."),
    }
}

async fn upload<B>(state: &AppState, req: Request<B>, permanent: bool) -> Response<ResponseBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    if permanent {
        let configured = state.config.upload_auth_token.as_deref();
        if let Err(err) = authorize_upload(configured, req.headers()) {
            let status = match err {
                UploadAuthError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
                UploadAuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            };
            return message_response(status, &err.to_string());
        }
    }

    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let body = match collect_limited(req.into_body(), state.config.max_upload_bytes).await {
        Ok(body) => body,
        Err(response) => return response,
    };

    let part = extract_boundary(&content_type)
        .and_then(|boundary| parse_file_part(&body, &boundary));
    let part = match part {
        Ok(part) => part,
        Err(err) => {
            debug!(error = %err, "upload carried no file");
            return message_response(StatusCode::BAD_REQUEST, "File is required.");
        }
    };

    let file = NewDocument {
        file_name: part.filename,
        content_type: part.content_type,
        body: part.data,
    };
    match state.manager.upload(file, permanent).await {
        Ok(view) => json_response(StatusCode::CREATED, &view),
        Err(err) => document_error_response(&err),
    }
}

#[derive(Debug, Serialize)]
struct ListResponse<'a> {
    items: &'a [DocumentView],
}

#[derive(Debug, Deserialize)]
struct ExtendRequest {
    minutes: Option<serde_json::Value>,
}

async fn extend<B>(state: &AppState, req: Request<B>, id: &str) -> Response<ResponseBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let body = match collect_limited(req.into_body(), state.config.max_upload_bytes).await {
        Ok(body) => body,
        Err(response) => return response,
    };
    let minutes = serde_json::from_slice::<ExtendRequest>(&body)
        .ok()
        .and_then(|request| request.minutes)
        .and_then(|value| minutes_from_json(&value))
        .unwrap_or(f64::NAN);

    match state.manager.extend(id, minutes).await {
        Ok(extended) => json_response(StatusCode::OK, &extended),
        Err(err) => document_error_response(&err),
    }
}

/// Accept a JSON number or a numeric string.
fn minutes_from_json(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Collect at most `limit` bytes, answering 413 past it.
async fn collect_limited<B>(body: B, limit: usize) -> Result<Bytes, Response<ResponseBody>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => Err(message_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "File exceeds the upload size limit.",
        )),
        Err(err) => {
            warn!(error = %err, "failed to read request body");
            Err(message_response(StatusCode::BAD_REQUEST, "Failed to read request body."))
        }
    }
}

fn download_response(document: DownloadedDocument) -> Response<ResponseBody> {
    let content_type = HeaderValue::from_str(&document.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_bytes(document.content_disposition().as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    let length = HeaderValue::from(document.content_length());

    let mut response = Response::new(full_body(document.body));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(CONTENT_LENGTH, length);
    headers.insert(CONTENT_DISPOSITION, disposition);
    response
}

fn document_error_response(err: &DocumentError) -> Response<ResponseBody> {
    if !err.is_client_error() {
        error!(error = %err, "document operation failed");
        return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.");
    }
    let status = if matches!(err, DocumentError::NotFoundOrExpired { .. }) {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::BAD_REQUEST
    };
    message_response(status, &err.to_string())
}

fn apply_cors(response: &mut Response<ResponseBody>, origin: &str) {
    let headers = response.headers_mut();
    if let Ok(origin) = HeaderValue::from_str(origin) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET,HEAD,PUT,PATCH,POST,DELETE"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type"),
    );
}

struct RequestLog<'a> {
    method: &'a Method,
    path: &'a str,
    status: StatusCode,
    elapsed: Duration,
    request_id: &'a str,
    origin: &'a RequestOrigin,
}

fn log_request(log: &RequestLog<'_>) {
    let duration_ms = u64::try_from(log.elapsed.as_millis()).unwrap_or(u64::MAX);
    let status = log.status.as_u16();
    let method = display(log.method);
    let ip = log.origin.ip.map(display);
    let user_agent = log.origin.user_agent.as_deref();
    let (path, request_id) = (log.path, log.request_id);
    if status >= 500 {
        error!(method, path, status, duration_ms, ip, user_agent, request_id, "request completed");
    } else if status >= 400 {
        warn!(method, path, status, duration_ms, ip, user_agent, request_id, "request completed");
    } else {
        info!(method, path, status, duration_ms, ip, user_agent, request_id, "request completed");
    }
}
