use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, RANGE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use axum_extra::headers::{ContentLength, HeaderMapExt};

use crate::config::Config;
use crate::encode::{encode, EncodedPayload};
use crate::error::ServeError;
use crate::plan::{content_type, plan, BodyPlan};
use crate::range::RangeOutcome;
use crate::resource::{ResourceDescriptor, ResourceStore};

pub const STREAM_PATH: &str = "/api/pdf-stream";
pub const RANGE_PATH: &str = "/api/pdf-range-request";
pub const BASE64_PATH: &str = "/api/pdf-base64";

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ResourceStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: impl ResourceStore + 'static, config: Config) -> Self {
        AppState { store: Arc::new(store), config: Arc::new(config) }
    }

    /// Existence gate shared by every endpoint.
    async fn describe(&self, id: &str) -> Result<ResourceDescriptor, ServeError> {
        match self.store.describe(id).await? {
            Some(descriptor) => Ok(descriptor.with_content_type(self.config.content_type.as_str())),
            None => Err(ServeError::NotFound(id.to_string())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(STREAM_PATH, get(stream_file))
        .route(RANGE_PATH, get(range_file))
        .route(BASE64_PATH, get(base64_file))
        .with_state(state)
}

async fn stream_file(
    State(state): State<AppState>,
    method: Method,
) -> Result<Response, ServeError> {
    let resource = state.describe(&state.config.stream_file).await?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, content_type(&resource));
    headers.typed_insert(ContentLength(resource.size));
    let disposition = format!("inline; filename={}", state.config.file_name);
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(CONTENT_DISPOSITION, value);
    }

    if method != Method::GET {
        return Ok((StatusCode::OK, headers).into_response());
    }

    let stream = state.store.open_window(&resource.id, resource.size, BodyPlan::Full).await?;
    Ok((StatusCode::OK, headers, stream).into_response())
}

async fn range_file(
    State(state): State<AppState>,
    method: Method,
    request_headers: HeaderMap,
) -> Result<Response, ServeError> {
    let resource = state.describe(&state.config.range_file).await?;

    // non-utf8 values still count as a (malformed) range header
    let range = request_headers
        .get(RANGE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());
    tracing::debug!(id = %resource.id, range = ?range, "range request");

    let outcome = RangeOutcome::parse(range.as_deref(), resource.size);
    let decision = plan(outcome, &resource).for_method(&method);

    let body = match decision.body {
        BodyPlan::Empty => Body::empty(),
        body_plan => {
            let stream = state.store.open_window(&resource.id, resource.size, body_plan).await?;
            Body::new(stream)
        }
    };

    Ok((decision.status, decision.headers, body).into_response())
}

async fn base64_file(State(state): State<AppState>) -> Result<Json<EncodedPayload>, ServeError> {
    let config = &state.config;
    let payload = encode(state.store.as_ref(), &config.base64_file, &config.file_name).await?;
    Ok(Json(payload))
}
